//! Baseline construction and verification.
//!
//! The engine walks the requested paths, runs the configured checks through
//! the [`CheckRegistry`] and persists one [`BaselineRecord`] per path. Verify
//! re-runs the checks each record names and collects every failure instead of
//! stopping at the first one.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::checks::{CheckList, CheckRegistry, Target, DEFAULT_DIR_CHECKS, DEFAULT_FILE_CHECKS};
use crate::error::{Error, Result};
use crate::fileset::FilesetName;
use crate::paths;
use crate::record::{BaselineRecord, CheckValue, Entry};
use crate::store::Store;

/// Pseudo check name for failures found before any check runs.
pub const BASIC_CHECK: &str = "basic";

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub fileset: FilesetName,
    pub recursive: bool,
    pub overwrite: bool,
    pub skip: bool,
    pub file_checks: CheckList,
    pub dir_checks: CheckList,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AddSummary {
    pub added: usize,
    pub skipped: usize,
}

/// One failed check on one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: String,
    pub check: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone)]
pub struct VerifyReport {
    /// Number of stored entries examined.
    pub entries: usize,
    pub failures: Vec<Failure>,
}

impl VerifyReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &str, check: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(path = %path, check = %check, "{reason}");
        self.failures.push(Failure {
            path: path.to_string(),
            check: check.to_string(),
            reason,
        });
    }
}

pub struct RecordEngine {
    registry: CheckRegistry,
}

impl RecordEngine {
    pub fn new(registry: CheckRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Options for `fileset` with the default check lists.
    pub fn default_options(&self, fileset: FilesetName) -> Result<AddOptions> {
        self.options(fileset, DEFAULT_FILE_CHECKS, DEFAULT_DIR_CHECKS)
    }

    /// Options for `fileset`, validating both check lists up front.
    pub fn options(&self, fileset: FilesetName, file_checks: &str, dir_checks: &str) -> Result<AddOptions> {
        Ok(AddOptions {
            fileset,
            recursive: true,
            overwrite: false,
            skip: false,
            file_checks: self.registry.parse_list(Target::File, file_checks)?,
            dir_checks: self.registry.parse_list(Target::Dir, dir_checks)?,
        })
    }

    /// Record a baseline for every path, descending into directories when
    /// `opts.recursive` is set.
    ///
    /// Symbolic links below a root are recorded with their target's
    /// attributes but never descended into.
    pub fn add_files<P: AsRef<Path>>(
        &self,
        store: &Store,
        inputs: &[P],
        opts: &AddOptions,
    ) -> Result<AddSummary> {
        let mut summary = AddSummary::default();
        for path in inputs {
            let root = paths::absolute(path.as_ref())?;
            let mut walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
            if !opts.recursive {
                walker = walker.max_depth(0);
            }
            for entry in walker {
                let entry = entry.map_err(|source| Error::Walk {
                    path: root.display().to_string(),
                    source,
                })?;
                self.add_one(store, entry.path(), opts, &mut summary)?;
            }
        }
        info!(
            fileset = %opts.fileset,
            added = summary.added,
            skipped = summary.skipped,
            "baseline updated"
        );
        Ok(summary)
    }

    fn add_one(
        &self,
        store: &Store,
        path: &Path,
        opts: &AddOptions,
        summary: &mut AddSummary,
    ) -> Result<()> {
        let key = paths::path_key(path)?;
        let meta = fs::metadata(path).map_err(|source| Error::File {
            path: key.clone(),
            source,
        })?;
        let target = Target::of(meta.is_dir());
        let checks = match target {
            Target::File => &opts.file_checks,
            Target::Dir => &opts.dir_checks,
        };

        let mut record = BaselineRecord::new(meta.is_dir());
        for name in checks.names() {
            let check = self
                .registry
                .get(target, name)
                .ok_or_else(|| Error::UnknownCheck(name.clone()))?;
            let value = check.prepare(path, &meta).map_err(|source| Error::Prepare {
                kind: target.label(),
                path: key.clone(),
                check: name.clone(),
                source,
            })?;
            record.checks.push(name.clone());
            record.data.insert(name.clone(), value);
        }

        match store.add(&key, &record, &opts.fileset, opts.overwrite) {
            Ok(()) => {
                debug!(path = %key, "recorded");
                summary.added += 1;
                Ok(())
            }
            Err(Error::RecordExists { path }) if opts.skip => {
                info!(path = %path, "skip");
                summary.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Compare stored baselines with the filesystem.
    ///
    /// With no paths every entry of `fileset` is verified; otherwise each path
    /// selects the entries whose key starts with it.
    pub fn verify_files<P: AsRef<Path>>(
        &self,
        store: &Store,
        inputs: &[P],
        fileset: &FilesetName,
    ) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        if inputs.is_empty() {
            let rows = store.query_raw_by_prefix(fileset, "")?;
            info!("{} entries", rows.len());
            self.verify_rows(rows, &mut report);
        }
        for path in inputs {
            let prefix = paths::path_key(&paths::absolute(path.as_ref())?)?;
            let rows = store.query_raw_by_prefix(fileset, &prefix)?;
            info!("{} entries with prefix {:?}", rows.len(), prefix);
            self.verify_rows(rows, &mut report);
        }
        Ok(report)
    }

    /// A row that no longer decodes is one failure; the rest still run.
    fn verify_rows(&self, rows: Vec<(String, Vec<u8>)>, report: &mut VerifyReport) {
        for (path, value) in rows {
            report.entries += 1;
            match BaselineRecord::from_bytes(&value) {
                Ok(record) => self.verify_entry(&Entry { path, record }, report),
                Err(e) => report.fail(&path, BASIC_CHECK, format!("data corrupt: {e}")),
            }
        }
    }

    fn verify_entry(&self, entry: &Entry, report: &mut VerifyReport) {
        let path = Path::new(&entry.path);
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => {
                report.fail(&entry.path, BASIC_CHECK, "file not found");
                return;
            }
        };
        if meta.is_dir() != entry.record.is_dir {
            let reason = if meta.is_dir() {
                "file mutation"
            } else {
                "dir mutation"
            };
            report.fail(&entry.path, BASIC_CHECK, reason);
            return;
        }

        let target = Target::of(entry.record.is_dir);
        for name in &entry.record.checks {
            let Some(check) = self.registry.get(target, name) else {
                report.fail(&entry.path, name, "unknown check");
                continue;
            };
            let baseline = entry.record.data.get(name).unwrap_or(&CheckValue::Empty);
            if let Err(e) = check.execute(path, baseline, &meta) {
                report.fail(&entry.path, name, e.to_string());
            }
        }
    }

    /// Remove every stored entry at or below each path. Missing entries are
    /// ignored.
    pub fn delete_files<P: AsRef<Path>>(
        &self,
        store: &Store,
        inputs: &[P],
        fileset: &FilesetName,
    ) -> Result<usize> {
        let mut removed = 0;
        for path in inputs {
            let prefix = paths::path_key(&paths::absolute(path.as_ref())?)?;
            for entry in store.query_by_prefix(fileset, &prefix)? {
                store.delete(&entry.path, fileset, true)?;
                debug!(path = %entry.path, "deleted");
                removed += 1;
            }
        }
        info!(fileset = %fileset, removed, "entries deleted");
        Ok(removed)
    }

    pub fn list(&self, store: &Store, fileset: &FilesetName) -> Result<Vec<Entry>> {
        store.list(fileset)
    }

    pub fn list_filesets(&self, store: &Store) -> Result<Vec<FilesetName>> {
        store.list_fileset_names()
    }

    pub fn delete_fileset(&self, store: &Store, fileset: &FilesetName) -> Result<()> {
        store.delete_fileset(fileset)?;
        info!(fileset = %fileset, "fileset deleted");
        Ok(())
    }

    pub fn copy_fileset(&self, store: &Store, src: &FilesetName, dst: &FilesetName) -> Result<()> {
        store.copy_fileset(src, dst)?;
        info!(src = %src, dst = %dst, "fileset copied");
        Ok(())
    }
}

impl Default for RecordEngine {
    fn default() -> Self {
        Self::new(CheckRegistry::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckError};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct AlwaysFails;

    impl Check for AlwaysFails {
        fn prepare(&self, _: &Path, _: &fs::Metadata) -> std::result::Result<CheckValue, CheckError> {
            Ok(CheckValue::Empty)
        }

        fn execute(
            &self,
            _: &Path,
            _: &CheckValue,
            _: &fs::Metadata,
        ) -> std::result::Result<(), CheckError> {
            Err(CheckError::Mismatch("always".into()))
        }
    }

    fn write_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store.begin(true).unwrap();
        store
    }

    #[test]
    fn fake_checks_plug_into_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();

        let mut registry = CheckRegistry::new();
        registry.register(Target::File, "fails", Arc::new(AlwaysFails));
        registry.register(Target::Dir, "fails", Arc::new(AlwaysFails));
        let engine = RecordEngine::new(registry);
        let opts = engine
            .options(FilesetName::default(), "fails", "fails")
            .unwrap();

        let store = write_store();
        let summary = engine.add_files(&store, &[dir.path()], &opts).unwrap();
        assert_eq!(summary.added, 2);

        let report = engine
            .verify_files(&store, &[] as &[PathBuf], &opts.fileset)
            .unwrap();
        assert_eq!(report.entries, 2);
        assert_eq!(report.failure_count(), 2);
        assert!(report.failures.iter().all(|f| f.reason == "always"));
    }

    #[test]
    fn unknown_check_in_record_counts_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        let key = paths::path_key(&file).unwrap();

        let store = write_store();
        let mut record = BaselineRecord::new(false);
        record.checks = vec!["size".into(), "retired".into()];
        record.data.insert("size".into(), CheckValue::Text("1".into()));
        store
            .add(&key, &record, &FilesetName::default(), false)
            .unwrap();

        let report = RecordEngine::default()
            .verify_files(&store, &[&file], &FilesetName::default())
            .unwrap();
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].check, "retired");
        assert_eq!(report.failures[0].reason, "unknown check");
    }

    #[test]
    fn kind_change_is_one_basic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p");
        fs::write(&path, b"x").unwrap();

        let engine = RecordEngine::default();
        let opts = engine.default_options(FilesetName::default()).unwrap();
        let store = write_store();
        engine.add_files(&store, &[&path], &opts).unwrap();

        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        let report = engine
            .verify_files(&store, &[&path], &opts.fileset)
            .unwrap();
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].check, BASIC_CHECK);
        assert_eq!(report.failures[0].reason, "file mutation");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join("inner"), b"x").unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path(), real.join("up")).unwrap();

        let engine = RecordEngine::default();
        let opts = engine.default_options(FilesetName::default()).unwrap();
        let store = write_store();
        let summary = engine.add_files(&store, &[dir.path()], &opts).unwrap();
        // root, loop, real, real/inner, real/up
        assert_eq!(summary.added, 5);
    }
}
