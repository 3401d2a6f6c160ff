//! Name-to-check dispatch, kept separately for files and directories.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{
    Check, ChildCheck, ModTimeCheck, NoCheck, OwnershipCheck, PermissionsCheck, Sha256Check,
    SizeCheck,
};
use crate::error::{Error, Result};

pub const DEFAULT_FILE_CHECKS: &str = "size,modtime,ownership,permissions,sha256";
pub const DEFAULT_DIR_CHECKS: &str = "child,modtime,ownership,permissions";

/// Which check table a path is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    File,
    Dir,
}

impl Target {
    pub fn of(is_dir: bool) -> Self {
        if is_dir {
            Target::Dir
        } else {
            Target::File
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Target::File => "file",
            Target::Dir => "dir",
        }
    }
}

/// A validated, lower-cased, de-duplicated list of check names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckList(Vec<String>);

impl CheckList {
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CheckList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

#[derive(Default)]
pub struct CheckRegistry {
    files: BTreeMap<String, Arc<dyn Check>>,
    dirs: BTreeMap<String, Arc<dyn Check>>,
}

impl CheckRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in checks. Files and directories share one ownership check,
    /// and so one name cache.
    pub fn builtin() -> Self {
        Self::builtin_with_ownership(OwnershipCheck::new())
    }

    pub fn builtin_with_ownership(ownership: OwnershipCheck) -> Self {
        let ownership: Arc<dyn Check> = Arc::new(ownership);
        let modtime: Arc<dyn Check> = Arc::new(ModTimeCheck);
        let permissions: Arc<dyn Check> = Arc::new(PermissionsCheck);
        let nocheck: Arc<dyn Check> = Arc::new(NoCheck);

        let mut registry = Self::new();
        registry.register(Target::File, "nocheck", nocheck.clone());
        registry.register(Target::File, "size", Arc::new(SizeCheck));
        registry.register(Target::File, "ownership", ownership.clone());
        registry.register(Target::File, "modtime", modtime.clone());
        registry.register(Target::File, "permissions", permissions.clone());
        registry.register(Target::File, "sha256", Arc::new(Sha256Check));

        registry.register(Target::Dir, "nocheck", nocheck);
        registry.register(Target::Dir, "ownership", ownership);
        registry.register(Target::Dir, "child", Arc::new(ChildCheck));
        registry.register(Target::Dir, "modtime", modtime);
        registry.register(Target::Dir, "permissions", permissions);
        registry
    }

    /// Adds or replaces a check. Names are matched case-insensitively.
    pub fn register(&mut self, target: Target, name: &str, check: Arc<dyn Check>) {
        self.table_mut(target).insert(name.to_ascii_lowercase(), check);
    }

    pub fn get(&self, target: Target, name: &str) -> Option<&Arc<dyn Check>> {
        self.table(target).get(&name.to_ascii_lowercase())
    }

    pub fn names(&self, target: Target) -> impl Iterator<Item = &str> {
        self.table(target).keys().map(String::as_str)
    }

    /// Parses a comma separated check list for `target`, failing on the first
    /// name the registry does not know.
    pub fn parse_list(&self, target: Target, list: &str) -> Result<CheckList> {
        let mut names: Vec<String> = Vec::new();
        for raw in list.split(',') {
            let name = raw.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            if !self.table(target).contains_key(&name) {
                return Err(Error::UnknownCheck(raw.trim().to_string()));
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(CheckList(names))
    }

    fn table(&self, target: Target) -> &BTreeMap<String, Arc<dyn Check>> {
        match target {
            Target::File => &self.files,
            Target::Dir => &self.dirs,
        }
    }

    fn table_mut(&mut self, target: Target) -> &mut BTreeMap<String, Arc<dyn Check>> {
        match target {
            Target::File => &mut self.files,
            Target::Dir => &mut self.dirs,
        }
    }
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("dirs", &self.dirs.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_against_builtin() {
        let registry = CheckRegistry::builtin();
        let files = registry.parse_list(Target::File, DEFAULT_FILE_CHECKS).unwrap();
        assert_eq!(files.to_string(), DEFAULT_FILE_CHECKS);
        let dirs = registry.parse_list(Target::Dir, DEFAULT_DIR_CHECKS).unwrap();
        assert_eq!(dirs.names().len(), 4);
    }

    #[test]
    fn parsing_is_case_insensitive_and_deduplicates() {
        let registry = CheckRegistry::builtin();
        let list = registry
            .parse_list(Target::File, " Size , SHA256,size,,")
            .unwrap();
        assert_eq!(list.names(), ["size", "sha256"]);
    }

    #[test]
    fn rejects_checks_from_the_other_table() {
        let registry = CheckRegistry::builtin();
        let err = registry.parse_list(Target::File, "size,child").unwrap_err();
        assert!(matches!(err, Error::UnknownCheck(ref name) if name == "child"));
        assert!(registry.parse_list(Target::Dir, "sha256").is_err());
        assert!(registry.get(Target::Dir, "CHILD").is_some());
    }
}
