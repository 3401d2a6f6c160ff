use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::Metadata;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::CheckValue;

/// Modification time as an RFC 3339 string with nanosecond precision.
///
/// Baseline and current time are compared as strings so both sides always
/// carry exactly the same precision.
#[derive(Debug, Default)]
pub struct ModTimeCheck;

fn storage_repr(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn display_repr(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn modified(meta: &Metadata) -> Result<DateTime<Utc>, CheckError> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .map_err(CheckError::io("read modification time"))
}

impl Check for ModTimeCheck {
    fn prepare(&self, _path: &Path, meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Text(storage_repr(&modified(meta)?)))
    }

    fn execute(&self, _path: &Path, baseline: &CheckValue, meta: &Metadata) -> Result<(), CheckError> {
        let recorded_repr = baseline
            .as_text()
            .ok_or(CheckError::Corrupt("modtime not recorded"))?;
        let recorded = DateTime::parse_from_rfc3339(recorded_repr)
            .map_err(|_| CheckError::Corrupt("modtime not recorded"))?
            .with_timezone(&Utc);
        let actual = modified(meta)?;
        if storage_repr(&actual) != recorded_repr {
            return Err(CheckError::Mismatch(format!(
                "expected '{}' actual '{}'",
                display_repr(&recorded),
                display_repr(&actual)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    #[test]
    fn stores_nanosecond_precision() {
        let time = DateTime::<Utc>::from(SystemTime::UNIX_EPOCH + Duration::new(5, 120));
        assert_eq!(storage_repr(&time), "1970-01-01T00:00:05.000000120Z");
    }

    #[test]
    fn detects_touched_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        let meta = fs::metadata(&file).unwrap();
        let value = ModTimeCheck.prepare(&file, &meta).unwrap();
        ModTimeCheck.execute(&file, &value, &meta).unwrap();

        let f = fs::File::options().write(true).open(&file).unwrap();
        f.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(86_400))
            .unwrap();
        drop(f);
        let meta = fs::metadata(&file).unwrap();
        let err = ModTimeCheck.execute(&file, &value, &meta).unwrap_err();
        assert!(err.to_string().ends_with("actual '1970-01-02T00:00:00Z'"));
    }

    #[test]
    fn garbage_timestamp_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let meta = fs::metadata(dir.path()).unwrap();
        let bad = CheckValue::Text("yesterday".into());
        assert!(matches!(
            ModTimeCheck.execute(dir.path(), &bad, &meta),
            Err(CheckError::Corrupt(_))
        ));
    }
}
