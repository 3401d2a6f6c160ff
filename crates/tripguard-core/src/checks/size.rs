use std::fs::Metadata;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::CheckValue;

/// File length in bytes, stored as a decimal string.
#[derive(Debug, Default)]
pub struct SizeCheck;

impl Check for SizeCheck {
    fn prepare(&self, _path: &Path, meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Text(meta.len().to_string()))
    }

    fn execute(&self, _path: &Path, baseline: &CheckValue, meta: &Metadata) -> Result<(), CheckError> {
        let recorded: u64 = baseline
            .as_text()
            .and_then(|s| s.parse().ok())
            .ok_or(CheckError::Corrupt("size was not recorded"))?;
        let actual = meta.len();
        if recorded != actual {
            return Err(CheckError::Mismatch(format!(
                "expected {recorded} actual {actual}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_growth_and_corrupt_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"hello").unwrap();
        let meta = fs::metadata(&file).unwrap();
        let value = SizeCheck.prepare(&file, &meta).unwrap();
        assert_eq!(value, CheckValue::Text("5".into()));
        SizeCheck.execute(&file, &value, &meta).unwrap();

        fs::write(&file, b"hello world").unwrap();
        let meta = fs::metadata(&file).unwrap();
        let err = SizeCheck.execute(&file, &value, &meta).unwrap_err();
        assert_eq!(err.to_string(), "expected 5 actual 11");

        let bad = CheckValue::Text("five".into());
        assert!(matches!(
            SizeCheck.execute(&file, &bad, &meta),
            Err(CheckError::Corrupt(_))
        ));
    }
}
