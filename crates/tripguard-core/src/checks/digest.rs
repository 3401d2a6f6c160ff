use sha2::{Digest, Sha256};
use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::CheckValue;

const READ_BUF: usize = 64 * 1024;

/// SHA-256 of the full file contents, hex encoded.
#[derive(Debug, Default)]
pub struct Sha256Check;

fn hash_file(path: &Path) -> Result<String, CheckError> {
    let mut file = File::open(path).map_err(CheckError::io("open file"))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUF];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(CheckError::io("calculate sha256"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

impl Check for Sha256Check {
    fn prepare(&self, path: &Path, _meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Text(hash_file(path)?))
    }

    fn execute(&self, path: &Path, baseline: &CheckValue, _meta: &Metadata) -> Result<(), CheckError> {
        let recorded = baseline
            .as_text()
            .ok_or(CheckError::Corrupt("sha256 not recorded"))?;
        let actual = hash_file(path)?;
        if recorded != actual {
            return Err(CheckError::Mismatch(format!(
                "expected {recorded} actual {actual}"
            )));
        }
        Ok(())
    }
}
