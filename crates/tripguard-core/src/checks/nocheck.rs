use std::fs::Metadata;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::CheckValue;

/// Records nothing and always passes.
#[derive(Debug, Default)]
pub struct NoCheck;

impl Check for NoCheck {
    fn prepare(&self, _path: &Path, _meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Empty)
    }

    fn execute(&self, _path: &Path, _baseline: &CheckValue, _meta: &Metadata) -> Result<(), CheckError> {
        Ok(())
    }
}
