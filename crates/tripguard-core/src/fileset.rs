use std::fmt;

use crate::error::{Error, Result};

/// Names starting with this prefix are reserved for internal bookkeeping.
pub const RESERVED_PREFIX: char = '_';

pub const DEFAULT_FILESET: &str = "default";

/// A validated user fileset name.
///
/// Every store operation takes a `FilesetName`, so the reserved-prefix rule
/// is enforced before any store access for that name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilesetName(String);

impl FilesetName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyFileset);
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(Error::ReservedFileset(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FilesetName {
    fn default() -> Self {
        Self(DEFAULT_FILESET.to_string())
    }
}

impl fmt::Display for FilesetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for FilesetName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for FilesetName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
