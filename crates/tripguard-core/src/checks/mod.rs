//! Attribute checks.
//!
//! A check captures one attribute of a file or directory when a path is
//! added ([`Check::prepare`]) and compares the captured value with the
//! current state when the path is verified ([`Check::execute`]).

use std::fs::Metadata;
use std::path::Path;
use thiserror::Error;

use crate::record::CheckValue;

mod child;
mod digest;
mod modtime;
mod nocheck;
pub mod ownership;
mod permissions;
pub mod registry;
mod size;

pub use child::ChildCheck;
pub use digest::Sha256Check;
pub use modtime::ModTimeCheck;
pub use nocheck::NoCheck;
pub use ownership::OwnershipCheck;
pub use permissions::PermissionsCheck;
pub use registry::{CheckList, CheckRegistry, Target, DEFAULT_DIR_CHECKS, DEFAULT_FILE_CHECKS};
pub use size::SizeCheck;

/// Why a check could not capture a value, or why it did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The stored value does not have the shape this check writes.
    #[error("data corrupt: {0}")]
    Corrupt(&'static str),

    #[error("{0}")]
    Mismatch(String),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("not supported on this platform")]
    Unsupported,
}

impl CheckError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> CheckError {
        move |source| CheckError::Io { context, source }
    }
}

pub trait Check: Send + Sync {
    /// Capture the baseline value for `path`.
    fn prepare(&self, path: &Path, meta: &Metadata) -> Result<CheckValue, CheckError>;

    /// Compare `baseline` against the current state of `path`.
    fn execute(&self, path: &Path, baseline: &CheckValue, meta: &Metadata)
        -> Result<(), CheckError>;
}
