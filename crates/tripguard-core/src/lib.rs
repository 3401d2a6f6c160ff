//! tripguard: file integrity baselines with tamper-evident storage.
//!
//! Paths are recorded into named filesets by the [`RecordEngine`] and kept in
//! a SQLite [`Store`]. The [`SignatureEngine`] seals a whole fileset under a
//! password so edits to the stored baselines themselves are detected.

pub mod checks;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod fileset;
pub mod paths;
pub mod record;
pub mod settings;
pub mod signature;
pub mod store;

pub use checks::{CheckRegistry, Target};
pub use crypto::KdfParams;
pub use engine::{AddOptions, AddSummary, Failure, RecordEngine, VerifyReport};
pub use error::{Error, Result, SignatureError};
pub use fileset::FilesetName;
pub use record::{BaselineRecord, CheckValue, Entry};
pub use settings::Settings;
pub use signature::SignatureEngine;
pub use store::{Store, TxMode};
