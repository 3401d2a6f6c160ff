//! Baseline records as they are persisted in a fileset.
//!
//! A record is stored as JSON, `{"isDir": .., "checks": [..], "data": {..}}`.
//! The per-check values are decoded into [`CheckValue`]; a value with a shape
//! none of the checks produce is kept as [`CheckValue::Corrupt`] instead of
//! failing the whole record, so one damaged value costs one failed check.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Owner and group names captured by the ownership check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckValue {
    /// Checks that capture nothing.
    Empty,
    Text(String),
    Names(Vec<String>),
    Owner(Ownership),
    Corrupt(serde_json::Value),
}

impl CheckValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CheckValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_names(&self) -> Option<&[String]> {
        match self {
            CheckValue::Names(names) => Some(names),
            _ => None,
        }
    }

    pub fn as_owner(&self) -> Option<&Ownership> {
        match self {
            CheckValue::Owner(owner) => Some(owner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    pub checks: Vec<String>,
    #[serde(default)]
    pub data: BTreeMap<String, CheckValue>,
}

impl BaselineRecord {
    pub fn new(is_dir: bool) -> Self {
        Self {
            is_dir,
            checks: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A record together with the path it is keyed under.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub path: String,
    pub record: BaselineRecord,
}
