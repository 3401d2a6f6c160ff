use std::collections::BTreeSet;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::CheckValue;

/// Names of the immediate entries of a directory.
#[derive(Debug, Default)]
pub struct ChildCheck;

fn child_names(path: &Path) -> Result<BTreeSet<String>, CheckError> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(path).map_err(CheckError::io("read directory"))? {
        let entry = entry.map_err(CheckError::io("read directory"))?;
        let name = entry.file_name().into_string().map_err(|raw| CheckError::Io {
            context: "read directory",
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("child name {raw:?} is not valid UTF-8"),
            ),
        })?;
        names.insert(name);
    }
    Ok(names)
}

impl Check for ChildCheck {
    fn prepare(&self, path: &Path, _meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Names(child_names(path)?.into_iter().collect()))
    }

    fn execute(&self, path: &Path, baseline: &CheckValue, _meta: &Metadata) -> Result<(), CheckError> {
        let recorded: BTreeSet<&str> = match baseline {
            CheckValue::Names(names) => names.iter().map(String::as_str).collect(),
            // An empty directory may have been stored as null.
            CheckValue::Empty => BTreeSet::new(),
            _ => return Err(CheckError::Corrupt("child list not recorded")),
        };
        let actual = child_names(path)?;

        let mut changes: Vec<String> = actual
            .iter()
            .filter(|name| !recorded.contains(name.as_str()))
            .map(|name| format!("new child {name:?}"))
            .collect();
        changes.extend(
            recorded
                .iter()
                .filter(|name| !actual.contains(**name))
                .map(|name| format!("removed child {name:?}")),
        );

        if changes.is_empty() {
            Ok(())
        } else {
            Err(CheckError::Mismatch(changes.join(",")))
        }
    }
}
