use std::fs::Metadata;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::CheckValue;

/// Mode bits rendered the way `ls -l` shows them, e.g. `-rw-r--r--`.
#[derive(Debug, Default)]
pub struct PermissionsCheck;

#[cfg(unix)]
fn mode_string(meta: &Metadata) -> String {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    let ft = meta.file_type();
    let kind = if ft.is_dir() {
        'd'
    } else if ft.is_symlink() {
        'l'
    } else if ft.is_block_device() {
        'b'
    } else if ft.is_char_device() {
        'c'
    } else if ft.is_fifo() {
        'p'
    } else if ft.is_socket() {
        's'
    } else {
        '-'
    };

    let mode = meta.permissions().mode();
    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    // Execute slot that doubles as setuid/setgid/sticky marker.
    let special = |exec: u32, flag: u32, set: char| match (mode & exec != 0, mode & flag != 0) {
        (true, true) => set,
        (false, true) => set.to_ascii_uppercase(),
        (true, false) => 'x',
        (false, false) => '-',
    };

    [
        kind,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        special(0o100, 0o4000, 's'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        special(0o010, 0o2000, 's'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        special(0o001, 0o1000, 't'),
    ]
    .iter()
    .collect()
}

#[cfg(not(unix))]
fn mode_string(meta: &Metadata) -> String {
    let kind = if meta.is_dir() { 'd' } else { '-' };
    let write = if meta.permissions().readonly() { '-' } else { 'w' };
    format!("{kind}r{write}-r{write}-r{write}-")
}

impl Check for PermissionsCheck {
    fn prepare(&self, _path: &Path, meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Text(mode_string(meta)))
    }

    fn execute(&self, _path: &Path, baseline: &CheckValue, meta: &Metadata) -> Result<(), CheckError> {
        let recorded = baseline
            .as_text()
            .ok_or(CheckError::Corrupt("permissions not recorded"))?;
        let actual = mode_string(meta);
        if recorded != actual {
            return Err(CheckError::Mismatch(format!(
                "expected {recorded} actual {actual}"
            )));
        }
        Ok(())
    }
}
