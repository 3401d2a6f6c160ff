use directories::ProjectDirs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub const APP_QUALIFIER: &str = "org";
pub const APP_ORG: &str = "tripguard";
pub const APP_NAME: &str = "tripguard";

pub const DB_FILE_NAME: &str = "tripguard.db";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DB_ENV: &str = "TRIPGUARD_DB";
pub const CONFIG_ENV: &str = "TRIPGUARD_CONFIG";

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| Error::Config("cannot determine home directory".into()))
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Location of the baseline database, `TRIPGUARD_DB` wins over the platform
/// data directory.
pub fn default_db_path() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DB_ENV) {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    Ok(data_dir()?.join(DB_FILE_NAME))
}

pub fn settings_path() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(CONFIG_ENV) {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    Ok(project_dirs()?.config_dir().join(SETTINGS_FILE_NAME))
}

/// Make `path` absolute without touching the filesystem.
///
/// Relative paths are joined onto the current directory, `.` components are
/// dropped and `..` pops the previous component. Symlinks are not resolved,
/// so a path that no longer exists still maps to the key it was stored under.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&joined))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Store key for an absolute path.
pub fn path_key(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::NonUtf8Path(path.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn normalizes_dots_lexically() {
        assert_eq!(
            absolute(Path::new("/var/./log/../lib/x")).unwrap(),
            PathBuf::from("/var/lib/x")
        );
        assert_eq!(absolute(Path::new("/..")).unwrap(), PathBuf::from("/"));
    }

    #[test]
    fn relative_paths_join_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolute(Path::new("a/b")).unwrap(), cwd.join("a").join("b"));
    }
}
