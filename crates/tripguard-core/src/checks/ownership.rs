//! Owner and group check, with the id-to-name cache it relies on.
//!
//! Name lookups go through a [`NameResolver`]. Resolved names are cached per
//! [`OwnershipCheck`] instance, so a cache lives exactly as long as the
//! registry that owns the check. Ids without a name fall back to the numeric
//! id and are not cached.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::Path;

use super::{Check, CheckError};
use crate::record::{CheckValue, Ownership};

/// Maps numeric user and group ids to names.
pub trait NameResolver: Send + Sync {
    fn user_name(&self, uid: u32) -> Option<String>;
    fn group_name(&self, gid: u32) -> Option<String>;
}

/// Resolves through the system user and group databases.
#[derive(Debug, Default)]
pub struct SystemResolver;

#[cfg(unix)]
mod sys {
    use std::ffi::CStr;
    use std::mem::MaybeUninit;

    const INITIAL_BUF: usize = 1024;
    const MAX_BUF: usize = 1 << 20;

    pub fn user_name(uid: u32) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
        loop {
            let mut pwd = MaybeUninit::<libc::passwd>::uninit();
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            let ret = unsafe {
                libc::getpwuid_r(
                    uid as libc::uid_t,
                    pwd.as_mut_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };
            if ret == libc::ERANGE && buf.len() < MAX_BUF {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if ret != 0 || result.is_null() {
                return None;
            }
            let name = unsafe { CStr::from_ptr((*result).pw_name) };
            return Some(name.to_string_lossy().into_owned());
        }
    }

    pub fn group_name(gid: u32) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
        loop {
            let mut grp = MaybeUninit::<libc::group>::uninit();
            let mut result: *mut libc::group = std::ptr::null_mut();
            let ret = unsafe {
                libc::getgrgid_r(
                    gid as libc::gid_t,
                    grp.as_mut_ptr(),
                    buf.as_mut_ptr(),
                    buf.len(),
                    &mut result,
                )
            };
            if ret == libc::ERANGE && buf.len() < MAX_BUF {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if ret != 0 || result.is_null() {
                return None;
            }
            let name = unsafe { CStr::from_ptr((*result).gr_name) };
            return Some(name.to_string_lossy().into_owned());
        }
    }
}

impl NameResolver for SystemResolver {
    #[cfg(unix)]
    fn user_name(&self, uid: u32) -> Option<String> {
        sys::user_name(uid)
    }

    #[cfg(unix)]
    fn group_name(&self, gid: u32) -> Option<String> {
        sys::group_name(gid)
    }

    #[cfg(not(unix))]
    fn user_name(&self, _uid: u32) -> Option<String> {
        None
    }

    #[cfg(not(unix))]
    fn group_name(&self, _gid: u32) -> Option<String> {
        None
    }
}

/// Id-to-name cache for users and groups.
#[derive(Debug, Default)]
pub struct NameCache {
    users: Mutex<HashMap<u32, String>>,
    groups: Mutex<HashMap<u32, String>>,
}

impl NameCache {
    pub fn user(&self, resolver: &dyn NameResolver, uid: u32) -> String {
        Self::lookup(&self.users, uid, |id| resolver.user_name(id))
    }

    pub fn group(&self, resolver: &dyn NameResolver, gid: u32) -> String {
        Self::lookup(&self.groups, gid, |id| resolver.group_name(id))
    }

    pub fn len(&self) -> usize {
        self.users.lock().len() + self.groups.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(
        map: &Mutex<HashMap<u32, String>>,
        id: u32,
        resolve: impl FnOnce(u32) -> Option<String>,
    ) -> String {
        if let Some(name) = map.lock().get(&id) {
            return name.clone();
        }
        match resolve(id) {
            Some(name) => {
                map.lock().insert(id, name.clone());
                name
            }
            None => id.to_string(),
        }
    }
}

pub struct OwnershipCheck {
    resolver: Box<dyn NameResolver>,
    cache: NameCache,
}

impl OwnershipCheck {
    pub fn new() -> Self {
        Self::with_resolver(Box::new(SystemResolver))
    }

    pub fn with_resolver(resolver: Box<dyn NameResolver>) -> Self {
        Self {
            resolver,
            cache: NameCache::default(),
        }
    }

    pub fn cache(&self) -> &NameCache {
        &self.cache
    }

    #[cfg(unix)]
    fn current(&self, meta: &Metadata) -> Result<Ownership, CheckError> {
        use std::os::unix::fs::MetadataExt;
        Ok(Ownership {
            user: self.cache.user(self.resolver.as_ref(), meta.uid()),
            group: self.cache.group(self.resolver.as_ref(), meta.gid()),
        })
    }

    #[cfg(not(unix))]
    fn current(&self, _meta: &Metadata) -> Result<Ownership, CheckError> {
        Err(CheckError::Unsupported)
    }
}

impl Default for OwnershipCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OwnershipCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipCheck")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Check for OwnershipCheck {
    fn prepare(&self, _path: &Path, meta: &Metadata) -> Result<CheckValue, CheckError> {
        Ok(CheckValue::Owner(self.current(meta)?))
    }

    fn execute(&self, _path: &Path, baseline: &CheckValue, meta: &Metadata) -> Result<(), CheckError> {
        let recorded = baseline
            .as_owner()
            .ok_or(CheckError::Corrupt("ownership not recorded"))?;
        let actual = self.current(meta)?;
        if *recorded != actual {
            return Err(CheckError::Mismatch(format!(
                "expected {}:{} actual {}:{}",
                recorded.user, recorded.group, actual.user, actual.group
            )));
        }
        Ok(())
    }
}
