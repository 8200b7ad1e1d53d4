//! Unix socket permission and ownership setup.
//!
//! The socket is created under a fully restrictive umask so it is never
//! reachable with looser permissions than configured, then chmod'ed and
//! chown'ed to the configured mode, user and group.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chown, Gid, Group, Uid, User};

use crate::config::schema::UnixSocketConfig;
use crate::net::listener::ListenerError;

/// Restores the previous process umask on drop.
pub(crate) struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    pub(crate) fn set(mask: u32) -> Self {
        let previous = umask(Mode::from_bits_truncate(mask as _));
        Self { previous }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        umask(self.previous);
    }
}

/// Apply mode and ownership from `config` to the socket at `path`.
pub fn apply_permissions(path: &Path, config: &UnixSocketConfig) -> Result<(), ListenerError> {
    fs::set_permissions(path, Permissions::from_mode(config.mode))
        .map_err(ListenerError::Permissions)?;

    let user = match &config.user {
        Some(name) => Some(
            lookup_user(name)
                .map_err(ListenerError::Owner)?
                .ok_or_else(|| ListenerError::UnknownUser(name.clone()))?,
        ),
        None => None,
    };
    let group = match &config.group {
        Some(name) => Some(
            lookup_group(name)
                .map_err(ListenerError::Owner)?
                .ok_or_else(|| ListenerError::UnknownGroup(name.clone()))?,
        ),
        None => None,
    };

    if user.is_some() || group.is_some() {
        chown(path, user.map(Uid::from_raw), group.map(Gid::from_raw))
            .map_err(|e| ListenerError::Owner(e.into()))?;
    }

    tracing::debug!(
        path = %path.display(),
        mode = %format!("{:#o}", config.mode),
        uid = ?user,
        gid = ?group,
        "Socket permissions applied"
    );
    Ok(())
}

/// Look up a user id by name in the system user database.
pub fn lookup_user(name: &str) -> io::Result<Option<u32>> {
    let user = missing_as_none(User::from_name(name))?;
    Ok(user.map(|user| user.uid.as_raw()))
}

/// Look up a group id by name in the system group database.
pub fn lookup_group(name: &str) -> io::Result<Option<u32>> {
    let group = missing_as_none(Group::from_name(name))?;
    Ok(group.map(|group| group.gid.as_raw()))
}

/// Some libcs report a missing entry as ENOENT/ESRCH rather than no result.
fn missing_as_none<T>(found: nix::Result<Option<T>>) -> io::Result<Option<T>> {
    match found {
        Ok(entry) => Ok(entry),
        Err(Errno::ENOENT | Errno::ESRCH) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
