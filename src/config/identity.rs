//! Invoking user's identity

use serde::{Deserialize, Serialize};

/// Login name and numeric uid of the submitting user
///
/// The name keys the scratch root and remote storage area; the uid keys
/// the default proxy path (`/tmp/x509up_u<uid>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub uid: u32,
}

impl UserIdentity {
    pub fn new(name: impl Into<String>, uid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
        }
    }

    /// Identity of the current process
    #[cfg(unix)]
    pub fn current() -> Option<Self> {
        let uid = nix::unistd::getuid();
        let name = match nix::unistd::User::from_uid(uid) {
            Ok(Some(user)) => user.name,
            _ => std::env::var("USER").ok()?,
        };
        Some(Self::new(name, uid.as_raw()))
    }

    /// Identity of the current process
    #[cfg(not(unix))]
    pub fn current() -> Option<Self> {
        let name = std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .ok()?;
        Some(Self::new(name, 0))
    }
}
