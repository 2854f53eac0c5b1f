//! Identity contract. Every persistence or completion call made by the
//! session requires a resolved user.

use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// No account is configured for this client.
    NoAccount,
    /// The identity provider refused the sign-in.
    Denied(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::NoAccount => write!(
                f,
                "no user configured; pass --user or set `user` in the config file"
            ),
            IdentityError::Denied(reason) => write!(f, "sign-in denied: {reason}"),
        }
    }
}

impl Error for IdentityError {}

#[async_trait]
pub trait Identity: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;

    async fn login(&self) -> Result<UserIdentity, IdentityError>;

    async fn logout(&self) -> Result<(), IdentityError>;

    /// Receiver that observes every change of the signed-in user.
    fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>>;
}
