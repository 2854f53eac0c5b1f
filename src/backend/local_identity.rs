use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use super::identity::{Identity, IdentityError, UserIdentity};

/// Identity bound to a locally configured user name. Signing in never leaves
/// the machine; it just makes the configured account current.
#[derive(Debug)]
pub struct LocalIdentity {
    account: Option<String>,
    current: watch::Sender<Option<UserIdentity>>,
}

impl LocalIdentity {
    pub fn new(account: Option<String>) -> Self {
        let account = account
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let (current, _) = watch::channel(None);
        Self { account, current }
    }
}

#[async_trait]
impl Identity for LocalIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.current.borrow().clone()
    }

    async fn login(&self) -> Result<UserIdentity, IdentityError> {
        let name = self.account.clone().ok_or(IdentityError::NoAccount)?;
        let user = UserIdentity {
            id: name.to_lowercase(),
            display_name: name,
        };
        info!(user = %user.id, "signed in");
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        if let Some(user) = self.current.send_replace(None) {
            info!(user = %user.id, "signed out");
        }
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.current.subscribe()
    }
}
