//! Auth session abstraction.
//!
//! Authentication itself is delegated to a hosted identity provider; the
//! bridge only consumes the current-user session and a sign-out call. Admin
//! capability is a client-side allow-list check, nothing more.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::watch;

/// The signed-in operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Email as reported by the identity provider.
    pub email: String,
}

impl Identity {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Current-user session from the external identity provider.
#[async_trait]
pub trait AuthSession: Send + Sync {
    /// Watch the current identity. Yields `None` while signed out.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;

    /// Sign the current user out.
    async fn sign_out(&self) -> Result<()>;
}

/// Fixed single-user session for the headless binary and tests.
pub struct StaticAuth {
    tx: watch::Sender<Option<Identity>>,
}

impl StaticAuth {
    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        let (tx, _) = watch::channel(Some(identity));
        Self { tx }
    }
}

#[async_trait]
impl AuthSession for StaticAuth {
    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        let _ = self.tx.send(None);
        Ok(())
    }
}

/// Client-side admin check against the configured allow-list.
#[must_use]
pub fn is_admin(email: &str, admin_emails: &[String]) -> bool {
    admin_emails.iter().any(|e| e.eq_ignore_ascii_case(email))
}
