use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Tourist,
    Author,
    Administrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tourist => "tourist",
            Self::Author => "author",
            Self::Administrator => "administrator",
        }
    }

    pub fn can_author(self) -> bool {
        matches!(self, Self::Author | Self::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tourist" => Ok(Self::Tourist),
            "author" | "guide" => Ok(Self::Author),
            "administrator" | "admin" => Ok(Self::Administrator),
            other => Err(ServiceError::validation(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

/// Who is logged in on this client. Cloning shares the same context.
#[derive(Debug, Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn login(&self, session: Session) {
        self.tx.send_replace(Some(session));
    }

    pub fn logout(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Fails with `Unauthenticated` when nobody is logged in.
    pub fn require(&self) -> Result<Session, ServiceError> {
        self.current().ok_or(ServiceError::Unauthenticated)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> Session {
        Session {
            user_id: 12,
            username: "ana".to_string(),
            role: Role::Tourist,
        }
    }

    #[tokio::test]
    async fn subscribers_see_login_and_logout() {
        let ctx = SessionContext::new();
        let mut rx = ctx.subscribe();
        assert!(ctx.current().is_none());
        assert_eq!(ctx.require(), Err(ServiceError::Unauthenticated));

        ctx.login(ana());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.user_id), Some(12));

        let shared = ctx.clone();
        shared.logout();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(ctx.current().is_none());
    }

    #[test]
    fn roles_parse_from_gateway_headers() {
        assert_eq!("Author".parse::<Role>().unwrap(), Role::Author);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
        assert!(Role::Administrator.can_author());
        assert!(!Role::Tourist.can_author());
        assert!("pilot".parse::<Role>().is_err());
    }
}
