//! Auth capabilities passed through the module context.
//!
//! The core does not validate tokens or enforce policy; the host plugs in an
//! implementation and modules use it to protect their routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::MiddlewareProvider;

/// Identity extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub subject: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

pub trait AuthProvider: Send + Sync {
    fn validate_token(&self, token: &str) -> anyhow::Result<Claims>;

    /// Middleware rejecting requests without a valid token.
    fn require_auth(&self) -> MiddlewareProvider;

    /// Middleware rejecting requests whose claims lack `role`.
    fn require_role(&self, role: &str) -> MiddlewareProvider;
}

pub trait TokenIssuer: Send + Sync {
    fn issue_token(&self, claims: &Claims) -> anyhow::Result<String>;
}
