//! Join-time identity resolution.
//!
//! Token issuance and signing live with the account service. The manager
//! only asks a [`TokenVerifier`] whether a presented token is valid; the
//! check is local and synchronous so a join never waits on I/O.

use std::collections::HashMap;

use super::player::AccountIdentity;

/// Identity behind a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
}

impl VerifiedIdentity {
    pub fn account(&self) -> AccountIdentity {
        AccountIdentity {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
        }
    }
}

pub trait TokenVerifier: Send + Sync {
    /// `None` for unknown, expired or malformed tokens.
    fn verify_token(&self, token: &str) -> Option<VerifiedIdentity>;
}

/// Accepts no tokens; every player joins as a guest.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl TokenVerifier for NoAuth {
    fn verify_token(&self, _token: &str) -> Option<VerifiedIdentity> {
        None
    }
}

/// Fixed token table, for tests and local play.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: VerifiedIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify_token(&self, token: &str) -> Option<VerifiedIdentity> {
        self.tokens.get(token.trim()).cloned()
    }
}
