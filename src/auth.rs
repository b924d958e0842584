//! Session lookup for the HTTP API.
//!
//! The server never owns user accounts. It asks an [`AuthProvider`] who
//! is calling and gates actions on the returned [`Role`]. [`TokenAuth`]
//! resolves static bearer tokens from `[[auth.tokens]]`.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use deskrag_core::error::{Error, Result};

use crate::config::TokenEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Worker,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The caller's user, or `None` without a valid session.
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<User>>;
}

/// Static bearer-token sessions.
pub struct TokenAuth {
    users: HashMap<String, User>,
}

impl TokenAuth {
    pub fn new(entries: &[TokenEntry]) -> Self {
        let users = entries
            .iter()
            .map(|e| {
                (
                    e.token.clone(),
                    User {
                        id: e.user_id.clone(),
                        role: e.role,
                    },
                )
            })
            .collect();
        Self { users }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn current_user(&self, headers: &HeaderMap) -> Result<Option<User>> {
        Ok(bearer_token(headers).and_then(|t| self.users.get(t).cloned()))
    }
}

/// 401 unless there is a session.
pub async fn require_user(auth: &dyn AuthProvider, headers: &HeaderMap) -> Result<User> {
    auth.current_user(headers)
        .await?
        .ok_or_else(|| Error::Authorization("sign in required".into()))
}

/// 401 without a session, 403 for non-admin roles.
pub async fn require_admin(auth: &dyn AuthProvider, headers: &HeaderMap) -> Result<User> {
    let user = require_user(auth, headers).await?;
    if !user.is_admin() {
        return Err(Error::Permission(format!(
            "user {} lacks the admin role",
            user.id
        )));
    }
    Ok(user)
}
