//! Application context and services

use super::User;
use nexus_rpc::{RequestMeta, RpcError, RpcResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Authenticated caller, taken from a `Bearer` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
}

/// Application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    /// Correlation id of the request
    pub request_id: String,
    /// Present when the request carried a bearer token
    pub auth: Option<Session>,
    /// Database service
    pub db: DbService,
    /// Pause between `teststream` messages
    pub stream_interval: Duration,
}

/// Process-wide state the context factory draws from
#[derive(Clone)]
pub struct AppState {
    pub db: DbService,
    pub stream_interval: Duration,
}

impl AppState {
    pub fn new(stream_interval: Duration) -> Self {
        Self {
            db: DbService::new(),
            stream_interval,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Build the per-request context.
///
/// An `authorization` header that is not a `Bearer <token>` fails the
/// request; a missing header yields an anonymous context.
pub async fn create_context(state: AppState, meta: RequestMeta) -> RpcResult<AppContext> {
    let auth = match meta.authorization() {
        None => None,
        Some(_) => {
            let token = meta
                .bearer_token()
                .ok_or_else(|| RpcError::unauthorized("Malformed authorization header"))?;
            Some(Session {
                user: token.to_string(),
            })
        }
    };

    Ok(AppContext {
        request_id: meta.request_id,
        auth,
        db: state.db,
        stream_interval: state.stream_interval,
    })
}

/// In-memory user store.
///
/// Reads share the lock; writes take it exclusively.
#[derive(Clone)]
pub struct DbService {
    users: Arc<RwLock<Vec<User>>>,
    next_id: Arc<RwLock<u32>>,
}

impl DbService {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(vec![
                User::new("1", "Alice", "alice@example.com"),
                User::new("2", "Bob", "bob@example.com"),
                User::new("123", "Carol", "carol@example.com"),
            ])),
            next_id: Arc::new(RwLock::new(124)),
        }
    }

    pub async fn get_user(&self, id: &str) -> Option<User> {
        let users = self.users.read().await;
        users.iter().find(|u| u.id == id).cloned()
    }

    pub async fn list_users(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    /// Emails are unique, compared case-insensitively.
    pub async fn create_user(&self, name: &str, email: &str) -> RpcResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(RpcError::conflict(format!("Email {} is already registered", email)));
        }
        let mut next_id = self.next_id.write().await;

        let user = User::new(next_id.to_string(), name, email);
        *next_id += 1;
        users.push(user.clone());
        Ok(user)
    }

    /// Returns false when no user has `id`.
    pub async fn delete_user(&self, id: &str) -> bool {
        let mut users = self.users.write().await;
        let len = users.len();
        users.retain(|u| u.id != id);
        users.len() < len
    }
}

impl Default for DbService {
    fn default() -> Self {
        Self::new()
    }
}
