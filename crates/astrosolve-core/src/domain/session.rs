//! Session credentials store
//!
//! Holds the API key and the session token derived from it. A single store is
//! meant to be shared (`Arc<SessionStore>`) by every workflow that uses the
//! same account; the login path is serialized so concurrent runs trigger at
//! most one login.

use std::sync::Arc;

use astrosolve_interfaces::{AstrometryGateway, LoginResponse, SessionToken};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::AuthError;

/// An authenticated (or not yet authenticated) context for gateway calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub api_key: String,
    pub session_token: Option<SessionToken>,
    pub is_authenticated: bool,
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl Session {
    fn unauthenticated(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            session_token: None,
            is_authenticated: false,
            authenticated_at: None,
        }
    }

    /// Token to attach to gateway calls, present once authenticated
    pub fn token(&self) -> Option<&SessionToken> {
        self.session_token.as_ref().filter(|_| self.is_authenticated)
    }
}

/// Produces an authenticated session on demand
pub struct SessionStore {
    gateway: Arc<dyn AstrometryGateway>,
    session: Mutex<Option<Session>>,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn AstrometryGateway>) -> Self {
        Self {
            gateway,
            session: Mutex::new(None),
        }
    }

    /// Authenticates with `api_key`, or returns the live session for that key
    ///
    /// A live session opened with a different key is replaced by a fresh login.
    /// One login attempt per call, no retry. The rejection text from the service
    /// is returned verbatim in the error.
    #[instrument(skip(self, api_key))]
    pub async fn authenticate(&self, api_key: &str) -> Result<Session, AuthError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AuthError::new("API key must not be empty"));
        }

        // Held across the login call so racing runs wait for the first one
        let mut guard = self.session.lock().await;

        if let Some(session) = guard
            .as_ref()
            .filter(|s| s.is_authenticated && s.api_key == api_key)
        {
            debug!("Reusing authenticated session");
            return Ok(session.clone());
        }

        let mut session = Session::unauthenticated(api_key);
        let outcome = match self.gateway.login(api_key).await {
            Ok(LoginResponse::Success { session: token, message }) => {
                info!(service_message = message.as_deref().unwrap_or_default(), "Logged in");
                session.session_token = Some(token);
                session.is_authenticated = true;
                session.authenticated_at = Some(Utc::now());
                Ok(session.clone())
            }
            Ok(LoginResponse::Error { message }) => {
                warn!("Login rejected: {}", message);
                Err(AuthError::new(message))
            }
            Err(e) => {
                warn!("Login call failed: {}", e);
                Err(AuthError::new(e.to_string()))
            }
        };

        *guard = Some(session);
        outcome
    }

    /// Snapshot of the current session, if a login was ever attempted
    pub async fn current(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_authenticated)
    }

    /// Drops the session so the next `authenticate` contacts the service again
    pub async fn invalidate(&self) {
        debug!("Invalidating session");
        *self.session.lock().await = None;
    }

    /// Explicit re-login request
    pub async fn relogin(&self, api_key: &str) -> Result<Session, AuthError> {
        self.invalidate().await;
        self.authenticate(api_key).await
    }
}
