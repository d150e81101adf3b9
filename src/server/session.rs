use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::metrics;
use crate::console_store::DEFAULT_SESSION_LIFETIME_MINUTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session manager is closed")]
    Closed,
    #[error("Session subject must not be empty")]
    EmptySubject,
}

struct Sessions {
    by_token: HashMap<String, Session>,
    closed: bool,
}

/// In-memory session store with a fixed lifetime per session.
pub struct SessionManager {
    lifetime: Duration,
    inner: Mutex<Sessions>,
}

impl SessionManager {
    /// A lifetime that does not fit a `chrono::Duration` falls back to
    /// [`DEFAULT_SESSION_LIFETIME_MINUTES`].
    pub fn new(lifetime_minutes: u64) -> Self {
        let lifetime = i64::try_from(lifetime_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .unwrap_or_else(|| {
                warn!(
                    "Session lifetime of {} minutes is out of range, using {} minutes",
                    lifetime_minutes, DEFAULT_SESSION_LIFETIME_MINUTES
                );
                Duration::minutes(DEFAULT_SESSION_LIFETIME_MINUTES as i64)
            });
        Self {
            lifetime,
            inner: Mutex::new(Sessions {
                by_token: HashMap::new(),
                closed: false,
            }),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self, subject: &str) -> Result<Session, SessionError> {
        self.create_at(subject, Utc::now())
    }

    fn create_at(&self, subject: &str, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(SessionError::EmptySubject);
        }

        let mut sessions = self.lock();
        if sessions.closed {
            return Err(SessionError::Closed);
        }
        let session = Session {
            token: uuid::Uuid::new_v4().simple().to_string(),
            subject: subject.to_string(),
            created_at: now,
            // Saturates instead of overflowing the calendar
            expires_at: now
                .checked_add_signed(self.lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        sessions
            .by_token
            .insert(session.token.clone(), session.clone());
        metrics::set_active_sessions(sessions.by_token.len());
        debug!("Created session for {}", session.subject);
        Ok(session)
    }

    /// Look up a live session. An expired session is removed and not returned.
    pub fn validate(&self, token: &str) -> Option<Session> {
        self.validate_at(token, Utc::now())
    }

    fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.lock();
        let session = sessions.by_token.get(token)?.clone();
        if session.is_expired_at(now) {
            sessions.by_token.remove(token);
            metrics::set_active_sessions(sessions.by_token.len());
            debug!("Session for {} expired", session.subject);
            return None;
        }
        Some(session)
    }

    pub fn revoke(&self, token: &str) -> bool {
        let mut sessions = self.lock();
        let removed = sessions.by_token.remove(token).is_some();
        metrics::set_active_sessions(sessions.by_token.len());
        removed
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.by_token.len();
        sessions.by_token.retain(|_, s| !s.is_expired_at(now));
        metrics::set_active_sessions(sessions.by_token.len());
        before - sessions.by_token.len()
    }

    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop every session and refuse new ones. Returns how many were dropped;
    /// closing again returns 0.
    pub fn close(&self) -> usize {
        let mut sessions = self.lock();
        if sessions.closed {
            return 0;
        }
        sessions.closed = true;
        let dropped = sessions.by_token.len();
        sessions.by_token.clear();
        metrics::set_active_sessions(0);
        info!("Session manager closed, dropped {} session(s)", dropped);
        dropped
    }
}
