use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::sink::SinkError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials issued")]
    NoCredentials,
    #[error("refresh token expired")]
    RefreshExpired,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    access_ttl: Duration,
}

/// Credentials for the grade submission collaborator, passed explicitly
/// to whatever performs a submission.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    credentials: Option<Credentials>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn issue(&mut self, access_ttl: Duration, refresh_ttl: Duration) -> &Credentials {
        self.issue_at(Utc::now(), access_ttl, refresh_ttl)
    }

    pub fn issue_at(
        &mut self,
        now: DateTime<Utc>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> &Credentials {
        self.credentials.insert(Credentials {
            access_token: Uuid::new_v4().to_string(),
            access_expires_at: now + access_ttl,
            refresh_expires_at: now + refresh_ttl,
            access_ttl,
        })
    }

    /// Rotates the access token while the refresh grant is still live.
    pub fn refresh(&mut self) -> Result<(), AuthError> {
        self.refresh_at(Utc::now())
    }

    pub fn refresh_at(&mut self, now: DateTime<Utc>) -> Result<(), AuthError> {
        let Some(creds) = self.credentials.as_mut() else {
            return Err(AuthError::NoCredentials);
        };
        if now >= creds.refresh_expires_at {
            return Err(AuthError::RefreshExpired);
        }
        // A zero-TTL issue still yields a usable token after refresh.
        let ttl = if creds.access_ttl > Duration::zero() {
            creds.access_ttl
        } else {
            Duration::seconds(60)
        };
        creds.access_token = Uuid::new_v4().to_string();
        creds.access_expires_at = now + ttl;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.credentials = None;
    }

    /// Access token to present at `now`, if one is issued and unexpired.
    pub fn bearer_at(&self, now: DateTime<Utc>) -> Option<&str> {
        self.credentials
            .as_ref()
            .filter(|c| now < c.access_expires_at)
            .map(|c| c.access_token.as_str())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.bearer_at(now).is_some()
    }

    pub fn status_json(&self) -> serde_json::Value {
        let now = Utc::now();
        match self.credentials() {
            None => json!({ "issued": false, "valid": false }),
            Some(c) => json!({
                "issued": true,
                "valid": now < c.access_expires_at,
                "accessExpiresAt": c.access_expires_at.to_rfc3339(),
                "refreshExpiresAt": c.refresh_expires_at.to_rfc3339(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reauthenticated {
    pub refreshed: bool,
}

/// Attempt, and on an auth rejection refresh once and retry once.
/// The retry's result is final.
pub fn with_reauth<F>(auth: &mut AuthContext, mut attempt: F) -> Result<Reauthenticated, SinkError>
where
    F: FnMut(&AuthContext) -> Result<(), SinkError>,
{
    match attempt(auth) {
        Err(SinkError::Unauthorized) => {}
        other => return other.map(|()| Reauthenticated { refreshed: false }),
    }

    if let Err(e) = auth.refresh() {
        log::warn!("credential refresh failed: {}", e);
        return Err(SinkError::Unauthorized);
    }
    log::info!("access token refreshed after auth rejection");

    attempt(auth).map(|()| Reauthenticated { refreshed: true })
}
