//! A dumb fire-and-forget notification sink. The at-most-once call discipline
//! (the edge detector on queue quiescence) lives in the orchestration engine;
//! this crate only owns the outbound HTTP call.

#[cfg(test)]
mod tests;

use shrinkray_config::NotificationCredentials;
use thiserror::Error;
use tracing::{debug, warn};

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification credentials are not configured")]
    NotConfigured,
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A one-shot "all done" signal. Implementations must not block the caller
/// for longer than their own configured timeout, and must never panic.
pub trait NotificationSink: Send + Sync {
    fn notify_all_done(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sends a single Pushover message per call. No retries: a dropped
/// notification is not worth delaying or blocking the worker pool over.
pub struct PushoverSink {
    client: reqwest::blocking::Client,
    credentials: NotificationCredentials,
}

impl PushoverSink {
    pub fn new(credentials: NotificationCredentials) -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
            credentials,
        }
    }
}

impl NotificationSink for PushoverSink {
    fn notify_all_done(&self, message: &str) -> Result<(), NotifyError> {
        if !self.credentials.is_configured() {
            return Err(NotifyError::NotConfigured);
        }
        let user_key = self.credentials.user_key.as_deref().unwrap_or_default();
        let app_token = self.credentials.app_token.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(PUSHOVER_API_URL)
            .form(&[("token", app_token), ("user", user_key), ("message", message)])
            .send()?;

        if let Err(err) = response.error_for_status_ref() {
            warn!(%err, "pushover notification was rejected");
            return Err(NotifyError::Request(err));
        }
        debug!("pushover notification sent");
        Ok(())
    }
}

/// A sink that drops every message. Used when notifications are disabled or
/// credentials are absent, so callers never need to branch on an `Option`.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify_all_done(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}
