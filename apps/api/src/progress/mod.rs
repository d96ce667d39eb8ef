//! Progress channel: out-of-band status messages for in-flight pipeline sessions.
//!
//! Messages are advisory. They arrive on a shared topic with no ordering
//! relative to stage completions, so every consumer filters them by the
//! session id carried in the payload.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub mod local;
pub mod pubsub;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed progress payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Progress channel unavailable: {0}")]
    Unavailable(String),
}

/// A progress payload as published by the processor.
///
/// Tagged events carry the correlation id minted when the session started.
/// Untagged events come from processors that predate correlation and cannot
/// be attributed to any session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Tagged {
        #[serde(alias = "sessionId")]
        session_id: Uuid,
        message: String,
    },
    Untagged {
        message: String,
    },
}

impl ProgressEvent {
    pub fn parse(payload: &str) -> Result<Self, ProgressError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn message(&self) -> &str {
        match self {
            ProgressEvent::Tagged { message, .. } | ProgressEvent::Untagged { message } => message,
        }
    }
}

/// Invoked once per inbound message.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn subscribe(
        &self,
        topic: &str,
        on_message: ProgressCallback,
    ) -> Result<Subscription, ProgressError>;
}

/// Handle to a live subscription. Released by `unsubscribe` or on drop.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            topic: topic.into(),
            cancel,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops the listener. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if self.is_active() {
            debug!("Releasing progress subscription on '{}'", self.topic);
            self.cancel.cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Parses a raw payload and hands it to the callback; malformed payloads are dropped.
pub(crate) fn dispatch(topic: &str, payload: &str, on_message: &ProgressCallback) {
    match ProgressEvent::parse(payload) {
        Ok(event) => on_message(event),
        Err(e) => debug!("Dropping unparseable progress payload on '{topic}': {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_parse_tagged_event() {
        let id = Uuid::new_v4();
        let event =
            ProgressEvent::parse(&format!(r#"{{"session_id":"{id}","message":"Parsing PDF"}}"#))
                .unwrap();
        assert_eq!(
            event,
            ProgressEvent::Tagged {
                session_id: id,
                message: "Parsing PDF".to_string()
            }
        );
    }

    #[test]
    fn test_parse_camel_case_session_id() {
        let id = Uuid::new_v4();
        let event =
            ProgressEvent::parse(&format!(r#"{{"sessionId":"{id}","message":"x"}}"#)).unwrap();
        assert!(matches!(event, ProgressEvent::Tagged { session_id, .. } if session_id == id));
    }

    #[test]
    fn test_parse_untagged_event() {
        let event = ProgressEvent::parse(r#"{"message":"Analyzing resume..."}"#).unwrap();
        assert_eq!(
            event,
            ProgressEvent::Untagged {
                message: "Analyzing resume...".to_string()
            }
        );
        assert_eq!(event.message(), "Analyzing resume...");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ProgressEvent::parse("not json").is_err());
        assert!(ProgressEvent::parse(r#"{"status":"ok"}"#).is_err());
    }

    #[test]
    fn test_dispatch_skips_malformed_payloads() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback =
            Arc::new(move |event: ProgressEvent| sink.lock().unwrap().push(event));

        dispatch("t", "{oops", &callback);
        dispatch("t", r#"{"message":"ok"}"#, &callback);

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let token = CancellationToken::new();
        let subscription = Subscription::new("topic", token.clone());
        assert!(subscription.is_active());

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert!(!subscription.is_active());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_drop_releases_subscription() {
        let token = CancellationToken::new();
        drop(Subscription::new("topic", token.clone()));
        assert!(token.is_cancelled());
    }
}
