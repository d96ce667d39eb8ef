//! In-process progress channel backed by a tokio broadcast channel.
//!
//! Used when no Redis is configured and by tests that need to publish
//! progress without a broker.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::progress::{dispatch, ProgressCallback, ProgressChannel, ProgressError, Subscription};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LocalProgressChannel {
    sender: broadcast::Sender<(String, String)>,
}

impl Default for LocalProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalProgressChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes a raw payload. Returns how many listeners were live.
    pub fn publish(&self, topic: &str, payload: impl Into<String>) -> usize {
        self.sender
            .send((topic.to_string(), payload.into()))
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl ProgressChannel for LocalProgressChannel {
    async fn subscribe(
        &self,
        topic: &str,
        on_message: ProgressCallback,
    ) -> Result<Subscription, ProgressError> {
        let mut receiver = self.sender.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let topic_name = topic.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok((message_topic, payload)) => {
                            if message_topic == topic_name {
                                dispatch(&topic_name, &payload, &on_message);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Progress listener on '{topic_name}' lagged, skipped {skipped} messages");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Progress listener on '{topic_name}' stopped");
        });

        Ok(Subscription::new(topic, cancel))
    }
}
