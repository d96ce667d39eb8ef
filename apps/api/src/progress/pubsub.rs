//! Redis pub/sub progress channel.

use std::pin::pin;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::progress::{dispatch, ProgressCallback, ProgressChannel, ProgressError, Subscription};

#[derive(Clone)]
pub struct RedisProgressChannel {
    client: redis::Client,
}

impl RedisProgressChannel {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProgressChannel for RedisProgressChannel {
    async fn subscribe(
        &self,
        topic: &str,
        on_message: ProgressCallback,
    ) -> Result<Subscription, ProgressError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;
        info!("Subscribed to progress topic '{topic}'");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let topic_name = topic.to_string();

        tokio::spawn(async move {
            let mut messages = pin!(pubsub.on_message());
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = messages.next() => {
                        let Some(message) = next else {
                            warn!("Progress stream on '{topic_name}' closed by server");
                            break;
                        };
                        match message.get_payload::<String>() {
                            Ok(payload) => dispatch(&topic_name, &payload, &on_message),
                            Err(e) => debug!("Skipping non-text progress payload: {e}"),
                        }
                    }
                }
            }
            // Dropping the connection ends the subscription server-side.
            debug!("Progress listener on '{topic_name}' stopped");
        });

        Ok(Subscription::new(topic, cancel))
    }
}
