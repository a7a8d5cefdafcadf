//! Broker (spec.md §4.4 FanOut's transport, §3 C2): Redis Pub/Sub used as a
//! backplane between HTTP processes (publishers) and WebSocket processes
//! (subscribers), grounded on the teacher's `pubsub.rs` — a dedicated
//! subscriber client, pattern-subscribed once, relaying into per-topic
//! in-memory broadcast channels with an unconditional reconnect-and-retry loop.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fred::prelude::*;
use fred::types::Message as RedisMessage;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::types::{Envelope, Topic};
use crate::{Error, Result};

const CHANNEL_PREFIX: &str = "relaykit:topic:";
const CHANNEL_PATTERN: &str = "relaykit:topic:*";

fn channel_name(topic: &Topic) -> String {
    format!("{CHANNEL_PREFIX}{topic}")
}

fn topic_from_channel(channel: &str) -> Option<Topic> {
    channel.strip_prefix(CHANNEL_PREFIX)?.parse().ok()
}

/// Publisher half. Held by the HTTP process; every mutating handler publishes
/// through this after its Store write commits (spec.md §4.1/§2: "the commit
/// hook never rolls back the mutation on publish failure").
pub struct Broker {
    client: Client,
}

impl Broker {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let config = Config::from_url(redis_url).map_err(Error::Redis)?;
        let client = Builder::from_config(config).build().map_err(Error::Redis)?;
        client.init().await.map_err(Error::Redis)?;
        Ok(Broker { client })
    }

    pub async fn publish(&self, topic: &Topic, envelope: &Envelope) -> Result<()> {
        let payload = serde_json::to_string(envelope)?;
        self.client
            .publish::<i64, _, _>(channel_name(topic), payload)
            .await
            .map_err(Error::Redis)?;
        Ok(())
    }
}

/// Subscriber half. Held by the WebSocket process: relays every published
/// Envelope into the matching topic's local broadcast channel so that
/// SessionHub connections subscribed to that topic receive it, without each
/// connection holding its own Redis subscription.
pub struct BrokerSubscriber {
    redis_url: String,
    channels: Arc<DashMap<Topic, broadcast::Sender<Envelope>>>,
}

impl BrokerSubscriber {
    pub fn new(redis_url: String, channels: Arc<DashMap<Topic, broadcast::Sender<Envelope>>>) -> Self {
        BrokerSubscriber { redis_url, channels }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.run().await {
                    tracing::error!("broker subscriber error: {e}, reconnecting in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        })
    }

    async fn run(&self) -> anyhow::Result<()> {
        let config = Config::from_url(&self.redis_url)?;
        let subscriber = Builder::from_config(config).build_subscriber_client()?;
        subscriber.init().await?;
        tracing::info!("broker subscriber connected to redis");

        let mut message_rx = subscriber.message_rx();
        subscriber.psubscribe(CHANNEL_PATTERN).await?;
        subscriber.manage_subscriptions();

        while let Ok(message) = message_rx.recv().await {
            self.relay(&message);
        }

        tracing::warn!("broker subscriber message channel closed");
        Ok(())
    }

    fn relay(&self, message: &RedisMessage) {
        let channel = message.channel.to_string();
        let Some(topic) = topic_from_channel(&channel) else {
            tracing::debug!("ignoring message on unrecognized channel: {channel}");
            return;
        };

        let payload: String = match message.value.clone().convert() {
            Ok(s) => s,
            Err(_) => {
                tracing::debug!("broker message payload is not a string, channel: {channel}");
                return;
            }
        };

        let envelope: Envelope = match serde_json::from_str(&payload) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("failed to parse broker envelope: {e}, payload: {payload}");
                return;
            }
        };

        if let Some(sender) = self.channels.get(&topic) {
            // A `SendError` just means nobody's currently subscribed to this
            // topic locally; that's normal, not a failure.
            let _ = sender.send(envelope);
        }
    }
}
