//! Wires the shared `relaykit_common::broker::BrokerSubscriber` into this
//! process's topic -> broadcast channel map, so every session task can read
//! from a plain in-memory `broadcast::Receiver` regardless of which HTTP
//! process actually published the envelope.

use tokio::task::JoinHandle;

use relaykit_common::broker::BrokerSubscriber;

use crate::state::WsState;

pub fn start(state: &WsState) -> JoinHandle<()> {
    let subscriber = BrokerSubscriber::new(state.config.redis_url.clone(), state.channels.clone());
    subscriber.start()
}
