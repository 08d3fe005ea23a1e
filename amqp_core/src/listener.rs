//! Listeners of messages returned by the broker with `basic.return`.
use std::sync::Arc;

use amqp_serde::types::{AmqpChannelId, AmqpReplyCode};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::{debug, error};

use crate::{
    frame::{BasicProperties, Return},
    Result,
};

/// A published message the broker could not route.
#[derive(Debug, Clone)]
pub struct ReturnedMessage {
    pub reply_code: AmqpReplyCode,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
    pub basic_properties: BasicProperties,
    pub content: Vec<u8>,
}

impl ReturnedMessage {
    pub fn new(ret: Return, basic_properties: BasicProperties, content: Vec<u8>) -> Self {
        Self {
            reply_code: ret.reply_code,
            reply_text: ret.reply_text.to_string(),
            exchange: ret.exchange.to_string(),
            routing_key: ret.routing_key.to_string(),
            basic_properties,
            content,
        }
    }
}

#[async_trait]
pub trait ReturnListener: Send + Sync {
    async fn handle_return(&self, message: &ReturnedMessage) -> Result<()>;
}

/// Copy-on-write set of return listeners.
///
/// Readers take the current snapshot without locking. Writers are serialized by the caller.
pub(crate) struct ReturnListeners {
    listeners: ArcSwap<Vec<Arc<dyn ReturnListener>>>,
}

impl ReturnListeners {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn ReturnListener>) {
        let mut listeners = Vec::clone(&self.listeners.load());
        listeners.push(listener);
        self.listeners.store(Arc::new(listeners));
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove(&self, listener: &Arc<dyn ReturnListener>) -> bool {
        let current = self.listeners.load();
        let listeners: Vec<Arc<dyn ReturnListener>> = current
            .iter()
            .filter(|registered| !Arc::ptr_eq(registered, listener))
            .cloned()
            .collect();
        if listeners.len() == current.len() {
            return false;
        }
        self.listeners.store(Arc::new(listeners));
        true
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Hand the message to every listener of the current snapshot.
    pub async fn notify(&self, channel_id: AmqpChannelId, message: ReturnedMessage) {
        let listeners = self.listeners.load_full();
        if listeners.is_empty() {
            debug!(
                "no return listener on channel {}, dropping returned message: {} {}",
                channel_id, message.reply_code, message.reply_text
            );
            return;
        }
        for listener in listeners.iter() {
            if let Err(err) = listener.handle_return(&message).await {
                error!("return listener on channel {} failed: {}", channel_id, err);
            }
        }
    }
}
