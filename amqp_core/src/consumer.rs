//! Callback interface of consumers registered with `basic.consume`.
use amqp_serde::types::AmqpDeliveryTag;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    error::Error,
    frame::{BasicProperties, Deliver, GetOk},
    Result,
};

/// Delivery information of a message, as given by `basic.deliver` or `basic.get-ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub delivery_tag: AmqpDeliveryTag,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

impl From<Deliver> for Envelope {
    fn from(deliver: Deliver) -> Self {
        Self {
            delivery_tag: deliver.delivery_tag,
            redelivered: deliver.redelivered,
            exchange: deliver.exchange.to_string(),
            routing_key: deliver.routing_key.to_string(),
        }
    }
}

impl From<GetOk> for Envelope {
    fn from(get_ok: GetOk) -> Self {
        Self {
            delivery_tag: get_ok.delivery_tag,
            redelivered: get_ok.redelivered,
            exchange: get_ok.exchange.to_string(),
            routing_key: get_ok.routing_key.to_string(),
        }
    }
}

/// Consumer of a channel.
///
/// Calls for one consumer are made one at a time, in the order the channel received the
/// corresponding methods, from a task of the shared work service. An `Err` returned by a
/// callback is logged and does not stop later calls.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// The broker confirmed the registration of `consumer_tag`.
    async fn handle_consume_ok(&self, consumer_tag: &str) -> Result<()> {
        let _ = consumer_tag;
        Ok(())
    }

    /// The consumer was cancelled with `basic.cancel`.
    async fn handle_cancel_ok(&self, consumer_tag: &str) -> Result<()> {
        let _ = consumer_tag;
        Ok(())
    }

    /// The broker cancelled the consumer, e.g. because its queue was deleted.
    async fn handle_cancel(&self, consumer_tag: &str) -> Result<()> {
        let _ = consumer_tag;
        Ok(())
    }

    /// `basic.recover` completed on the channel.
    async fn handle_recover_ok(&self, consumer_tag: &str) -> Result<()> {
        let _ = consumer_tag;
        Ok(())
    }

    async fn handle_delivery(
        &self,
        consumer_tag: &str,
        envelope: Envelope,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) -> Result<()>;

    /// The channel or its connection was closed while the consumer was registered.
    /// Called exactly once, and no further call follows.
    async fn handle_shutdown(&self, consumer_tag: &str, error: &Error) -> Result<()> {
        let _ = (consumer_tag, error);
        Ok(())
    }
}

/// Consumer that only logs what it receives.
pub struct DefaultConsumer;

#[async_trait]
impl Consumer for DefaultConsumer {
    async fn handle_consume_ok(&self, consumer_tag: &str) -> Result<()> {
        info!("consumer {} registered", consumer_tag);
        Ok(())
    }

    async fn handle_cancel_ok(&self, consumer_tag: &str) -> Result<()> {
        info!("consumer {} cancelled", consumer_tag);
        Ok(())
    }

    async fn handle_delivery(
        &self,
        consumer_tag: &str,
        envelope: Envelope,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) -> Result<()> {
        debug!(
            "consumer {} got delivery {} from exchange '{}' with routing key '{}', {} bytes, {}",
            consumer_tag,
            envelope.delivery_tag,
            envelope.exchange,
            envelope.routing_key,
            content.len(),
            basic_properties
        );
        Ok(())
    }

    async fn handle_shutdown(&self, consumer_tag: &str, error: &Error) -> Result<()> {
        info!("consumer {} shut down: {}", consumer_tag, error);
        Ok(())
    }
}
