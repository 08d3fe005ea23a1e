#![allow(dead_code)]
use std::{sync::Arc, time::Duration};

use amqp_core::{
    frame::{Method, OpenChannelOk},
    transport::mem::{BrokerHandle, MemoryTransport},
    BasicProperties, Channel, ChannelConfig, ChannelManager, Consumer, Envelope, Error,
    WorkService,
};
use amqp_serde::types::AmqpChannelId;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long the scripted broker waits for the client.
pub const WAIT: Duration = Duration::from_secs(5);

// construct a subscriber that prints formatted traces to stdout
pub fn setup_logging() {
    // global subscriber with log level according to RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

pub fn build_manager(config: ChannelConfig) -> (ChannelManager, BrokerHandle) {
    let (transport, broker) = MemoryTransport::new(2047);
    let work_service = WorkService::new().unwrap();
    (
        ChannelManager::new(Arc::new(transport), work_service, config),
        broker,
    )
}

/// Open a channel, with the broker answering `channel.open`.
pub async fn open_channel(manager: &ChannelManager, broker: &BrokerHandle) -> Channel {
    let server = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let (channel_id, method) = expect_method(&broker).await;
            assert!(matches!(method, Method::OpenChannel(_)), "got {}", method);
            broker
                .send_method(channel_id, OpenChannelOk::default())
                .unwrap();
        })
    };
    let channel = manager.create_channel().await.unwrap();
    server.await.unwrap();
    channel
}

pub async fn setup(config: ChannelConfig) -> (ChannelManager, BrokerHandle, Channel) {
    setup_logging();
    let (manager, broker) = build_manager(config);
    let channel = open_channel(&manager, &broker).await;
    (manager, broker, channel)
}

/// Next method sent by the client. Panics if nothing arrives in time.
pub async fn expect_method(broker: &BrokerHandle) -> (AmqpChannelId, Method) {
    broker
        .recv_method(WAIT)
        .await
        .expect("no method sent by the client")
}

/// What a [`RecordingConsumer`] was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConsumeOk(String),
    CancelOk(String),
    Cancel(String),
    RecoverOk(String),
    Delivery {
        consumer_tag: String,
        envelope: Envelope,
        basic_properties: BasicProperties,
        content: Vec<u8>,
        thread: std::thread::ThreadId,
    },
    Shutdown(String, Error),
}

/// Consumer forwarding every callback to a channel the test reads.
pub struct RecordingConsumer {
    events: mpsc::UnboundedSender<Event>,
    fail_shutdown: bool,
}

impl RecordingConsumer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        Self::build(false)
    }

    /// A consumer whose shutdown callback returns an error.
    pub fn failing_shutdown() -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        Self::build(true)
    }

    fn build(fail_shutdown: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                events,
                fail_shutdown,
            }),
            rx,
        )
    }

    fn record(&self, event: Event) {
        self.events.send(event).ok();
    }
}

#[async_trait]
impl Consumer for RecordingConsumer {
    async fn handle_consume_ok(&self, consumer_tag: &str) -> amqp_core::Result<()> {
        self.record(Event::ConsumeOk(consumer_tag.to_string()));
        Ok(())
    }

    async fn handle_cancel_ok(&self, consumer_tag: &str) -> amqp_core::Result<()> {
        self.record(Event::CancelOk(consumer_tag.to_string()));
        Ok(())
    }

    async fn handle_cancel(&self, consumer_tag: &str) -> amqp_core::Result<()> {
        self.record(Event::Cancel(consumer_tag.to_string()));
        Ok(())
    }

    async fn handle_recover_ok(&self, consumer_tag: &str) -> amqp_core::Result<()> {
        self.record(Event::RecoverOk(consumer_tag.to_string()));
        Ok(())
    }

    async fn handle_delivery(
        &self,
        consumer_tag: &str,
        envelope: Envelope,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) -> amqp_core::Result<()> {
        self.record(Event::Delivery {
            consumer_tag: consumer_tag.to_string(),
            envelope,
            basic_properties,
            content,
            thread: std::thread::current().id(),
        });
        Ok(())
    }

    async fn handle_shutdown(&self, consumer_tag: &str, error: &Error) -> amqp_core::Result<()> {
        self.record(Event::Shutdown(consumer_tag.to_string(), error.clone()));
        if self.fail_shutdown {
            return Err(Error::Callback("shutdown callback failed".to_string()));
        }
        Ok(())
    }
}

/// Next event recorded by a consumer. Panics if nothing arrives in time.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("no consumer event in time")
        .expect("consumer dropped")
}
