//! AMQP 0-9-1 channel engine.
//!
//! Assembles inbound frames into commands, correlates synchronous methods with their replies
//! and dispatches deliveries to consumers, on top of any [`Transport`](transport::Transport)
//! that carries frames for a channel.
//!
//! This library is based on async tokio runtime.
//!
//! # Example
//!
//! ```ignore
//! let (transport, broker) = MemoryTransport::new(2047);
//! let manager = ChannelManager::new(Arc::new(transport), WorkService::new()?, ChannelConfig::default());
//! let channel = manager.create_channel().await?;
//! let (queue, _, _) = channel
//!     .queue_declare(QueueDeclareArguments::new("q1"))
//!     .await?
//!     .unwrap();
//! channel
//!     .basic_consume(Arc::new(DefaultConsumer), BasicConsumeArguments::new(&queue, "c1"))
//!     .await?;
//! ```
pub mod frame;
pub mod transport;

mod channel;
mod channel_manager;
mod command;
mod config;
mod consumer;
mod dispatcher;
mod error;
mod listener;
mod rpc;
mod work;

#[cfg(test)]
mod test_utils;

// public API
pub use channel::*;
pub use channel_manager::ChannelManager;
pub use command::Command;
pub use config::ChannelConfig;
pub use consumer::{Consumer, DefaultConsumer, Envelope};
pub use error::Error;
pub use frame::BasicProperties;
pub use listener::{ReturnListener, ReturnedMessage};
pub use rpc::{BlockingRpcContinuation, RpcContinuation};
pub use work::{Task, WorkService};

pub type Result<T> = std::result::Result<T, Error>;
