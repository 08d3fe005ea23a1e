//! Interface to the transport layer that carries frames for one channel.
//!
//! The transport owns the socket, frame header parsing and channel number allocation.
//! A channel only needs to open its handle, send and receive frames on it, and close it.
use std::{fmt, time::Duration};

use amqp_serde::types::AmqpChannelId;
use async_trait::async_trait;

use crate::frame::Frame;

mod channel_id;
pub mod mem;

pub(crate) use channel_id::ChannelIdRepository;

/// Opaque handle of a channel opened on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// Non-OK status reported by a transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportStatus {
    Timeout,
    NoMemory,
    InvalidHandle,
    InvalidArgument,
    WrongState,
    TooManyChannels,
    QueueFull,
    FrameTooLarge,
    IoError,
    ProtocolError,
    Unimplemented,
    IoInterrupted,
    Generic,
}

impl TransportStatus {
    /// Statuses that only mean "nothing to read right now".
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportStatus::Timeout | TransportStatus::IoInterrupted)
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TransportStatus::Timeout => "operation timed out",
            TransportStatus::NoMemory => "out of memory",
            TransportStatus::InvalidHandle => "invalid channel handle",
            TransportStatus::InvalidArgument => "invalid argument",
            TransportStatus::WrongState => "operation not allowed in current state",
            TransportStatus::TooManyChannels => "too many channels",
            TransportStatus::QueueFull => "queue full",
            TransportStatus::FrameTooLarge => "frame too large",
            TransportStatus::IoError => "I/O error",
            TransportStatus::ProtocolError => "protocol error",
            TransportStatus::Unimplemented => "unimplemented",
            TransportStatus::IoInterrupted => "I/O interrupted",
            TransportStatus::Generic => "generic transport error",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for TransportStatus {}

/// Frame transport used by channels.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel handle and return it with the channel number assigned to it.
    async fn open_channel(&self) -> Result<(ChannelHandle, AmqpChannelId), TransportStatus>;

    async fn close_channel(&self, handle: ChannelHandle) -> Result<(), TransportStatus>;

    async fn send_frame(&self, handle: ChannelHandle, frame: Frame) -> Result<(), TransportStatus>;

    /// Wait up to `timeout` for the next frame on the channel.
    ///
    /// Returns `Ok(None)` when no frame is available and `timeout` is zero,
    /// and `Err(TransportStatus::Timeout)` when a non-zero timeout elapses.
    async fn receive_frame(
        &self,
        handle: ChannelHandle,
        timeout: Duration,
    ) -> Result<Option<Frame>, TransportStatus>;
}
