//! In-process transport.
//!
//! Frames are passed through tokio channels without serialization of the frame header.
//! The [`BrokerHandle`] plays the server side: it receives every frame the client sends
//! and injects frames (or transport failures) into a channel's inbound queue.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, broker) = MemoryTransport::new(2047);
//! ```
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use amqp_serde::types::{AmqpChannelId, ShortUint};
use async_trait::async_trait;
use tokio::{sync::mpsc, time};

use super::{ChannelHandle, ChannelIdRepository, Transport, TransportStatus};
use crate::frame::{BasicProperties, ContentHeader, Frame, Method};

/// Item of a channel's inbound queue.
#[derive(Debug)]
enum Inbound {
    Frame(Frame),
    Status(TransportStatus),
}

struct ChannelSlot {
    channel_id: AmqpChannelId,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>>,
}

struct MemoryInner {
    next_handle: AtomicU64,
    id_repo: Mutex<ChannelIdRepository>,
    slots: Mutex<HashMap<ChannelHandle, ChannelSlot>>,
    /// Frames sent by the client, tagged with the channel number.
    outbound_tx: mpsc::UnboundedSender<(AmqpChannelId, Frame)>,
    send_failure: Mutex<Option<TransportStatus>>,
}

impl MemoryInner {
    fn handle_of(&self, channel_id: AmqpChannelId) -> Option<ChannelHandle> {
        let slots = self.slots.lock().ok()?;
        slots
            .iter()
            .find(|(_, slot)| slot.channel_id == channel_id)
            .map(|(handle, _)| *handle)
    }

    fn push_inbound(&self, channel_id: AmqpChannelId, item: Inbound) -> Result<(), TransportStatus> {
        let slots = self.slots.lock().map_err(|_| TransportStatus::WrongState)?;
        let slot = slots
            .values()
            .find(|slot| slot.channel_id == channel_id)
            .ok_or(TransportStatus::InvalidHandle)?;
        slot.inbound_tx
            .send(item)
            .map_err(|_| TransportStatus::InvalidHandle)
    }
}

/// Client side of the in-process transport.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

impl MemoryTransport {
    /// Create a transport allowing channel numbers up to `channel_max`,
    /// together with the broker end that serves it.
    pub fn new(channel_max: ShortUint) -> (Self, BrokerHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(MemoryInner {
            next_handle: AtomicU64::new(1),
            id_repo: Mutex::new(ChannelIdRepository::new(channel_max)),
            slots: Mutex::new(HashMap::new()),
            outbound_tx,
            send_failure: Mutex::new(None),
        });
        let broker = BrokerHandle {
            inner: inner.clone(),
            outbound_rx: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
        };
        (Self { inner }, broker)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_channel(&self) -> Result<(ChannelHandle, AmqpChannelId), TransportStatus> {
        let channel_id = self
            .inner
            .id_repo
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
            .allocate()
            .ok_or(TransportStatus::TooManyChannels)?;
        let handle = ChannelHandle::new(self.inner.next_handle.fetch_add(1, Ordering::Relaxed));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.inner
            .slots
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
            .insert(
                handle,
                ChannelSlot {
                    channel_id,
                    inbound_tx,
                    inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
                },
            );
        Ok((handle, channel_id))
    }

    async fn close_channel(&self, handle: ChannelHandle) -> Result<(), TransportStatus> {
        let slot = self
            .inner
            .slots
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
            .remove(&handle)
            .ok_or(TransportStatus::InvalidHandle)?;
        self.inner
            .id_repo
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
            .release(slot.channel_id);
        Ok(())
    }

    async fn send_frame(&self, handle: ChannelHandle, frame: Frame) -> Result<(), TransportStatus> {
        if let Some(status) = *self
            .inner
            .send_failure
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
        {
            return Err(status);
        }
        let channel_id = self
            .inner
            .slots
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
            .get(&handle)
            .map(|slot| slot.channel_id)
            .ok_or(TransportStatus::InvalidHandle)?;
        self.inner
            .outbound_tx
            .send((channel_id, frame))
            .map_err(|_| TransportStatus::IoError)
    }

    async fn receive_frame(
        &self,
        handle: ChannelHandle,
        timeout: Duration,
    ) -> Result<Option<Frame>, TransportStatus> {
        let inbound_rx = self
            .inner
            .slots
            .lock()
            .map_err(|_| TransportStatus::WrongState)?
            .get(&handle)
            .map(|slot| slot.inbound_rx.clone())
            .ok_or(TransportStatus::InvalidHandle)?;
        let mut inbound_rx = inbound_rx.lock().await;

        let item = if timeout.is_zero() {
            match inbound_rx.try_recv() {
                Ok(item) => item,
                Err(mpsc::error::TryRecvError::Empty) => return Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(TransportStatus::InvalidHandle)
                }
            }
        } else {
            match time::timeout(timeout, inbound_rx.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => return Err(TransportStatus::InvalidHandle),
                Err(_) => return Err(TransportStatus::Timeout),
            }
        };
        match item {
            Inbound::Frame(frame) => Ok(Some(frame)),
            Inbound::Status(status) => Err(status),
        }
    }
}

/// Server end of a [`MemoryTransport`]. Clones share the same end.
#[derive(Clone)]
pub struct BrokerHandle {
    inner: Arc<MemoryInner>,
    outbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<(AmqpChannelId, Frame)>>>,
}

impl BrokerHandle {
    /// Next frame sent by the client, waiting up to `timeout`.
    pub async fn recv_frame(&self, timeout: Duration) -> Option<(AmqpChannelId, Frame)> {
        let mut outbound_rx = self.outbound_rx.lock().await;
        time::timeout(timeout, outbound_rx.recv()).await.ok().flatten()
    }

    /// Next method sent by the client, skipping content header and body frames.
    pub async fn recv_method(&self, timeout: Duration) -> Option<(AmqpChannelId, Method)> {
        let deadline = time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(time::Instant::now());
            match self.recv_frame(remaining).await? {
                (channel_id, Frame::Method(payload)) => {
                    return Method::decode(&payload).ok().map(|m| (channel_id, m))
                }
                _ => continue,
            }
        }
    }

    /// True if the client sent nothing within `timeout`.
    pub async fn is_idle(&self, timeout: Duration) -> bool {
        self.recv_frame(timeout).await.is_none()
    }

    pub fn send_frame(&self, channel_id: AmqpChannelId, frame: Frame) -> Result<(), TransportStatus> {
        self.inner.push_inbound(channel_id, Inbound::Frame(frame))
    }

    pub fn send_method<M: Into<Method>>(
        &self,
        channel_id: AmqpChannelId,
        method: M,
    ) -> Result<(), TransportStatus> {
        let frame = Frame::from_method(&method.into()).map_err(|_| TransportStatus::InvalidArgument)?;
        self.send_frame(channel_id, frame)
    }

    /// Send a content-bearing method followed by its header and a single body frame.
    pub fn send_content<M: Into<Method>>(
        &self,
        channel_id: AmqpChannelId,
        method: M,
        basic_properties: BasicProperties,
        content: &[u8],
    ) -> Result<(), TransportStatus> {
        self.send_method(channel_id, method)?;
        let header = ContentHeader::new(content.len() as u64, basic_properties);
        let frame =
            Frame::from_content_header(&header).map_err(|_| TransportStatus::InvalidArgument)?;
        self.send_frame(channel_id, frame)?;
        if !content.is_empty() {
            self.send_frame(channel_id, Frame::ContentBody(content.to_vec()))?;
        }
        Ok(())
    }

    /// Make the next receive on the channel fail with `status`.
    pub fn inject_status(
        &self,
        channel_id: AmqpChannelId,
        status: TransportStatus,
    ) -> Result<(), TransportStatus> {
        self.inner.push_inbound(channel_id, Inbound::Status(status))
    }

    /// Make every client send fail with `status`, or succeed again with `None`.
    pub fn fail_sends(&self, status: Option<TransportStatus>) {
        if let Ok(mut failure) = self.inner.send_failure.lock() {
            *failure = status;
        }
    }

    /// True while the client keeps the channel handle open.
    pub fn is_channel_open(&self, channel_id: AmqpChannelId) -> bool {
        self.inner.handle_of(channel_id).is_some()
    }
}
