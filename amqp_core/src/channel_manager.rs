//! Registry of the channels of one connection.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use amqp_serde::types::AmqpChannelId;
use tracing::{debug, info, warn};

use crate::{
    channel::Channel, config::ChannelConfig, error::Error, transport::Transport,
    work::WorkService, Result,
};

pub(crate) struct ChannelManagerInner {
    transport: Arc<dyn Transport>,
    work_service: WorkService,
    config: ChannelConfig,
    channels: Mutex<HashMap<AmqpChannelId, Channel>>,
}

impl ChannelManagerInner {
    fn lock_channels(&self) -> MutexGuard<'_, HashMap<AmqpChannelId, Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unregister a channel that closed itself.
    pub(crate) fn forget(&self, channel: &Channel) {
        let mut channels = self.lock_channels();
        let registered = channels
            .get(&channel.channel_id())
            .map_or(false, |registered| registered.same_channel(channel));
        if registered {
            channels.remove(&channel.channel_id());
            debug!("{} unregistered", channel);
        }
    }
}

/// Creates the channels of a connection and tracks them by channel number.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ChannelManagerInner>,
}

impl ChannelManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        work_service: WorkService,
        config: ChannelConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelManagerInner {
                transport,
                work_service,
                config,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open a new channel and register it under its channel number.
    pub async fn create_channel(&self) -> Result<Channel> {
        let channel = Channel::open(
            self.inner.transport.clone(),
            self.inner.work_service.clone(),
            self.inner.config.clone(),
            Arc::downgrade(&self.inner),
        )
        .await?;

        let channel_id = channel.channel_id();
        {
            let mut channels = self.inner.lock_channels();
            if channels.contains_key(&channel_id) {
                drop(channels);
                let err = Error::DuplicateElement(format!("channel {}", channel_id));
                channel.shutdown(err.clone()).await;
                return Err(err);
            }
            channels.insert(channel_id, channel.clone());
        }
        // closed by the broker before it was registered
        if !channel.is_open() {
            self.inner.forget(&channel);
            return Err(Error::ChannelClosed(format!(
                "channel {} closed while opening",
                channel_id
            )));
        }
        Ok(channel)
    }

    pub fn get_channel(&self, channel_id: AmqpChannelId) -> Result<Channel> {
        self.inner
            .lock_channels()
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| Error::NoSuchElement(format!("channel {}", channel_id)))
    }

    /// Close a channel with `channel.close` and unregister it.
    ///
    /// `reason` is what its consumers and any outstanding synchronous method observe.
    pub async fn close_channel(&self, channel_id: AmqpChannelId, reason: Error) -> Result<()> {
        let channel = self.get_channel(channel_id)?;
        let result = channel.close_handshake(reason).await;
        self.inner.forget(&channel);
        result
    }

    /// Unregister a channel without closing it.
    pub fn remove_channel(&self, channel_id: AmqpChannelId) -> Option<Channel> {
        self.inner.lock_channels().remove(&channel_id)
    }

    /// The connection is gone: stop accepting work and shut every channel down with `error`.
    pub async fn notify_connection_close(&self, error: Error) {
        self.inner.work_service.shutdown();
        let channels: Vec<Channel> = self
            .inner
            .lock_channels()
            .drain()
            .map(|(_, channel)| channel)
            .collect();
        info!(
            "connection closed, shutting down {} channel(s): {}",
            channels.len(),
            error
        );
        for channel in channels {
            channel.notify_connection_closed(error.clone()).await;
            if channel.is_open() {
                warn!("{} still open after connection close", channel);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock_channels().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numbers of the registered channels, in ascending order.
    pub fn channel_numbers(&self) -> Vec<AmqpChannelId> {
        let mut numbers: Vec<AmqpChannelId> = self.inner.lock_channels().keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }
}
