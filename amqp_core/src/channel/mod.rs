//! AMQP channel.
//!
//! A [`Channel`] is opened by a [`ChannelManager`](crate::ChannelManager) and lives until it is
//! closed by the application, by the broker with `channel.close`, or by the failure of its
//! connection. It never reopens.
//!
//! Inbound frames are read by a task on the shared [`WorkService`], which assembles them into
//! commands and either handles them on its own (deliveries, returns, server close) or hands them
//! to the one outstanding synchronous method.
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use amqp_serde::types::{AmqpChannelId, ShortStr};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{
    channel_manager::ChannelManagerInner,
    command::Command,
    config::ChannelConfig,
    consumer::Consumer,
    dispatcher::ConsumerDispatcher,
    error::Error,
    frame::{
        BasicProperties, CloseChannel, CloseChannelOk, ContentHeader, Flow, FlowOk, Frame, Method,
        OpenChannel,
    },
    listener::{ReturnListener, ReturnListeners, ReturnedMessage},
    rpc::{BlockingRpcContinuation, RpcContinuation},
    transport::{ChannelHandle, Transport, TransportStatus},
    work::WorkService,
    Result,
};

/// Reply code of `channel.close` sent on normal closure.
const REPLY_SUCCESS: u16 = 200;

// macros should appear before module declaration
#[macro_use]
mod helpers {
    /// Execute a synchronous method and check that the reply is the expected method.
    macro_rules! synchronous_request {
        ($channel:expr, $method:expr, $reply:path) => {{
            let command = $channel.exec_rpc($method.into()).await?;
            match command.into_parts().0 {
                $reply(reply) => Ok(reply),
                unexpected => Err(Error::UnexpectedReply(unexpected.name().to_string())),
            }
        }};
    }

    macro_rules! impl_chainable_setter {
        ($($field:ident: $typ:ty),+) => {
            $(
            pub fn $field(&mut self, $field: $typ) -> &mut Self {
                self.$field = $field;
                self
            }
            )+

            pub fn finish(&mut self) -> Self {
                self.clone()
            }
        };
    }
}

mod basic;
mod exchange;
mod queue;
mod task;

pub use basic::*;
pub use exchange::*;
pub use queue::*;

use task::ChannelTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelStatus {
    /// Waiting for `channel.open-ok`.
    Opening,
    Open,
    /// `channel.close` sent or being answered.
    Closing,
    Closed,
}

struct ChannelState {
    status: ChannelStatus,
    /// Continuation of the one outstanding synchronous method.
    active_rpc: Option<Arc<dyn RpcContinuation>>,
    /// Cleared once `channel.close-ok` is received.
    handle_valid: bool,
}

impl ChannelState {
    fn ensure_open(&self, channel_id: AmqpChannelId) -> Result<()> {
        match self.status {
            ChannelStatus::Open => Ok(()),
            status => Err(Error::ChannelClosed(format!(
                "channel {} is {:?}",
                channel_id, status
            ))),
        }
    }
}

pub(crate) struct SharedChannelInner {
    channel_id: AmqpChannelId,
    handle: ChannelHandle,
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    /// Signalled whenever the RPC slot is released.
    rpc_released: Notify,
    /// Serializes outbound frames so content frames of a method are never interleaved.
    send_lock: tokio::sync::Mutex<()>,
    dispatcher: Arc<ConsumerDispatcher>,
    return_listeners: ReturnListeners,
    manager: Weak<ChannelManagerInner>,
}

/// Handle of an AMQP channel. Clones share the same channel.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<SharedChannelInner>,
}

/////////////////////////////////////////////////////////////////////////////
impl Channel {
    /// Open a channel on the transport and wait for `channel.open-ok`.
    pub(crate) async fn open(
        transport: Arc<dyn Transport>,
        work_service: WorkService,
        config: ChannelConfig,
        manager: Weak<ChannelManagerInner>,
    ) -> Result<Self> {
        // armed before the request can produce a reply
        let continuation = Arc::new(BlockingRpcContinuation::new());

        let (handle, channel_id) = transport.open_channel().await?;
        let dispatcher = Arc::new(ConsumerDispatcher::new(
            channel_id,
            work_service.clone(),
            config.get_deliveries_per_turn(),
        ));
        let active_rpc: Arc<dyn RpcContinuation> = continuation.clone();
        let channel = Self {
            shared: Arc::new(SharedChannelInner {
                channel_id,
                handle,
                transport,
                config,
                state: Mutex::new(ChannelState {
                    status: ChannelStatus::Opening,
                    active_rpc: Some(active_rpc),
                    handle_valid: true,
                }),
                rpc_released: Notify::new(),
                send_lock: tokio::sync::Mutex::new(()),
                dispatcher,
                return_listeners: ReturnListeners::new(),
                manager,
            }),
        };

        if let Err(err) = work_service.submit(ChannelTask::new(channel.clone())) {
            channel.shutdown(err.clone()).await;
            return Err(err);
        }
        if let Err(err) = channel.transmit(OpenChannel::default()).await {
            channel.shutdown(err.clone()).await;
            return Err(err);
        }

        let active_rpc: Arc<dyn RpcContinuation> = continuation.clone();
        let reply = channel.wait_reply(&active_rpc, &continuation).await?;
        match reply.method() {
            Method::OpenChannelOk(_) => {}
            unexpected => {
                let err = Error::IllegalState(format!(
                    "expected channel.open-ok, got {}",
                    unexpected.name()
                ));
                channel.shutdown(err.clone()).await;
                return Err(err);
            }
        }

        {
            let mut state = channel.lock_state();
            if state.status != ChannelStatus::Opening {
                return Err(Error::ChannelClosed(format!(
                    "channel {} closed while opening",
                    channel_id
                )));
            }
            state.status = ChannelStatus::Open;
        }
        info!("open channel {} on {}", channel_id, handle);
        Ok(channel)
    }

    pub fn channel_id(&self) -> AmqpChannelId {
        self.shared.channel_id
    }

    pub fn is_open(&self) -> bool {
        self.lock_state().status == ChannelStatus::Open
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock_state().status == ChannelStatus::Closed
    }

    /// Consumer registered with `consumer_tag`, if any.
    pub fn get_consumer(&self, consumer_tag: &str) -> Option<Arc<dyn Consumer>> {
        self.shared.dispatcher.get_consumer(consumer_tag)
    }

    pub fn add_return_listener(&self, listener: Arc<dyn ReturnListener>) {
        let _state = self.lock_state();
        self.shared.return_listeners.add(listener);
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove_return_listener(&self, listener: &Arc<dyn ReturnListener>) -> bool {
        let _state = self.lock_state();
        self.shared.return_listeners.remove(listener)
    }

    /// True if both handles refer to the same channel.
    pub(crate) fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn dispatcher(&self) -> &Arc<ConsumerDispatcher> {
        &self.shared.dispatcher
    }

    pub(crate) fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    fn ensure_open(&self) -> Result<()> {
        self.lock_state().ensure_open(self.shared.channel_id)
    }

    /// Send a method frame.
    pub(crate) async fn transmit<M: Into<Method>>(&self, method: M) -> Result<()> {
        let frame = Frame::from_method(&method.into())?;
        let _guard = self.shared.send_lock.lock().await;
        self.send_frame(frame).await
    }

    /// Send a content-bearing method with its header and body frames.
    pub(crate) async fn transmit_content<M: Into<Method>>(
        &self,
        method: M,
        basic_properties: BasicProperties,
        content: &[u8],
    ) -> Result<()> {
        let method_frame = Frame::from_method(&method.into())?;
        let header = ContentHeader::new(content.len() as u64, basic_properties);
        let header_frame = Frame::from_content_header(&header)?;

        let _guard = self.shared.send_lock.lock().await;
        self.send_frame(method_frame).await?;
        self.send_frame(header_frame).await?;
        for body_frame in Frame::content_bodies(content, self.shared.config.get_frame_max()) {
            self.send_frame(body_frame).await?;
        }
        Ok(())
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        if !self.lock_state().handle_valid {
            return Err(Error::Transport(TransportStatus::InvalidHandle));
        }
        self.shared
            .transport
            .send_frame(self.shared.handle, frame)
            .await?;
        Ok(())
    }

    /// Fire-and-forget method on an open channel.
    pub(crate) async fn send_method<M: Into<Method>>(&self, method: M) -> Result<()> {
        self.ensure_open()?;
        self.transmit(method).await
    }

    /// Execute a synchronous method and return its reply.
    ///
    /// Waits until no other synchronous method is outstanding on the channel.
    pub(crate) async fn exec_rpc(&self, method: Method) -> Result<Command> {
        let continuation = Arc::new(BlockingRpcContinuation::new());
        self.exec_continuation(method, continuation.clone(), continuation)
            .await
    }

    /// Execute a synchronous method with `active` as the continuation that receives the reply,
    /// and wait on `reply`, which `active` completes.
    pub(crate) async fn exec_continuation(
        &self,
        method: Method,
        active: Arc<dyn RpcContinuation>,
        reply: Arc<BlockingRpcContinuation>,
    ) -> Result<Command> {
        let name = method.name();
        self.install_rpc(active.clone()).await?;
        debug!("channel {} sends {}", self.shared.channel_id, name);
        if let Err(err) = self.transmit(method).await {
            self.release_rpc(&active);
            return Err(err);
        }
        self.wait_reply(&active, &reply).await
    }

    /// Take the RPC slot, waiting for it to be released.
    async fn install_rpc(&self, continuation: Arc<dyn RpcContinuation>) -> Result<()> {
        loop {
            // registered before the slot is checked, so a release in between is not missed
            let released = self.shared.rpc_released.notified();
            {
                let mut state = self.lock_state();
                state.ensure_open(self.shared.channel_id)?;
                if state.active_rpc.is_none() {
                    state.active_rpc = Some(continuation);
                    return Ok(());
                }
            }
            released.await;
        }
    }

    async fn wait_reply(
        &self,
        active: &Arc<dyn RpcContinuation>,
        reply: &BlockingRpcContinuation,
    ) -> Result<Command> {
        let outcome = match self.shared.config.get_rpc_timeout() {
            None => reply.get_reply().await,
            Some(timeout) => match reply.get_reply_timeout(timeout).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // no reply can be matched reliably anymore
                    self.release_rpc(active);
                    warn!(
                        "channel {} shuts down after waiting {:?} for a reply",
                        self.shared.channel_id, timeout
                    );
                    self.shutdown(err.clone()).await;
                    return Err(err);
                }
            },
        };
        match outcome {
            Some(command) => Ok(command),
            None => Err(reply.exception().unwrap_or_else(|| {
                Error::IllegalState("synchronous method aborted without reason".to_string())
            })),
        }
    }

    /// Take and clear the RPC slot, letting a waiting synchronous method proceed.
    pub(crate) fn next_outstanding_rpc(&self) -> Option<Arc<dyn RpcContinuation>> {
        let continuation = self.lock_state().active_rpc.take();
        if continuation.is_some() {
            self.shared.rpc_released.notify_waiters();
        }
        continuation
    }

    /// Clear the RPC slot if it still holds `continuation`.
    fn release_rpc(&self, continuation: &Arc<dyn RpcContinuation>) {
        let mut state = self.lock_state();
        let installed = state
            .active_rpc
            .as_ref()
            .map_or(false, |active| Arc::ptr_eq(active, continuation));
        if installed {
            state.active_rpc.take();
            drop(state);
            self.shared.rpc_released.notify_waiters();
        }
    }

    /// Ask the broker to pause (`false`) or resume (`true`) deliveries on the channel.
    ///
    /// Returns the flow state confirmed by the broker.
    pub async fn channel_flow(&self, active: bool) -> Result<bool> {
        let flow_ok: FlowOk = synchronous_request!(self, Flow { active }, Method::FlowOk)?;
        Ok(flow_ok.active)
    }

    /// Close the channel with `channel.close` and wait for `channel.close-ok`.
    ///
    /// A no-op on a closed channel. Any outstanding synchronous method fails with
    /// [`Error::ChannelClosed`].
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.close_handshake(Error::ChannelClosed("normal closure".to_string()))
            .await
    }

    /// Orderly close: `channel.close`, wait for `channel.close-ok`, then shut down with `reason`.
    pub(crate) async fn close_handshake(&self, reason: Error) -> Result<()> {
        let close_ok = Arc::new(BlockingRpcContinuation::new());
        let active: Arc<dyn RpcContinuation> = close_ok.clone();
        let aborted = {
            let mut state = self.lock_state();
            match state.status {
                ChannelStatus::Closed | ChannelStatus::Closing => return Ok(()),
                _ => state.status = ChannelStatus::Closing,
            }
            state.active_rpc.replace(active.clone())
        };
        self.shared.dispatcher.quiesce();
        if let Some(continuation) = aborted {
            continuation.handle_abort(reason.clone());
        }
        // waiters see the channel closing
        self.shared.rpc_released.notify_waiters();

        let reply_text = ShortStr::try_from("Normal shutdown").unwrap_or_default();
        let result = match self
            .transmit(CloseChannel::new(REPLY_SUCCESS, reply_text, 0, 0))
            .await
        {
            Ok(()) => match close_ok
                .get_reply_timeout(self.shared.config.get_close_timeout())
                .await
            {
                // aborted: the broker closed the channel at the same time
                Ok(_) => Ok(()),
                Err(err) => {
                    warn!(
                        "no channel.close-ok on channel {}: {}",
                        self.shared.channel_id, err
                    );
                    Err(err)
                }
            },
            Err(err) => Err(err),
        };
        self.shutdown(reason).await;
        result
    }

    /// The connection of the channel is closed or failed.
    pub async fn notify_connection_closed(&self, error: Error) {
        self.shutdown(error).await;
    }

    /// Tear the channel down with `reason` and unregister it from its manager.
    /// A no-op if already closed.
    pub(crate) async fn shutdown(&self, reason: Error) {
        let aborted = {
            let mut state = self.lock_state();
            if state.status == ChannelStatus::Closed {
                return;
            }
            state.status = ChannelStatus::Closed;
            state.active_rpc.take()
        };
        info!("close channel {}: {}", self.shared.channel_id, reason);

        self.shared.dispatcher.quiesce();
        if let Some(continuation) = aborted {
            continuation.handle_abort(reason.clone());
        }
        self.shared.rpc_released.notify_waiters();
        self.shared.dispatcher.handle_shutdown(&reason).await;

        if let Err(status) = self
            .shared
            .transport
            .close_channel(self.shared.handle)
            .await
        {
            warn!(
                "failed to close {} of channel {}: {}",
                self.shared.handle, self.shared.channel_id, status
            );
        }
        if let Some(manager) = self.shared.manager.upgrade() {
            manager.forget(self);
        }
    }

    /// `channel.close` received from the broker.
    pub(crate) async fn handle_server_close(&self, close: &CloseChannel) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.status == ChannelStatus::Closed {
                return Ok(());
            }
            state.status = ChannelStatus::Closing;
        }
        // nothing more is queued while the handshake completes
        self.shared.dispatcher.quiesce();
        let reply = self.transmit(CloseChannelOk).await;

        let err = Error::ChannelClosedByServer {
            reply_code: close.reply_code,
            reply_text: close.reply_text.to_string(),
            class_id: close.class_id,
            method_id: close.method_id,
        };
        warn!("channel {} closed by server: {}", self.shared.channel_id, close);
        self.shutdown(err).await;
        reply
    }

    /// `channel.close-ok` received: nothing can be sent on the handle anymore.
    pub(crate) fn invalidate_handle(&self) {
        self.lock_state().handle_valid = false;
    }

    pub(crate) fn is_accepting_async(&self) -> bool {
        self.lock_state().status == ChannelStatus::Open
    }

    pub(crate) async fn notify_return_listeners(&self, message: ReturnedMessage) {
        self.shared
            .return_listeners
            .notify(self.shared.channel_id, message)
            .await;
    }

    pub(crate) async fn receive_frame(&self) -> std::result::Result<Option<Frame>, TransportStatus> {
        self.shared
            .transport
            .receive_frame(self.shared.handle, self.shared.config.get_receive_timeout())
            .await
    }
}

/// Convert an argument to a short string, failing on values over 255 bytes.
pub(crate) fn short_str(value: &str) -> Result<ShortStr> {
    ShortStr::try_from(value)
        .map_err(|_| Error::Codec(format!("'{}' is longer than 255 bytes", value)))
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.shared.channel_id)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("channel_id", &self.shared.channel_id)
            .field("handle", &self.shared.handle)
            .field("status", &self.lock_state().status)
            .finish()
    }
}
