//! Continuations of synchronous methods.
//!
//! A channel has at most one outstanding synchronous method. The frame task hands the reply,
//! or the reason the channel went away, to the continuation installed for it.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    sync::oneshot::{self, error::RecvError},
    time,
};
use tracing::debug;

use crate::{
    command::Command, consumer::Consumer, dispatcher::ConsumerDispatcher, error::Error,
    frame::Method, Result,
};

/// Receiver of the outcome of one synchronous method.
///
/// Exactly one of the two methods takes effect, once; later calls are ignored.
pub trait RpcContinuation: Send + Sync {
    fn handle_command(&self, command: Command);

    fn handle_abort(&self, error: Error);
}

/// Continuation whose outcome is awaited by the caller of the synchronous method.
pub struct BlockingRpcContinuation {
    /// `None` is published on abort.
    reply_tx: Mutex<Option<oneshot::Sender<Option<Command>>>>,
    /// Taken once the outcome has been read.
    reply_rx: tokio::sync::Mutex<Option<oneshot::Receiver<Option<Command>>>>,
    exception: Mutex<Option<Error>>,
}

impl Default for BlockingRpcContinuation {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingRpcContinuation {
    pub fn new() -> Self {
        let (reply_tx, reply_rx) = oneshot::channel();
        Self {
            reply_tx: Mutex::new(Some(reply_tx)),
            reply_rx: tokio::sync::Mutex::new(Some(reply_rx)),
            exception: Mutex::new(None),
        }
    }

    /// Wait for the outcome. `None` means the method was aborted, see [`exception`].
    ///
    /// [`exception`]: BlockingRpcContinuation::exception
    pub async fn get_reply(&self) -> Option<Command> {
        let mut reply_rx = self.reply_rx.lock().await;
        let outcome = match reply_rx.as_mut() {
            Some(rx) => rx.await,
            None => return None,
        };
        reply_rx.take();
        Self::reply_of(outcome)
    }

    /// Wait up to `timeout` for the outcome.
    ///
    /// Fails with [`Error::RpcTimeout`] if nothing was published in time. An outcome published
    /// after the timeout is kept and returned by the next call.
    pub async fn get_reply_timeout(&self, timeout: Duration) -> Result<Option<Command>> {
        let mut reply_rx = self.reply_rx.lock().await;
        let outcome = match reply_rx.as_mut() {
            Some(rx) => time::timeout(timeout, rx)
                .await
                .map_err(|_| Error::RpcTimeout(format!("no reply within {:?}", timeout)))?,
            None => return Ok(None),
        };
        reply_rx.take();
        Ok(Self::reply_of(outcome))
    }

    /// Reason recorded by [`handle_abort`](RpcContinuation::handle_abort), if it took effect.
    pub fn exception(&self) -> Option<Error> {
        self.exception
            .lock()
            .ok()
            .and_then(|exception| exception.clone())
    }

    fn reply_of(outcome: std::result::Result<Option<Command>, RecvError>) -> Option<Command> {
        // a dropped sender means nobody will ever publish
        outcome.ok().flatten()
    }

    fn take_sender(&self) -> Option<oneshot::Sender<Option<Command>>> {
        self.reply_tx.lock().ok().and_then(|mut tx| tx.take())
    }
}

impl RpcContinuation for BlockingRpcContinuation {
    fn handle_command(&self, command: Command) {
        match self.take_sender() {
            Some(tx) => {
                // receiver may already be gone after a timeout
                let _ = tx.send(Some(command));
            }
            None => debug!("continuation already completed, dropping {}", command),
        }
    }

    fn handle_abort(&self, error: Error) {
        match self.take_sender() {
            Some(tx) => {
                if let Ok(mut exception) = self.exception.lock() {
                    *exception = Some(error);
                }
                let _ = tx.send(None);
            }
            None => debug!("continuation already completed, ignoring abort: {}", error),
        }
    }
}

/// Continuation of `basic.consume`.
///
/// Registers the consumer with the dispatcher when `basic.consume-ok` arrives, before any
/// delivery for the new tag can be processed, then completes the inner continuation.
pub(crate) struct ConsumeRpcContinuation {
    inner: Arc<BlockingRpcContinuation>,
    dispatcher: Arc<ConsumerDispatcher>,
    consumer: Mutex<Option<Arc<dyn Consumer>>>,
}

impl ConsumeRpcContinuation {
    pub fn new(
        inner: Arc<BlockingRpcContinuation>,
        dispatcher: Arc<ConsumerDispatcher>,
        consumer: Arc<dyn Consumer>,
    ) -> Self {
        Self {
            inner,
            dispatcher,
            consumer: Mutex::new(Some(consumer)),
        }
    }
}

impl RpcContinuation for ConsumeRpcContinuation {
    fn handle_command(&self, command: Command) {
        if let Method::ConsumeOk(consume_ok) = command.method() {
            let consumer = self.consumer.lock().ok().and_then(|mut c| c.take());
            if let Some(consumer) = consumer {
                let mut dispatcher = self.dispatcher.lock();
                let consumer_tag = consume_ok.consumer_tag.to_string();
                if let Err(err) = dispatcher.add_consumer(&consumer_tag, consumer) {
                    drop(dispatcher);
                    self.inner.handle_abort(err);
                    return;
                }
                dispatcher.handle_consume_ok(&consumer_tag);
            }
        }
        self.inner.handle_command(command);
    }

    fn handle_abort(&self, error: Error) {
        self.inner.handle_abort(error);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::{BlockingRpcContinuation, RpcContinuation};
    use crate::{command::Command, error::Error, frame::Method, frame::QosOk};

    #[tokio::test]
    async fn test_reply_published() {
        let continuation = BlockingRpcContinuation::new();
        continuation.handle_command(Command::new(Method::QosOk(QosOk)));

        let reply = continuation.get_reply().await.unwrap();
        assert!(matches!(reply.method(), Method::QosOk(_)));
        assert_eq!(None, continuation.exception());
    }

    #[tokio::test]
    async fn test_abort_published() {
        let continuation = BlockingRpcContinuation::new();
        continuation.handle_abort(Error::ChannelClosed("normal closure".to_string()));
        // a late reply does not change the outcome
        continuation.handle_command(Command::new(Method::QosOk(QosOk)));

        assert!(continuation.get_reply().await.is_none());
        assert_eq!(
            Some(Error::ChannelClosed("normal closure".to_string())),
            continuation.exception()
        );
    }

    #[tokio::test]
    async fn test_late_reply_not_lost_after_timeout() {
        let continuation = BlockingRpcContinuation::new();
        assert!(matches!(
            continuation
                .get_reply_timeout(Duration::from_millis(10))
                .await,
            Err(Error::RpcTimeout(_))
        ));

        continuation.handle_command(Command::new(Method::QosOk(QosOk)));
        let reply = continuation
            .get_reply_timeout(Duration::from_millis(10))
            .await
            .unwrap();
        assert!(reply.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_command_and_abort_race() {
        for _ in 0..100 {
            let continuation = Arc::new(BlockingRpcContinuation::new());

            let by_reply = continuation.clone();
            let reply_thread = thread::spawn(move || {
                by_reply.handle_command(Command::new(Method::QosOk(QosOk)));
            });
            let by_abort = continuation.clone();
            let abort_thread = thread::spawn(move || {
                by_abort.handle_abort(Error::ChannelClosed("race".to_string()));
            });
            reply_thread.join().unwrap();
            abort_thread.join().unwrap();

            // exactly one producer is observed
            match continuation.get_reply().await {
                Some(_) => assert_eq!(None, continuation.exception()),
                None => assert!(continuation.exception().is_some()),
            }
            // outcome is read once
            assert!(continuation.get_reply().await.is_none());
        }
    }
}
