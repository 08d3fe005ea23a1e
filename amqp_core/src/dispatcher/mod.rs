//! Dispatch of consumer notifications.
//!
//! Each consumer registered on a channel has its own FIFO queue, drained by its own task on the
//! shared work service, so a slow consumer never delays the frame task or other consumers.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use amqp_serde::types::AmqpChannelId;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    consumer::{Consumer, Envelope},
    error::Error,
    frame::BasicProperties,
    work::WorkService,
    Result,
};

mod queue;

pub(crate) use queue::{ConsumerDispatchTask, ConsumerWorkItem};

struct ConsumerEntry {
    consumer: Arc<dyn Consumer>,
    queue_tx: mpsc::UnboundedSender<ConsumerWorkItem>,
}

type ConsumerMap = HashMap<String, ConsumerEntry>;

/// Registry of the consumers of one channel.
pub(crate) struct ConsumerDispatcher {
    channel_id: AmqpChannelId,
    work_service: WorkService,
    items_per_turn: usize,
    consumers: Mutex<ConsumerMap>,
    quiescing: AtomicBool,
}

impl ConsumerDispatcher {
    pub fn new(channel_id: AmqpChannelId, work_service: WorkService, items_per_turn: usize) -> Self {
        Self {
            channel_id,
            work_service,
            items_per_turn,
            consumers: Mutex::new(HashMap::new()),
            quiescing: AtomicBool::new(false),
        }
    }

    /// Lock the dispatcher. Every other call into the dispatcher waits until the guard is dropped.
    pub fn lock(&self) -> DispatcherGuard<'_> {
        DispatcherGuard {
            dispatcher: self,
            consumers: self
                .consumers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn add_consumer(&self, consumer_tag: &str, consumer: Arc<dyn Consumer>) -> Result<()> {
        self.lock().add_consumer(consumer_tag, consumer)
    }

    pub fn remove_consumer(&self, consumer_tag: &str) {
        self.lock().remove_consumer(consumer_tag)
    }

    pub fn get_consumer(&self, consumer_tag: &str) -> Option<Arc<dyn Consumer>> {
        self.lock().get_consumer(consumer_tag)
    }

    #[cfg(test)]
    pub fn consumer_tags(&self) -> Vec<String> {
        self.lock().consumers.keys().cloned().collect()
    }

    #[cfg(test)]
    pub fn handle_consume_ok(&self, consumer_tag: &str) {
        self.lock().handle_consume_ok(consumer_tag)
    }

    #[cfg(test)]
    pub fn handle_cancel_ok(&self, consumer_tag: &str) {
        self.lock().handle_cancel_ok(consumer_tag)
    }

    /// Notify every consumer.
    pub fn handle_recover_ok(&self) {
        let guard = self.lock();
        if self.is_quiescing() {
            return;
        }
        for entry in guard.consumers.values() {
            let _ = entry.queue_tx.send(ConsumerWorkItem::RecoverOk);
        }
    }

    pub fn handle_delivery(
        &self,
        consumer_tag: &str,
        envelope: Envelope,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        self.lock().enqueue(
            consumer_tag,
            ConsumerWorkItem::Delivery {
                envelope,
                basic_properties,
                content,
            },
        )
    }

    /// Drop every later notification.
    pub fn quiesce(&self) {
        self.quiescing.store(true, Ordering::Release);
    }

    pub fn is_quiescing(&self) -> bool {
        self.quiescing.load(Ordering::Acquire)
    }

    /// Terminate every consumer task and call each consumer's `handle_shutdown` once.
    pub async fn handle_shutdown(&self, error: &Error) {
        self.quiesce();
        let entries: Vec<(String, ConsumerEntry)> = self.lock().consumers.drain().collect();
        for (consumer_tag, entry) in entries {
            let _ = entry.queue_tx.send(ConsumerWorkItem::Terminate);
            if let Err(err) = entry.consumer.handle_shutdown(&consumer_tag, error).await {
                error!(
                    "consumer {} on channel {} failed to handle shutdown: {}",
                    consumer_tag, self.channel_id, err
                );
            }
        }
    }
}

/// Dispatcher held locked, see [`ConsumerDispatcher::lock`].
pub(crate) struct DispatcherGuard<'a> {
    dispatcher: &'a ConsumerDispatcher,
    consumers: MutexGuard<'a, ConsumerMap>,
}

impl<'a> DispatcherGuard<'a> {
    /// Register a consumer and schedule its dispatch task.
    ///
    /// Fails with [`Error::DuplicateElement`] if the tag is in use, leaving the existing
    /// registration untouched.
    pub fn add_consumer(&mut self, consumer_tag: &str, consumer: Arc<dyn Consumer>) -> Result<()> {
        let channel_id = self.dispatcher.channel_id;
        if self.consumers.contains_key(consumer_tag) {
            return Err(Error::DuplicateElement(format!(
                "consumer tag {} on channel {}",
                consumer_tag, channel_id
            )));
        }
        if self.dispatcher.is_quiescing() {
            return Err(Error::ChannelClosed(format!(
                "channel {} is shutting down",
                channel_id
            )));
        }
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        self.dispatcher.work_service.submit(ConsumerDispatchTask::new(
            channel_id,
            consumer_tag.to_string(),
            consumer.clone(),
            queue_rx,
            self.dispatcher.items_per_turn,
        ))?;
        self.consumers
            .insert(consumer_tag.to_string(), ConsumerEntry { consumer, queue_tx });
        info!("consumer {} registered on channel {}", consumer_tag, channel_id);
        Ok(())
    }

    /// Let the task of the consumer finish the queued items, then terminate it.
    pub fn remove_consumer(&mut self, consumer_tag: &str) {
        if let Some(entry) = self.consumers.remove(consumer_tag) {
            let _ = entry.queue_tx.send(ConsumerWorkItem::Terminate);
            info!(
                "consumer {} removed from channel {}",
                consumer_tag, self.dispatcher.channel_id
            );
        }
    }

    pub fn get_consumer(&self, consumer_tag: &str) -> Option<Arc<dyn Consumer>> {
        self.consumers
            .get(consumer_tag)
            .map(|entry| entry.consumer.clone())
    }

    pub fn handle_consume_ok(&mut self, consumer_tag: &str) {
        self.enqueue(consumer_tag, ConsumerWorkItem::ConsumeOk)
    }

    pub fn handle_cancel_ok(&mut self, consumer_tag: &str) {
        self.enqueue(consumer_tag, ConsumerWorkItem::CancelOk)
    }

    /// Broker-initiated cancel.
    pub fn handle_cancel(&mut self, consumer_tag: &str) {
        self.enqueue(consumer_tag, ConsumerWorkItem::Cancel)
    }

    fn enqueue(&self, consumer_tag: &str, item: ConsumerWorkItem) {
        if self.dispatcher.is_quiescing() {
            return;
        }
        match self.consumers.get(consumer_tag) {
            Some(entry) => {
                if entry.queue_tx.send(item).is_err() {
                    error!(
                        "consumer {} on channel {} no longer runs",
                        consumer_tag, self.dispatcher.channel_id
                    );
                }
            }
            None => debug!(
                "no consumer {} on channel {}, dropping {:?}",
                consumer_tag, self.dispatcher.channel_id, item
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use async_trait::async_trait;
    use tokio::{sync::mpsc, time};

    use super::ConsumerDispatcher;
    use crate::{
        consumer::{Consumer, Envelope},
        error::Error,
        frame::BasicProperties,
        test_utils::setup_logging,
        work::WorkService,
        Result,
    };

    #[derive(Debug, PartialEq)]
    enum Event {
        ConsumeOk(String),
        Delivery(String, u64, Vec<u8>, thread::ThreadId),
        RecoverOk(String),
        Shutdown(String, Error),
    }

    struct TestConsumer {
        events_tx: mpsc::UnboundedSender<Event>,
        fail_shutdown: bool,
    }

    impl TestConsumer {
        fn new(events_tx: mpsc::UnboundedSender<Event>) -> Arc<Self> {
            Arc::new(Self {
                events_tx,
                fail_shutdown: false,
            })
        }
    }

    #[async_trait]
    impl Consumer for TestConsumer {
        async fn handle_consume_ok(&self, consumer_tag: &str) -> Result<()> {
            let _ = self.events_tx.send(Event::ConsumeOk(consumer_tag.to_string()));
            Ok(())
        }

        async fn handle_recover_ok(&self, consumer_tag: &str) -> Result<()> {
            let _ = self.events_tx.send(Event::RecoverOk(consumer_tag.to_string()));
            Ok(())
        }

        async fn handle_delivery(
            &self,
            consumer_tag: &str,
            envelope: Envelope,
            _basic_properties: BasicProperties,
            content: Vec<u8>,
        ) -> Result<()> {
            let _ = self.events_tx.send(Event::Delivery(
                consumer_tag.to_string(),
                envelope.delivery_tag,
                content,
                thread::current().id(),
            ));
            Ok(())
        }

        async fn handle_shutdown(&self, consumer_tag: &str, error: &Error) -> Result<()> {
            let _ = self
                .events_tx
                .send(Event::Shutdown(consumer_tag.to_string(), error.clone()));
            if self.fail_shutdown {
                return Err(Error::Callback("shutdown failed".to_string()));
            }
            Ok(())
        }
    }

    fn envelope(delivery_tag: u64) -> Envelope {
        Envelope {
            delivery_tag,
            redelivered: false,
            exchange: "amq.direct".to_string(),
            routing_key: "q1".to_string(),
        }
    }

    async fn next_event(events_rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        time::timeout(Duration::from_secs(1), events_rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_tag_keeps_first_registration() {
        setup_logging();
        let dispatcher = ConsumerDispatcher::new(1, WorkService::new().unwrap(), 8);
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        dispatcher
            .add_consumer("c1", TestConsumer::new(first_tx))
            .unwrap();
        assert!(matches!(
            dispatcher.add_consumer("c1", TestConsumer::new(second_tx)),
            Err(Error::DuplicateElement(_))
        ));

        dispatcher.handle_delivery("c1", envelope(1), BasicProperties::default(), vec![1]);
        match next_event(&mut first_rx).await {
            Event::Delivery(tag, 1, content, _) => {
                assert_eq!("c1", tag);
                assert_eq!(vec![1], content);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notifications_in_order() {
        setup_logging();
        let dispatcher = ConsumerDispatcher::new(1, WorkService::new().unwrap(), 2);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        {
            let mut guard = dispatcher.lock();
            guard.add_consumer("c1", TestConsumer::new(events_tx)).unwrap();
            guard.handle_consume_ok("c1");
        }
        for tag in 1..=5 {
            dispatcher.handle_delivery("c1", envelope(tag), BasicProperties::default(), vec![]);
        }
        dispatcher.handle_recover_ok();

        assert_eq!(Event::ConsumeOk("c1".to_string()), next_event(&mut events_rx).await);
        for tag in 1..=5 {
            match next_event(&mut events_rx).await {
                Event::Delivery(_, delivery_tag, _, _) => assert_eq!(tag, delivery_tag),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(Event::RecoverOk("c1".to_string()), next_event(&mut events_rx).await);
        assert!(dispatcher.get_consumer("c1").is_some());
        assert!(dispatcher.get_consumer("c2").is_none());
    }

    #[tokio::test]
    async fn test_quiesced_dispatcher_drops_notifications() {
        setup_logging();
        let dispatcher = ConsumerDispatcher::new(1, WorkService::new().unwrap(), 8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        dispatcher
            .add_consumer("c1", TestConsumer::new(events_tx))
            .unwrap();

        dispatcher.quiesce();
        dispatcher.handle_consume_ok("c1");
        dispatcher.handle_delivery("c1", envelope(1), BasicProperties::default(), vec![]);
        dispatcher.handle_cancel_ok("c1");
        dispatcher.handle_recover_ok();
        // unknown tags are fine too
        dispatcher.handle_delivery("c2", envelope(2), BasicProperties::default(), vec![]);

        time::sleep(Duration::from_millis(50)).await;
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_reaches_every_consumer() {
        setup_logging();
        let dispatcher = ConsumerDispatcher::new(1, WorkService::new().unwrap(), 8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        dispatcher
            .add_consumer(
                "a",
                Arc::new(TestConsumer {
                    events_tx: events_tx.clone(),
                    fail_shutdown: true,
                }),
            )
            .unwrap();
        dispatcher
            .add_consumer("b", TestConsumer::new(events_tx))
            .unwrap();

        let reason = Error::ConnectionClosed("socket closed".to_string());
        dispatcher.handle_shutdown(&reason).await;

        let mut shutdowns = vec![
            next_event(&mut events_rx).await,
            next_event(&mut events_rx).await,
        ];
        shutdowns.sort_by_key(|event| format!("{:?}", event));
        assert_eq!(
            vec![
                Event::Shutdown("a".to_string(), reason.clone()),
                Event::Shutdown("b".to_string(), reason.clone()),
            ],
            shutdowns
        );
        assert!(dispatcher.consumer_tags().is_empty());

        // second shutdown finds nobody
        dispatcher.handle_shutdown(&reason).await;
        time::sleep(Duration::from_millis(20)).await;
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_consumer() {
        setup_logging();
        let dispatcher = ConsumerDispatcher::new(1, WorkService::new().unwrap(), 8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        dispatcher
            .add_consumer("c1", TestConsumer::new(events_tx))
            .unwrap();
        dispatcher.handle_delivery("c1", envelope(1), BasicProperties::default(), vec![]);
        dispatcher.remove_consumer("c1");
        dispatcher.remove_consumer("c1");

        // queued item is still handled
        assert!(matches!(
            next_event(&mut events_rx).await,
            Event::Delivery(_, 1, _, _)
        ));
        assert!(dispatcher.get_consumer("c1").is_none());
        // task ends and drops the consumer with its sender
        assert!(time::timeout(Duration::from_secs(1), events_rx.recv())
            .await
            .unwrap()
            .is_none());
    }
}
