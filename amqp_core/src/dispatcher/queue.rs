use std::sync::Arc;

use amqp_serde::types::AmqpChannelId;
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{error, trace};

use crate::{
    consumer::{Consumer, Envelope},
    frame::BasicProperties,
    work::Task,
};

/// Notification queued for one consumer.
#[derive(Debug)]
pub(crate) enum ConsumerWorkItem {
    ConsumeOk,
    CancelOk,
    RecoverOk,
    /// Cancelled by the broker.
    Cancel,
    Delivery {
        envelope: Envelope,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    },
    /// Last item handled by the task.
    Terminate,
}

impl ConsumerWorkItem {
    fn kind(&self) -> &'static str {
        match self {
            ConsumerWorkItem::ConsumeOk => "consume-ok",
            ConsumerWorkItem::CancelOk => "cancel-ok",
            ConsumerWorkItem::RecoverOk => "recover-ok",
            ConsumerWorkItem::Cancel => "cancel",
            ConsumerWorkItem::Delivery { .. } => "delivery",
            ConsumerWorkItem::Terminate => "terminate",
        }
    }
}

/// Task draining the queue of one consumer in FIFO order.
pub(crate) struct ConsumerDispatchTask {
    channel_id: AmqpChannelId,
    consumer_tag: String,
    consumer: Arc<dyn Consumer>,
    queue_rx: mpsc::UnboundedReceiver<ConsumerWorkItem>,
    items_per_turn: usize,
}

impl ConsumerDispatchTask {
    pub fn new(
        channel_id: AmqpChannelId,
        consumer_tag: String,
        consumer: Arc<dyn Consumer>,
        queue_rx: mpsc::UnboundedReceiver<ConsumerWorkItem>,
        items_per_turn: usize,
    ) -> Self {
        Self {
            channel_id,
            consumer_tag,
            consumer,
            queue_rx,
            items_per_turn: items_per_turn.max(1),
        }
    }

    /// Returns `true` on the terminate marker.
    async fn handle_item(&self, item: ConsumerWorkItem) -> bool {
        trace!(
            "consumer {} on channel {} handles {}",
            self.consumer_tag,
            self.channel_id,
            item.kind()
        );
        let kind = item.kind();
        let tag = self.consumer_tag.as_str();
        let result = match item {
            ConsumerWorkItem::ConsumeOk => self.consumer.handle_consume_ok(tag).await,
            ConsumerWorkItem::CancelOk => self.consumer.handle_cancel_ok(tag).await,
            ConsumerWorkItem::RecoverOk => self.consumer.handle_recover_ok(tag).await,
            ConsumerWorkItem::Cancel => self.consumer.handle_cancel(tag).await,
            ConsumerWorkItem::Delivery {
                envelope,
                basic_properties,
                content,
            } => {
                self.consumer
                    .handle_delivery(tag, envelope, basic_properties, content)
                    .await
            }
            ConsumerWorkItem::Terminate => return true,
        };
        if let Err(err) = result {
            error!(
                "consumer {} on channel {} failed to handle {}: {}",
                tag, self.channel_id, kind, err
            );
        }
        false
    }
}

#[async_trait]
impl Task for ConsumerDispatchTask {
    async fn run(&mut self) -> bool {
        // sender side dropped without terminate marker: dispatcher is gone
        let Some(first) = self.queue_rx.recv().await else {
            return true;
        };
        if self.handle_item(first).await {
            return true;
        }
        for _ in 1..self.items_per_turn {
            match self.queue_rx.try_recv() {
                Ok(item) => {
                    if self.handle_item(item).await {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }
}
