use std::sync::Arc;

use amqp_serde::types::{AmqpDeliveryTag, AmqpMessageCount, FieldTable};
use tracing::info;

use super::{short_str, Channel};
use crate::{
    consumer::{Consumer, Envelope},
    error::Error,
    frame::{
        Ack, BasicProperties, Cancel, CancelOk, Consume, ConsumeOk, Get, Method, Nack, Publish,
        Qos, QosOk, Recover, RecoverAsync, RecoverOk, Reject,
    },
    rpc::{BlockingRpcContinuation, ConsumeRpcContinuation, RpcContinuation},
    Result,
};

#[derive(Debug, Clone, Default)]
pub struct BasicQosArguments {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global: bool,
}

impl BasicQosArguments {
    pub fn new(prefetch_size: u32, prefetch_count: u16, global: bool) -> Self {
        Self {
            prefetch_size,
            prefetch_count,
            global,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicConsumeArguments {
    pub queue: String,
    /// Empty to let the broker generate a tag.
    pub consumer_tag: String,
    pub no_local: bool,
    // In automatic acknowledgement mode,
    // a message is considered to be successfully delivered immediately after it is sent
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl BasicConsumeArguments {
    pub fn new(queue: &str, consumer_tag: &str) -> Self {
        Self {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
            no_local: false,
            no_ack: false,
            exclusive: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    impl_chainable_setter! {
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: FieldTable
    }
}

#[derive(Debug, Clone)]
pub struct BasicCancelArguments {
    pub consumer_tag: String,
    pub no_wait: bool,
}

impl BasicCancelArguments {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.to_string(),
            no_wait: false,
        }
    }

    impl_chainable_setter! {
        no_wait: bool
    }
}

#[derive(Debug, Clone)]
pub struct BasicGetArguments {
    pub queue: String,
    pub no_ack: bool,
}

impl BasicGetArguments {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            no_ack: false,
        }
    }

    impl_chainable_setter! {
        no_ack: bool
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicAckArguments {
    pub delivery_tag: AmqpDeliveryTag,
    pub multiple: bool,
}

impl BasicAckArguments {
    pub fn new(delivery_tag: AmqpDeliveryTag, multiple: bool) -> Self {
        Self {
            delivery_tag,
            multiple,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicNackArguments {
    pub delivery_tag: AmqpDeliveryTag,
    pub multiple: bool,
    pub requeue: bool,
}

impl BasicNackArguments {
    pub fn new(delivery_tag: AmqpDeliveryTag, multiple: bool, requeue: bool) -> Self {
        Self {
            delivery_tag,
            multiple,
            requeue,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicRejectArguments {
    pub delivery_tag: AmqpDeliveryTag,
    pub requeue: bool,
}

impl BasicRejectArguments {
    pub fn new(delivery_tag: AmqpDeliveryTag, requeue: bool) -> Self {
        Self {
            delivery_tag,
            requeue,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicPublishArguments {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

impl BasicPublishArguments {
    pub fn new(exchange: &str, routing_key: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            mandatory: false,
            immediate: false,
        }
    }

    impl_chainable_setter! {
        mandatory: bool,
        immediate: bool
    }
}

/// Message fetched with `basic.get`.
#[derive(Debug, Clone)]
pub struct GetMessage {
    pub envelope: Envelope,
    /// Messages left in the queue.
    pub message_count: AmqpMessageCount,
    pub basic_properties: BasicProperties,
    pub content: Vec<u8>,
}

/////////////////////////////////////////////////////////////////////////////
impl Channel {
    pub async fn basic_qos(&self, args: BasicQosArguments) -> Result<()> {
        let qos = Qos {
            prefetch_size: args.prefetch_size,
            prefetch_count: args.prefetch_count,
            global: args.global,
        };
        let _: QosOk = synchronous_request!(self, qos, Method::QosOk)?;
        Ok(())
    }

    /// Start a consumer and return its tag.
    ///
    /// The consumer is registered before any delivery for it is dispatched. Fails with
    /// [`Error::DuplicateElement`] if the tag is already in use on the channel.
    pub async fn basic_consume(
        &self,
        consumer: Arc<dyn Consumer>,
        args: BasicConsumeArguments,
    ) -> Result<String> {
        if !args.consumer_tag.is_empty() && self.get_consumer(&args.consumer_tag).is_some() {
            return Err(Error::DuplicateElement(format!(
                "consumer tag {} on {}",
                args.consumer_tag, self
            )));
        }
        let mut consume = Consume {
            ticket: 0,
            queue: short_str(&args.queue)?,
            consumer_tag: short_str(&args.consumer_tag)?,
            bits: 0,
            arguments: args.arguments,
        };
        consume.set_no_local(args.no_local);
        consume.set_no_ack(args.no_ack);
        consume.set_exclusive(args.exclusive);
        consume.set_no_wait(args.no_wait);

        if args.no_wait {
            if args.consumer_tag.is_empty() {
                return Err(Error::IllegalState(
                    "consumer tag is required with no-wait".to_string(),
                ));
            }
            self.ensure_open()?;
            self.dispatcher().add_consumer(&args.consumer_tag, consumer)?;
            if let Err(err) = self.transmit(consume).await {
                self.dispatcher().remove_consumer(&args.consumer_tag);
                return Err(err);
            }
            return Ok(args.consumer_tag);
        }

        let reply = Arc::new(BlockingRpcContinuation::new());
        let active: Arc<dyn RpcContinuation> = Arc::new(ConsumeRpcContinuation::new(
            reply.clone(),
            self.dispatcher().clone(),
            consumer,
        ));
        let command = self
            .exec_continuation(consume.into(), active, reply)
            .await?;
        match command.into_parts().0 {
            Method::ConsumeOk(ConsumeOk { consumer_tag }) => {
                info!("{} started consumer {}", self, consumer_tag);
                Ok(consumer_tag.to_string())
            }
            unexpected => Err(Error::UnexpectedReply(unexpected.name().to_string())),
        }
    }

    /// Cancel a consumer and return its tag.
    pub async fn basic_cancel(&self, args: BasicCancelArguments) -> Result<String> {
        let cancel = Cancel {
            consumer_tag: short_str(&args.consumer_tag)?,
            no_wait: args.no_wait,
        };
        let consumer_tag = if args.no_wait {
            self.send_method(cancel).await?;
            args.consumer_tag
        } else {
            let cancel_ok: CancelOk = synchronous_request!(self, cancel, Method::CancelOk)?;
            cancel_ok.consumer_tag.to_string()
        };

        let mut dispatcher = self.dispatcher().lock();
        dispatcher.handle_cancel_ok(&consumer_tag);
        dispatcher.remove_consumer(&consumer_tag);
        Ok(consumer_tag)
    }

    /// Fetch one message, `None` if the queue is empty.
    pub async fn basic_get(&self, args: BasicGetArguments) -> Result<Option<GetMessage>> {
        let get = Get {
            ticket: 0,
            queue: short_str(&args.queue)?,
            no_ack: args.no_ack,
        };
        let command = self.exec_rpc(get.into()).await?;
        match command.into_parts() {
            (Method::GetOk(get_ok), header, body) => Ok(Some(GetMessage {
                message_count: get_ok.message_count,
                envelope: get_ok.into(),
                basic_properties: header
                    .map(|header| header.basic_properties)
                    .unwrap_or_default(),
                content: body.unwrap_or_default(),
            })),
            (Method::GetEmpty(_), _, _) => Ok(None),
            (unexpected, _, _) => Err(Error::UnexpectedReply(unexpected.name().to_string())),
        }
    }

    /// Redeliver unacknowledged messages. Every consumer of the channel is notified on completion.
    pub async fn basic_recover(&self, requeue: bool) -> Result<()> {
        let _: RecoverOk = synchronous_request!(self, Recover { requeue }, Method::RecoverOk)?;
        self.dispatcher().handle_recover_ok();
        Ok(())
    }

    pub async fn basic_recover_async(&self, requeue: bool) -> Result<()> {
        self.send_method(RecoverAsync { requeue }).await
    }

    pub async fn basic_ack(&self, args: BasicAckArguments) -> Result<()> {
        self.send_method(Ack {
            delivery_tag: args.delivery_tag,
            multiple: args.multiple,
        })
        .await
    }

    pub async fn basic_nack(&self, args: BasicNackArguments) -> Result<()> {
        let mut nack = Nack {
            delivery_tag: args.delivery_tag,
            bits: 0,
        };
        nack.set_multiple(args.multiple);
        nack.set_requeue(args.requeue);
        self.send_method(nack).await
    }

    pub async fn basic_reject(&self, args: BasicRejectArguments) -> Result<()> {
        self.send_method(Reject {
            delivery_tag: args.delivery_tag,
            requeue: args.requeue,
        })
        .await
    }

    /// Publish a message. Unroutable mandatory messages come back to the return listeners.
    pub async fn basic_publish(
        &self,
        basic_properties: BasicProperties,
        content: Vec<u8>,
        args: BasicPublishArguments,
    ) -> Result<()> {
        let mut publish = Publish {
            ticket: 0,
            exchange: short_str(&args.exchange)?,
            routing_key: short_str(&args.routing_key)?,
            bits: 0,
        };
        publish.set_mandatory(args.mandatory);
        publish.set_immediate(args.immediate);

        self.ensure_open()?;
        self.transmit_content(publish, basic_properties, &content)
            .await
    }
}
