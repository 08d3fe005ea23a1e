use amqp_serde::types::{AmqpMessageCount, FieldTable};

use super::{short_str, Channel};
use crate::{
    error::Error,
    frame::{
        BindQueue, BindQueueOk, DeclareQueue, DeclareQueueOk, DeleteQueue, DeleteQueueOk, Method,
        PurgeQueue, PurgeQueueOk, UnbindQueue, UnbindQueueOk,
    },
    Result,
};

#[derive(Debug, Clone)]
pub struct QueueDeclareArguments {
    /// Empty to let the broker generate a name.
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl QueueDeclareArguments {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    impl_chainable_setter! {
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable
    }
}

#[derive(Debug, Clone)]
pub struct QueueBindArguments {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl QueueBindArguments {
    pub fn new(queue: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    impl_chainable_setter! {
        no_wait: bool,
        arguments: FieldTable
    }
}

#[derive(Debug, Clone)]
pub struct QueueUnbindArguments {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

impl QueueUnbindArguments {
    pub fn new(queue: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            arguments: FieldTable::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePurgeArguments {
    pub queue: String,
    pub no_wait: bool,
}

impl QueuePurgeArguments {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            no_wait: false,
        }
    }

    impl_chainable_setter! {
        no_wait: bool
    }
}

#[derive(Debug, Clone)]
pub struct QueueDeleteArguments {
    pub queue: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

impl QueueDeleteArguments {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            if_unused: false,
            if_empty: false,
            no_wait: false,
        }
    }

    impl_chainable_setter! {
        if_unused: bool,
        if_empty: bool,
        no_wait: bool
    }
}

/////////////////////////////////////////////////////////////////////////////
/// API for Queue methods
impl Channel {
    /// Declare a queue.
    ///
    /// Returns `(queue name, message count, consumer count)`, or `None` with `no_wait`.
    pub async fn queue_declare(
        &self,
        args: QueueDeclareArguments,
    ) -> Result<Option<(String, AmqpMessageCount, u32)>> {
        let mut declare = DeclareQueue {
            ticket: 0,
            queue: short_str(&args.queue)?,
            bits: 0,
            arguments: args.arguments,
        };
        declare.set_passive(args.passive);
        declare.set_durable(args.durable);
        declare.set_exclusive(args.exclusive);
        declare.set_auto_delete(args.auto_delete);
        declare.set_no_wait(args.no_wait);

        if args.no_wait {
            self.send_method(declare).await?;
            return Ok(None);
        }
        let declare_ok: DeclareQueueOk =
            synchronous_request!(self, declare, Method::DeclareQueueOk)?;
        Ok(Some((
            declare_ok.queue.to_string(),
            declare_ok.message_count,
            declare_ok.consumer_count,
        )))
    }

    /// Check that a queue exists without modifying it.
    pub async fn queue_declare_passive(
        &self,
        queue: &str,
    ) -> Result<(String, AmqpMessageCount, u32)> {
        let mut args = QueueDeclareArguments::new(queue);
        args.passive(true);
        self.queue_declare(args.finish()).await?.ok_or_else(|| {
            Error::IllegalState("passive queue.declare returned no reply".to_string())
        })
    }

    pub async fn queue_bind(&self, args: QueueBindArguments) -> Result<()> {
        let bind = BindQueue {
            ticket: 0,
            queue: short_str(&args.queue)?,
            exchange: short_str(&args.exchange)?,
            routing_key: short_str(&args.routing_key)?,
            no_wait: args.no_wait,
            arguments: args.arguments,
        };
        if args.no_wait {
            return self.send_method(bind).await;
        }
        let _: BindQueueOk = synchronous_request!(self, bind, Method::BindQueueOk)?;
        Ok(())
    }

    /// Purge a queue. Returns the number of purged messages, or `None` with `no_wait`.
    pub async fn queue_purge(&self, args: QueuePurgeArguments) -> Result<Option<AmqpMessageCount>> {
        let purge = PurgeQueue {
            ticket: 0,
            queue: short_str(&args.queue)?,
            no_wait: args.no_wait,
        };
        if args.no_wait {
            self.send_method(purge).await?;
            return Ok(None);
        }
        let purge_ok: PurgeQueueOk = synchronous_request!(self, purge, Method::PurgeQueueOk)?;
        Ok(Some(purge_ok.message_count))
    }

    /// Delete a queue. Returns the number of deleted messages, or `None` with `no_wait`.
    pub async fn queue_delete(
        &self,
        args: QueueDeleteArguments,
    ) -> Result<Option<AmqpMessageCount>> {
        let mut delete = DeleteQueue {
            ticket: 0,
            queue: short_str(&args.queue)?,
            bits: 0,
        };
        delete.set_if_unused(args.if_unused);
        delete.set_if_empty(args.if_empty);
        delete.set_no_wait(args.no_wait);

        if args.no_wait {
            self.send_method(delete).await?;
            return Ok(None);
        }
        let delete_ok: DeleteQueueOk = synchronous_request!(self, delete, Method::DeleteQueueOk)?;
        Ok(Some(delete_ok.message_count))
    }

    pub async fn queue_unbind(&self, args: QueueUnbindArguments) -> Result<()> {
        let unbind = UnbindQueue {
            ticket: 0,
            queue: short_str(&args.queue)?,
            exchange: short_str(&args.exchange)?,
            routing_key: short_str(&args.routing_key)?,
            arguments: args.arguments,
        };
        let _: UnbindQueueOk = synchronous_request!(self, unbind, Method::UnbindQueueOk)?;
        Ok(())
    }
}
