use std::fmt;

use amqp_serde::types::{
    AmqpDeliveryTag, AmqpExchangeName, AmqpMessageCount, AmqpQueueName, AmqpReplyCode,
    AmqpReplyText, Boolean, FieldTable, LongUint, Octect, ShortStr, ShortUint,
};
use serde::{Deserialize, Serialize};

use super::{is_set, set_bit};

mod bit_flag {
    pub mod consume {
        use amqp_serde::types::Octect;
        pub const NO_LOCAL: Octect = 0b0000_0001;
        pub const NO_ACK: Octect = 0b0000_0010;
        pub const EXCLUSIVE: Octect = 0b0000_0100;
        pub const NO_WAIT: Octect = 0b0000_1000;
    }
    pub mod publish {
        use amqp_serde::types::Octect;
        pub const MANDATORY: Octect = 0b0000_0001;
        pub const IMMEDIATE: Octect = 0b0000_0010;
    }
    pub mod nack {
        use amqp_serde::types::Octect;
        pub const MULTIPLE: Octect = 0b0000_0001;
        pub const REQUEUE: Octect = 0b0000_0010;
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Qos {
    pub prefetch_size: LongUint,
    pub prefetch_count: ShortUint,
    pub global: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct QosOk;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Consume {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub consumer_tag: ShortStr,
    pub bits: Octect,
    pub arguments: FieldTable,
}

impl Consume {
    pub fn set_no_local(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::consume::NO_LOCAL, value);
    }
    pub fn set_no_ack(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::consume::NO_ACK, value);
    }
    pub fn set_exclusive(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::consume::EXCLUSIVE, value);
    }
    pub fn set_no_wait(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::consume::NO_WAIT, value);
    }
    pub fn no_ack(&self) -> bool {
        is_set(self.bits, bit_flag::consume::NO_ACK)
    }
    pub fn exclusive(&self) -> bool {
        is_set(self.bits, bit_flag::consume::EXCLUSIVE)
    }
    pub fn no_wait(&self) -> bool {
        is_set(self.bits, bit_flag::consume::NO_WAIT)
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ConsumeOk {
    pub consumer_tag: ShortStr,
}

/// AMQP method [basic.cancel](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.cancel).
///
/// Sent by client to stop a consumer, and by RabbitMQ when the queue of a consumer goes away.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Cancel {
    pub consumer_tag: ShortStr,
    pub no_wait: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CancelOk {
    pub consumer_tag: ShortStr,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Publish {
    pub ticket: ShortUint,
    pub exchange: AmqpExchangeName,
    pub routing_key: ShortStr,
    pub bits: Octect,
}

impl Publish {
    pub fn set_mandatory(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::publish::MANDATORY, value);
    }
    pub fn set_immediate(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::publish::IMMEDIATE, value);
    }
    pub fn mandatory(&self) -> bool {
        is_set(self.bits, bit_flag::publish::MANDATORY)
    }
}

/// AMQP method [basic.return](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.return).
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Return {
    pub reply_code: AmqpReplyCode,
    pub reply_text: AmqpReplyText,
    pub exchange: AmqpExchangeName,
    pub routing_key: ShortStr,
}

impl fmt::Display for Return {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}: {}', (exchange = {}, routing_key = {})",
            self.reply_code, self.reply_text, self.exchange, self.routing_key
        )
    }
}

/// AMQP method [basic.deliver](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.deliver).
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Deliver {
    pub consumer_tag: ShortStr,
    pub delivery_tag: AmqpDeliveryTag,
    pub redelivered: Boolean,
    pub exchange: AmqpExchangeName,
    pub routing_key: ShortStr,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Get {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub no_ack: Boolean,
}

/// AMQP method [basic.get-ok](https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.get-ok).
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct GetOk {
    pub delivery_tag: AmqpDeliveryTag,
    pub redelivered: Boolean,
    pub exchange: AmqpExchangeName,
    pub routing_key: ShortStr,
    pub message_count: AmqpMessageCount,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GetEmpty {
    pub cluster_id: ShortStr,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Ack {
    pub delivery_tag: AmqpDeliveryTag,
    pub multiple: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Reject {
    pub delivery_tag: AmqpDeliveryTag,
    pub requeue: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RecoverAsync {
    pub requeue: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Recover {
    pub requeue: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RecoverOk;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Nack {
    pub delivery_tag: AmqpDeliveryTag,
    pub bits: Octect,
}

impl Nack {
    pub fn set_multiple(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::nack::MULTIPLE, value);
    }
    pub fn set_requeue(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::nack::REQUEUE, value);
    }
    pub fn multiple(&self) -> bool {
        is_set(self.bits, bit_flag::nack::MULTIPLE)
    }
    pub fn requeue(&self) -> bool {
        is_set(self.bits, bit_flag::nack::REQUEUE)
    }
}
