use amqp_serde::types::{
    AmqpExchangeName, AmqpMessageCount, AmqpQueueName, Boolean, FieldTable, LongUint, Octect,
    ShortStr, ShortUint,
};
use serde::{Deserialize, Serialize};

use super::{is_set, set_bit};

mod bit_flag {
    pub mod declare {
        use amqp_serde::types::Octect;
        pub const PASSIVE: Octect = 0b0000_0001;
        pub const DURABLE: Octect = 0b0000_0010;
        pub const EXCLUSIVE: Octect = 0b0000_0100;
        pub const AUTO_DELETE: Octect = 0b0000_1000;
        pub const NO_WAIT: Octect = 0b0001_0000;
    }
    pub mod delete {
        use amqp_serde::types::Octect;
        pub const IF_UNUSED: Octect = 0b0000_0001;
        pub const IF_EMPTY: Octect = 0b0000_0010;
        pub const NO_WAIT: Octect = 0b0000_0100;
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeclareQueue {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub bits: Octect,
    pub arguments: FieldTable,
}

impl DeclareQueue {
    pub fn set_passive(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::PASSIVE, value);
    }
    pub fn set_durable(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::DURABLE, value);
    }
    pub fn set_exclusive(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::EXCLUSIVE, value);
    }
    pub fn set_auto_delete(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::AUTO_DELETE, value);
    }
    pub fn set_no_wait(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::NO_WAIT, value);
    }
    pub fn passive(&self) -> bool {
        is_set(self.bits, bit_flag::declare::PASSIVE)
    }
    pub fn durable(&self) -> bool {
        is_set(self.bits, bit_flag::declare::DURABLE)
    }
    pub fn exclusive(&self) -> bool {
        is_set(self.bits, bit_flag::declare::EXCLUSIVE)
    }
    pub fn auto_delete(&self) -> bool {
        is_set(self.bits, bit_flag::declare::AUTO_DELETE)
    }
    pub fn no_wait(&self) -> bool {
        is_set(self.bits, bit_flag::declare::NO_WAIT)
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeclareQueueOk {
    pub queue: AmqpQueueName,
    pub message_count: AmqpMessageCount,
    pub consumer_count: LongUint,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct BindQueue {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub exchange: AmqpExchangeName,
    pub routing_key: ShortStr,
    pub no_wait: Boolean,
    pub arguments: FieldTable,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct BindQueueOk;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct PurgeQueue {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub no_wait: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct PurgeQueueOk {
    pub message_count: AmqpMessageCount,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeleteQueue {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub bits: Octect,
}

impl DeleteQueue {
    pub fn set_if_unused(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::delete::IF_UNUSED, value);
    }
    pub fn set_if_empty(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::delete::IF_EMPTY, value);
    }
    pub fn set_no_wait(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::delete::NO_WAIT, value);
    }
    pub fn no_wait(&self) -> bool {
        is_set(self.bits, bit_flag::delete::NO_WAIT)
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeleteQueueOk {
    pub message_count: AmqpMessageCount,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct UnbindQueue {
    pub ticket: ShortUint,
    pub queue: AmqpQueueName,
    pub exchange: AmqpExchangeName,
    pub routing_key: ShortStr,
    pub arguments: FieldTable,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct UnbindQueueOk;
