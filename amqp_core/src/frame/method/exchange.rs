use amqp_serde::types::{AmqpExchangeName, Boolean, FieldTable, Octect, ShortStr, ShortUint};
use serde::{Deserialize, Serialize};

use super::{is_set, set_bit};

mod bit_flag {
    pub mod declare {
        use amqp_serde::types::Octect;
        pub const PASSIVE: Octect = 0b0000_0001;
        pub const DURABLE: Octect = 0b0000_0010;
        pub const AUTO_DELETE: Octect = 0b0000_0100;
        pub const INTERNAL: Octect = 0b0000_1000;
        pub const NO_WAIT: Octect = 0b0001_0000;
    }
    pub mod delete {
        use amqp_serde::types::Octect;
        pub const IF_UNUSED: Octect = 0b0000_0001;
        pub const NO_WAIT: Octect = 0b0000_0010;
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Declare {
    pub ticket: ShortUint,
    pub exchange: AmqpExchangeName,
    pub typ: ShortStr,
    pub bits: Octect,
    pub arguments: FieldTable,
}

impl Declare {
    pub fn set_passive(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::PASSIVE, value);
    }
    pub fn set_durable(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::DURABLE, value);
    }
    pub fn set_auto_delete(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::AUTO_DELETE, value);
    }
    pub fn set_internal(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::declare::INTERNAL, value);
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
    pub fn no_wait(&self) -> bool {
        is_set(self.bits, bit_flag::declare::NO_WAIT)
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeclareOk;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Delete {
    pub ticket: ShortUint,
    pub exchange: AmqpExchangeName,
    pub bits: Octect,
}

impl Delete {
    pub fn set_if_unused(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::delete::IF_UNUSED, value);
    }
    pub fn set_no_wait(&mut self, value: bool) {
        set_bit(&mut self.bits, bit_flag::delete::NO_WAIT, value);
    }
    pub fn if_unused(&self) -> bool {
        is_set(self.bits, bit_flag::delete::IF_UNUSED)
    }
    pub fn no_wait(&self) -> bool {
        is_set(self.bits, bit_flag::delete::NO_WAIT)
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeleteOk;

/// Exchange to exchange binding, RabbitMQ extension.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Bind {
    pub ticket: ShortUint,
    pub destination: AmqpExchangeName,
    pub source: AmqpExchangeName,
    pub routing_key: ShortStr,
    pub no_wait: Boolean,
    pub arguments: FieldTable,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct BindOk;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Unbind {
    pub ticket: ShortUint,
    pub destination: AmqpExchangeName,
    pub source: AmqpExchangeName,
    pub routing_key: ShortStr,
    pub no_wait: Boolean,
    pub arguments: FieldTable,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct UnbindOk;
