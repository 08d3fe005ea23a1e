use std::fmt;

use amqp_serde::types::{
    AmqpClassId, AmqpMethodId, AmqpReplyCode, AmqpReplyText, Boolean, LongStr, ShortStr,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct OpenChannel {
    out_of_band: ShortStr,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct OpenChannelOk {
    channel_id: LongStr,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Flow {
    pub active: Boolean,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct FlowOk {
    pub active: Boolean,
}

/// AMQP method [channel.close](https://www.rabbitmq.com/amqp-0-9-1-reference.html#channel.close).
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CloseChannel {
    pub reply_code: AmqpReplyCode,
    pub reply_text: AmqpReplyText,
    pub class_id: AmqpClassId,
    pub method_id: AmqpMethodId,
}

impl CloseChannel {
    pub fn new(
        reply_code: AmqpReplyCode,
        reply_text: AmqpReplyText,
        class_id: AmqpClassId,
        method_id: AmqpMethodId,
    ) -> Self {
        Self {
            reply_code,
            reply_text,
            class_id,
            method_id,
        }
    }
}

impl fmt::Display for CloseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}: {}', (class_id = {}, method_id = {})",
            self.reply_code, self.reply_text, self.class_id, self.method_id
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CloseChannelOk;
