use std::fmt;

use amqp_serde::{
    from_bytes, to_bytes,
    types::{FieldTable, LongLongUint, Octect, ShortStr, ShortUint, TimeStamp},
};
use serde::{de::Visitor, Deserialize, Serialize};

use super::{Error, BASIC_CLASS_ID};

/// Size of class id + weight + body size, the part common to every content header.
const CONTENT_HEADER_COMMON_SIZE: usize = 12;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentHeader {
    pub common: ContentHeaderCommon,
    pub basic_properties: BasicProperties,
}

impl ContentHeader {
    pub fn new(body_size: LongLongUint, basic_properties: BasicProperties) -> Self {
        Self {
            common: ContentHeaderCommon {
                class: BASIC_CLASS_ID,
                weight: 0,
                body_size,
            },
            basic_properties,
        }
    }

    pub fn body_size(&self) -> LongLongUint {
        self.common.body_size
    }

    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        let common: ContentHeaderCommon =
            from_bytes(payload.get(0..CONTENT_HEADER_COMMON_SIZE).ok_or(Error::Corrupted)?)?;
        let basic_properties: BasicProperties = from_bytes(
            payload
                .get(CONTENT_HEADER_COMMON_SIZE..)
                .ok_or(Error::Corrupted)?,
        )?;
        Ok(Self {
            common,
            basic_properties,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(to_bytes(self)?)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentHeaderCommon {
    pub class: ShortUint,
    pub weight: ShortUint,
    pub body_size: LongLongUint,
}

mod property_flag {
    // first octet
    pub const CONTENT_TYPE: (usize, u8) = (0, 1 << 7);
    pub const CONTENT_ENCODING: (usize, u8) = (0, 1 << 6);
    pub const HEADERS: (usize, u8) = (0, 1 << 5);
    pub const DELIVERY_MODE: (usize, u8) = (0, 1 << 4);
    pub const PRIORITY: (usize, u8) = (0, 1 << 3);
    pub const CORRELATION_ID: (usize, u8) = (0, 1 << 2);
    pub const REPLY_TO: (usize, u8) = (0, 1 << 1);
    pub const EXPIRATION: (usize, u8) = (0, 1);
    // second octet
    pub const MESSAGE_ID: (usize, u8) = (1, 1 << 7);
    pub const TIMESTAMP: (usize, u8) = (1, 1 << 6);
    pub const TYPE: (usize, u8) = (1, 1 << 5);
    pub const USER_ID: (usize, u8) = (1, 1 << 4);
    pub const APP_ID: (usize, u8) = (1, 1 << 3);
    pub const CLUSTER_ID: (usize, u8) = (1, 1 << 2);
}

/// Properties of a message, carried by the content header.
///
/// Property flags are kept in step with the optional fields so that only
/// present properties go on the wire.
#[derive(Debug, Serialize, Default, Clone, PartialEq)]
pub struct BasicProperties {
    property_flags: [Octect; 2],

    content_type: Option<ShortStr>,
    content_encoding: Option<ShortStr>,
    headers: Option<FieldTable>,
    delivery_mode: Option<Octect>,
    priority: Option<Octect>,
    correlation_id: Option<ShortStr>,
    reply_to: Option<ShortStr>,
    expiration: Option<ShortStr>,
    message_id: Option<ShortStr>,
    timestamp: Option<TimeStamp>,
    typ: Option<ShortStr>,
    user_id: Option<ShortStr>,
    app_id: Option<ShortStr>,
    cluster_id: Option<ShortStr>,
}

macro_rules! short_str_property {
    ($getter:ident, $setter:ident, $flag:expr) => {
        pub fn $getter(&self) -> Option<&String> {
            self.$getter.as_ref().map(|value| value.as_ref())
        }

        /// Values longer than 255 bytes do not fit a short string and are ignored.
        pub fn $setter(&mut self, value: &str) -> &mut Self {
            if let Ok(value) = ShortStr::try_from(value) {
                self.set_flag($flag);
                self.$getter = Some(value);
            }
            self
        }
    };
}

impl BasicProperties {
    fn set_flag(&mut self, (octet, mask): (usize, u8)) {
        self.property_flags[octet] |= mask;
    }

    short_str_property!(content_type, with_content_type, property_flag::CONTENT_TYPE);
    short_str_property!(
        content_encoding,
        with_content_encoding,
        property_flag::CONTENT_ENCODING
    );
    short_str_property!(correlation_id, with_correlation_id, property_flag::CORRELATION_ID);
    short_str_property!(reply_to, with_reply_to, property_flag::REPLY_TO);
    short_str_property!(expiration, with_expiration, property_flag::EXPIRATION);
    short_str_property!(message_id, with_message_id, property_flag::MESSAGE_ID);
    short_str_property!(typ, with_type, property_flag::TYPE);
    short_str_property!(user_id, with_user_id, property_flag::USER_ID);
    short_str_property!(app_id, with_app_id, property_flag::APP_ID);
    short_str_property!(cluster_id, with_cluster_id, property_flag::CLUSTER_ID);

    pub fn headers(&self) -> Option<&FieldTable> {
        self.headers.as_ref()
    }

    pub fn with_headers(&mut self, headers: FieldTable) -> &mut Self {
        self.set_flag(property_flag::HEADERS);
        self.headers = Some(headers);
        self
    }

    pub fn delivery_mode(&self) -> Option<u8> {
        self.delivery_mode
    }

    pub fn with_delivery_mode(&mut self, delivery_mode: u8) -> &mut Self {
        self.set_flag(property_flag::DELIVERY_MODE);
        self.delivery_mode = Some(delivery_mode);
        self
    }

    pub fn priority(&self) -> Option<u8> {
        self.priority
    }

    pub fn with_priority(&mut self, priority: u8) -> &mut Self {
        self.set_flag(property_flag::PRIORITY);
        self.priority = Some(priority);
        self
    }

    pub fn timestamp(&self) -> Option<TimeStamp> {
        self.timestamp
    }

    pub fn with_timestamp(&mut self, timestamp: TimeStamp) -> &mut Self {
        self.set_flag(property_flag::TIMESTAMP);
        self.timestamp = Some(timestamp);
        self
    }

    pub fn finish(&mut self) -> Self {
        self.clone()
    }
}

impl fmt::Display for BasicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl<'de> Deserialize<'de> for BasicProperties {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        const FIELDS: &[&str] = &[
            "property_flags",
            "content_type",
            "content_encoding",
            "headers",
            "delivery_mode",
            "priority",
            "correlation_id",
            "reply_to",
            "expiration",
            "message_id",
            "timestamp",
            "typ",
            "user_id",
            "app_id",
            "cluster_id",
        ];

        struct BasicPropertiesVisitor;

        impl<'de> Visitor<'de> for BasicPropertiesVisitor {
            type Value = BasicProperties;
            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("struct BasicProperties")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let flags: [Octect; 2] = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let mut properties = BasicProperties {
                    property_flags: flags,
                    ..Default::default()
                };
                let mut index = 1;

                // properties present on the wire are in flag order
                macro_rules! read_if_flagged {
                    ($field:ident, $flag:expr) => {
                        let (octet, mask) = $flag;
                        if flags[octet] & mask != 0 {
                            properties.$field = Some(
                                seq.next_element()?
                                    .ok_or_else(|| serde::de::Error::invalid_length(index, &self))?,
                            );
                            index += 1;
                        }
                    };
                }

                read_if_flagged!(content_type, property_flag::CONTENT_TYPE);
                read_if_flagged!(content_encoding, property_flag::CONTENT_ENCODING);
                read_if_flagged!(headers, property_flag::HEADERS);
                read_if_flagged!(delivery_mode, property_flag::DELIVERY_MODE);
                read_if_flagged!(priority, property_flag::PRIORITY);
                read_if_flagged!(correlation_id, property_flag::CORRELATION_ID);
                read_if_flagged!(reply_to, property_flag::REPLY_TO);
                read_if_flagged!(expiration, property_flag::EXPIRATION);
                read_if_flagged!(message_id, property_flag::MESSAGE_ID);
                read_if_flagged!(timestamp, property_flag::TIMESTAMP);
                read_if_flagged!(typ, property_flag::TYPE);
                read_if_flagged!(user_id, property_flag::USER_ID);
                read_if_flagged!(app_id, property_flag::APP_ID);
                read_if_flagged!(cluster_id, property_flag::CLUSTER_ID);
                let _ = index;

                Ok(properties)
            }
        }
        deserializer.deserialize_struct("BasicProperties", FIELDS, BasicPropertiesVisitor)
    }
}
