//! Codec for the frames and methods a channel exchanges with the broker.
//!
//! The transport layer hands over raw [`Frame`]s, one per AMQP frame received on a channel.
//! Method frames are decoded into the closed [`Method`] sum type, so the rest of the crate
//! pattern matches on the variant instead of probing the decoded object at runtime.
use amqp_serde::{
    from_bytes, to_bytes,
    types::{Octect, ShortUint},
};
use serde::{Deserialize, Serialize};
use std::fmt;

////////////////////////////////////////////////////////////////////////
// macros should appear before module declaration
#[macro_use]
mod helpers {
    macro_rules! impl_method {
    ($($class_id:literal => $($method_id:literal : $method:ident = $name:literal),+);+) => {
        /// Every method a channel can send or receive, decoded.
        #[derive(Debug)]
        pub enum Method {
            $($($method($method),)+)+
        }

        impl Method {
            /// Decode a method frame payload: class id, method id, then the arguments.
            pub fn decode(payload: &[u8]) -> Result<Self, Error> {
                let header: MethodHeader = from_bytes(payload.get(0..4).ok_or(Error::Corrupted)?)?;
                let arguments = payload.get(4..).ok_or(Error::Corrupted)?;
                match (header.class_id, header.method_id) {
                    $($(($class_id, $method_id) => Ok(Method::$method(from_bytes::<$method>(arguments)?)),)+)+
                    (class_id, method_id) => Err(Error::UnknownMethod(class_id, method_id)),
                }
            }

            /// Encode into a method frame payload.
            pub fn encode(&self) -> Result<Vec<u8>, Error> {
                let mut buf = to_bytes(&self.header())?;
                match self {
                    $($(Method::$method(m) => buf.extend(to_bytes(m)?),)+)+
                }
                Ok(buf)
            }

            pub fn header(&self) -> MethodHeader {
                match self {
                    $($(Method::$method(_) => MethodHeader::new($class_id, $method_id),)+)+
                }
            }

            pub fn class_id(&self) -> ShortUint {
                self.header().class_id
            }

            pub fn method_id(&self) -> ShortUint {
                self.header().method_id
            }

            /// Protocol name of the method, e.g. `queue.declare-ok`.
            pub fn name(&self) -> &'static str {
                match self {
                    $($(Method::$method(_) => $name,)+)+
                }
            }
        }

        $($(
        impl From<$method> for Method {
            fn from(method: $method) -> Self {
                Method::$method(method)
            }
        }
        )+)+
    };
}
}
///////////////////////////////////////////////////////////
mod content_header;
mod error;
mod method;

pub use content_header::*;
pub use error::*;
pub use method::*;

pub const FRAME_METHOD: Octect = 1;
pub const FRAME_CONTENT_HEADER: Octect = 2;
pub const FRAME_CONTENT_BODY: Octect = 3;
pub const FRAME_HEARTBEAT: Octect = 8;

/// Frame header (7 octets) + frame end (1 octet).
pub const FRAME_OVERHEAD: usize = 8;

pub const BASIC_CLASS_ID: ShortUint = 60;

/////////////////////////////////////////////////////////////////
impl_method! {
    // == Channel ==
    20 =>   10: OpenChannel = "channel.open",
            11: OpenChannelOk = "channel.open-ok",
            20: Flow = "channel.flow",
            21: FlowOk = "channel.flow-ok",
            40: CloseChannel = "channel.close",
            41: CloseChannelOk = "channel.close-ok";
    // == Exchange ==
    40 =>   10: Declare = "exchange.declare",
            11: DeclareOk = "exchange.declare-ok",
            20: Delete = "exchange.delete",
            21: DeleteOk = "exchange.delete-ok",
            30: Bind = "exchange.bind",
            31: BindOk = "exchange.bind-ok",
            40: Unbind = "exchange.unbind",
            51: UnbindOk = "exchange.unbind-ok";
    // == Queue ==
    50 =>   10: DeclareQueue = "queue.declare",
            11: DeclareQueueOk = "queue.declare-ok",
            20: BindQueue = "queue.bind",
            21: BindQueueOk = "queue.bind-ok",
            30: PurgeQueue = "queue.purge",
            31: PurgeQueueOk = "queue.purge-ok",
            40: DeleteQueue = "queue.delete",
            41: DeleteQueueOk = "queue.delete-ok",
            50: UnbindQueue = "queue.unbind",
            51: UnbindQueueOk = "queue.unbind-ok";
    // == Basic ==
    60 =>   10: Qos = "basic.qos",
            11: QosOk = "basic.qos-ok",
            20: Consume = "basic.consume",
            21: ConsumeOk = "basic.consume-ok",
            30: Cancel = "basic.cancel",
            31: CancelOk = "basic.cancel-ok",
            40: Publish = "basic.publish",
            50: Return = "basic.return",
            60: Deliver = "basic.deliver",
            70: Get = "basic.get",
            71: GetOk = "basic.get-ok",
            72: GetEmpty = "basic.get-empty",
            80: Ack = "basic.ack",
            90: Reject = "basic.reject",
            100: RecoverAsync = "basic.recover-async",
            110: Recover = "basic.recover",
            111: RecoverOk = "basic.recover-ok",
            120: Nack = "basic.nack"
}

impl Method {
    /// Whether the method is followed by a content header and body frames.
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            Method::Publish(_) | Method::Return(_) | Method::Deliver(_) | Method::GetOk(_)
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//////////////////////////////////////////////////////////////////////
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct MethodHeader {
    class_id: ShortUint,
    method_id: ShortUint,
}

impl MethodHeader {
    pub const fn new(class_id: ShortUint, method_id: ShortUint) -> Self {
        Self {
            class_id,
            method_id,
        }
    }

    pub fn class_id(&self) -> ShortUint {
        self.class_id
    }

    pub fn method_id(&self) -> ShortUint {
        self.method_id
    }
}

//////////////////////////////////////////////////////////////////////
/// A raw frame on one channel, as handed over by the transport.
///
/// Only the payload is kept; the frame header and frame-end octet are the transport's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Method(Vec<u8>),
    ContentHeader(Vec<u8>),
    ContentBody(Vec<u8>),
    Heartbeat,
}

impl Frame {
    pub fn frame_type(&self) -> Octect {
        match self {
            Frame::Method(_) => FRAME_METHOD,
            Frame::ContentHeader(_) => FRAME_CONTENT_HEADER,
            Frame::ContentBody(_) => FRAME_CONTENT_BODY,
            Frame::Heartbeat => FRAME_HEARTBEAT,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Method(_) => "method",
            Frame::ContentHeader(_) => "content-header",
            Frame::ContentBody(_) => "content-body",
            Frame::Heartbeat => "heartbeat",
        }
    }

    pub fn from_method(method: &Method) -> Result<Self, Error> {
        Ok(Frame::Method(method.encode()?))
    }

    pub fn from_content_header(header: &ContentHeader) -> Result<Self, Error> {
        Ok(Frame::ContentHeader(header.encode()?))
    }

    /// Split content into body frames no larger than `frame_max`, frame overhead included.
    pub fn content_bodies(content: &[u8], frame_max: usize) -> Vec<Frame> {
        let chunk_size = frame_max.saturating_sub(FRAME_OVERHEAD).max(1);
        content
            .chunks(chunk_size)
            .map(|chunk| Frame::ContentBody(chunk.to_vec()))
            .collect()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Method(payload) => match Method::decode(payload) {
                Ok(method) => write!(f, "method frame {}", method),
                Err(_) => write!(f, "method frame ({} bytes)", payload.len()),
            },
            Frame::ContentHeader(payload) | Frame::ContentBody(payload) => {
                write!(f, "{} frame ({} bytes)", self.kind(), payload.len())
            }
            Frame::Heartbeat => f.write_str("heartbeat frame"),
        }
    }
}
