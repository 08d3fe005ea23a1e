//! Error type can be returned by the APIs.

use std::fmt;

use amqp_serde::types::{AmqpClassId, AmqpMethodId, AmqpReplyCode};

use crate::{frame, transport::TransportStatus};

/// A list of errors can be returned by the APIs.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A frame arrived that does not fit the command being assembled.
    UnexpectedFrame(String),
    /// The reply of a synchronous method is not the expected `-ok` method.
    /// Carries the name of the method actually received.
    UnexpectedReply(String),
    /// A reply arrived while no synchronous method is outstanding.
    NoOutstandingRpc(String),
    /// Invariant violation, usually due to incorrect usage.
    IllegalState(String),
    DuplicateElement(String),
    NoSuchElement(String),
    /// Channel is closed, or being closed, by the client.
    ChannelClosed(String),
    /// Channel is closed by server with `channel.close`.
    ChannelClosedByServer {
        reply_code: AmqpReplyCode,
        reply_text: String,
        class_id: AmqpClassId,
        method_id: AmqpMethodId,
    },
    /// Parent connection is closed or failed.
    ConnectionClosed(String),
    /// Non-OK status reported by the transport.
    Transport(TransportStatus),
    /// Error in encoding or decoding frames.
    Codec(String),
    /// No reply to a synchronous method within the configured timeout.
    RpcTimeout(String),
    /// Error returned by a user callback.
    Callback(String),
}

impl Error {
    /// True if the error reports that the channel, or its connection, is gone.
    pub fn is_channel_closed(&self) -> bool {
        matches!(
            self,
            Error::ChannelClosed(_)
                | Error::ChannelClosedByServer { .. }
                | Error::ConnectionClosed(_)
        )
    }
}

impl From<frame::Error> for Error {
    fn from(err: frame::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<TransportStatus> for Error {
    fn from(status: TransportStatus) -> Self {
        Self::Transport(status)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnexpectedFrame(msg) => write!(f, "AMQP unexpected frame: {}", msg),
            Error::UnexpectedReply(msg) => write!(f, "AMQP unexpected reply method: {}", msg),
            Error::NoOutstandingRpc(msg) => {
                write!(f, "AMQP reply without outstanding request: {}", msg)
            }
            Error::IllegalState(msg) => write!(f, "illegal state: {}", msg),
            Error::DuplicateElement(msg) => write!(f, "duplicate element: {}", msg),
            Error::NoSuchElement(msg) => write!(f, "no such element: {}", msg),
            Error::ChannelClosed(msg) => write!(f, "AMQP channel closed: {}", msg),
            Error::ChannelClosedByServer {
                reply_code,
                reply_text,
                class_id,
                method_id,
            } => write!(
                f,
                "AMQP channel closed by server: '{}: {}', (class_id = {}, method_id = {})",
                reply_code, reply_text, class_id, method_id
            ),
            Error::ConnectionClosed(msg) => write!(f, "AMQP connection closed: {}", msg),
            Error::Transport(status) => write!(f, "AMQP transport error: {}", status),
            Error::Codec(msg) => write!(f, "AMQP codec error: {}", msg),
            Error::RpcTimeout(msg) => write!(f, "AMQP request timed out: {}", msg),
            Error::Callback(msg) => write!(f, "callback error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
