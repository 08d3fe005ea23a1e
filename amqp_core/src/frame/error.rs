use std::fmt;

use amqp_serde::types::ShortUint;

#[derive(Debug)]
pub enum Error {
    Corrupted,
    UnknownMethod(ShortUint, ShortUint),
    SerdeError(String),
}

impl From<amqp_serde::Error> for Error {
    fn from(err: amqp_serde::Error) -> Self {
        Self::SerdeError(err.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Corrupted => f.write_str("corrupted frame"),
            Error::UnknownMethod(class_id, method_id) => {
                write!(f, "unknown method, class id {}, method id {}", class_id, method_id)
            }
            Error::SerdeError(msg) => write!(f, "serde error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
