//! Assembly of inbound frames into commands.
use std::fmt;

use crate::{
    error::Error,
    frame::{ContentHeader, Frame, Method},
    Result,
};

/// One logical inbound unit: a method, plus header and body for content-bearing methods.
#[derive(Debug)]
pub struct Command {
    method: Method,
    header: Option<ContentHeader>,
    body: Option<Vec<u8>>,
}

impl Command {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            header: None,
            body: None,
        }
    }

    pub fn with_content(method: Method, header: ContentHeader, body: Vec<u8>) -> Self {
        Self {
            method,
            header: Some(header),
            body: Some(body),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn header(&self) -> Option<&ContentHeader> {
        self.header.as_ref()
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn into_parts(self) -> (Method, Option<ContentHeader>, Option<Vec<u8>>) {
        (self.method, self.header, self.body)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.header {
            Some(header) => write!(f, "{} with {} bytes of content", self.method, header.body_size()),
            None => write!(f, "{}", self.method),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyState {
    AwaitingMethod,
    AwaitingHeader,
    AwaitingBody,
    Complete,
}

/// Builds one [`Command`] out of the frames of a channel.
///
/// Frames must come in protocol order: one method frame, then for content-bearing methods a
/// header frame and as many body frames as needed to reach the declared body size.
#[derive(Debug)]
pub(crate) struct CommandAssembler {
    state: AssemblyState,
    method: Option<Method>,
    header: Option<ContentHeader>,
    body: Vec<u8>,
    body_size: usize,
}

impl Default for CommandAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandAssembler {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::AwaitingMethod,
            method: None,
            header: None,
            body: Vec::new(),
            body_size: 0,
        }
    }

    /// Discard any partial command and wait for a method frame again.
    pub fn init(&mut self) {
        *self = Self::new();
    }

    pub fn is_complete(&self) -> bool {
        self.state == AssemblyState::Complete
    }

    /// Consume one frame. Returns `true` on the frame that completes the command.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<bool> {
        match (self.state, frame) {
            (AssemblyState::AwaitingMethod, Frame::Method(payload)) => {
                let method = Method::decode(&payload)?;
                self.state = if method.has_content() {
                    AssemblyState::AwaitingHeader
                } else {
                    AssemblyState::Complete
                };
                self.method = Some(method);
            }
            (AssemblyState::AwaitingHeader, Frame::ContentHeader(payload)) => {
                let header = ContentHeader::decode(&payload)?;
                self.body_size = usize::try_from(header.body_size()).map_err(|_| {
                    Error::UnexpectedFrame(format!(
                        "body size {} is too large",
                        header.body_size()
                    ))
                })?;
                // the declared size is untrusted, the body grows as frames arrive
                self.header = Some(header);
                self.state = if self.body_size == 0 {
                    AssemblyState::Complete
                } else {
                    AssemblyState::AwaitingBody
                };
            }
            (AssemblyState::AwaitingBody, Frame::ContentBody(payload)) => {
                if self.body.len() + payload.len() > self.body_size {
                    return Err(Error::UnexpectedFrame(format!(
                        "content body exceeds declared size {}",
                        self.body_size
                    )));
                }
                self.body.extend_from_slice(&payload);
                if self.body.len() == self.body_size {
                    self.state = AssemblyState::Complete;
                }
            }
            (state, frame) => {
                return Err(Error::UnexpectedFrame(format!(
                    "{} frame while {:?}",
                    frame.kind(),
                    state
                )));
            }
        }
        Ok(self.is_complete())
    }

    /// Take the completed command, leaving the assembler ready for the next one.
    pub fn take_command(&mut self) -> Option<Command> {
        if !self.is_complete() {
            return None;
        }
        let assembler = std::mem::take(self);
        let method = assembler.method?;
        Some(match assembler.header {
            Some(header) => Command::with_content(method, header, assembler.body),
            None => Command::new(method),
        })
    }
}
