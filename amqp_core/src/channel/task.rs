use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use super::Channel;
use crate::{
    command::{Command, CommandAssembler},
    error::Error,
    frame::{CancelOk, FlowOk, Frame, Method},
    listener::ReturnedMessage,
    transport::TransportStatus,
    work::Task,
    Result,
};

/// Frame-processing task of a channel.
pub(super) struct ChannelTask {
    channel: Channel,
    assembler: CommandAssembler,
}

impl ChannelTask {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            assembler: CommandAssembler::new(),
        }
    }

    /// A single command failed: drop it and fail the outstanding synchronous method.
    fn handle_command_error(&mut self, err: Error) {
        self.assembler.init();
        match &err {
            Error::NoOutstandingRpc(name) => warn!(
                "{} discards {}: no synchronous method is outstanding",
                self.channel, name
            ),
            _ => error!("{} failed to process inbound command: {}", self.channel, err),
        }
        if let Some(continuation) = self.channel.next_outstanding_rpc() {
            continuation.handle_abort(err);
        }
    }

    async fn handle_receive_error(&mut self, status: TransportStatus) -> bool {
        if self.channel.is_closed() {
            return true;
        }
        if status == TransportStatus::InvalidHandle {
            // handle is gone, so is the channel
            self.channel.shutdown(Error::Transport(status)).await;
            return true;
        }
        self.handle_command_error(Error::Transport(status));
        false
    }
}

#[async_trait]
impl Task for ChannelTask {
    async fn run(&mut self) -> bool {
        for _ in 0..self.channel.config().get_frames_per_turn() {
            if self.channel.is_closed() {
                return true;
            }
            let frame = match self.channel.receive_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return false,
                Err(status) if status.is_transient() => return false,
                Err(status) => return self.handle_receive_error(status).await,
            };
            if let Frame::Heartbeat = frame {
                trace!("{} ignores heartbeat", self.channel);
                continue;
            }
            match self.assembler.handle_frame(frame) {
                Ok(false) => {}
                Ok(true) => {
                    if let Some(command) = self.assembler.take_command() {
                        if let Err(err) = self.channel.handle_complete_inbound_command(command).await {
                            self.handle_command_error(err);
                        }
                    }
                }
                Err(err) => self.handle_command_error(err),
            }
        }
        self.channel.is_closed()
    }
}

/////////////////////////////////////////////////////////////////////////////
impl Channel {
    /// Handle a completed command, or hand it to the outstanding synchronous method.
    pub(crate) async fn handle_complete_inbound_command(&self, command: Command) -> Result<()> {
        trace!("{} received {}", self, command);
        let command = match self.process_async(command).await? {
            Some(command) => command,
            None => return Ok(()),
        };
        match self.next_outstanding_rpc() {
            Some(continuation) => {
                continuation.handle_command(command);
                Ok(())
            }
            None if self.is_open() => Err(Error::NoOutstandingRpc(
                command.method().name().to_string(),
            )),
            None => {
                debug!("{} is not open, discarding {}", self, command);
                Ok(())
            }
        }
    }

    /// Handle commands that are not replies. Returns the command back if it is a reply.
    async fn process_async(&self, command: Command) -> Result<Option<Command>> {
        match command.method() {
            Method::CloseChannel(close) => {
                self.handle_server_close(close).await?;
                return Ok(None);
            }
            Method::CloseChannelOk(_) => {
                self.invalidate_handle();
                return Ok(Some(command));
            }
            // completes the open continuation
            Method::OpenChannelOk(_) => return Ok(Some(command)),
            _ if !self.is_accepting_async() => {
                debug!("{} is shutting down, discarding {}", self, command);
                return Ok(None);
            }
            Method::Deliver(_) | Method::Return(_) | Method::Flow(_) | Method::Cancel(_) => {}
            _ => return Ok(Some(command)),
        }

        let (method, header, body) = command.into_parts();
        let basic_properties = header
            .map(|header| header.basic_properties)
            .unwrap_or_default();
        let content = body.unwrap_or_default();
        match method {
            Method::Deliver(deliver) => {
                let consumer_tag = deliver.consumer_tag.to_string();
                self.dispatcher().handle_delivery(
                    &consumer_tag,
                    deliver.into(),
                    basic_properties,
                    content,
                );
            }
            Method::Return(ret) => {
                self.notify_return_listeners(ReturnedMessage::new(ret, basic_properties, content))
                    .await;
            }
            Method::Flow(flow) => {
                debug!("{} flow active = {}", self, flow.active);
                self.transmit(FlowOk {
                    active: flow.active,
                })
                .await?;
            }
            Method::Cancel(cancel) => {
                let consumer_tag = cancel.consumer_tag.to_string();
                debug!("{} consumer {} cancelled by server", self, consumer_tag);
                {
                    let mut dispatcher = self.dispatcher().lock();
                    dispatcher.handle_cancel(&consumer_tag);
                    dispatcher.remove_consumer(&consumer_tag);
                }
                if !cancel.no_wait {
                    self.transmit(CancelOk {
                        consumer_tag: cancel.consumer_tag,
                    })
                    .await?;
                }
            }
            _ => {}
        }
        Ok(None)
    }
}
