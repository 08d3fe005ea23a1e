use std::time::Duration;

const DEFAULT_FRAMES_PER_TURN: usize = 64;
const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(10);
const DEFAULT_DELIVERIES_PER_TURN: usize = 32;
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FRAME_MAX: usize = 131_072;

/// Tuning of the channels created by a [`ChannelManager`](crate::ChannelManager).
///
/// # Usage
///
/// ```
/// # use std::time::Duration;
/// # use amqp_core::ChannelConfig;
/// let config = ChannelConfig::default()
///     .rpc_timeout(Some(Duration::from_secs(30)))
///     .deliveries_per_turn(8)
///     .finish();
/// assert_eq!(8, config.get_deliveries_per_turn());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    frames_per_turn: usize,
    receive_timeout: Duration,
    deliveries_per_turn: usize,
    rpc_timeout: Option<Duration>,
    close_timeout: Duration,
    frame_max: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frames_per_turn: DEFAULT_FRAMES_PER_TURN,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            deliveries_per_turn: DEFAULT_DELIVERIES_PER_TURN,
            rpc_timeout: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            frame_max: DEFAULT_FRAME_MAX,
        }
    }
}

impl ChannelConfig {
    /// Max frames the frame task of a channel processes before yielding.
    pub fn frames_per_turn(&mut self, frames_per_turn: usize) -> &mut Self {
        self.frames_per_turn = frames_per_turn.max(1);
        self
    }

    /// How long the frame task waits for a frame before yielding.
    pub fn receive_timeout(&mut self, receive_timeout: Duration) -> &mut Self {
        self.receive_timeout = receive_timeout;
        self
    }

    /// Max notifications a consumer task handles before yielding.
    pub fn deliveries_per_turn(&mut self, deliveries_per_turn: usize) -> &mut Self {
        self.deliveries_per_turn = deliveries_per_turn.max(1);
        self
    }

    /// Time limit of synchronous methods, `None` to wait forever.
    pub fn rpc_timeout(&mut self, rpc_timeout: Option<Duration>) -> &mut Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// How long `close` waits for `channel.close-ok`.
    pub fn close_timeout(&mut self, close_timeout: Duration) -> &mut Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn frame_max(&mut self, frame_max: usize) -> &mut Self {
        self.frame_max = frame_max;
        self
    }

    pub fn finish(&mut self) -> Self {
        self.clone()
    }

    pub fn get_frames_per_turn(&self) -> usize {
        self.frames_per_turn
    }

    pub fn get_receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    pub fn get_deliveries_per_turn(&self) -> usize {
        self.deliveries_per_turn
    }

    pub fn get_rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout
    }

    pub fn get_close_timeout(&self) -> Duration {
        self.close_timeout
    }

    pub fn get_frame_max(&self) -> usize {
        self.frame_max
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ChannelConfig;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(64, config.get_frames_per_turn());
        assert_eq!(Duration::from_millis(10), config.get_receive_timeout());
        assert_eq!(32, config.get_deliveries_per_turn());
        assert_eq!(None, config.get_rpc_timeout());
        assert_eq!(Duration::from_secs(5), config.get_close_timeout());
        assert_eq!(131_072, config.get_frame_max());
    }

    #[test]
    fn test_zero_turns_are_clamped() {
        let config = ChannelConfig::default()
            .frames_per_turn(0)
            .deliveries_per_turn(0)
            .finish();
        assert_eq!(1, config.get_frames_per_turn());
        assert_eq!(1, config.get_deliveries_per_turn());
    }
}
