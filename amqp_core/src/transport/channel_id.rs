use amqp_serde::types::{AmqpChannelId, ShortUint};

const INITIAL_BIT_MASK: u8 = 0b1000_0000;

/// Allocator of channel numbers `1..=channel_max`.
pub(crate) struct ChannelIdRepository {
    channel_max: ShortUint,
    /// Each bit represent two states: 1: occupied, 0: free.
    /// Real id is calculated by byte postion in Vec + bit postion in byte.
    id_state: Vec<u8>,
}

impl ChannelIdRepository {
    pub fn new(channel_max: ShortUint) -> Self {
        let channel_max = channel_max.max(1);
        let len = 1 + (channel_max as usize - 1) / 8;

        Self {
            channel_max,
            id_state: vec![0; len],
        }
    }

    fn is_free(&self, pos: usize, mask: u8) -> bool {
        (mask & self.id_state[pos]) == 0
    }

    fn get_pos_mask(&self, id: AmqpChannelId) -> Option<(usize, u8)> {
        if id == 0 || id > self.channel_max {
            return None;
        }
        let pos = (id as usize - 1) / 8;
        let mask = INITIAL_BIT_MASK >> ((id - 1) % 8);
        Some((pos, mask))
    }

    /// Lowest free id, or `None` when all ids up to `channel_max` are taken.
    pub fn allocate(&mut self) -> Option<AmqpChannelId> {
        for (pos, state) in self.id_state.iter_mut().enumerate() {
            if *state == 0b1111_1111 {
                continue;
            }
            for i in 0..8usize {
                let mask = INITIAL_BIT_MASK >> i;
                let channel_id = pos * 8 + i + 1;
                if channel_id > self.channel_max as usize {
                    return None;
                }
                if *state & mask == 0 {
                    *state |= mask;
                    return Some(channel_id as AmqpChannelId);
                }
            }
        }
        None
    }

    /// true: OK, false: already released or out of range
    pub fn release(&mut self, id: AmqpChannelId) -> bool {
        match self.get_pos_mask(id) {
            Some((pos, mask)) if !self.is_free(pos, mask) => {
                self.id_state[pos] &= !mask;
                true
            }
            _ => false,
        }
    }
}
