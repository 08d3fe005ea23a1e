use amqp_serde::types::Octect;
//////////////////////////////////////////////////////////
mod basic;
mod channel;
mod exchange;
mod queue;

pub use basic::*;
pub use channel::*;
pub use exchange::*;
pub use queue::*;

// continous bits are packed into one octet, starting from the low bit.
#[inline]
fn set_bit(bits: &mut Octect, mask: Octect, value: bool) {
    if value {
        *bits |= mask;
    } else {
        *bits &= !mask;
    }
}

#[inline]
fn is_set(bits: Octect, mask: Octect) -> bool {
    bits & mask != 0
}
