//! Bit-window acknowledgment codec.
//!
//! An ack is a pair `(ack_base, ack_bits)`: `ack_base` is the newest sequence
//! number received and bit *k* of `ack_bits` records whether
//! `ack_base - (k + 1)` was received as well. All functions here are pure and
//! every shift goes through [`shift_left`], so no shift amount outside
//! `0..32` is ever evaluated.

/// Number of sequence numbers preceding the ack base that fit in the bitfield.
pub const ACK_WINDOW: u32 = u32::BITS;

#[inline]
fn shift_left(bits: u32, amount: u32) -> u32 {
    // `checked_shl` refuses amounts >= 32; everything is shifted out then.
    bits.checked_shl(amount).unwrap_or(0)
}

/// Bit standing for the sequence `distance` steps behind the ack base, or 0
/// when the distance is not representable (0 or more than [`ACK_WINDOW`]).
#[inline]
fn window_bit(distance: u32) -> u32 {
    if (1..=ACK_WINDOW).contains(&distance) {
        shift_left(1, distance - 1)
    } else {
        0
    }
}

/// Moves the window forward to `new_sequence`, which must be newer than
/// `old_ack_base`. The superseded base becomes bit `diff - 1`. A jump of a
/// full window or more loses the old history and yields an empty bitfield.
pub fn advance(old_ack_base: u32, old_bits: u32, new_sequence: u32) -> (u32, u32) {
    let diff = new_sequence.wrapping_sub(old_ack_base);
    if diff == 0 {
        return (old_ack_base, old_bits);
    }
    if diff >= ACK_WINDOW {
        return (new_sequence, 0);
    }

    (new_sequence, shift_left(old_bits, diff) | window_bit(diff))
}

/// Records a sequence that is not newer than `ack_base`. A duplicate of the
/// base itself or anything further back than the window leaves `bits` alone.
pub fn mark_out_of_order(ack_base: u32, bits: u32, received: u32) -> u32 {
    bits | window_bit(ack_base.wrapping_sub(received))
}

/// Whether the ack `(ack_base, bits)` covers `candidate`.
///
/// Sequences newer than the base, or too far behind it to be represented,
/// are reported as not acknowledged. The latter means "not known yet", it
/// never implies the packet was lost.
pub fn is_acknowledged(ack_base: u32, bits: u32, candidate: u32) -> bool {
    let distance = ack_base.wrapping_sub(candidate);
    distance == 0 || bits & window_bit(distance) != 0
}
