//! Committee turn rotation.

use crate::types::{BlockNumber, ShardMetadata};

/// Whether this node is on-turn to report `block` for its shard.
///
/// With `C` committee members and threshold `T`, block `n` opens a window
/// of `T` consecutive beacon indexes starting at `n mod C`, wrapping past
/// the end of the committee. Over any `C` consecutive blocks every member
/// is on-turn exactly `T` times. With `T >= C` everyone is always on-turn.
/// Malformed metadata (empty committee, index out of range) is never
/// on-turn.
pub fn beacon_is_turn(block: BlockNumber, meta: &ShardMetadata) -> bool {
    let size = meta.committee_size() as u64;
    let index = u64::from(meta.beacon_index);
    let threshold = u64::from(meta.threshold);
    if size == 0 || index >= size {
        return false;
    }
    if threshold >= size {
        return true;
    }

    let window_start = u64::from(block) % size;
    (index + size - window_start) % size < threshold
}
