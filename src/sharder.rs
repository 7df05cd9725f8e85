//! Identity sharding.
//!
//! Buckets an entity's identity string into a fixed number of shards. The hash must stay stable
//! across processes and releases for the lifetime of any running experiment: changing it
//! reshuffles every existing assignment and is a breaking change.
use md5;

/// Hashes an input to a shard in `[0, total_shards)`.
pub trait Sharder {
    /// Deterministically map `input` to a shard.
    fn shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64;
}

/// The default (and only) sharder.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u64::from_be_bytes(hash[0..8].try_into().unwrap());
        value % total_shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_is_deterministic() {
        assert_eq!(
            Md5Sharder.shard("u123seed", 100),
            Md5Sharder.shard("u123seed", 100),
        );
    }

    #[test]
    fn shard_is_in_range() {
        for input in ["", "a", "user-4711", "9001ranking"] {
            assert!(Md5Sharder.shard(input, 100) < 100);
        }
    }

    #[test]
    fn known_shards() {
        // Pinned values; a change here means assignments get reshuffled.
        assert_eq!(Md5Sharder.shard("1234checkout_flow", 100), 20);
        assert_eq!(Md5Sharder.shard("1234altseed", 100), 3);
        assert_eq!(Md5Sharder.shard("9001ranking", 100), 63);
    }
}
