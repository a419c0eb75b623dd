use crate::config::HostPort;

/// Deterministic key→shard routing shared by every client.
///
/// The hash folds the key bytes with `h = h*31 + byte` over a wrapping signed
/// 64-bit accumulator. Stability is a contract: every client must compute the
/// same owner for a key, and changing this function re-partitions the entire
/// key space.
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    let mut h: i64 = 0;
    for b in key.as_bytes() {
        h = h.wrapping_mul(31).wrapping_add(i64::from(*b));
    }
    (h.unsigned_abs() as usize) % shard_count
}

/// Returns the node that owns `key`. `hosts` must be non-empty; callers fall
/// back to [`HostPort::default_local`] before routing.
pub fn owner_for_key<'a>(key: &str, hosts: &'a [HostPort]) -> &'a HostPort {
    &hosts[shard_index(key, hosts.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_stable() {
        // Independent computations must agree (this is what lets every client
        // route without coordination).
        for key in ["", "a", "test", "account_7", "1023"] {
            assert_eq!(shard_index(key, 5), shard_index(key, 5));
        }
    }

    #[test]
    fn routing_pins_known_values() {
        // h("test") = ((116*31 + 101)*31 + 115)*31 + 116 = 3556498
        assert_eq!(shard_index("test", 1), 0);
        assert_eq!(shard_index("test", 4), 2);
        assert_eq!(shard_index("test", 3556498 + 1), 3556498);
    }

    #[test]
    fn routing_stays_in_range_for_long_keys() {
        // Long keys overflow the accumulator; the wrap plus unsigned_abs must
        // still land in [0, shard_count).
        let key = "x".repeat(1024);
        for count in 1..16 {
            assert!(shard_index(&key, count) < count);
        }
    }

    #[test]
    fn owner_for_key_indexes_host_list() {
        let hosts = vec![
            HostPort::new("a", 1),
            HostPort::new("b", 2),
            HostPort::new("c", 3),
        ];
        let owner = owner_for_key("test", &hosts);
        assert_eq!(*owner, hosts[shard_index("test", 3)]);
    }
}
