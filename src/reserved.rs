//! Reserved (bogon) ranges that are never scanned.
//!
//! Every block is at least a `/24`, so a match only ever depends on the top
//! three octets. A match resolves to the first address past the block,
//! which lets the iterator skip a whole range in one step.
use crate::address::Address;

/// A reserved network, `network/prefix_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedBlock {
    network: Address,
    prefix_len: u8,
}

impl ReservedBlock {
    const fn new(a: u8, b: u8, c: u8, prefix_len: u8) -> Self {
        Self {
            network: Address::from_octets(a, b, c, 0),
            prefix_len,
        }
    }

    const fn mask(self) -> u32 {
        u32::MAX << (32 - self.prefix_len)
    }

    #[must_use]
    pub const fn contains(self, addr: Address) -> bool {
        addr.value() & self.mask() == self.network.value()
    }

    /// First address after the block.
    #[must_use]
    pub const fn end(self) -> Address {
        Address::new(self.network.value() + !self.mask() + 1)
    }
}

/// Blocks skipped by the scanner, in ascending order.
pub const RESERVED_BLOCKS: [ReservedBlock; 10] = [
    // private use
    ReservedBlock::new(10, 0, 0, 8),
    // loopback
    ReservedBlock::new(127, 0, 0, 8),
    // link local
    ReservedBlock::new(169, 254, 0, 16),
    // private use
    ReservedBlock::new(172, 16, 0, 12),
    // IETF protocol assignments
    ReservedBlock::new(192, 0, 0, 24),
    // TEST-NET-1
    ReservedBlock::new(192, 0, 2, 24),
    // 6to4 relay anycast
    ReservedBlock::new(192, 88, 99, 24),
    // private use
    ReservedBlock::new(192, 168, 0, 16),
    // TEST-NET-2
    ReservedBlock::new(198, 51, 100, 24),
    // TEST-NET-3
    ReservedBlock::new(203, 0, 113, 24),
];

/// If `addr` is reserved, the address to jump to; otherwise `None`.
///
/// The jump target is strictly greater than `addr` and lies outside the
/// matched block. It is not itself re-checked here.
///
/// ```rust
/// # use rangescan::address::Address;
/// # use rangescan::reserved::reserved_jump;
/// let addr = Address::from_octets(172, 20, 1, 1);
/// assert_eq!(reserved_jump(addr), Some(Address::from_octets(172, 32, 0, 0)));
/// assert_eq!(reserved_jump(Address::from_octets(8, 8, 8, 8)), None);
/// ```
#[must_use]
pub fn reserved_jump(addr: Address) -> Option<Address> {
    RESERVED_BLOCKS
        .iter()
        .find(|block| block.contains(addr))
        .map(|block| block.end())
}

#[must_use]
pub fn is_reserved(addr: Address) -> bool {
    reserved_jump(addr).is_some()
}

#[cfg(test)]
mod tests {
    use super::{is_reserved, reserved_jump, RESERVED_BLOCKS};
    use crate::address::Address;
    use parameterized::parameterized;

    #[parameterized(first = {
        "10.0.0.0", "127.0.0.0", "169.254.0.0", "172.16.0.0", "192.0.0.0",
        "192.0.2.0", "192.88.99.0", "192.168.0.0", "198.51.100.0", "203.0.113.0",
    }, last = {
        "10.255.255.255", "127.255.255.255", "169.254.255.255", "172.31.255.255", "192.0.0.255",
        "192.0.2.255", "192.88.99.255", "192.168.255.255", "198.51.100.255", "203.0.113.255",
    }, target = {
        "11.0.0.0", "128.0.0.0", "169.255.0.0", "172.32.0.0", "192.0.1.0",
        "192.0.3.0", "192.88.100.0", "192.169.0.0", "198.51.101.0", "203.0.114.0",
    })]
    fn jumps_past_block(first: &str, last: &str, target: &str) {
        let first: Address = first.parse().unwrap();
        let last: Address = last.parse().unwrap();
        let target: Address = target.parse().unwrap();

        assert_eq!(reserved_jump(first), Some(target));
        assert_eq!(reserved_jump(last), Some(target));
        assert!(target > last);
        assert!(target.in_domain());
    }

    #[parameterized(input = {
        "9.255.255.255", "11.0.0.0", "126.255.255.255", "169.253.255.255", "169.255.0.0",
        "172.15.255.255", "172.32.0.0", "192.0.1.0", "192.0.3.0", "192.88.98.255",
        "192.88.100.0", "192.167.255.255", "192.169.0.0", "198.51.99.255", "198.51.101.0",
        "203.0.112.255", "203.0.114.0", "8.8.8.8", "1.0.0.0",
    })]
    fn leaves_public_addresses_alone(input: &str) {
        let addr: Address = input.parse().unwrap();
        assert_eq!(reserved_jump(addr), None);
    }

    #[test]
    fn every_address_in_small_blocks_jumps_out() {
        for block in RESERVED_BLOCKS.iter().filter(|b| b.prefix_len >= 16) {
            let mut addr = block.network;
            while addr < block.end() {
                let target = reserved_jump(addr).unwrap();
                assert!(target > addr);
                assert!(!block.contains(target));
                assert_eq!(target, block.end());
                addr = addr.successor().unwrap();
            }
        }
    }

    #[test]
    fn jump_targets_are_never_reserved() {
        for block in RESERVED_BLOCKS {
            assert!(!is_reserved(block.end()), "{} lands in a reserved block", block.end());
        }
    }
}
