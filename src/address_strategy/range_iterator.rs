use crate::address::Address;
use crate::reserved::reserved_jump;

/// Yields every non-reserved address from `start` up to, but excluding,
/// [`Address::DOMAIN_END`], in increasing order.
///
/// The reserved filter is consulted before each emission and again after
/// every jump, so a jump target that happens to sit in another block is
/// skipped as well. Nothing is allocated; the iterator is a single cursor.
#[derive(Debug, Clone)]
pub struct AddressIterator {
    cursor: Option<Address>,
}

impl AddressIterator {
    #[must_use]
    pub const fn new(start: Address) -> Self {
        Self {
            cursor: Some(start),
        }
    }

    /// The address the iterator will examine next, or `None` once the
    /// domain is exhausted.
    #[must_use]
    pub const fn position(&self) -> Option<Address> {
        self.cursor
    }
}

impl Default for AddressIterator {
    fn default() -> Self {
        Self::new(Address::DEFAULT_START)
    }
}

impl Iterator for AddressIterator {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        loop {
            let current = self.cursor.filter(|addr| addr.in_domain());
            let Some(current) = current else {
                self.cursor = None;
                return None;
            };

            if let Some(target) = reserved_jump(current) {
                self.cursor = Some(target);
                continue;
            }

            self.cursor = current.successor();
            return Some(current);
        }
    }
}
