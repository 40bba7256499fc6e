//! Decides which addresses a run visits, and in what order.
mod range_iterator;

use std::path::Path;

use tokio::fs;

use crate::address::Address;
use crate::errors::AddressError;
use crate::reserved::is_reserved;
pub use range_iterator::AddressIterator;

/// The address source for a run.
///
///   - Range walks the whole domain from a start address.
///   - List visits an explicit set of addresses, typically a reachable-hosts
///     file written by a previous connect-only run.
///
/// Both orders are strictly increasing, so dispatch order is numeric.
#[derive(Debug, Clone)]
pub enum AddressStrategy {
    Range(AddressIterator),
    List(Vec<Address>),
}

impl AddressStrategy {
    pub fn pick(start: Address, list: Option<Vec<Address>>) -> Self {
        match list {
            Some(mut addrs) => {
                addrs.retain(|addr| addr.in_domain() && !is_reserved(*addr) && *addr >= start);
                addrs.sort_unstable();
                addrs.dedup();
                Self::List(addrs)
            }
            None => Self::Range(AddressIterator::new(start)),
        }
    }

    pub fn ordered_iter(self) -> Box<dyn Iterator<Item = Address> + Send> {
        match self {
            Self::Range(iter) => Box::new(iter),
            Self::List(addrs) => Box::new(addrs.into_iter()),
        }
    }
}

/// Parses newline-delimited addresses. Blank lines and `#` comments are
/// skipped; any other malformed line fails the whole list.
pub fn parse_address_list(content: &str) -> Result<Vec<Address>, AddressError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::parse)
        .collect()
}

/// Reads an address list from disk.
pub async fn read_address_list(path: &Path) -> anyhow::Result<Vec<Address>> {
    let content = fs::read_to_string(path).await?;
    Ok(parse_address_list(&content)?)
}
