//! Address classification and IPv4 <-> IPv6 mapping policy.
//!
//! The daemon configures a set of mappings (explicit 1:1 entries, RFC 6052
//! translation prefixes, dynamic pools) at startup. The data path then asks
//! this crate, for every packet, which addresses to rewrite. The table is
//! immutable after configuration load, so lookups need no synchronization.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod entry;
mod rfc6052;
mod table;
mod validate;

pub use entry::{MapEntry, MapKind};
pub use rfc6052::{WELL_KNOWN_PREFIX, embed, extract, is_well_known_prefix};
pub use table::{InsertError, MapTable};
pub use validate::{is_private_ip4, validate_ip4, validate_ip6};

/// Why an address could not be mapped.
///
/// Mirrors the two failure outcomes of the data path: `Reject` means the
/// caller may answer with an ICMP error, `Drop` means discard silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("address is not covered by any mapping or is forbidden by policy")]
    Reject,
    #[error("address cannot be represented")]
    Drop,
}
