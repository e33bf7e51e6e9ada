//! Consistent-hash ring lookup for key-based request routing.
//!
//! The store partitions metric data across nodes with a consistent-hash
//! ring of virtual nodes. This crate holds the client-side copy of that
//! ring and answers "which nodes own this key": hash the key onto the
//! ring, binary-search for the first virtual node at or past that
//! position (wrapping around at the end), then walk forward collecting
//! distinct owning nodes.
//!
//! The ring is immutable once built; topology refresh constructs a new
//! [`Ring`] and swaps it wholesale, so concurrent readers never observe a
//! partially-updated ring.

mod ring;

pub use ring::{Ring, RingError};
