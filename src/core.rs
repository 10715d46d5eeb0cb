pub mod node;
pub mod ring;
pub mod config;
pub mod error;
pub mod finger;
pub mod successor;
pub mod store;

pub use node::*;
pub use config::*;
pub use error::*;

use self::ring::Digest;

/// Build a PeerRef for an endpoint, deriving the identifier by
/// hashing the address onto the m-bit ring. Rings that assign
/// identifiers explicitly must not mix in hashed ones.
pub fn construct_node(addr: &str, num_bits: u32) -> Node {
	Node {
		addr: addr.to_string(),
		id: ring::hash(addr.as_bytes(), num_bits)
	}
}

/// Digest of an application key on the m-bit ring
pub fn key_digest(key: &[u8], num_bits: u32) -> Digest {
	ring::hash(key, num_bits)
}
