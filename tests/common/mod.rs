#![allow(dead_code)]

use rand::Rng;
use gridring::core::{
	config::Config,
	node::{Node, NodeServer},
	ring::{self, Digest}
};

/// Config with background maintenance disabled so tests drive
/// stabilization rounds by hand.
pub fn manual_config(num_bits: u32) -> Config {
	Config {
		num_bits,
		stabilize_interval: 0,
		fix_finger_interval: 0,
		rpc_timeout: 500,
		..Config::default()
	}
}

pub fn node(id: Digest, port: u16) -> Node {
	Node {
		id,
		addr: format!("localhost:{}", port)
	}
}

pub async fn fix_all_fingers(server: &NodeServer) {
	// entry 0 is maintained by the successor list
	for k in 1..server.num_bits() as usize {
		server.fix_finger(k).await;
	}
}

/// Random key whose digest lands on (start, end] of the m-bit ring
pub fn generate_key_in_range<T: Rng>(rng: &mut T, start: Digest, end: Digest, num_bits: u32) -> Vec<u8> {
	loop {
		let key: [u8; 8] = rng.gen();
		let digest = ring::hash(&key, num_bits);
		if digest == end || ring::in_range(digest, start, end) {
			return key.to_vec();
		}
	}
}

/// The node that should own `key` per a linear scan over all
/// active ids: the smallest id >= key, wrapping around.
pub fn expected_owner(ids: &[Digest], key: Digest) -> Digest {
	let mut sorted = ids.to_vec();
	sorted.sort_unstable();
	*sorted.iter().find(|&&id| id >= key).unwrap_or(&sorted[0])
}
