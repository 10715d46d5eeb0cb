use std::default::Default;
use super::ring::MAX_BITS;

/// Tunables for one ring node.
/// Immutable once the node is running; changing any of them
/// means tearing the node down and rejoining.
#[derive(Debug, Clone)]
pub struct Config {
	/// ring size exponent m: identifiers live in [0, 2^m)
	pub num_bits: u32,
	/// successor list length r (tolerates r - 1 consecutive failures)
	pub successor_list_len: usize,
	/// interval in ms (0 disables the task)
	pub stabilize_interval: u64,
	/// interval in ms (0 disables the task)
	pub fix_finger_interval: u64,
	/// per-RPC deadline in ms, also used as the liveness-probe budget
	pub rpc_timeout: u64,
	/// max number of concurrent inbound connections buffered
	pub max_connections: u64
}

impl Default for Config {
	fn default() -> Self {
		Self {
			num_bits: MAX_BITS,
			successor_list_len: 4,
			stabilize_interval: 200,
			fix_finger_interval: 200,
			rpc_timeout: 1000,
			max_connections: 16
		}
	}
}
