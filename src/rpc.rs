use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::core::{
	ring::Digest,
	error::RingError,
	node::Node,
	store::{Key, Value}
};

/// Faults that have to cross the wire when a remote node cannot
/// complete a request on our behalf. Projection of RingError onto
/// the serializable subset.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RpcFault {
	#[error("no reachable peer for this request")]
	Unreachable,
	#[error("lookup for {digest} gave up after {hops} hops")]
	LookupExhausted {
		digest: Digest,
		hops: usize
	},
	#[error("node is not part of a ring")]
	Detached
}

impl From<&RingError> for RpcFault {
	fn from(err: &RingError) -> Self {
		match err {
			RingError::LookupExhausted { digest, hops } => RpcFault::LookupExhausted {
				digest: *digest,
				hops: *hops
			},
			RingError::Detached => RpcFault::Detached,
			_ => RpcFault::Unreachable
		}
	}
}

impl RpcFault {
	/// Re-raise a fault received from `addr` as a local error.
	pub fn into_error(self, addr: &str) -> RingError {
		match self {
			RpcFault::LookupExhausted { digest, hops } => RingError::LookupExhausted { digest, hops },
			RpcFault::Detached => RingError::Detached,
			RpcFault::Unreachable => RingError::Unreachable(addr.to_string())
		}
	}
}

#[tarpc::service]
pub trait NodeService {
	// Pointer snapshots at this node
	async fn get_node_rpc() -> Node;
	async fn get_predecessor_rpc() -> Option<Node>;
	async fn get_successor_rpc() -> Node;
	async fn get_successor_list_rpc() -> Vec<Node>;

	// Ring maintenance and routing
	async fn find_successor_rpc(id: Digest) -> Result<Node, RpcFault>;
	async fn closest_preceding_finger_rpc(id: Digest) -> Node;
	async fn notify_rpc(node: Node);
	async fn ping_rpc();
	async fn leaving_rpc(departing: Node, successors: Vec<Node>, predecessor: Option<Node>);

	// Key-value access at the node that owns the key
	async fn get_local_rpc(key: Key) -> Option<Value>;
	async fn put_local_rpc(key: Key, value: Option<Value>);

	// Key-value access routed through the ring from any node
	async fn get_rpc(key: Key) -> Result<Option<Value>, RpcFault>;
	async fn put_rpc(key: Key, value: Option<Value>) -> Result<(), RpcFault>;
}
