use log::debug;
use crate::{
	core::{
		self,
		config::Config,
		error::RingResult,
		node::{Node, NodeServer, Status},
		ring::Digest,
		store::{Key, Value}
	},
	server::NodeHandle
};

/// Process-wide entry point for the application layer: one ring
/// node plus its background maintenance, addressed by value only.
/// Callers resolve key ownership and exchange opaque payloads here;
/// what the payloads mean is their business.
pub struct Peer {
	server: NodeServer,
	handle: NodeHandle
}

impl Peer {
	/// Start the first node of a fresh ring.
	///
	/// When `id` is None the identifier is hashed from the bind
	/// address. All nodes of one ring must use the same policy.
	pub async fn start(bind: &str, id: Option<Digest>, config: Config) -> RingResult<Peer> {
		Self::launch(bind, id, None, config).await
	}

	/// Join the ring reachable through `bootstrap`.
	pub async fn connect_to_network(bind: &str, bootstrap: &str, id: Option<Digest>, config: Config) -> RingResult<Peer> {
		Self::launch(bind, id, Some(bootstrap), config).await
	}

	async fn launch(bind: &str, id: Option<Digest>, bootstrap: Option<&str>, config: Config) -> RingResult<Peer> {
		let node = match id {
			Some(id) => Node {
				id,
				addr: bind.to_string()
			},
			None => core::construct_node(bind, config.num_bits)
		};
		// the bootstrap's real id is learned over the wire; only
		// its address matters here
		let join_node = bootstrap.map(|addr| core::construct_node(addr, config.num_bits));

		let mut server = NodeServer::new(node, config);
		let handle = server.start(join_node).await?;
		Ok(Peer { server, handle })
	}

	/// Store a value under `key` at the node owning it
	pub async fn put(&self, key: Key, value: Value) -> RingResult<()> {
		self.server.put(key, Some(value)).await
	}

	/// Remove `key` from the node owning it
	pub async fn remove(&self, key: Key) -> RingResult<()> {
		self.server.put(key, None).await
	}

	/// Fetch the value stored under `key`, wherever it lives
	pub async fn get(&self, key: Key) -> RingResult<Option<Value>> {
		self.server.get(key).await
	}

	/// Resolve the node that owns `digest`
	pub async fn find_successor(&self, digest: Digest) -> RingResult<Node> {
		self.server.find_successor(digest).await
	}

	/// Announce departure to the neighbors (best effort), then
	/// stop the listener and background tasks. Never blocks on
	/// remote acknowledgements.
	pub async fn disconnect(self) -> RingResult<()> {
		debug!("{}: disconnecting", self.server.node());
		self.server.leave().await;
		self.handle.stop().await
	}

	// Snapshots for the application layer; values, never
	// references into the ring state.

	pub fn node(&self) -> Node {
		self.server.node().clone()
	}

	pub fn status(&self) -> Status {
		self.server.status()
	}

	pub fn successor(&self) -> Node {
		self.server.get_successor()
	}

	pub fn predecessor(&self) -> Option<Node> {
		self.server.get_predecessor()
	}
}
