use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
	time::Duration
};
use rand::{Rng, SeedableRng};
use serde::{Serialize, Deserialize};
use tarpc::{
	context,
	tokio_serde::formats::Bincode,
	server::Channel
};
use futures::{future, prelude::*};
use log::{info, warn, debug, error};
use super::{
	ring::{self, Digest, in_range},
	config::Config,
	finger::FingerTable,
	successor::SuccessorList,
	store::{DataStore, Key, Value},
	error::{
		RingError,
		RingResult,
		classify_rpc_error
	}
};
use crate::{
	client::{setup_client, deadline_context},
	rpc::{NodeService, NodeServiceClient, RpcFault},
	server::NodeHandle
};

// Data part of the node, exchanged over the wire and never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
	pub id: Digest,
	pub addr: String
}

impl std::fmt::Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Node({}, {})", self.id, self.addr)
	}
}

/// Membership state of a node on the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Detached,
	Joining,
	Active,
	Leaving,
	Failed
}

// All mutable ring pointers live behind one lock so a stabilize
// round and a concurrent inbound notify cannot interleave.
// Routing takes snapshots under the lock; the lock is never held
// across an await point.
#[derive(Debug)]
struct RingState {
	status: Status,
	predecessor: Option<Node>,
	successors: SuccessorList,
	fingers: FingerTable,
	// remembered join target, the last resort when every successor is gone
	bootstrap: Option<Node>
}

#[derive(Clone)]
pub struct NodeServer {
	node: Node,
	store: DataStore,
	config: Config,
	state: Arc<RwLock<RingState>>,
	// connections to remote nodes, evicted on failure; keyed by
	// address because a joiner only guesses the bootstrap's id
	connections: Arc<RwLock<HashMap<String, NodeServiceClient>>>
}

impl NodeServer {
	pub fn new(node: Node, config: Config) -> Self {
		assert!(config.num_bits >= 1 && config.num_bits <= ring::MAX_BITS,
			"ring size exponent out of range");
		assert_eq!(node.id, ring::truncate(node.id, config.num_bits),
			"node id does not fit the {}-bit ring", config.num_bits);

		// a lone node is its own successor and predecessor
		let state = RingState {
			status: Status::Detached,
			predecessor: Some(node.clone()),
			successors: SuccessorList::new(node.clone(), config.successor_list_len),
			fingers: FingerTable::new(node.clone(), config.num_bits),
			bootstrap: None
		};

		NodeServer {
			node: node.clone(),
			store: DataStore::new(),
			config,
			state: Arc::new(RwLock::new(state)),
			connections: Arc::new(RwLock::new(HashMap::new()))
		}
	}

	pub fn node(&self) -> &Node {
		&self.node
	}

	pub fn num_bits(&self) -> u32 {
		self.config.num_bits
	}

	pub fn status(&self) -> Status {
		self.state.read().unwrap().status
	}

	pub fn get_successor(&self) -> Node {
		self.state.read().unwrap().successors.first().clone()
	}

	pub fn get_successor_list(&self) -> Vec<Node> {
		self.state.read().unwrap().successors.to_vec()
	}

	pub fn get_predecessor(&self) -> Option<Node> {
		self.state.read().unwrap().predecessor.clone()
	}

	pub fn get_finger(&self, k: usize) -> Node {
		self.state.read().unwrap().fingers.entry(k).clone()
	}

	fn set_status(&self, status: Status) {
		self.state.write().unwrap().status = status;
	}

	fn ctx(&self) -> context::Context {
		deadline_context(self.config.rpc_timeout)
	}

	async fn get_connection(&self, node: &Node) -> RingResult<NodeServiceClient> {
		// Use a block to drop the map guard before awaiting
		{
			let map = self.connections.read().unwrap();
			if let Some(c) = map.get(&node.addr) {
				// clients are cheap to clone
				return Ok(c.clone());
			}
		}
		debug!("{}: connecting to {}", self.node, node);
		let c = setup_client(&node.addr, self.config.rpc_timeout).await?;
		let mut map = self.connections.write().unwrap();
		map.insert(node.addr.clone(), c.clone());
		Ok(c)
	}

	fn drop_connection(&self, addr: &str) {
		self.connections.write().unwrap().remove(addr);
	}

	fn rpc_failed(&self, node: &Node, err: tarpc::client::RpcError) -> RingError {
		self.drop_connection(&node.addr);
		classify_rpc_error(&node.addr, err)
	}

	/// Start the listener and maintenance tasks, joining through
	/// `join_node` first when one is given.
	pub async fn start(&mut self, join_node: Option<Node>) -> RingResult<NodeHandle> {
		// channel used to shutdown (true means shutdown)
		let (tx, rx) = tokio::sync::watch::channel(false);

		// Listen locally first so the bootstrap can call back
		let mut listener = tarpc::serde_transport::tcp::listen(&self.node.addr, Bincode::default).await?;
		let server = self.clone();
		let mut listener_rx = rx.clone();
		let listener_handle = tokio::spawn(async move {
			listener.config_mut().max_frame_length(usize::MAX);
			let listener_fut = listener
				.filter_map(|r| future::ready(r.ok()))
				.map(tarpc::server::BaseChannel::with_defaults)
				.map(|channel| async {
					// Clone a new server to share the data in Arc
					channel.execute(server.clone().serve()).await;
				})
				.buffer_unordered(server.config.max_connections as usize)
				.for_each(|_| async {});

			debug!("{}: listening", server.node);

			tokio::select! {
				_ = listener_fut => {
					warn!("{}: listener terminated", server.node);
				},
				_ = listener_rx.changed() => {
					debug!("{}: listener stopped gracefully", server.node);
				}
			};
		});

		match join_node.as_ref() {
			Some(n) => {
				if let Err(e) = self.join(n).await {
					let _ = tx.send(true);
					return Err(e);
				}
			},
			None => {
				// first node of a fresh ring
				self.set_status(Status::Active);
			}
		};

		// Periodically stabilize
		let server = self.clone();
		let mut stabilize_rx = rx.clone();
		let stabilize_interval = self.config.stabilize_interval;
		let stabilize_handle = tokio::spawn(async move {
			if stabilize_interval == 0 {
				return;
			}
			let mut interval = tokio::time::interval(Duration::from_millis(stabilize_interval));
			loop {
				tokio::select! {
					_ = interval.tick() => {
						server.stabilize().await;
					},
					_ = stabilize_rx.changed() => {
						debug!("{}: stabilize task stopped gracefully", server.node);
						break;
					}
				};
			}
		});

		// Periodically refresh one random finger
		let server = self.clone();
		let mut fix_finger_rx = rx.clone();
		let fix_finger_interval = self.config.fix_finger_interval;
		let num_bits = self.config.num_bits as usize;
		let fix_finger_handle = tokio::spawn(async move {
			// entry 0 is maintained by the successor list
			if fix_finger_interval == 0 || num_bits < 2 {
				return;
			}
			let mut interval = tokio::time::interval(Duration::from_millis(fix_finger_interval));
			// StdRng can be sent across threads
			let mut rng = rand::prelude::StdRng::from_entropy();
			loop {
				tokio::select! {
					_ = interval.tick() => {
						let index = rng.gen_range(1..num_bits);
						server.fix_finger(index).await;
					},
					_ = fix_finger_rx.changed() => {
						debug!("{}: fix_finger task stopped gracefully", server.node);
						break;
					}
				};
			}
		});

		info!("{}: listening at {}", self.node, self.node.addr);
		// An aggregated handle for all tasks
		let joined_handle = future::join_all(vec![
			listener_handle,
			stabilize_handle,
			fix_finger_handle
		]);

		Ok(NodeHandle {
			handle: joined_handle,
			tx
		})
	}

	/// Join the ring that `bootstrap` belongs to. On failure the
	/// node stays detached and the caller may retry elsewhere.
	pub async fn join(&self, bootstrap: &Node) -> RingResult<()> {
		debug!("{}: joining via {}", self.node, bootstrap);
		{
			let mut state = self.state.write().unwrap();
			state.status = Status::Joining;
			state.predecessor = None;
			state.bootstrap = Some(bootstrap.clone());
		}

		let result = self.join_inner(bootstrap).await;
		match result {
			Ok(_) => {
				self.set_status(Status::Active);
				info!("{}: joined ring via {}", self.node, bootstrap);
				Ok(())
			},
			Err(e) => {
				self.set_status(Status::Detached);
				Err(RingError::BootstrapUnreachable {
					addr: bootstrap.addr.clone(),
					reason: e.to_string()
				})
			}
		}
	}

	async fn join_inner(&self, bootstrap: &Node) -> RingResult<()> {
		let conn = self.get_connection(bootstrap).await?;
		// the caller may only know the bootstrap's address; remember
		// its actual identity for the fallback path
		let real = conn.get_node_rpc(self.ctx())
			.await
			.map_err(|e| self.rpc_failed(bootstrap, e))?;
		self.state.write().unwrap().bootstrap = Some(real);

		let owner = conn.find_successor_rpc(self.ctx(), self.node.id)
			.await
			.map_err(|e| self.rpc_failed(bootstrap, e))?
			.map_err(|fault| fault.into_error(&bootstrap.addr))?;

		// Seed the list from the true successor; stabilization
		// fills in the rest on the next round
		let reported = match self.get_connection(&owner).await {
			Ok(c) => c.get_successor_list_rpc(self.ctx()).await.unwrap_or_default(),
			Err(_) => Vec::new()
		};
		let mut state = self.state.write().unwrap();
		state.successors.rebuild(owner, reported);
		Ok(())
	}

	/// One stabilization round: verify the successor, adopt a
	/// closer one if a node joined in between, rebuild the
	/// successor list and notify the successor about us.
	pub async fn stabilize(&self) {
		if self.status() != Status::Active {
			return;
		}
		let ctx = self.ctx();

		self.check_predecessor().await;

		let entries = self.get_successor_list();
		for mut succ in entries.into_iter() {
			let mut conn = match self.get_connection(&succ).await {
				Ok(c) => c,
				Err(e) => {
					warn!("{}: successor {} unreachable: {}", self.node, succ, e);
					self.fail_successor(succ.id);
					continue;
				}
			};

			let pred = match conn.get_predecessor_rpc(ctx).await {
				Ok(p) => p,
				Err(e) => {
					let err = self.rpc_failed(&succ, e);
					warn!("{}: failed to stabilize against {}: {}", self.node, succ, err);
					self.fail_successor(succ.id);
					continue;
				}
			};

			let verified = succ.clone();
			let verified_conn = conn.clone();
			if let Some(x) = pred {
				if in_range(x.id, self.node.id, succ.id) {
					// a node joined between us and our successor
					match self.get_connection(&x).await {
						Ok(c) => {
							conn = c;
							succ = x;
						},
						Err(e) => {
							// keep the verified successor, heal next round
							debug!("{}: candidate successor {} unreachable: {}", self.node, x, e);
						}
					}
				}
			}

			if self.adopt_and_notify(&succ, &conn, ctx).await {
				return;
			}
			if succ.id != verified.id {
				// the candidate died right after announcing itself;
				// retry the successor that just answered the
				// predecessor query instead of skipping past it
				if self.adopt_and_notify(&verified, &verified_conn, ctx).await {
					return;
				}
			}
			self.fail_successor(verified.id);
		}

		self.rejoin_or_detach().await;
	}

	// Install `succ`'s successor list as ours and tell it about us.
	// False when it stopped answering.
	async fn adopt_and_notify(&self, succ: &Node, conn: &NodeServiceClient, ctx: context::Context) -> bool {
		match conn.get_successor_list_rpc(ctx).await {
			Ok(reported) => {
				{
					let mut state = self.state.write().unwrap();
					state.successors.rebuild(succ.clone(), reported);
				}
				// failure here only delays the successor learning
				// about us until the next round
				conn.notify_rpc(ctx, self.node.clone()).await.unwrap_or(());
				true
			},
			Err(e) => {
				let err = self.rpc_failed(succ, e);
				warn!("{}: failed to fetch successor list from {}: {}", self.node, succ, err);
				false
			}
		}
	}

	// Forget a predecessor that stopped answering probes so an
	// inbound notify can fill the slot with a live node again.
	async fn check_predecessor(&self) {
		let pred = match self.get_predecessor() {
			Some(p) if p.id != self.node.id => p,
			_ => return
		};
		if self.ping(&pred).await {
			return;
		}
		warn!("{}: predecessor {} presumed dead", self.node, pred);
		let mut state = self.state.write().unwrap();
		if state.predecessor.as_ref().map(|p| p.id) == Some(pred.id) {
			state.predecessor = None;
		}
		state.fingers.evict(pred.id);
	}

	// Promote past a successor that stopped answering
	fn fail_successor(&self, dead: Digest) {
		let mut state = self.state.write().unwrap();
		if state.successors.first().id == dead {
			state.successors.drop_head();
			warn!("{}: successor {} presumed dead, promoted {}",
				self.node, dead, state.successors.first());
		}
		state.fingers.evict(dead);
	}

	// Every successor is gone: fall back to the remembered
	// bootstrap, otherwise give up and detach.
	async fn rejoin_or_detach(&self) {
		self.set_status(Status::Failed);
		let bootstrap = self.state.read().unwrap().bootstrap.clone();
		if let Some(b) = bootstrap {
			if b.id != self.node.id {
				warn!("{}: no live successors, rejoining via {}", self.node, b);
				if self.join(&b).await.is_ok() {
					return;
				}
			}
		}
		error!("{}: no live successors and no reachable bootstrap, detaching", self.node);
		self.set_status(Status::Detached);
	}

	/// Refresh finger k by resolving the successor of its start
	pub async fn fix_finger(&self, k: usize) {
		let start = self.state.read().unwrap().fingers.start(k as u32);
		match self.find_successor(start).await {
			Ok(node) => {
				let mut state = self.state.write().unwrap();
				state.fingers.set(k, node);
			},
			Err(e) => {
				debug!("{}: failed to fix finger {}: {}", self.node, k, e);
			}
		};
	}

	/// Adopt `candidate` as predecessor when it fills the gap.
	/// Replaying a stale notify never regresses a converged pointer.
	pub fn notify(&self, candidate: Node) {
		let mut state = self.state.write().unwrap();
		if let Some(p) = &state.predecessor {
			if !in_range(candidate.id, p.id, self.node.id) {
				return;
			}
		}
		debug!("{}: new predecessor adopted in notify: {}", self.node, candidate);
		state.predecessor = Some(candidate);
	}

	pub fn closest_preceding_finger(&self, id: Digest) -> Node {
		let state = self.state.read().unwrap();
		let succ = state.successors.first().clone();
		state.fingers.closest_preceding(id, &succ)
	}

	/// Resolve the node that owns `id`: the first node whose
	/// identifier is >= id walking clockwise.
	///
	/// Iterative routing: keep a (current, successor-of-current)
	/// cursor; stop when id falls on (current, successor]; otherwise
	/// hop to the closest preceding finger reported by `current`.
	/// A dead hop falls back to the first live successor. The hop
	/// ceiling of 2m turns routing loops from inconsistent state
	/// into a LookupExhausted error instead of a hang.
	pub async fn find_successor(&self, id: Digest) -> RingResult<Node> {
		// a detached node has no ring to route on; get/put start
		// here too, so they surface the same fault
		if self.status() == Status::Detached {
			return Err(RingError::Detached);
		}
		let max_hops = 2 * self.config.num_bits as usize;
		let mut current = self.node.clone();
		let mut succ = self.get_successor();
		let mut hops = 0;

		loop {
			if id == succ.id || in_range(id, current.id, succ.id) {
				debug!("{}: find_successor({}) -> {} after {} hops", self.node, id, succ, hops);
				return Ok(succ);
			}
			if hops >= max_hops {
				warn!("{}: find_successor({}) exhausted after {} hops", self.node, id, hops);
				return Err(RingError::LookupExhausted { digest: id, hops });
			}
			hops += 1;

			let step = self.next_hop(&current, id).await;
			match step {
				Ok((next, next_succ)) => {
					current = next;
					succ = next_succ;
				},
				Err(e) if e.is_peer_failure() => {
					debug!("{}: hop via {} failed ({}), falling back to successor list", self.node, current, e);
					current = self.node.clone();
					succ = self.first_live_successor().await?;
				},
				Err(e) => return Err(e)
			}
		}
	}

	// One routing step from `current` towards `id`: the closest
	// preceding finger and that finger's own successor. Marks the
	// peer that actually failed before propagating the error.
	async fn next_hop(&self, current: &Node, id: Digest) -> RingResult<(Node, Node)> {
		let ctx = self.ctx();
		let mut next = if current.id == self.node.id {
			self.closest_preceding_finger(id)
		} else {
			let result = match self.get_connection(current).await {
				Ok(conn) => conn.closest_preceding_finger_rpc(ctx, id)
					.await
					.map_err(|e| self.rpc_failed(current, e)),
				Err(e) => Err(e)
			};
			result.map_err(|e| {
				self.fail_node(current);
				e
			})?
		};

		if next.id == current.id {
			// no finger strictly precedes id, step along the ring
			next = self.successor_of(current).await.map_err(|e| {
				self.fail_node(current);
				e
			})?;
		}
		let next_succ = self.successor_of(&next).await.map_err(|e| {
			self.fail_node(&next);
			e
		})?;
		Ok((next, next_succ))
	}

	async fn successor_of(&self, node: &Node) -> RingResult<Node> {
		if node.id == self.node.id {
			return Ok(self.get_successor());
		}
		let conn = self.get_connection(node).await?;
		conn.get_successor_rpc(self.ctx())
			.await
			.map_err(|e| self.rpc_failed(node, e))
	}

	// A peer failed mid-lookup: forget its fingers and, if it was
	// our successor, promote the next list entry right away.
	fn fail_node(&self, dead: &Node) {
		self.drop_connection(&dead.addr);
		self.fail_successor(dead.id);
	}

	/// Liveness probe, sharing the normal RPC deadline
	pub async fn ping(&self, node: &Node) -> bool {
		match self.get_connection(node).await {
			Ok(c) => match c.ping_rpc(self.ctx()).await {
				Ok(_) => true,
				Err(e) => {
					self.rpc_failed(node, e);
					false
				}
			},
			Err(_) => false
		}
	}

	/// First successor-list entry that answers a ping, promoting
	/// past dead entries as they are discovered.
	pub async fn first_live_successor(&self) -> RingResult<Node> {
		let entries = self.get_successor_list();
		for node in entries.iter() {
			if node.id == self.node.id || self.ping(node).await {
				return Ok(node.clone());
			}
			warn!("{}: successor-list entry {} is dead", self.node, node);
			self.fail_node(node);
		}
		Err(RingError::Unreachable(entries[0].addr.clone()))
	}

	/// Best-effort departure notice so both neighbors patch their
	/// pointers now instead of at the next stabilization round.
	/// Never waits beyond the RPC deadline; the ring self-heals
	/// even if nothing gets through.
	pub async fn leave(&self) {
		let (pred, successors) = {
			let mut state = self.state.write().unwrap();
			state.status = Status::Leaving;
			(state.predecessor.clone(), state.successors.to_vec())
		};
		let ctx = self.ctx();

		let succ = successors[0].clone();
		if succ.id != self.node.id {
			if let Ok(c) = self.get_connection(&succ).await {
				c.leaving_rpc(ctx, self.node.clone(), successors.clone(), pred.clone())
					.await
					.unwrap_or(());
			}
		}
		if let Some(p) = pred.as_ref() {
			if p.id != self.node.id && p.id != succ.id {
				if let Ok(c) = self.get_connection(p).await {
					c.leaving_rpc(ctx, self.node.clone(), successors, pred.clone())
						.await
						.unwrap_or(());
				}
			}
		}

		let mut state = self.state.write().unwrap();
		state.status = Status::Detached;
		state.predecessor = None;
		info!("{}: left the ring", self.node);
	}

	/// A neighbor announced its departure: splice it out of our
	/// pointers using the replacement info it sent along.
	pub fn handle_leaving(&self, departing: Node, successors: Vec<Node>, predecessor: Option<Node>) {
		debug!("{}: departure notice from {}", self.node, departing);
		let mut state = self.state.write().unwrap();

		if state.successors.first().id == departing.id {
			// adopt the departing node's successors as ours
			let mut reported: Vec<Node> = successors
				.into_iter()
				.filter(|n| n.id != departing.id)
				.collect();
			if !reported.is_empty() {
				let head = reported.remove(0);
				state.successors.rebuild(head, reported);
			} else {
				state.successors.remove(departing.id);
			}
		} else {
			state.successors.remove(departing.id);
		}

		if let Some(p) = &state.predecessor {
			if p.id == departing.id {
				state.predecessor = predecessor.filter(|n| n.id != departing.id);
			}
		}
		state.fingers.evict(departing.id);
	}

	/// Fetch `key` from the node that owns it
	pub async fn get(&self, key: Key) -> RingResult<Option<Value>> {
		let digest = ring::hash(&key, self.config.num_bits);
		let owner = self.find_successor(digest).await?;
		if owner.id == self.node.id {
			return Ok(self.store.get(&key));
		}
		let conn = self.get_connection(&owner).await?;
		conn.get_local_rpc(self.ctx(), key)
			.await
			.map_err(|e| self.rpc_failed(&owner, e))
	}

	/// Store `key` at the node that owns it (None removes it)
	pub async fn put(&self, key: Key, value: Option<Value>) -> RingResult<()> {
		let digest = ring::hash(&key, self.config.num_bits);
		let owner = self.find_successor(digest).await?;
		if owner.id == self.node.id {
			self.store.put(key, value);
			return Ok(());
		}
		let conn = self.get_connection(&owner).await?;
		conn.put_local_rpc(self.ctx(), key, value)
			.await
			.map_err(|e| self.rpc_failed(&owner, e))
	}
}

#[tarpc::server]
impl NodeService for NodeServer {
	async fn get_node_rpc(self, _: context::Context) -> Node {
		self.node.clone()
	}

	async fn get_predecessor_rpc(self, _: context::Context) -> Option<Node> {
		self.get_predecessor()
	}

	async fn get_successor_rpc(self, _: context::Context) -> Node {
		self.get_successor()
	}

	async fn get_successor_list_rpc(self, _: context::Context) -> Vec<Node> {
		self.get_successor_list()
	}

	async fn find_successor_rpc(self, _: context::Context, id: Digest) -> Result<Node, RpcFault> {
		self.find_successor(id).await.map_err(|e| {
			error!("{}: find_successor_rpc({}) failed: {}", self.node, id, e);
			RpcFault::from(&e)
		})
	}

	async fn closest_preceding_finger_rpc(self, _: context::Context, id: Digest) -> Node {
		self.closest_preceding_finger(id)
	}

	async fn notify_rpc(self, _: context::Context, node: Node) {
		self.notify(node)
	}

	async fn ping_rpc(self, _: context::Context) {}

	async fn leaving_rpc(self, _: context::Context, departing: Node, successors: Vec<Node>, predecessor: Option<Node>) {
		self.handle_leaving(departing, successors, predecessor)
	}

	async fn get_local_rpc(self, _: context::Context, key: Key) -> Option<Value> {
		self.store.get(&key)
	}

	async fn put_local_rpc(self, _: context::Context, key: Key, value: Option<Value>) {
		self.store.put(key, value)
	}

	async fn get_rpc(self, _: context::Context, key: Key) -> Result<Option<Value>, RpcFault> {
		self.get(key).await.map_err(|e| {
			error!("{}: get_rpc failed: {}", self.node, e);
			RpcFault::from(&e)
		})
	}

	async fn put_rpc(self, _: context::Context, key: Key, value: Option<Value>) -> Result<(), RpcFault> {
		self.put(key, value).await.map_err(|e| {
			error!("{}: put_rpc failed: {}", self.node, e);
			RpcFault::from(&e)
		})
	}
}
