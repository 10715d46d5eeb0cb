use super::{
	node::Node,
	ring::{Digest, finger_start, in_range}
};

/// Routing shortcuts: entry k caches the successor of
/// (own + 2^k) mod 2^m. Entries are eventually-consistent;
/// a stale entry only costs extra hops, never correctness.
/// Entry 0 is authoritative in the successor list instead,
/// so it is skipped here and supplied by the caller.
#[derive(Debug, Clone)]
pub struct FingerTable {
	own: Node,
	entries: Vec<Node>
}

impl FingerTable {
	pub fn new(own: Node, num_bits: u32) -> Self {
		let entries = vec![own.clone(); num_bits as usize];
		FingerTable { own, entries }
	}

	pub fn entry(&self, k: usize) -> &Node {
		&self.entries[k]
	}

	pub fn set(&mut self, k: usize, node: Node) {
		self.entries[k] = node;
	}

	pub fn start(&self, k: u32) -> Digest {
		finger_start(self.own.id, k, self.entries.len() as u32)
	}

	/// The finger closest to `id` while still strictly preceding it,
	/// scanning from the coarsest entry down. `successor` stands in
	/// for entry 0. Falls back to the own node when no finger helps.
	pub fn closest_preceding(&self, id: Digest, successor: &Node) -> Node {
		for k in (0..self.entries.len()).rev() {
			let f = if k > 0 { &self.entries[k] } else { successor };
			if in_range(f.id, self.own.id, id) {
				return f.clone();
			}
		}
		self.own.clone()
	}

	/// Drop every entry pointing at a peer that stopped answering,
	/// so routing falls back to the successor until the next refresh.
	pub fn evict(&mut self, dead: Digest) {
		for entry in self.entries.iter_mut() {
			if entry.id == dead {
				*entry = self.own.clone();
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn node(id: Digest) -> Node {
		Node {
			id,
			addr: format!("localhost:{}", 9800 + id)
		}
	}

	#[test]
	fn test_closest_preceding() {
		// m = 4 ring, own node 0 with fingers at 4 and 8
		let mut table = FingerTable::new(node(0), 4);
		table.set(2, node(4));
		table.set(3, node(8));
		let succ = node(4);

		assert_eq!(table.closest_preceding(10, &succ).id, 8);
		assert_eq!(table.closest_preceding(6, &succ).id, 4);
		// nothing precedes 3 except the own node
		assert_eq!(table.closest_preceding(3, &succ).id, 0);
	}

	#[test]
	fn test_evict_falls_back_to_own() {
		let mut table = FingerTable::new(node(0), 4);
		table.set(3, node(8));
		table.evict(8);
		assert_eq!(table.entry(3).id, 0);
	}
}
