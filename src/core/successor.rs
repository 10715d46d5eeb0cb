use super::node::Node;

/// The next r nodes clockwise, nearest first. Keeping r of them
/// instead of one lets routing survive up to r - 1 consecutive
/// node failures between two stabilization rounds.
#[derive(Debug, Clone)]
pub struct SuccessorList {
	entries: Vec<Node>,
	capacity: usize
}

impl SuccessorList {
	pub fn new(own: Node, capacity: usize) -> Self {
		assert!(capacity > 0, "successor list length must be at least 1");
		SuccessorList {
			entries: vec![own],
			capacity
		}
	}

	pub fn first(&self) -> &Node {
		// never empty, see drop_head
		&self.entries[0]
	}

	pub fn entries(&self) -> &[Node] {
		&self.entries
	}

	pub fn to_vec(&self) -> Vec<Node> {
		self.entries.clone()
	}

	/// Rebuild from a live successor and the list it reported:
	/// [successor] ++ reported[0..r-1]
	pub fn rebuild(&mut self, successor: Node, reported: Vec<Node>) {
		let mut entries = Vec::with_capacity(self.capacity);
		entries.push(successor);
		for node in reported {
			if entries.len() == self.capacity {
				break;
			}
			// the reported list may still contain ourselves or the
			// successor right after a join; keep each node once
			if entries.iter().all(|e| e.id != node.id) {
				entries.push(node);
			}
		}
		self.entries = entries;
	}

	/// Promote the next candidate after the head failed a probe.
	/// The last entry is kept even if dead so there is always
	/// something to retry against.
	pub fn drop_head(&mut self) {
		if self.entries.len() > 1 {
			self.entries.remove(0);
		}
	}

	/// Splice a departed node out of the list without waiting
	/// for the next stabilization round.
	pub fn remove(&mut self, id: u64) {
		if self.entries.len() > 1 {
			self.entries.retain(|e| e.id != id);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn node(id: u64) -> Node {
		Node {
			id,
			addr: format!("localhost:{}", 9800 + id)
		}
	}

	#[test]
	fn test_rebuild_truncates_and_dedupes() {
		let mut list = SuccessorList::new(node(0), 3);
		list.rebuild(node(4), vec![node(4), node(8), node(12), node(0)]);
		let ids: Vec<_> = list.entries().iter().map(|n| n.id).collect();
		assert_eq!(ids, vec![4, 8, 12]);
	}

	#[test]
	fn test_drop_head_keeps_last_resort() {
		let mut list = SuccessorList::new(node(0), 3);
		list.rebuild(node(4), vec![node(8)]);
		list.drop_head();
		assert_eq!(list.first().id, 8);
		list.drop_head();
		assert_eq!(list.first().id, 8);
		list.drop_head();
		assert_eq!(list.first().id, 8);
	}

	#[test]
	fn test_remove_departed() {
		let mut list = SuccessorList::new(node(0), 3);
		list.rebuild(node(4), vec![node(8), node(12)]);
		list.remove(8);
		let ids: Vec<_> = list.entries().iter().map(|n| n.id).collect();
		assert_eq!(ids, vec![4, 12]);
	}
}
