use std::{
	collections::{
		HashMap,
		hash_map::Entry
	},
	sync::{Arc, RwLock}
};

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// Thread-safe in-memory key-value store for the payloads a node
/// owns. What the payloads mean (grid partitions, content tags)
/// is up to the application layer.
#[derive(Clone, Default)]
pub struct DataStore {
	data: Arc<RwLock<HashMap<Key, Value>>>
}

impl DataStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &Key) -> Option<Value> {
		self.data.read().unwrap().get(key).cloned()
	}

	/// Insert or update a key; a None value removes the entry.
	pub fn put(&self, key: Key, value: Option<Value>) {
		let mut data = self.data.write().unwrap();
		match data.entry(key) {
			Entry::Occupied(mut entry) => {
				match value {
					Some(v) => {
						entry.insert(v);
					},
					None => {
						entry.remove();
					}
				};
			},
			Entry::Vacant(entry) => {
				if let Some(v) = value {
					entry.insert(v);
				}
			}
		};
	}
}
