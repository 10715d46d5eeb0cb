use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher},
	mem::size_of
};

pub type Digest = u64;
// upper bound for the ring size exponent m
pub const MAX_BITS: u32 = (size_of::<Digest>() * 8) as u32;

/// Truncate a digest to the m-bit identifier space
pub fn truncate(digest: Digest, num_bits: u32) -> Digest {
	if num_bits >= MAX_BITS {
		digest
	} else {
		digest & ((1 << num_bits) - 1)
	}
}

/// Map arbitrary bytes (an endpoint or an application key)
/// onto the m-bit ring
pub fn hash(data: &[u8], num_bits: u32) -> Digest {
	let mut hasher = DefaultHasher::new();
	data.hash(&mut hasher);
	truncate(hasher.finish(), num_bits)
}

// Strictly in range on the clockwise arc: id in (start, end)
// start == end means the whole circle except start itself
pub fn in_range(id: Digest, start: Digest, end: Digest) -> bool {
	if end > start {
		// (start, id, end)
		id > start && id < end
	}
	else {
		// end <= start
		// case 1: (start, id, end + MAX_VAL)
		// case 2: (start, id + MAX_VAL, end + MAX_VAL)
		id > start || id < end
	}
}

// Start of finger interval k: (id + 2^k) mod 2^m
// k in [0, m)
pub fn finger_start(id: Digest, k: u32, num_bits: u32) -> Digest {
	truncate(id.wrapping_add(1 << k), num_bits)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_in_range() {
		assert!(in_range(5, 0, 10));
		assert!(!in_range(0, 0, 10));
		assert!(!in_range(10, 0, 10));
		// wrap around zero
		assert!(in_range(15, 12, 3));
		assert!(in_range(1, 12, 3));
		assert!(!in_range(3, 12, 3));
		assert!(!in_range(7, 12, 3));
		// start == end: full circle minus start
		assert!(in_range(1, 4, 4));
		assert!(in_range(9, 4, 4));
		assert!(!in_range(4, 4, 4));
	}

	#[test]
	fn test_hash_truncation() {
		let d = hash(b"localhost:9800", 4);
		assert!(d < 16);
		// deterministic
		assert_eq!(d, hash(b"localhost:9800", 4));
		assert_eq!(hash(b"k", MAX_BITS), hash(b"k", 64));
	}

	#[test]
	fn test_finger_start() {
		assert_eq!(finger_start(0, 0, 4), 1);
		assert_eq!(finger_start(12, 3, 4), 4);
		assert_eq!(finger_start(15, 0, 4), 0);
		let id = u64::MAX - 1;
		assert_eq!(finger_start(id, 1, MAX_BITS), 0);
	}
}
