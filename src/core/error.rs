use thiserror::Error;
use std::result::Result;
use super::ring::Digest;

#[derive(Error, Debug)]
pub enum RingError {
	#[error("peer {0} did not respond within the deadline")]
	Unreachable(String),
	#[error("bootstrap node {addr} unreachable: {reason}")]
	BootstrapUnreachable {
		addr: String,
		reason: String
	},
	#[error("lookup for {digest} gave up after {hops} hops")]
	LookupExhausted {
		digest: Digest,
		hops: usize
	},
	#[error("malformed response from peer {0}")]
	Malformed(String),
	#[error("node is not part of a ring")]
	Detached,
	#[error("IO error")]
	Io(#[from] std::io::Error),
	#[error("background task failed")]
	TaskJoin(#[from] tokio::task::JoinError),
	#[error("shutdown channel closed")]
	Shutdown(#[from] tokio::sync::watch::error::SendError<bool>)
}

impl RingError {
	/// Transport-level failures that should make the caller
	/// try another peer instead of giving up
	pub fn is_peer_failure(&self) -> bool {
		matches!(self, RingError::Unreachable(_) | RingError::Malformed(_))
	}
}

pub type RingResult<T> = Result<T, RingError>;

/// Classify a tarpc client error against the peer it was sent to.
/// A missed deadline means the peer is unreachable; anything else
/// (dropped connection, undecodable frame) is malformed but handled
/// the same way by callers.
pub fn classify_rpc_error(addr: &str, err: tarpc::client::RpcError) -> RingError {
	match err {
		tarpc::client::RpcError::DeadlineExceeded => RingError::Unreachable(addr.to_string()),
		_ => RingError::Malformed(addr.to_string())
	}
}
