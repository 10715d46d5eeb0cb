use std::time::{Duration, SystemTime};
use tarpc::{context, tokio_serde::formats::Bincode};
use crate::{
	core::error::{RingError, RingResult},
	rpc::NodeServiceClient
};

/// Connect to a remote node, bounded by `timeout` milliseconds.
/// A peer that does not accept within the budget is Unreachable.
pub async fn setup_client(addr: &str, timeout: u64) -> RingResult<NodeServiceClient> {
	let connect = tarpc::serde_transport::tcp::connect(addr, Bincode::default);
	let transport = tokio::time::timeout(Duration::from_millis(timeout), connect)
		.await
		.map_err(|_| RingError::Unreachable(addr.to_string()))?
		.map_err(|_| RingError::Unreachable(addr.to_string()))?;
	Ok(NodeServiceClient::new(tarpc::client::Config::default(), transport).spawn())
}

/// Context with the per-RPC deadline applied.
/// tarpc enforces it on both ends of the call.
pub fn deadline_context(timeout: u64) -> context::Context {
	let mut ctx = context::current();
	ctx.deadline = SystemTime::now() + Duration::from_millis(timeout);
	ctx
}
