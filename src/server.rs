use crate::core::error::RingResult;
use futures::future;

/// Handle to a running node: the listener plus its maintenance
/// tasks, all stopped through one watch channel.
pub struct NodeHandle {
	pub(crate) handle: future::JoinAll<tokio::task::JoinHandle<()>>,
	pub(crate) tx: tokio::sync::watch::Sender<bool>
}

impl NodeHandle {
	/// Wait for the node's tasks to terminate
	pub async fn wait(self) -> RingResult<()> {
		self.handle.await
			.into_iter()
			.collect::<Result<Vec<_>, tokio::task::JoinError>>()?;
		Ok(())
	}

	/// Stop the listener and background tasks gracefully
	pub async fn stop(self) -> RingResult<()> {
		self.tx.send(true)?;
		self.wait().await
	}
}
