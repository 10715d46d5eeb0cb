// Pointer convergence under sequential joins on a small ring,
// driven by manual stabilization rounds.
use gridring::core::node::NodeServer;

mod common;
use common::*;

#[tokio::test]
async fn test_pointer_convergence() -> anyhow::Result<()> {
	let _ = env_logger::builder().is_test(true).try_init();

	// 3-bit ring, ids 0, 1, 3, 6
	let n0 = node(0, 17810);
	let n1 = node(1, 17811);
	let n3 = node(3, 17813);
	let n6 = node(6, 17816);
	let config = manual_config(3);

	let mut s0 = NodeServer::new(n0.clone(), config.clone());
	let h0 = s0.start(None).await?;
	s0.stabilize().await;
	// a lone node is its own successor and predecessor
	assert_eq!(s0.get_predecessor().unwrap().id, 0);
	assert_eq!(s0.get_successor().id, 0);

	// Node 1 joins via node 0
	let mut s1 = NodeServer::new(n1.clone(), config.clone());
	let h1 = s1.start(Some(n0.clone())).await?;
	assert_eq!(s1.get_successor().id, 0);

	// Stabilize s1 first so it notifies s0
	s1.stabilize().await;
	assert_eq!(s0.get_predecessor().unwrap().id, 1);
	s0.stabilize().await;
	assert_eq!(s0.get_predecessor().unwrap().id, 1);
	assert_eq!(s0.get_successor().id, 1);
	assert_eq!(s1.get_predecessor().unwrap().id, 0);
	assert_eq!(s1.get_successor().id, 0);

	// Node 3 joins via node 1
	let mut s3 = NodeServer::new(n3.clone(), config.clone());
	let h3 = s3.start(Some(n1.clone())).await?;
	s3.stabilize().await;
	s1.stabilize().await;
	s0.stabilize().await;

	assert_eq!(s3.get_predecessor().unwrap().id, 1);
	assert_eq!(s1.get_predecessor().unwrap().id, 0);
	assert_eq!(s0.get_predecessor().unwrap().id, 3);

	fix_all_fingers(&s0).await;
	assert_eq!(s0.get_successor().id, 1);
	assert_eq!(s0.get_finger(1).id, 3);
	// start 4 wraps around past the last node
	assert_eq!(s0.get_finger(2).id, 0);

	fix_all_fingers(&s1).await;
	assert_eq!(s1.get_successor().id, 3);
	assert_eq!(s1.get_finger(1).id, 3);
	assert_eq!(s1.get_finger(2).id, 0);

	fix_all_fingers(&s3).await;
	assert_eq!(s3.get_successor().id, 0);
	assert_eq!(s3.get_finger(1).id, 0);
	assert_eq!(s3.get_finger(2).id, 0);

	// Node 6 joins via node 0
	let mut s6 = NodeServer::new(n6.clone(), config.clone());
	let h6 = s6.start(Some(n0.clone())).await?;
	s6.stabilize().await;
	s3.stabilize().await;
	s1.stabilize().await;
	s0.stabilize().await;

	// exactly one successor/predecessor pair brackets the new node
	assert_eq!(s6.get_predecessor().unwrap().id, 3);
	assert_eq!(s3.get_successor().id, 6);
	assert_eq!(s0.get_predecessor().unwrap().id, 6);
	assert_eq!(s6.get_successor().id, 0);
	assert_eq!(s1.get_predecessor().unwrap().id, 0);
	assert_eq!(s3.get_predecessor().unwrap().id, 1);

	fix_all_fingers(&s0).await;
	assert_eq!(s0.get_finger(1).id, 3);
	assert_eq!(s0.get_finger(2).id, 6);
	fix_all_fingers(&s1).await;
	assert_eq!(s1.get_finger(1).id, 3);
	assert_eq!(s1.get_finger(2).id, 6);
	fix_all_fingers(&s3).await;
	assert_eq!(s3.get_finger(1).id, 6);
	assert_eq!(s3.get_finger(2).id, 0);
	fix_all_fingers(&s6).await;
	assert_eq!(s6.get_finger(1).id, 0);
	assert_eq!(s6.get_finger(2).id, 3);

	// Ring closure: successor pointers walk back to the start
	// within one full turn
	for start in [&s0, &s1, &s3, &s6] {
		let mut current = start.get_successor();
		let mut hops = 1;
		while current.id != start.node().id {
			let next = match current.id {
				0 => s0.get_successor(),
				1 => s1.get_successor(),
				3 => s3.get_successor(),
				_ => s6.get_successor()
			};
			current = next;
			hops += 1;
			assert!(hops <= 4, "successor chain did not close");
		}
	}

	// Replaying stale notifies never regresses a converged ring
	s0.notify(n3.clone());
	assert_eq!(s0.get_predecessor().unwrap().id, 6);
	s0.notify(n6.clone());
	assert_eq!(s0.get_predecessor().unwrap().id, 6);
	s6.notify(n1.clone());
	assert_eq!(s6.get_predecessor().unwrap().id, 3);

	h0.stop().await?;
	h1.stop().await?;
	h3.stop().await?;
	h6.stop().await?;
	Ok(())
}
