use gridring::{
	core::{ring::MAX_BITS, Config},
	peer::Peer
};
use clap::Parser;

#[derive(Parser)]
struct Args {
	/// Local addr to bind (<host>:<port>)
	addr: String,

	/// Join an existing node on init (<host>:<port>)
	#[clap(short, long)]
	join: Option<String>,

	/// Explicit ring identifier for this node
	/// (hashed from addr when omitted)
	#[clap(short, long)]
	id: Option<u64>,

	/// Ring size exponent m
	#[clap(short = 'm', long, default_value_t = MAX_BITS)]
	bits: u32,

	/// Successor list length r
	#[clap(short = 'r', long, default_value_t = 4)]
	successors: usize,

	/// Stabilization interval in ms (0 disables)
	#[clap(long, default_value_t = 200)]
	stabilize_interval: u64,

	/// Finger refresh interval in ms (0 disables)
	#[clap(long, default_value_t = 200)]
	fix_finger_interval: u64,

	/// Per-RPC timeout in ms
	#[clap(long, default_value_t = 1000)]
	rpc_timeout: u64
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();

	let config = Config {
		num_bits: args.bits,
		successor_list_len: args.successors,
		stabilize_interval: args.stabilize_interval,
		fix_finger_interval: args.fix_finger_interval,
		rpc_timeout: args.rpc_timeout,
		..Config::default()
	};

	let peer = match args.join.as_ref() {
		Some(bootstrap) => Peer::connect_to_network(&args.addr, bootstrap, args.id, config).await?,
		None => Peer::start(&args.addr, args.id, config).await?
	};

	tokio::signal::ctrl_c().await?;
	peer.disconnect().await?;
	Ok(())
}
