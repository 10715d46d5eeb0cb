use gridring::{
	client::{setup_client, deadline_context},
	rpc::NodeServiceClient
};
use clap::Parser;
use inquire::{Text, CustomUserError};
use anyhow::anyhow;

#[derive(Parser)]
struct Args {
	/// Node addr to connect to (<host>:<port>)
	addr: String,

	/// Per-RPC timeout in ms
	#[clap(long, default_value_t = 1000)]
	rpc_timeout: u64
}

const COMMANDS: [&str; 3] = [
	"get",
	"put",
	"del"
];

fn suggest_command(v: &str) -> Result<Vec<String>, CustomUserError> {
	let mut result = Vec::new();
	for command in COMMANDS {
		if v.len() > 0 && command.starts_with(v) {
			result.push(command.to_string());
		}
	}
	Ok(result)
}

fn complete_command(v: &str) -> Result<Option<String>, CustomUserError> {
	let result = suggest_command(v)?;
	let command = if result.len() > 0 {
		Some(result[0].clone() + " ")
	}
	else {
		None
	};
	Ok(command)
}

async fn execute_command(client: &NodeServiceClient, timeout: u64, command: &str) -> anyhow::Result<()> {
	let words: Vec<_> = command.split_whitespace().collect();
	if words.len() == 0 {
		return Err(anyhow!("invalid command"));
	}

	let ctx = deadline_context(timeout);
	match words[0] {
		"get" => {
			if words.len() != 2 {
				return Err(anyhow!("get: invalid number of arguments"));
			}
			let value = client.get_rpc(
				ctx,
				words[1].as_bytes().to_vec()
			).await??;
			match value {
				Some(v) => println!("{}", String::from_utf8(v)?),
				None => return Err(anyhow!("get: key doesn't exist"))
			};
		},
		"put" => {
			if words.len() != 3 {
				return Err(anyhow!("put: invalid number of arguments"));
			}
			client.put_rpc(
				ctx,
				words[1].as_bytes().to_vec(),
				Some(words[2].as_bytes().to_vec())
			).await??;
		},
		"del" => {
			if words.len() != 2 {
				return Err(anyhow!("del: invalid number of arguments"));
			}
			client.put_rpc(
				ctx,
				words[1].as_bytes().to_vec(),
				None
			).await??;
		},
		_ => {
			return Err(anyhow!("invalid command"));
		}
	};
	Ok(())
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();
	let args = Args::parse();
	let client = setup_client(&args.addr, args.rpc_timeout).await?;

	loop {
		let command = Text::new("")
			.with_suggester(&suggest_command)
			.with_completer(&complete_command)
			.prompt()?;

		match execute_command(&client, args.rpc_timeout, &command).await {
			Ok(_) => (),
			Err(e) => println!("Error: {}", e)
		};
	}
}
