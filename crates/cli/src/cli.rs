#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Root CLI for gw.
#[derive(Parser, Debug)]
#[command(name = "gw")]
#[command(about = "Gateway socket client - requests, chat and event streams")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file [default: $XDG_CONFIG_HOME/gw/config.json]
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Gateway URL (ws:// or wss://)
	#[arg(long, global = true, value_name = "URL")]
	pub url: Option<String>,

	/// Auth token
	#[arg(long, global = true, value_name = "TOKEN")]
	pub token: Option<String>,

	/// Auth password, used when no token is set
	#[arg(long, global = true, value_name = "PASSWORD")]
	pub password: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Connect, print the server hello and exit.
	Status,
	/// Send one request and print its response payload.
	Call(CallArgs),
	/// Send a chat message and stream the agent's reply.
	Chat(ChatArgs),
	/// Abort an agent run.
	Abort(AbortArgs),
	/// Print events as NDJSON until interrupted.
	Watch(WatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
	/// Method name (for example: chat.history).
	#[arg(value_name = "METHOD")]
	pub method: String,

	/// JSON params.
	#[arg(value_name = "JSON", default_value = "{}")]
	pub params: String,

	/// Response deadline, overriding the configured request timeout.
	#[arg(long, value_name = "MS")]
	pub timeout_ms: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
	/// Message text.
	#[arg(value_name = "MESSAGE")]
	pub message: String,

	/// Chat session key.
	#[arg(short, long, value_name = "KEY", default_value = "main")]
	pub session: String,

	/// Reuse an idempotency key, e.g. to replay after a connection reset.
	#[arg(long, value_name = "KEY")]
	pub idempotency_key: Option<String>,

	/// Print the acknowledgment and exit without streaming the reply.
	#[arg(long)]
	pub no_wait: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AbortArgs {
	#[arg(value_name = "RUN_ID")]
	pub run_id: String,

	#[arg(long)]
	pub reason: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
	/// Only print these events (repeatable). Prints every event when omitted.
	#[arg(short, long = "event", value_name = "NAME")]
	pub events: Vec<String>,

	/// Exit after this many events.
	#[arg(short = 'n', long, value_name = "N")]
	pub count: Option<usize>,
}
