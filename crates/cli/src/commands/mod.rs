mod call;
mod chat;
mod watch;

use anyhow::{Context, bail};
use gw_runtime::Session;
use serde::Serialize;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::settings::Settings;

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	let settings = Settings::resolve(&cli)?;
	let url = settings.url()?.to_string();

	let session = Session::new(settings.session.clone()).context("invalid session config")?;
	session
		.connect(&url, settings.credentials())
		.with_context(|| format!("cannot connect to {url}"))?;
	// The session retries unreachable gateways forever; a one-shot command
	// gives up after one connect plus handshake window.
	let wait = settings.session.connect_timeout() + settings.session.handshake_timeout();
	let hello = match tokio::time::timeout(wait, session.ready()).await {
		Ok(ready) => ready.with_context(|| format!("handshake with {url} failed"))?,
		Err(_) => {
			let last_error = session.state().last_error.unwrap_or_else(|| "no response".to_string());
			session.close().await;
			bail!("gateway at {url} not ready after {}ms: {last_error}", wait.as_millis());
		}
	};
	info!(protocol = hello.protocol, server = %hello.server.version, "Connected");

	let result = match cli.command {
		Commands::Status => print_json(&hello),
		Commands::Call(args) => call::execute(&session, args).await,
		Commands::Chat(args) => chat::execute(&session, args).await,
		Commands::Abort(args) => {
			let ack = session
				.chat_abort(&args.run_id, args.reason.as_deref())
				.await
				.with_context(|| format!("abort of run {} failed", args.run_id))?;
			print_json(&ack)
		}
		Commands::Watch(args) => watch::execute(&session, args).await,
	};

	session.close().await;
	result
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
