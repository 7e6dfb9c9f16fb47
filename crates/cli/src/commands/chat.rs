//! `gw chat`: send a message and stream the run that answers it.

use std::io::Write;

use anyhow::{Context, anyhow, bail};
use gw_protocol::{AgentEvent, StreamKind};
use gw_runtime::{Error, Phase, Session};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::print_json;
use crate::cli::ChatArgs;

pub async fn execute(session: &Session, args: ChatArgs) -> anyhow::Result<()> {
	let (tx, mut events) = mpsc::unbounded_channel::<AgentEvent>();
	let _agent = session.subscribe_agent(move |event| {
		let _ = tx.send(event.clone());
	});

	let key = args.idempotency_key.unwrap_or_else(|| Uuid::new_v4().to_string());
	let ack = match session.chat_send_with_key(&args.session, &args.message, &key).await {
		Ok(ack) => ack,
		Err(err @ Error::ConnectionReset) => {
			return Err(anyhow!(err).context(format!(
				"delivery unknown; replay safely with --idempotency-key {key}"
			)));
		}
		Err(err) => return Err(err).context("chat.send failed"),
	};
	info!(idempotency_key = %key, "Message accepted");

	if args.no_wait {
		return print_json(&json!({ "idempotencyKey": key, "ack": ack }));
	}

	let run_id = ack.get("runId").and_then(Value::as_str).map(str::to_string);
	let mut state = session.watch_state();
	let mut stdout = std::io::stdout();
	let mut wrote_text = false;

	loop {
		tokio::select! {
			event = events.recv() => {
				let Some(event) = event else { bail!("event stream ended") };
				if run_id.is_some() && event.run_id != run_id {
					continue;
				}
				match render(&event) {
					Render::Text(text) => {
						write!(stdout, "{text}")?;
						stdout.flush()?;
						wrote_text = true;
					}
					Render::Note(note) => eprintln!("[{note}]"),
					Render::Done => break,
					Render::Failed(message) => {
						finish_line(&mut stdout, wrote_text)?;
						bail!("run failed: {message}");
					}
					Render::Skip => {}
				}
			}
			changed = state.changed() => {
				if changed.is_err() {
					bail!("session dropped");
				}
				let phase = state.borrow_and_update().phase;
				match phase {
					Phase::Closed => bail!("session closed before the run finished"),
					Phase::Reconnecting => warn!("Connection lost; output may be incomplete"),
					_ => {}
				}
			}
			_ = tokio::signal::ctrl_c() => {
				if let Some(run_id) = &run_id {
					if let Err(err) = session.chat_abort(run_id, Some("interrupted")).await {
						warn!(error = %err, "Failed to abort run");
					}
				}
				finish_line(&mut stdout, wrote_text)?;
				bail!("interrupted");
			}
		}
	}

	finish_line(&mut stdout, wrote_text)
}

/// Ends a partially written assistant line.
fn finish_line(stdout: &mut impl Write, wrote_text: bool) -> anyhow::Result<()> {
	if wrote_text {
		writeln!(stdout)?;
	}
	Ok(())
}

/// What one agent event contributes to the terminal.
#[derive(Debug, PartialEq, Eq)]
enum Render {
	/// Assistant text for stdout.
	Text(String),
	/// Side note for stderr.
	Note(String),
	Done,
	Failed(String),
	Skip,
}

fn render(event: &AgentEvent) -> Render {
	let field = |name: &str| event.data.get(name).and_then(Value::as_str);
	match &event.stream {
		StreamKind::Assistant => match field("delta").or_else(|| field("text")) {
			Some(text) => Render::Text(text.to_string()),
			None => Render::Skip,
		},
		StreamKind::Tool => {
			let name = field("name").or_else(|| field("tool")).unwrap_or("tool");
			match field("phase") {
				Some(phase) => Render::Note(format!("tool: {name} {phase}")),
				None => Render::Note(format!("tool: {name}")),
			}
		}
		StreamKind::Lifecycle => match field("phase") {
			Some("end") => Render::Done,
			Some("error") => Render::Failed(
				field("error")
					.or_else(|| field("message"))
					.unwrap_or("unknown error")
					.to_string(),
			),
			_ => Render::Skip,
		},
		StreamKind::Other(_) => Render::Skip,
	}
}
