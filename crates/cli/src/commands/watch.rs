//! `gw watch`: dump events as NDJSON.

use std::io::Write;

use anyhow::bail;
use gw_protocol::EventFrame;
use gw_runtime::{Phase, Session, Subscription};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::WatchArgs;

pub async fn execute(session: &Session, args: WatchArgs) -> anyhow::Result<()> {
	let (tx, mut events) = mpsc::unbounded_channel::<EventFrame>();
	let _subscriptions: Vec<Subscription> = if args.events.is_empty() {
		vec![session.subscribe_all(move |frame| {
			let _ = tx.send(frame.clone());
		})]
	} else {
		args.events
			.iter()
			.map(|name| {
				let tx = tx.clone();
				session.subscribe(name, move |frame| {
					let _ = tx.send(frame.clone());
				})
			})
			.collect()
	};

	let mut state = session.watch_state();
	let mut stdout = std::io::stdout();
	let mut printed = 0usize;

	loop {
		if args.count.is_some_and(|count| printed >= count) {
			return Ok(());
		}
		tokio::select! {
			frame = events.recv() => {
				let Some(frame) = frame else { bail!("event stream ended") };
				writeln!(stdout, "{}", ndjson_line(&frame))?;
				stdout.flush()?;
				printed += 1;
			}
			changed = state.changed() => {
				if changed.is_err() {
					bail!("session dropped");
				}
				let snapshot = state.borrow_and_update().clone();
				info!(phase = %snapshot.phase, generation = snapshot.generation, "Connection state changed");
				if snapshot.phase == Phase::Closed {
					bail!("session closed");
				}
			}
			_ = tokio::signal::ctrl_c() => return Ok(()),
		}
	}
}

fn ndjson_line(frame: &EventFrame) -> String {
	let mut line = json!({ "event": frame.event, "payload": frame.payload });
	if let Some(seq) = frame.seq {
		line["seq"] = json!(seq);
	}
	line.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ndjson_line_is_single_line() {
		let frame = EventFrame::new("tick", json!({"ts": 1}));
		let line = ndjson_line(&frame);
		assert!(!line.contains('\n'));
		assert_eq!(
			serde_json::from_str::<serde_json::Value>(&line).unwrap(),
			json!({"event": "tick", "payload": {"ts": 1}})
		);
	}

	#[test]
	fn ndjson_line_keeps_frame_seq() {
		let mut frame = EventFrame::new("agent.event", json!({}));
		frame.seq = Some(9);
		let value: serde_json::Value = serde_json::from_str(&ndjson_line(&frame)).unwrap();
		assert_eq!(value["seq"], 9);
	}
}
