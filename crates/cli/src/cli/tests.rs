use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn parse_call_command() {
	let args = vec!["gw", "call", "chat.history", r#"{"sessionKey":"main"}"#, "--timeout-ms", "500"];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Call(args) => {
			assert_eq!(args.method, "chat.history");
			assert_eq!(args.params, r#"{"sessionKey":"main"}"#);
			assert_eq!(args.timeout_ms, Some(500));
		}
		_ => panic!("Expected Call command"),
	}
}

#[test]
fn parse_call_default_params() {
	let cli = Cli::try_parse_from(["gw", "call", "health"]).unwrap();

	match cli.command {
		Commands::Call(args) => {
			assert_eq!(args.params, "{}");
			assert_eq!(args.timeout_ms, None);
		}
		_ => panic!("Expected Call command"),
	}
}

#[test]
fn parse_chat_command() {
	let args = vec!["gw", "chat", "hello there", "-s", "work", "--idempotency-key", "k1"];
	let cli = Cli::try_parse_from(args).unwrap();

	match cli.command {
		Commands::Chat(args) => {
			assert_eq!(args.message, "hello there");
			assert_eq!(args.session, "work");
			assert_eq!(args.idempotency_key.as_deref(), Some("k1"));
			assert!(!args.no_wait);
		}
		_ => panic!("Expected Chat command"),
	}
}

#[test]
fn parse_chat_defaults_to_main_session() {
	let cli = Cli::try_parse_from(["gw", "chat", "hi", "--no-wait"]).unwrap();

	match cli.command {
		Commands::Chat(args) => {
			assert_eq!(args.session, "main");
			assert!(args.no_wait);
		}
		_ => panic!("Expected Chat command"),
	}
}

#[test]
fn parse_watch_filters() {
	let cli = Cli::try_parse_from(["gw", "watch", "-e", "agent.event", "--event", "tick", "-n", "10"]).unwrap();

	match cli.command {
		Commands::Watch(args) => {
			assert_eq!(args.events, vec!["agent.event", "tick"]);
			assert_eq!(args.count, Some(10));
		}
		_ => panic!("Expected Watch command"),
	}
}

#[test]
fn parse_abort_with_reason() {
	let cli = Cli::try_parse_from(["gw", "abort", "run-1", "--reason", "stop"]).unwrap();

	match cli.command {
		Commands::Abort(args) => {
			assert_eq!(args.run_id, "run-1");
			assert_eq!(args.reason.as_deref(), Some("stop"));
		}
		_ => panic!("Expected Abort command"),
	}
}

#[test]
fn global_flags_after_subcommand() {
	let args = vec![
		"gw",
		"status",
		"-vv",
		"--url",
		"wss://gateway.example.com/ws",
		"--token",
		"t0k",
		"--config",
		"/tmp/gw.json",
	];
	let cli = Cli::try_parse_from(args).unwrap();

	assert!(matches!(cli.command, Commands::Status));
	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.url.as_deref(), Some("wss://gateway.example.com/ws"));
	assert_eq!(cli.token.as_deref(), Some("t0k"));
	assert_eq!(cli.config, Some(PathBuf::from("/tmp/gw.json")));
}

#[test]
fn subcommand_is_required() {
	assert!(Cli::try_parse_from(["gw", "-v"]).is_err());
	assert!(Cli::try_parse_from(["gw", "call"]).is_err());
}
