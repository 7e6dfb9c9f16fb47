use std::time::Duration;

use anyhow::Context;
use gw_runtime::Session;
use serde_json::Value;

use super::print_json;
use crate::cli::CallArgs;
use crate::error::CliError;

pub async fn execute(session: &Session, args: CallArgs) -> anyhow::Result<()> {
	let params = parse_params(&args.params)?;
	let timeout = args
		.timeout_ms
		.map(Duration::from_millis)
		.unwrap_or_else(|| session.config().request_timeout());

	let payload = session
		.request_with_timeout(&args.method, params, timeout)
		.await
		.with_context(|| format!("{} failed", args.method))?;
	print_json(&payload)
}

/// Parses the params argument; only objects and arrays are valid params.
pub(crate) fn parse_params(raw: &str) -> Result<Value, CliError> {
	let value: Value = serde_json::from_str(raw).map_err(|e| CliError::InvalidParams(e.to_string()))?;
	match value {
		Value::Object(_) | Value::Array(_) => Ok(value),
		other => Err(CliError::InvalidParams(format!("got {other}"))),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn params_must_be_structured() {
		assert_eq!(parse_params(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
		assert_eq!(parse_params("[1, 2]").unwrap(), json!([1, 2]));
		assert!(matches!(parse_params("42"), Err(CliError::InvalidParams(_))));
		assert!(matches!(parse_params("{oops"), Err(CliError::InvalidParams(_))));
	}
}
