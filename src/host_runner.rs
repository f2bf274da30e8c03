//! # Host Runner (C10, ambient)
//!
//! The seam between task bodies and an actual device connection. Real
//! transport (SSH/NETCONF/etc.) is explicitly out of scope (Non-goals, §2)
//! — this module exists so the Task Runner has something to dispatch
//! through, and so a future transport plugin has a trait to implement
//! against instead of NornFlow needing a rewrite.
//!
//! Grounded on `examples/supernovae-st-nika/src/provider/mock.rs`'s
//! `MockProvider` (an in-memory stand-in behind the same trait a real
//! provider would implement, used throughout the teacher's own test suite).

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::NornFlowError;

/// Abstracts "do the task body's work against this host's device
/// connection." NornFlow's built-in tasks (`set`, `echo`, `write_file`) run
/// entirely local and don't reach for a `HostRunner` at all; the trait and
/// its mock exist so C10's seam is present in the crate the way a real
/// transport plugin would need it, without this crate itself shipping one
/// (Non-goals, §2).
#[async_trait]
pub trait HostRunner: Send + Sync {
    /// Opens (or reuses) a connection/session for `host`. A no-op for
    /// runners with no real transport, like [`MockHostRunner`].
    async fn connect(&self, host: &str) -> Result<(), NornFlowError>;

    /// Sends `command` to `host` and returns its raw response payload.
    async fn execute(&self, host: &str, command: &str, args: &Map<String, Value>) -> Result<Value, NornFlowError>;

    /// Releases any resources opened by `connect`.
    async fn disconnect(&self, host: &str) -> Result<(), NornFlowError>;
}

/// In-memory host runner with no real transport: `connect`/`disconnect` are
/// no-ops, and `execute` echoes back a deterministic, inspectable record of
/// what it was asked to do. Used by default and throughout this crate's own
/// tests, matching the teacher's `MockProvider` role in its test suite.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockHostRunner;

#[async_trait]
impl HostRunner for MockHostRunner {
    async fn connect(&self, _host: &str) -> Result<(), NornFlowError> {
        Ok(())
    }

    async fn execute(&self, host: &str, command: &str, args: &Map<String, Value>) -> Result<Value, NornFlowError> {
        Ok(serde_json::json!({
            "host": host,
            "command": command,
            "args": args,
            "simulated": true,
        }))
    }

    async fn disconnect(&self, _host: &str) -> Result<(), NornFlowError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_runner_round_trip() {
        let runner = MockHostRunner;
        runner.connect("r1").await.unwrap();
        let mut args = Map::new();
        args.insert("cmd".into(), json!("show version"));
        let result = runner.execute("r1", "show_version", &args).await.unwrap();
        assert_eq!(result["host"], json!("r1"));
        assert_eq!(result["simulated"], json!(true));
        runner.disconnect("r1").await.unwrap();
    }
}
