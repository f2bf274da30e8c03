//! # Host Proxy (C3)
//!
//! Per-host view presented to templates as `host.*`.
//!
//! The original implementation mutates a thread-local "current host" on a
//! shared proxy object. Per REDESIGN FLAGS §9, the host view is passed as an
//! explicit template context key (`json!({"host": proxy.to_json(), ...})`)
//! rather than read from mutable state at render time — the proxy is a pure
//! value at the templating seam. The `current_host_name` cell is kept only
//! for the task-function seam (`TaskContext::host`), where ambient access is
//! part of the §6 task catalog contract, and is implemented with
//! `tokio::task_local!` rather than `std::thread_local!` since a spawned
//! async task may migrate OS threads across `.await` points — a plain
//! thread-local would silently leak one host's identity into another's
//! concurrently-running task invocation.

use serde_json::{json, Map, Value};

/// Read-only per-host attributes exposed to templates and task bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct HostProxy {
    pub name: String,
    pub hostname: String,
    pub platform: Option<String>,
    pub groups: Vec<String>,
    pub data: Map<String, Value>,
}

impl HostProxy {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        platform: Option<String>,
        groups: Vec<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            platform,
            groups,
            data,
        }
    }

    /// Renders this proxy as the `host` namespace value injected into the
    /// template context.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "hostname": self.hostname,
            "platform": self.platform,
            "groups": self.groups,
            "data": self.data,
        })
    }
}

tokio::task_local! {
    /// The host currently under evaluation, for the task (not the async thread)
    /// running its per-host invocation. Set before `task_instance_started` and
    /// cleared after `task_instance_completed`, never shared across hosts.
    static CURRENT_HOST_NAME: String;
}

/// Errors accessing the current host outside of a scoped invocation.
#[derive(Debug, thiserror::Error)]
#[error("host proxy accessed with no host currently under evaluation")]
pub struct NoCurrentHostError;

/// Runs `f` with `host_name` bound as the current host for the duration of
/// the future, matching the spec's "set before, clear after" lifecycle.
pub async fn with_current_host<F, Fut, T>(host_name: String, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    CURRENT_HOST_NAME.scope(host_name, f()).await
}

/// Reads the current host name, failing clearly if none is bound.
pub fn current_host_name() -> Result<String, NoCurrentHostError> {
    CURRENT_HOST_NAME
        .try_with(|name| name.clone())
        .map_err(|_| NoCurrentHostError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_shape() {
        let mut data = Map::new();
        data.insert("role".into(), json!("edge"));
        let proxy = HostProxy::new("r1", "r1.example.com", Some("ios".into()), vec!["core".into()], data);
        let j = proxy.to_json();
        assert_eq!(j["name"], json!("r1"));
        assert_eq!(j["platform"], json!("ios"));
        assert_eq!(j["groups"], json!(["core"]));
        assert_eq!(j["data"]["role"], json!("edge"));
    }

    #[tokio::test]
    async fn test_current_host_scoped() {
        assert!(current_host_name().is_err());

        with_current_host("r1".to_string(), || async {
            assert_eq!(current_host_name().unwrap(), "r1");
        })
        .await;

        assert!(current_host_name().is_err());
    }

    #[tokio::test]
    async fn test_current_host_isolated_across_concurrent_tasks() {
        let a = tokio::spawn(with_current_host("a".to_string(), || async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            current_host_name().unwrap()
        }));
        let b = tokio::spawn(with_current_host("b".to_string(), || async {
            current_host_name().unwrap()
        }));

        let (a_name, b_name) = tokio::join!(a, b);
        assert_eq!(a_name.unwrap(), "a");
        assert_eq!(b_name.unwrap(), "b");
    }
}
