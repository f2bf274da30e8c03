//! # Inventory (C8, ambient)
//!
//! Loads hosts/groups from YAML; exposes the fleet the Orchestrator filters.
//! Not part of the kernel proper (§1 names YAML discovery out of kernel
//! scope) but required for a runnable crate.
//!
//! Grounded on `examples/supernovae-st-nika/src/workflow.rs`'s serde struct
//! layout and `#[serde(deny_unknown_fields)]` discipline, generalized from
//! workflow-file parsing to inventory-file parsing.

use std::collections::HashMap;

use dashmap::DashSet;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::NornFlowError;
use crate::vars::deep_merge;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostDecl {
    hostname: Option<String>,
    platform: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupDecl {
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventoryDoc {
    #[serde(default)]
    hosts: HashMap<String, HostDecl>,
    #[serde(default)]
    groups: HashMap<String, GroupDecl>,
}

/// One host's resolved identity. `data` here is the host's *own* data block,
/// not yet merged with group data — see [`Inventory::merged_data_for`].
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub name: String,
    pub hostname: String,
    pub platform: Option<String>,
    pub groups: Vec<String>,
    pub data: Map<String, Value>,
}

/// A loaded, immutable fleet of hosts and groups. Also owns the process-wide
/// "suppressed task" set the `shush` hook marks/clears around a task's
/// run-once-per-task lifecycle (§4.5) — not fleet data proper, but it has no
/// other natural home since it must outlive any single task invocation.
#[derive(Debug)]
pub struct Inventory {
    hosts: HashMap<String, Host>,
    group_data: HashMap<String, Map<String, Value>>,
    suppressed_tasks: DashSet<String>,
}

impl Inventory {
    pub fn from_yaml(text: &str) -> Result<Self, NornFlowError> {
        let doc: InventoryDoc = serde_yaml::from_str(text)?;

        let group_data = doc
            .groups
            .into_iter()
            .map(|(name, g)| (name, g.data))
            .collect::<HashMap<_, _>>();

        let hosts = doc
            .hosts
            .into_iter()
            .map(|(name, h)| {
                let hostname = h.hostname.unwrap_or_else(|| name.clone());
                (
                    name.clone(),
                    Host {
                        name,
                        hostname,
                        platform: h.platform,
                        groups: h.groups,
                        data: h.data,
                    },
                )
            })
            .collect();

        Ok(Self {
            hosts,
            group_data,
            suppressed_tasks: DashSet::new(),
        })
    }

    pub fn empty() -> Self {
        Self {
            hosts: HashMap::new(),
            group_data: HashMap::new(),
            suppressed_tasks: DashSet::new(),
        }
    }

    /// Marks `task_name` as suppressed — called by the `shush` hook's
    /// `task_started` callback when its condition is truthy.
    pub fn suppress_task(&self, task_name: &str) {
        self.suppressed_tasks.insert(task_name.to_string());
    }

    /// Clears `task_name`'s suppression — called by `shush`'s
    /// `task_completed` callback, regardless of whether it was ever set.
    pub fn unsuppress_task(&self, task_name: &str) {
        self.suppressed_tasks.remove(task_name);
    }

    pub fn is_task_suppressed(&self, task_name: &str) -> bool {
        self.suppressed_tasks.contains(task_name)
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// All host names, in a stable (sorted) order — used as the default
    /// candidate list before any workflow-scope filtering is applied.
    pub fn all_host_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.keys().cloned().collect();
        names.sort();
        names
    }

    /// Hosts matching the given name list and/or group list. An empty filter
    /// (both lists empty) selects every host. Order follows `all_host_names`.
    pub fn filtered_host_names(&self, names: &[String], groups: &[String]) -> Vec<String> {
        if names.is_empty() && groups.is_empty() {
            return self.all_host_names();
        }
        self.all_host_names()
            .into_iter()
            .filter(|n| {
                names.contains(n)
                    || self
                        .hosts
                        .get(n)
                        .map(|h| h.groups.iter().any(|g| groups.contains(g)))
                        .unwrap_or(false)
            })
            .collect()
    }

    /// As [`Self::filtered_host_names`], additionally narrowed by a workflow's
    /// free-form `inventory_filters` k/v pairs (§6): a host must match every
    /// pair against its merged (group + own) data to stay in the candidate
    /// set. An empty `extra` map leaves the `names`/`groups` selection as-is.
    pub fn filtered_host_names_with_extra(
        &self,
        names: &[String],
        groups: &[String],
        extra: &Map<String, Value>,
    ) -> Vec<String> {
        let base = self.filtered_host_names(names, groups);
        if extra.is_empty() {
            return base;
        }
        base.into_iter()
            .filter(|n| {
                let merged = self.merged_data_for(n);
                extra.iter().all(|(k, v)| merged.get(k) == Some(v))
            })
            .collect()
    }

    /// Host data merged with its groups' data (groups are lower precedence
    /// than the host's own data block; among groups, later-declared groups
    /// in the host's `groups` list win on collision).
    pub fn merged_data_for(&self, host_name: &str) -> Map<String, Value> {
        let mut merged = Map::new();
        let Some(host) = self.hosts.get(host_name) else {
            return merged;
        };
        for group in &host.groups {
            if let Some(data) = self.group_data.get(group) {
                deep_merge(&mut merged, data);
            }
        }
        deep_merge(&mut merged, &host.data);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
hosts:
  r1:
    hostname: r1.example.com
    platform: ios
    groups: [core, edge]
    data:
      role: leaf
  r2:
    platform: ios
groups:
  core:
    data:
      region: us-east
  edge:
    data:
      role: spine
"#;

    #[test]
    fn test_parses_hosts_and_groups() {
        let inv = Inventory::from_yaml(YAML).unwrap();
        assert_eq!(inv.all_host_names(), vec!["r1", "r2"]);
        let r1 = inv.host("r1").unwrap();
        assert_eq!(r1.hostname, "r1.example.com");
        assert_eq!(r1.groups, vec!["core", "edge"]);
    }

    #[test]
    fn test_hostname_defaults_to_name() {
        let inv = Inventory::from_yaml(YAML).unwrap();
        let r2 = inv.host("r2").unwrap();
        assert_eq!(r2.hostname, "r2");
    }

    #[test]
    fn test_merged_data_group_then_host_precedence() {
        let inv = Inventory::from_yaml(YAML).unwrap();
        let merged = inv.merged_data_for("r1");
        assert_eq!(merged["region"], json!("us-east"));
        // host's own `role: leaf` overrides edge group's `role: spine`
        assert_eq!(merged["role"], json!("leaf"));
    }

    #[test]
    fn test_filtered_host_names_by_group() {
        let inv = Inventory::from_yaml(YAML).unwrap();
        let filtered = inv.filtered_host_names(&[], &["core".to_string()]);
        assert_eq!(filtered, vec!["r1"]);
    }

    #[test]
    fn test_extra_keys_rejected() {
        let bad = "hosts:\n  r1:\n    bogus_field: 1\n";
        assert!(Inventory::from_yaml(bad).is_err());
    }

    #[test]
    fn test_filtered_host_names_with_extra_matches_merged_data() {
        let inv = Inventory::from_yaml(YAML).unwrap();
        let mut extra = Map::new();
        extra.insert("role".into(), json!("leaf"));
        let filtered = inv.filtered_host_names_with_extra(&[], &[], &extra);
        assert_eq!(filtered, vec!["r1"]);
    }

    #[test]
    fn test_filtered_host_names_with_extra_narrows_group_selection() {
        let inv = Inventory::from_yaml(YAML).unwrap();
        let mut extra = Map::new();
        extra.insert("role".into(), json!("spine"));
        let filtered = inv.filtered_host_names_with_extra(&[], &["core".to_string()], &extra);
        assert!(filtered.is_empty());
    }
}
