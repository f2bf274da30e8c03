//! # Variable Store (C2)
//!
//! Holds all variable layers; resolves names per host with deterministic
//! precedence; exposes per-host "device context" snapshots.
//!
//! Grounded on `examples/supernovae-st-nika/src/runner/context.rs`'s
//! `GlobalContext`/`LocalContext` split (shared-vs-isolated state), adapted
//! from "one shared context + one isolated snapshot" to N independent
//! per-host runtime partitions living alongside a shared, read-only stack of
//! layers.

pub mod host_proxy;

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::error::NornFlowError;
use crate::inventory::Inventory;
use crate::template::TemplateService;

pub use host_proxy::HostProxy;

/// Layer precedence, highest first — mirrors §3 exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Runtime,
    Cli,
    Environment,
    Workflow,
    DomainDefaults,
}

/// The layered, per-host variable store.
pub struct VariableStore {
    /// Per-host runtime partitions, created lazily on first write.
    runtime: DashMap<String, Map<String, Value>>,
    cli: Map<String, Value>,
    environment: Map<String, Value>,
    workflow: Map<String, Value>,
    domain_defaults: Map<String, Value>,
    inventory: Arc<Inventory>,
    templates: Arc<TemplateService>,
}

impl VariableStore {
    pub fn new(
        inventory: Arc<Inventory>,
        templates: Arc<TemplateService>,
        cli: Map<String, Value>,
        environment: Map<String, Value>,
        workflow: Map<String, Value>,
        domain_defaults_dir: Option<&Path>,
    ) -> Result<Self, NornFlowError> {
        let domain_defaults = load_domain_defaults(domain_defaults_dir)?;
        Ok(Self {
            runtime: DashMap::new(),
            cli,
            environment,
            workflow,
            domain_defaults,
            inventory,
            templates,
        })
    }

    /// Walks layers in precedence order; stops at the first match.
    pub fn get(&self, name: &str, host: &str) -> Option<Value> {
        if let Some(partition) = self.runtime.get(host) {
            if let Some(v) = partition.get(name) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.cli.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.environment.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.workflow.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.domain_defaults.get(name) {
            return Some(v.clone());
        }
        None
    }

    /// Binds `name` in the runtime layer for `host`, creating the partition
    /// on first use. Never affects any other host's view of `name`.
    pub fn set_runtime(&self, name: &str, value: Value, host: &str) {
        self.runtime
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Builds the merged device-context mapping for `host`: runtime overlaid
    /// on CLI overlaid on environment overlaid on workflow overlaid on domain
    /// defaults, plus the `host` namespace from the Host Proxy.
    pub fn device_context(&self, host: &str) -> Result<Map<String, Value>, NornFlowError> {
        let mut merged = self.domain_defaults.clone();
        deep_merge(&mut merged, &self.workflow);
        deep_merge(&mut merged, &self.environment);
        deep_merge(&mut merged, &self.cli);
        if let Some(partition) = self.runtime.get(host) {
            deep_merge(&mut merged, &partition);
        }

        let proxy = self.host_proxy(host)?;
        merged.insert("host".to_string(), proxy.to_json());
        Ok(merged)
    }

    fn host_proxy(&self, host: &str) -> Result<HostProxy, NornFlowError> {
        let h = self
            .inventory
            .host(host)
            .ok_or_else(|| NornFlowError::Load(format!("unknown host: '{host}'")))?;
        Ok(HostProxy::new(
            h.name.clone(),
            h.hostname.clone(),
            h.platform.clone(),
            h.groups.clone(),
            self.inventory.merged_data_for(host),
        ))
    }

    /// The shared layers merged without any per-host overlay or `host`
    /// namespace — used by task-scoped (not host-scoped) hook parameters
    /// such as `shush`'s, which run once per task rather than once per host.
    pub fn device_context_shared(&self) -> Map<String, Value> {
        let mut merged = self.domain_defaults.clone();
        deep_merge(&mut merged, &self.workflow);
        deep_merge(&mut merged, &self.environment);
        deep_merge(&mut merged, &self.cli);
        merged
    }

    /// `resolve_to_bool` against the shared (no-host) context.
    pub fn resolve_to_bool_shared(&self, v: &Value) -> Result<bool, NornFlowError> {
        let ctx = self.device_context_shared();
        self.templates.resolve_to_bool(v, &ctx)
    }

    /// Shorthand: build the device context then render a single string.
    pub fn resolve_string(&self, template: &str, host: &str) -> Result<String, NornFlowError> {
        let ctx = self.device_context(host)?;
        self.templates.render(template, &ctx)
    }

    /// Shorthand: build the device context then recursively render `x`.
    pub fn resolve_data(&self, x: &Value, host: &str) -> Result<Value, NornFlowError> {
        let ctx = self.device_context(host)?;
        self.templates.render_data(x, &ctx)
    }
}

/// Deep-merges `overlay` into `base` in place: maps merge key-by-key
/// recursively; every other value type (including lists) is replaced
/// wholesale by the overlay's value. Lists are never concatenated — this
/// matches the original implementation's `deep_merge` semantics exactly
/// (see SPEC_FULL §9 Open Questions).
pub(crate) fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (k, v) in overlay {
        match (base.get_mut(k), v) {
            (Some(Value::Object(base_map)), Value::Object(overlay_map)) => {
                deep_merge(base_map, overlay_map);
            }
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Loads every `*.yaml`/`*.yml` file directly under `dir` (non-recursive),
/// sorted by filename, merging later files over earlier ones on key
/// collision. A missing directory yields an empty layer, not an error.
fn load_domain_defaults(dir: Option<&Path>) -> Result<Map<String, Value>, NornFlowError> {
    let mut merged = Map::new();
    let Some(dir) = dir else {
        return Ok(merged);
    };
    if !dir.is_dir() {
        return Ok(merged);
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let doc: Value = serde_yaml::from_str(&text)?;
        if let Value::Object(map) = doc {
            deep_merge(&mut merged, &map);
        }
    }
    Ok(merged)
}
