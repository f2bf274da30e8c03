//! Engine-wide configuration, passed by dependency injection.
//!
//! No global/singleton config per the anti-singleton redesign flag — the CLI
//! builds one `EngineConfig` from flags/env and threads it through the
//! `VariableStore` and `WorkflowOrchestrator` constructors.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::limits::ResourceLimits;

/// Configuration for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory of `*.yaml`/`*.yml` files loaded once into the Domain Defaults layer.
    pub domain_defaults_dir: Option<PathBuf>,

    /// Name/value bindings for the Environment layer, pre-filtered by the caller
    /// (the store never reads `std::env` directly).
    pub environment: HashMap<String, serde_json::Value>,

    /// Name/value bindings for the CLI layer (`--var KEY=VALUE`).
    pub cli_vars: HashMap<String, serde_json::Value>,

    /// Upper bound on concurrent per-host workers within one task.
    pub worker_cap: usize,

    /// Default dry-run flag, overridable by the workflow file.
    pub default_dry_run: bool,

    /// Timeout/retry/circuit-breaker policy for the Host Runner.
    pub limits: ResourceLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            domain_defaults_dir: None,
            environment: HashMap::new(),
            cli_vars: HashMap::new(),
            worker_cap: 64,
            default_dry_run: false,
            limits: ResourceLimits::production(),
        }
    }
}

impl EngineConfig {
    pub fn testing() -> Self {
        Self {
            worker_cap: 4,
            limits: ResourceLimits::testing(),
            ..Self::default()
        }
    }

    pub fn with_domain_defaults_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.domain_defaults_dir = Some(dir.into());
        self
    }

    pub fn with_cli_var(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.cli_vars.insert(name.into(), value);
        self
    }

    pub fn with_environment(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.environment.insert(name.into(), value);
        self
    }

    pub fn with_worker_cap(mut self, cap: usize) -> Self {
        self.worker_cap = cap.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.default_dry_run = dry_run;
        self
    }
}
