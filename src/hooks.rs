//! # Hook Registry (C5)
//!
//! Built-in task hooks (`set_to`, `shush`) plus the registry that resolves a
//! hook name to a validated, parameterized instance at workflow load time.
//!
//! Per REDESIGN FLAGS §9, hook capabilities are an explicit, declared struct
//! rather than `hasattr`-style dynamic dispatch on the original's hook
//! objects — grounded on `examples/supernovae-st-nika/src/limits.rs`'s
//! explicit-profile idiom (`ResourceLimits::testing()`/`production()` as
//! named, inspectable configurations rather than ad-hoc flag soup) and on
//! `examples/original_source/nornflow/builtins/hooks.py` /
//! `tests/unit/builtins/test_shush_hook.py` for the two built-ins' exact
//! runtime behavior.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::NornFlowError;
use crate::inventory::Inventory;
use crate::result::AggregatedResult;
use crate::template::contains_template_markers;
use crate::vars::VariableStore;

/// Declared capabilities of a hook kind. Orchestrator/Task Runner code
/// branches on these flags instead of probing for optional methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookCapabilities {
    pub filters_hosts: bool,
    pub processes_results: bool,
    pub mutates_variables: bool,
}

/// Read-only bundle a hook's lifecycle callbacks need, beyond their own
/// parameter — kept as one struct so the trait's method signatures don't
/// grow a new parameter every time a built-in needs one more collaborator.
pub struct HookEnv<'a> {
    pub store: &'a VariableStore,
    pub inventory: &'a Inventory,
    /// Whether any processor in the active chain declares
    /// `supports_shush_hook` — `shush` is a no-op, with a warning, otherwise.
    pub any_processor_supports_shush: bool,
}

/// A hook *kind*: the stateless behavior behind a registered hook name. Each
/// task's declared hook parameter is paired with one of these to form a
/// [`HookInstance`].
pub trait HookKind: Send + Sync {
    fn hook_name(&self) -> &'static str;

    /// True if this hook runs once per task rather than once per host.
    fn run_once_per_task(&self) -> bool;

    fn requires_deferred_templates(&self) -> bool {
        false
    }

    fn capabilities(&self) -> HookCapabilities;

    /// Load-time parameter validation (`execute_hook_validations`, §4.5).
    fn validate(&self, param: &Value) -> Result<(), NornFlowError>;

    /// Narrows the candidate host list for the owning task. Only called for
    /// hooks with `filters_hosts = true`.
    fn filter_hosts(&self, _param: &Value, candidate_hosts: &[String], _env: &HookEnv) -> Vec<String> {
        candidate_hosts.to_vec()
    }

    /// Post-processes a task's aggregated results. Only called for hooks
    /// with `processes_results = true`.
    fn process_results(
        &self,
        _param: &Value,
        _aggregated: &AggregatedResult,
        _env: &HookEnv,
    ) -> Result<(), NornFlowError> {
        Ok(())
    }

    /// Fires once before a task's host fan-out begins. Only meaningful for
    /// `run_once_per_task` hooks (`shush`).
    fn task_started(&self, _param: &Value, _task_name: &str, _env: &HookEnv) -> Result<(), NornFlowError> {
        Ok(())
    }

    /// Fires once after a task's host fan-out (and `process_results`) ends.
    fn task_completed(&self, _param: &Value, _task_name: &str, _env: &HookEnv) {}
}

/// A hook bound to a specific task's declared parameter, post-validation.
pub struct HookInstance {
    kind: Arc<dyn HookKind>,
    pub param: Value,
}

impl HookInstance {
    pub fn name(&self) -> &'static str {
        self.kind.hook_name()
    }

    pub fn run_once_per_task(&self) -> bool {
        self.kind.run_once_per_task()
    }

    pub fn requires_deferred_templates(&self) -> bool {
        self.kind.requires_deferred_templates()
    }

    pub fn capabilities(&self) -> HookCapabilities {
        self.kind.capabilities()
    }

    pub fn filter_hosts(&self, candidate_hosts: &[String], env: &HookEnv) -> Vec<String> {
        self.kind.filter_hosts(&self.param, candidate_hosts, env)
    }

    pub fn process_results(&self, aggregated: &AggregatedResult, env: &HookEnv) -> Result<(), NornFlowError> {
        self.kind.process_results(&self.param, aggregated, env)
    }

    pub fn task_started(&self, task_name: &str, env: &HookEnv) -> Result<(), NornFlowError> {
        self.kind.task_started(&self.param, task_name, env)
    }

    pub fn task_completed(&self, task_name: &str, env: &HookEnv) {
        self.kind.task_completed(&self.param, task_name, env)
    }
}

/// Resolves hook names declared in workflow YAML to validated instances.
pub struct HookRegistry {
    kinds: HashMap<&'static str, Arc<dyn HookKind>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HookRegistry {
    pub fn with_builtins() -> Self {
        let mut kinds: HashMap<&'static str, Arc<dyn HookKind>> = HashMap::new();
        kinds.insert("set_to", Arc::new(SetToHook));
        kinds.insert("shush", Arc::new(ShushHook));
        Self { kinds }
    }

    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: Arc<dyn HookKind>) {
        self.kinds.insert(kind.hook_name(), kind);
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Resolves `name` and validates `param` against it, per §4.5's
    /// load-time `execute_hook_validations` pass.
    pub fn instantiate(&self, name: &str, param: Value) -> Result<HookInstance, NornFlowError> {
        let kind = self.kinds.get(name).cloned().ok_or_else(|| NornFlowError::HookValidation {
            hook_name: name.to_string(),
            message: "unknown hook".to_string(),
        })?;
        kind.validate(&param)?;
        Ok(HookInstance { kind, param })
    }
}

/// Built-in post-hook: writes a successful task's per-host payload into the
/// runtime variable layer under the name given as the hook's parameter.
///
/// Grounded on `nornflow/builtins/hooks.py`'s `set_to` — the parameter is a
/// bare variable name, not a template, and only successful (non-failed)
/// per-host results are written.
pub struct SetToHook;

impl HookKind for SetToHook {
    fn hook_name(&self) -> &'static str {
        "set_to"
    }

    fn run_once_per_task(&self) -> bool {
        false
    }

    fn capabilities(&self) -> HookCapabilities {
        HookCapabilities {
            processes_results: true,
            mutates_variables: true,
            ..Default::default()
        }
    }

    fn validate(&self, param: &Value) -> Result<(), NornFlowError> {
        match param.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err(NornFlowError::HookValidation {
                hook_name: self.hook_name().to_string(),
                message: "parameter must be a non-empty variable name string".to_string(),
            }),
        }
    }

    fn process_results(
        &self,
        param: &Value,
        aggregated: &AggregatedResult,
        env: &HookEnv,
    ) -> Result<(), NornFlowError> {
        let name = param.as_str().expect("validated at load time");
        for r in aggregated {
            if r.failed {
                continue;
            }
            if let Some(payload) = &r.payload {
                env.store.set_runtime(name, payload.clone(), &r.host);
            }
        }
        Ok(())
    }
}

/// Built-in pre-hook: when its (possibly templated) condition is truthy,
/// suppresses a task's per-host output reporting for the task's whole
/// run-once-per-task lifetime — but only if some processor in the active
/// chain actually knows how to honor suppression. Otherwise it warns and is
/// a no-op, exactly as `test_shush_hook.py` exercises.
pub struct ShushHook;

impl HookKind for ShushHook {
    fn hook_name(&self) -> &'static str {
        "shush"
    }

    fn run_once_per_task(&self) -> bool {
        true
    }

    fn capabilities(&self) -> HookCapabilities {
        HookCapabilities::default()
    }

    /// A plain string with no template markers is ambiguous (is "false" the
    /// literal word, or a stand-in for a missing `{{ }}`?) and is rejected;
    /// booleans and template strings are accepted.
    fn validate(&self, param: &Value) -> Result<(), NornFlowError> {
        match param {
            Value::Bool(_) => Ok(()),
            Value::String(s) if contains_template_markers(s) => Ok(()),
            Value::String(_) => Err(NornFlowError::HookValidation {
                hook_name: self.hook_name().to_string(),
                message: "parameter must be a bool or a template expression with Jinja2 markers, \
                          got a plain string without Jinja2 markers"
                    .to_string(),
            }),
            _ => Err(NornFlowError::HookValidation {
                hook_name: self.hook_name().to_string(),
                message: "parameter must be a bool or a template string".to_string(),
            }),
        }
    }

    fn task_started(&self, param: &Value, task_name: &str, env: &HookEnv) -> Result<(), NornFlowError> {
        if !env.store.resolve_to_bool_shared(param)? {
            return Ok(());
        }
        if env.any_processor_supports_shush {
            env.inventory.suppress_task(task_name);
        } else {
            tracing::warn!(
                "'shush' hook has no effect - task '{task_name}' has no compatible processor \
                 found in chain. Outputs are not going to be suppressed."
            );
        }
        Ok(())
    }

    fn task_completed(&self, _param: &Value, task_name: &str, env: &HookEnv) {
        env.inventory.unsuppress_task(task_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use crate::template::TemplateService;
    use crate::result::HostResult;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    fn env_with<'a>(store: &'a VariableStore, inventory: &'a Inventory, shush_supported: bool) -> HookEnv<'a> {
        HookEnv {
            store,
            inventory,
            any_processor_supports_shush: shush_supported,
        }
    }

    fn store_and_inventory() -> (VariableStore, Inventory) {
        let inv = Inventory::from_yaml("hosts:\n  r1: {}\n  r2: {}\n").unwrap();
        let inv_arc = StdArc::new(Inventory::from_yaml("hosts:\n  r1: {}\n  r2: {}\n").unwrap());
        let store = VariableStore::new(
            inv_arc,
            StdArc::new(TemplateService::new()),
            Default::default(),
            Default::default(),
            Default::default(),
            None,
        )
        .unwrap();
        (store, inv)
    }

    #[test]
    fn test_registry_resolves_builtins() {
        let registry = HookRegistry::with_builtins();
        assert!(registry.is_known("set_to"));
        assert!(registry.is_known("shush"));
        assert!(!registry.is_known("nonexistent"));
    }

    #[test]
    fn test_set_to_rejects_non_string_param() {
        let registry = HookRegistry::with_builtins();
        assert!(registry.instantiate("set_to", json!(42)).is_err());
        assert!(registry.instantiate("set_to", json!("result_var")).is_ok());
    }

    #[test]
    fn test_shush_rejects_plain_string_without_markers() {
        let registry = HookRegistry::with_builtins();
        assert!(registry.instantiate("shush", json!("false")).is_err());
        assert!(registry.instantiate("shush", json!(true)).is_ok());
        assert!(registry.instantiate("shush", json!("{{ quiet }}")).is_ok());
    }

    #[test]
    fn test_set_to_writes_successful_payloads_only() {
        let (store, inv) = store_and_inventory();
        let env = env_with(&store, &inv, true);
        let hook = HookRegistry::with_builtins().instantiate("set_to", json!("backup")).unwrap();

        let aggregated = vec![
            HostResult::ok("r1", "echo", json!({"msg": "hi"})),
            HostResult::failed("r2", "echo", "boom"),
        ];
        hook.process_results(&aggregated, &env).unwrap();

        assert_eq!(store.get("backup", "r1"), Some(json!({"msg": "hi"})));
        assert_eq!(store.get("backup", "r2"), None);
    }

    #[test]
    fn test_shush_suppresses_when_processor_supports_it() {
        let (store, inv) = store_and_inventory();
        let env = env_with(&store, &inv, true);
        let hook = HookRegistry::with_builtins().instantiate("shush", json!(true)).unwrap();

        hook.task_started("backup-configs", &env).unwrap();
        assert!(inv.is_task_suppressed("backup-configs"));

        hook.task_completed("backup-configs", &env);
        assert!(!inv.is_task_suppressed("backup-configs"));
    }

    #[test]
    fn test_shush_noop_without_compatible_processor() {
        let (store, inv) = store_and_inventory();
        let env = env_with(&store, &inv, false);
        let hook = HookRegistry::with_builtins().instantiate("shush", json!(true)).unwrap();

        hook.task_started("backup-configs", &env).unwrap();
        assert!(!inv.is_task_suppressed("backup-configs"));
    }

    #[test]
    fn test_shush_false_condition_is_noop() {
        let (store, inv) = store_and_inventory();
        let env = env_with(&store, &inv, true);
        let hook = HookRegistry::with_builtins().instantiate("shush", json!(false)).unwrap();

        hook.task_started("backup-configs", &env).unwrap();
        assert!(!inv.is_task_suppressed("backup-configs"));
    }
}
