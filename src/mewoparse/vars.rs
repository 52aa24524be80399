//! Mutable state shared by one execution: variables, features, positional
//! arguments, the last exit code and the global shell.

use super::value::Value;
use std::collections::{HashMap, HashSet};

/// Name to value mapping. Assignment creates or replaces.
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Enabled feature names.
///
/// Names disabled from the command line are recorded as forced off and
/// cannot be re-enabled by the file.
#[derive(Debug, Default, Clone)]
pub struct FeatureSet {
    enabled: HashSet<String>,
    forced_off: HashSet<String>,
}

impl FeatureSet {
    /// Enables a feature. Returns false when the name is forced off.
    pub fn enable(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.forced_off.contains(name) {
            return false;
        }
        self.enabled.insert(name.to_string());
        true
    }

    /// Disables a feature for the rest of the run.
    pub fn force_off(&mut self, name: &str) {
        let name = name.trim();
        self.enabled.remove(name);
        self.forced_off.insert(name.to_string());
    }

    /// Enables every name in a comma-separated list.
    pub fn enable_list(&mut self, list: &str) {
        for name in list.split(',') {
            self.enable(name);
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name.trim())
    }

    pub fn clear(&mut self) {
        self.enabled.clear();
        self.forced_off.clear();
    }
}

/// Everything one run mutates besides the statement cursor.
#[derive(Debug, Default, Clone)]
pub struct RuntimeState {
    pub vars: VariableStore,
    pub features: FeatureSet,
    /// Positional arguments, read by `$N` and `${argv}`.
    pub argv: Vec<String>,
    /// Exit code of the last command that ran, read by `$?`.
    pub last_exit_code: i32,
    pub global_shell: Option<String>,
    /// Names set from the command line; file assignments to them are skipped.
    pub pinned: HashSet<String>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable unless the name is pinned. Returns whether it was stored.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if self.pinned.contains(name) {
            return false;
        }
        self.vars.set(name, value);
        true
    }

    /// Sets and pins a variable so later file assignments leave it alone.
    pub fn pin(&mut self, name: &str, value: Value) {
        self.vars.set(name, value);
        self.pinned.insert(name.to_string());
    }

    /// Returns the state to what a fresh run sees.
    pub fn reset(&mut self) {
        self.vars.clear();
        self.features.clear();
        self.argv.clear();
        self.last_exit_code = 0;
        self.global_shell = None;
        self.pinned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_overwrites() {
        let mut vars = VariableStore::new();
        vars.set("x", Value::Number(1.0));
        vars.set("x", Value::String("two".to_string()));
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("x"), Some(&Value::String("two".to_string())));
    }

    #[test]
    fn test_forced_off_feature_cannot_be_enabled() {
        let mut features = FeatureSet::default();
        features.enable_list("fast, debug ,");
        assert!(features.is_enabled("fast"));
        assert!(features.is_enabled("debug"));

        features.force_off("debug");
        assert!(!features.enable("debug"));
        assert!(!features.is_enabled("debug"));
    }

    #[test]
    fn test_pinned_assignment_is_skipped() {
        let mut state = RuntimeState::new();
        state.pin("mode", Value::String("release".to_string()));
        assert!(!state.assign("mode", Value::String("debug".to_string())));
        assert_eq!(state.vars.get("mode").unwrap().to_string(), "release");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = RuntimeState::new();
        state.assign("a", Value::Bool(true));
        state.features.enable("f");
        state.argv.push("x".to_string());
        state.last_exit_code = 3;
        state.global_shell = Some("bash".to_string());

        state.reset();

        assert!(state.vars.is_empty());
        assert!(!state.features.is_enabled("f"));
        assert!(state.argv.is_empty());
        assert_eq!(state.last_exit_code, 0);
        assert_eq!(state.global_shell, None);
    }
}
