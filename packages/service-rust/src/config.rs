//! Framework-level configuration for service classes.

use serde::Deserialize;

/// Which middleware stack backend committed method chains run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackBackend {
    /// Nested closures: each middleware wraps the next one.
    #[default]
    Rack,
    /// Cursor-based runner that advances an index through the stack.
    Stateful,
}

/// Settings every `ServiceClass` is created with.
///
/// Controls the stack backend used at commit time and which built-in
/// concerns are queued for inclusion.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Backend the method chains are compiled into on commit.
    pub stack_backend: StackBackend,
    /// Wrap `result` calls in a `tracing` span with status and duration.
    pub trace_calls: bool,
    /// Consult the context's stub registry before running `result`.
    pub stubs_enabled: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            stack_backend: StackBackend::Rack,
            trace_calls: true,
            stubs_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_config_defaults() {
        let config = FrameworkConfig::default();
        assert_eq!(config.stack_backend, StackBackend::Rack);
        assert!(config.trace_calls);
        assert!(config.stubs_enabled);
    }

    #[test]
    fn framework_config_from_partial_json() {
        let config: FrameworkConfig =
            serde_json::from_str(r#"{ "stack_backend": "stateful", "trace_calls": false }"#)
                .unwrap();
        assert_eq!(config.stack_backend, StackBackend::Stateful);
        assert!(!config.trace_calls);
        assert!(config.stubs_enabled);
    }
}
