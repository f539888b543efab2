//! Bridge runtime configuration

use std::env;
use std::str::FromStr;

use tracing::warn;

/// Hard upper bound on native arguments a trampoline accepts
pub const MAX_ARGUMENTS: usize = 64;

/// Reports kept before the oldest is dropped
pub const DEFAULT_REPORT_CAPACITY: usize = 256;

/// Native addresses the handle table holds before sweeping
pub const DEFAULT_HANDLE_CAPACITY: usize = 4096;

/// Options for a `BridgeRuntime`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Native argument limit for new trampolines (clamped to `MAX_ARGUMENTS`)
    pub max_arguments: usize,

    /// Capacity of the invocation report channel
    pub report_capacity: usize,

    /// Addresses the runtime's handle table holds before it sweeps
    pub handle_capacity: usize,

    /// Emit a `trace!` event for every invocation
    pub trace_invocations: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            max_arguments: MAX_ARGUMENTS,
            report_capacity: DEFAULT_REPORT_CAPACITY,
            handle_capacity: DEFAULT_HANDLE_CAPACITY,
            trace_invocations: false,
        }
    }
}

impl BridgeOptions {
    /// Set the argument limit
    pub fn max_arguments(mut self, limit: usize) -> Self {
        self.max_arguments = limit;
        self
    }

    /// Set the report channel capacity
    pub fn report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }

    /// Set the handle table capacity
    pub fn handle_capacity(mut self, capacity: usize) -> Self {
        self.handle_capacity = capacity;
        self
    }

    /// Enable or disable per-invocation tracing
    pub fn trace_invocations(mut self, enabled: bool) -> Self {
        self.trace_invocations = enabled;
        self
    }

    /// The argument limit actually enforced
    pub fn argument_limit(&self) -> usize {
        self.max_arguments.min(MAX_ARGUMENTS)
    }

    /// Defaults overridden by `SCRIPTBLOCK_MAX_ARGUMENTS`,
    /// `SCRIPTBLOCK_REPORT_CAPACITY`, `SCRIPTBLOCK_HANDLE_CAPACITY` and
    /// `SCRIPTBLOCK_TRACE_INVOCATIONS`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(limit) = env_var("SCRIPTBLOCK_MAX_ARGUMENTS") {
            options.max_arguments = limit;
        }
        if let Some(capacity) = env_var("SCRIPTBLOCK_REPORT_CAPACITY") {
            options.report_capacity = capacity;
        }
        if let Some(capacity) = env_var("SCRIPTBLOCK_HANDLE_CAPACITY") {
            options.handle_capacity = capacity;
        }
        if let Some(enabled) = env_var("SCRIPTBLOCK_TRACE_INVOCATIONS") {
            options.trace_invocations = enabled;
        }
        options
    }
}

fn env_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: "scriptblock::config", variable = name, value = %raw, "ignoring invalid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::default();
        assert_eq!(options.max_arguments, 64);
        assert_eq!(options.report_capacity, 256);
        assert_eq!(options.handle_capacity, 4096);
        assert!(!options.trace_invocations);
    }

    #[test]
    fn test_builder_setters() {
        let options = BridgeOptions::default()
            .max_arguments(8)
            .report_capacity(4)
            .handle_capacity(32)
            .trace_invocations(true);
        assert_eq!(options.argument_limit(), 8);
        assert_eq!(options.report_capacity, 4);
        assert_eq!(options.handle_capacity, 32);
        assert!(options.trace_invocations);
    }

    #[test]
    fn test_limit_is_clamped() {
        let options = BridgeOptions::default().max_arguments(1000);
        assert_eq!(options.argument_limit(), MAX_ARGUMENTS);
    }

    #[test]
    fn test_env_parsing() {
        env::set_var("SCRIPTBLOCK_TEST_OPTION_OK", " 12 ");
        env::set_var("SCRIPTBLOCK_TEST_OPTION_BAD", "twelve");
        assert_eq!(env_var::<usize>("SCRIPTBLOCK_TEST_OPTION_OK"), Some(12));
        assert_eq!(env_var::<usize>("SCRIPTBLOCK_TEST_OPTION_BAD"), None);
        assert_eq!(env_var::<bool>("SCRIPTBLOCK_TEST_OPTION_MISSING"), None);
    }
}
