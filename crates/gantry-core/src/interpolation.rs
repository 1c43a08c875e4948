//! `${{ ... }}` expression interpolation for step commands.

use crate::job::JobInstance;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").expect("interpolation pattern is valid")
});

/// Context for variable interpolation.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    /// Job-level and step-level environment variables
    pub env: BTreeMap<String, String>,
    /// Matrix values for the current instance, including `os`
    pub matrix: BTreeMap<String, String>,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context exposing the resolved overrides of `instance` as `matrix.*`.
    pub fn for_instance(instance: &JobInstance) -> Self {
        let mut matrix = instance.resolved_overrides.clone();
        matrix.insert("os".to_string(), instance.os.to_string());
        Self {
            env: BTreeMap::new(),
            matrix,
        }
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Interpolate expressions in a string.
    ///
    /// Supports:
    /// - `${{ matrix.key }}` - resolved matrix override
    /// - `${{ env.VAR }}` - job/step environment, then the process environment
    ///
    /// Unknown expressions resolve to an empty string.
    pub fn interpolate(&self, input: &str) -> String {
        EXPRESSION
            .replace_all(input, |caps: &Captures| {
                let expr = caps.get(1).map_or("", |m| m.as_str()).trim();
                self.resolve(expr)
            })
            .into_owned()
    }

    fn resolve(&self, expr: &str) -> String {
        if let Some(key) = expr.strip_prefix("matrix.") {
            return self.matrix.get(key).cloned().unwrap_or_default();
        }

        if let Some(var) = expr.strip_prefix("env.") {
            return self
                .env
                .get(var)
                .cloned()
                .or_else(|| std::env::var(var).ok())
                .unwrap_or_default();
        }

        String::new()
    }
}
