//! Environment lookups.
//!
//! Resolution takes the environment as a lookup function instead of reading
//! process state directly, so tests can supply their own variables.

use std::env;

/// Variable name to value, `None` when unset.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl<F> EnvSource for F
where
    F: Fn(&str) -> Option<String>,
{
    fn var(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Replace `${VAR}` references with their values. Unset variables become
/// empty; an unclosed `${` is kept literally.
pub fn expand_env_vars(value: &str, env: &impl EnvSource) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&env.var(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
