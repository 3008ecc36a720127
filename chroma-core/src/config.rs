#![forbid(unsafe_code)]

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("invalid configuration: {message}")]
#[diagnostic(code(chroma::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Colorize rendered diagnostics.
    pub use_colors: bool,
    /// Nested calls allowed before a PanicError.
    pub max_call_depth: usize,
    /// Memoize blue calls. Turning this off re-executes every blue call.
    pub blue_cache: bool,
    /// Collect `print` output in `Vm::stdout` instead of writing to stdout.
    pub capture_stdout: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            use_colors: false,
            max_call_depth: 512,
            blue_cache: true,
            capture_stdout: true,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError {
            message: e.to_string(),
        })
    }
}
