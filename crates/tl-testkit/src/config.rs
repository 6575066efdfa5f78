//! Harness configuration
//!
//! Settings are layered: built-in defaults, then an optional
//! `tl-testkit.toml` (explicit path or discovered by walking up from a start
//! directory), then `TL_TESTKIT_*` environment overrides.
//!
//! ```toml
//! interpreter = "lua"
//! executable = "./tl"
//! source_extension = "tl"
//! output_extension = "lua"
//!
//! [env]
//! LUA_PATH = "./?.lua;./?/init.lua"
//! ```

use crate::error::TestkitError;
use crate::result::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file name looked up during discovery
pub const CONFIG_FILE_NAME: &str = "tl-testkit.toml";

pub const ENV_INTERPRETER: &str = "TL_TESTKIT_INTERPRETER";
pub const ENV_EXECUTABLE: &str = "TL_TESTKIT_EXECUTABLE";
pub const ENV_TEMP_ROOT: &str = "TL_TESTKIT_TEMP_ROOT";

/// How the compiler CLI is invoked and where fixtures live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Interpreter that runs the compiler script
    pub interpreter: String,
    /// Path to the compiler executable script
    pub executable: PathBuf,
    /// Environment prefix injected into every invocation
    pub env: BTreeMap<String, String>,
    /// Extension of compiler source files
    pub source_extension: String,
    /// Extension of generated files
    pub output_extension: String,
    /// Directory temporary fixtures are created in
    pub temp_root: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert(
            "LUA_PATH".to_string(),
            "./?.lua;./?/init.lua;./src/?.lua;./src/?/init.lua".to_string(),
        );
        env.insert("LUA_CPATH".to_string(), "./?.so;./src/?.so".to_string());

        Self {
            interpreter: "lua".to_string(),
            executable: PathBuf::from("./tl"),
            env,
            source_extension: "tl".to_string(),
            output_extension: "lua".to_string(),
            temp_root: std::env::temp_dir(),
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TestkitError::config(e.to_string()))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| TestkitError::io(path, e))?;
        Self::from_toml(&content).map_err(|e| {
            TestkitError::config(format!(
                "Failed to load config from '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Find `tl-testkit.toml` in `start_dir` or any of its ancestors
    pub fn discover(start_dir: &Path) -> Option<PathBuf> {
        start_dir
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Resolve the full layered configuration
    ///
    /// An explicit `custom_path` must exist; otherwise discovery starts at
    /// `start_dir`, and the defaults are used when nothing is found.
    pub fn load(custom_path: Option<&Path>, start_dir: &Path) -> Result<Self> {
        let config = match custom_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(TestkitError::config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_from_file(path)?
            }
            None => match Self::discover(start_dir) {
                Some(found) => {
                    tracing::debug!("Found config: {}", found.display());
                    Self::load_from_file(&found)?
                }
                None => Self::default(),
            },
        };

        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply environment-style overrides looked up through `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(interpreter) = lookup(ENV_INTERPRETER) {
            self.interpreter = interpreter;
        }
        if let Some(executable) = lookup(ENV_EXECUTABLE) {
            self.executable = PathBuf::from(executable);
        }
        if let Some(temp_root) = lookup(ENV_TEMP_ROOT) {
            self.temp_root = PathBuf::from(temp_root);
        }
        self
    }
}
