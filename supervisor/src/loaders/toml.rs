//! TOML stack loader.
//!
//! This is the native configuration format for stagehand stacks.

use crate::error::{Error, Result};
use crate::stack::StackConfig;
use std::path::Path;

/// Loader for TOML stack files.
pub struct TomlLoader;

impl super::StackLoader for TomlLoader {
    fn parse(&self, content: &str, path: &Path) -> Result<StackConfig> {
        toml::from_str(content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: format!("failed to parse TOML: {}", e),
        })
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["toml"]
    }

    fn name(&self) -> &'static str {
        "TOML"
    }
}
