//! JSON stack loader.

use crate::error::{Error, Result};
use crate::stack::StackConfig;
use std::path::Path;

/// Loader for JSON stack files. Same schema as the TOML format.
pub struct JsonLoader;

impl super::StackLoader for JsonLoader {
    fn parse(&self, content: &str, path: &Path) -> Result<StackConfig> {
        serde_json::from_str(content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: format!("failed to parse JSON: {}", e),
        })
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn name(&self) -> &'static str {
        "JSON"
    }
}
