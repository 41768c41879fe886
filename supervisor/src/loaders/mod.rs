//! Stack file loaders for different configuration formats.
//!
//! - TOML (native stagehand format, `.toml`, also used for files without an
//!   extension)
//! - JSON (`.json`), handy when the stack is generated by another tool
//!
//! Whatever the format, a loaded stack is validated before it is handed out.

pub mod json;
pub mod toml;

use crate::error::{Error, Result};
use crate::stack::StackConfig;
use std::path::Path;
use tracing::debug;

/// Parses one stack file format.
pub trait StackLoader: Send + Sync {
    /// Parse a stack from file contents. `path` is only used in errors.
    fn parse(&self, content: &str, path: &Path) -> Result<StackConfig>;

    /// Lower-case file extensions handled by this loader.
    fn extensions(&self) -> &'static [&'static str];

    /// Format name for logs.
    fn name(&self) -> &'static str;
}

/// Picks a loader by file extension, reads the file and validates the stack.
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn StackLoader>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self {
            loaders: vec![Box::new(toml::TomlLoader), Box::new(json::JsonLoader)],
        }
    }
}

impl LoaderRegistry {
    /// Add a format. Later loaders only see extensions earlier ones skip.
    pub fn with_loader(mut self, loader: Box<dyn StackLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    fn loader_for(&self, path: &Path) -> Result<&dyn StackLoader> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "toml".to_string());

        self.loaders
            .iter()
            .map(|loader| loader.as_ref())
            .find(|loader| loader.extensions().contains(&ext.as_str()))
            .ok_or_else(|| Error::Config {
                path: path.to_path_buf(),
                reason: format!("no loader found for extension: {}", ext),
            })
    }

    /// Read, parse and validate the stack at `path`.
    pub fn load(&self, path: &Path) -> Result<StackConfig> {
        let loader = self.loader_for(path)?;
        debug!(path = %path.display(), loader = loader.name(), "Loading stack file");

        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: format!("failed to read: {}", e),
        })?;
        let stack = loader.parse(&content, path)?;
        stack.validate()?;
        Ok(stack)
    }
}

pub use self::json::JsonLoader;
pub use self::toml::TomlLoader;
