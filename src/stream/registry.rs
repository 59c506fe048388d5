use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{ConfigError, Result},
    stream::{
        clip::ClipBackend,
        filters::TextStyle,
        graph::GraphBackend,
        toolchain::Toolchain,
        traits::{Backend, RenderSettings},
    },
};

/// Everything a backend needs from its surroundings
#[derive(Clone)]
pub struct BackendContext {
    pub toolchain: Arc<dyn Toolchain>,
    pub settings: RenderSettings,
}

impl BackendContext {
    pub fn new(toolchain: Arc<dyn Toolchain>, settings: RenderSettings) -> Self {
        Self { toolchain, settings }
    }

    /// Font and bar style for this toolchain and settings
    pub fn text_style(&self) -> TextStyle {
        TextStyle::new(
            self.settings.font_file.as_deref(),
            self.toolchain.version().supports_fill_box(),
        )
    }
}

type BackendFactory = Box<dyn Fn(BackendContext) -> Result<Box<dyn Backend>>>;

/// Registry for the available rendering backends
///
/// Backends are registered by name and instantiated per render so that a
/// run never mixes streams of two different backends.
pub struct BackendRegistry {
    backends: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new registry with the built-in backends
    pub fn new() -> Self {
        let mut registry = Self {
            backends: HashMap::new(),
        };

        registry.register_builtin_backends();
        registry
    }

    fn register_builtin_backends(&mut self) {
        // Lazy filter graph, one ffmpeg run per unit
        self.register("graph", |context| Ok(Box::new(GraphBackend::new(context))));

        // Eager intermediate clips, one ffmpeg run per operation
        self.register("clip", |context| Ok(Box::new(ClipBackend::new(context)?)));
    }

    /// Register a custom backend
    ///
    /// # Arguments
    ///
    /// * `name` - Unique name for the backend
    /// * `factory` - Function that creates a backend for a context
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(BackendContext) -> Result<Box<dyn Backend>> + 'static,
    {
        self.backends.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate the backend called `name`
    pub fn create(&self, name: &str, context: BackendContext) -> Result<Box<dyn Backend>> {
        let factory = self.backends.get(name).ok_or_else(|| ConfigError::UnknownBackend {
            name: name.to_string(),
            available: self.available_backends().join(", "),
        })?;
        factory(context)
    }

    /// Get all available backend names, sorted
    pub fn available_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is available
    pub fn has_backend(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Get the number of registered backends
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
