//! Tool registry shared by every session.
//!
//! Registration is keyed by tool name and rejects duplicates atomically.
//! Lookups are lock-free reads, so one registry can back many concurrent
//! sessions.
//!
//! # Example
//!
//! ```rust
//! use autogen_agentchat::tools::{FunctionTool, ToolDescriptor, ToolOutcome, ToolRegistry};
//!
//! let registry = ToolRegistry::new();
//! let echo = ToolDescriptor::builder("echo")
//!     .build(FunctionTool::new(|_, _| async { ToolOutcome::ok(serde_json::json!("hi")) }))
//!     .unwrap();
//! registry.register(echo).unwrap();
//!
//! assert!(registry.lookup("echo").is_ok());
//! assert_eq!(registry.list_for(&["echo".to_string(), "other".to_string()]).len(), 1);
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::descriptor::ToolDescriptor;
use crate::error::RegistryError;

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails with `DuplicateTool` if the name is taken.
    pub fn register(&self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        match self.tools.entry(descriptor.name().to_string()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateTool(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(tool = %descriptor.name(), "Registered tool");
                entry.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDescriptor>, RegistryError> {
        self.tools
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Descriptors named in `allow_list`, in allow-list order. Unknown names are skipped.
    pub fn list_for(&self, allow_list: &[String]) -> Vec<Arc<ToolDescriptor>> {
        let mut seen = std::collections::HashSet::new();
        allow_list
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| self.tools.get(name).map(|entry| Arc::clone(entry.value())))
            .collect()
    }

    /// Fails with `UnknownTool` for the first allow-list entry that is not registered
    pub fn validate_allow_list(&self, allow_list: &[String]) -> Result<(), RegistryError> {
        match allow_list.iter().find(|name| !self.tools.contains_key(name.as_str())) {
            Some(missing) => Err(RegistryError::UnknownTool(missing.clone())),
            None => Ok(()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
