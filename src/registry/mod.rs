//! Widget registry module
//!
//! Prioritized widget registries with winner-takes-all resolution per widget
//! type. Customization layers register at a higher priority than the
//! built-in set to override individual widgets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod manifest;
pub mod resolver;

pub use manifest::RegistryManifest;
pub use resolver::WidgetRegistryResolver;

/// Widget default configuration
pub type DefaultConfig = serde_json::Map<String, serde_json::Value>;

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read registry manifest: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML manifest: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON manifest: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported manifest format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Opaque reference to a renderable component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentRef(String);

impl ComponentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Descriptive widget metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub tags: Vec<String>,
}

/// A widget definition inside one registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRegistryEntry {
    pub component: ComponentRef,
    #[serde(default, rename = "defaultConfig", alias = "default_config")]
    pub default_config: DefaultConfig,
    #[serde(default)]
    pub metadata: WidgetMetadata,
}

impl WidgetRegistryEntry {
    pub fn new(component: impl Into<String>, metadata: WidgetMetadata) -> Self {
        Self {
            component: ComponentRef::new(component),
            default_config: DefaultConfig::new(),
            metadata,
        }
    }

    pub fn with_default_config(mut self, default_config: DefaultConfig) -> Self {
        self.default_config = default_config;
        self
    }

    /// Case-insensitive match of an already lowercased term against name,
    /// description, tags or the widget type itself
    pub(crate) fn matches(&self, widget_type: &str, term_lower: &str) -> bool {
        let meta = &self.metadata;
        widget_type.to_lowercase().contains(term_lower)
            || meta.name.to_lowercase().contains(term_lower)
            || meta.description.to_lowercase().contains(term_lower)
            || meta
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(term_lower))
    }
}

/// Widget definitions keyed by widget type
pub type RegistryEntries = HashMap<String, WidgetRegistryEntry>;

/// One registered registry
#[derive(Debug, Clone)]
pub struct RegistrySlot {
    pub priority: i32,
    pub name: String,
    pub entries: RegistryEntries,
}

/// Diagnostic summary of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    pub name: String,
    pub priority: i32,
    pub widget_count: usize,
    pub widget_types: Vec<String>,
}

/// Widget type descriptor supplied from outside the registry (e.g. an API)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetTypeDescriptor {
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl WidgetTypeDescriptor {
    fn display_name(&self) -> Option<&str> {
        non_empty(self.name.as_deref()).or_else(|| non_empty(self.label.as_deref()))
    }
}

/// Widget data that already carries its own name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineWidget {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub widget_type: Option<String>,
}

impl InlineWidget {
    fn display_name(&self) -> Option<&str> {
        non_empty(self.name.as_deref()).or_else(|| non_empty(self.label.as_deref()))
    }
}

/// Subject of a display-name lookup
#[derive(Debug, Clone, Copy)]
pub enum WidgetRef<'a> {
    Type(&'a str),
    Inline(&'a InlineWidget),
}

impl<'a> From<&'a str> for WidgetRef<'a> {
    fn from(widget_type: &'a str) -> Self {
        Self::Type(widget_type)
    }
}

impl<'a> From<&'a InlineWidget> for WidgetRef<'a> {
    fn from(widget: &'a InlineWidget) -> Self {
        Self::Inline(widget)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
