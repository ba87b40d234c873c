//! Registry manifests
//!
//! A manifest describes one registry on disk, in YAML or JSON:
//!
//! ```yaml
//! name: "theme-override"
//! priority: 200
//! widgets:
//!   core.Footer:
//!     component: "BrandFooter"
//!     defaultConfig:
//!       columns: 4
//!     metadata:
//!       name: "Footer"
//!       category: "layout"
//!       tags: ["navigation"]
//! ```

use super::{RegistryEntries, RegistryError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One registry loaded from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryManifest {
    pub name: String,
    pub priority: i32,
    #[serde(default)]
    pub widgets: RegistryEntries,
}

impl RegistryManifest {
    /// Load a manifest, choosing the format from the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let manifest: Self = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            other => return Err(RegistryError::UnsupportedFormat(other.to_string())),
        };

        manifest.validate()?;
        tracing::debug!(
            path = %path.display(),
            registry = %manifest.name,
            priority = manifest.priority,
            widgets = manifest.widgets.len(),
            "Loaded registry manifest"
        );
        Ok(manifest)
    }

    /// Load several manifests, failing on the first bad one
    pub fn load_all<I, P>(paths: I) -> Result<Vec<Self>, RegistryError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(Self::load).collect()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidManifest(
                "registry name cannot be empty".into(),
            ));
        }
        if let Some(widget_type) = self.widgets.keys().find(|t| t.trim().is_empty()) {
            return Err(RegistryError::InvalidManifest(format!(
                "registry '{}' has an empty widget type '{}'",
                self.name, widget_type
            )));
        }
        Ok(())
    }
}
