//! Widget registry resolver
//!
//! # Design
//!
//! - Slots are keyed by priority in a `BTreeMap`; registering at an occupied
//!   priority replaces the previous slot
//! - Lookups walk priorities from highest to lowest and stop at the first slot
//!   defining the widget type
//! - The winning slot's entry is used whole; fields are never merged across
//!   slots
//! - `RwLock` gives a single writer and many readers; registration is expected
//!   once per source at startup
//!
//! # Example
//!
//! ```
//! use cms_admin_core::registry::{
//!     RegistryEntries, WidgetMetadata, WidgetRegistryEntry, WidgetRegistryResolver,
//! };
//!
//! let footer = |name: &str| {
//!     WidgetRegistryEntry::new(
//!         name,
//!         WidgetMetadata { name: name.into(), ..Default::default() },
//!     )
//! };
//!
//! let resolver = WidgetRegistryResolver::new();
//! resolver.register_registry(
//!     RegistryEntries::from([("core.Footer".to_string(), footer("DefaultFooter"))]),
//!     100,
//!     "default",
//! );
//! resolver.register_registry(
//!     RegistryEntries::from([("core.Footer".to_string(), footer("BrandFooter"))]),
//!     200,
//!     "override",
//! );
//!
//! let component = resolver.resolve_component("core.Footer").unwrap();
//! assert_eq!(component.as_str(), "BrandFooter");
//! ```

use super::{
    ComponentRef, DefaultConfig, RegistryEntries, RegistryInfo, RegistryManifest, RegistrySlot,
    WidgetRef, WidgetRegistryEntry, WidgetTypeDescriptor,
};
use crate::metrics;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Category value that disables [`WidgetRegistryResolver::filter_by_category`]
pub const ALL_CATEGORIES: &str = "all";

/// Priority-ordered set of widget registries
#[derive(Default)]
pub struct WidgetRegistryResolver {
    slots: RwLock<BTreeMap<i32, Arc<RegistrySlot>>>,
}

impl WidgetRegistryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from loaded manifests
    pub fn from_manifests<I>(manifests: I) -> Self
    where
        I: IntoIterator<Item = RegistryManifest>,
    {
        let resolver = Self::new();
        for manifest in manifests {
            resolver.register_registry(manifest.widgets, manifest.priority, &manifest.name);
        }
        resolver
    }

    /// Install a registry at `priority`, returning the slot it replaced
    pub fn register_registry(
        &self,
        entries: RegistryEntries,
        priority: i32,
        name: &str,
    ) -> Option<Arc<RegistrySlot>> {
        let widget_count = entries.len();
        let slot = Arc::new(RegistrySlot {
            priority,
            name: name.to_string(),
            entries,
        });

        let replaced = self.slots.write().insert(priority, slot);

        match &replaced {
            Some(previous) => tracing::warn!(
                registry = %name,
                replaced = %previous.name,
                priority,
                "Registry replaced another registered at the same priority"
            ),
            None => tracing::debug!(
                registry = %name,
                priority,
                widget_count,
                "Registered widget registry"
            ),
        }

        replaced
    }

    /// Highest-priority definition of `widget_type`
    fn winner(&self, widget_type: &str) -> Option<WidgetRegistryEntry> {
        let slots = self.slots.read();
        let found = slots
            .values()
            .rev()
            .find_map(|slot| slot.entries.get(widget_type))
            .cloned();

        metrics::record_registry_lookup(found.is_some());
        found
    }

    pub fn resolve_component(&self, widget_type: &str) -> Option<ComponentRef> {
        let component = self.winner(widget_type).map(|e| e.component);
        if component.is_none() {
            tracing::warn!(widget_type, "No registered component for widget type");
        }
        component
    }

    pub fn resolve_metadata(&self, widget_type: &str) -> Option<WidgetRegistryEntry> {
        self.winner(widget_type)
    }

    /// Default configuration of the winning definition, empty if unresolved
    pub fn resolve_default_config(&self, widget_type: &str) -> DefaultConfig {
        self.winner(widget_type)
            .map(|e| e.default_config)
            .unwrap_or_default()
    }

    /// Human-readable name for a widget; never fails
    ///
    /// Inline widget data carrying a name or label wins outright. Otherwise
    /// the registry name is used, then a matching `fallback` descriptor, and
    /// finally the widget type string itself.
    pub fn resolve_display_name<'a>(
        &self,
        widget: impl Into<WidgetRef<'a>>,
        fallback: &[WidgetTypeDescriptor],
    ) -> String {
        let widget_type = match widget.into() {
            WidgetRef::Inline(inline) => {
                if let Some(name) = inline.display_name() {
                    return name.to_string();
                }
                match inline.widget_type.as_deref() {
                    Some(t) => t,
                    None => return String::new(),
                }
            }
            WidgetRef::Type(t) => t,
        };

        if let Some(entry) = self.winner(widget_type) {
            if !entry.metadata.name.trim().is_empty() {
                return entry.metadata.name;
            }
        }

        fallback
            .iter()
            .find(|d| d.widget_type == widget_type)
            .and_then(WidgetTypeDescriptor::display_name)
            .unwrap_or(widget_type)
            .to_string()
    }

    /// Union of widget types across all registries
    pub fn list_available_types(&self) -> BTreeSet<String> {
        let slots = self.slots.read();
        let mut types = BTreeSet::new();
        // Lowest to highest so overriding registries are always represented
        for slot in slots.values() {
            types.extend(slot.entries.keys().cloned());
        }
        types
    }

    /// Types whose winning definition matches `term`; empty term returns all
    pub fn search(&self, term: &str) -> Vec<String> {
        let term = term.trim().to_lowercase();
        self.winning_entries()
            .into_iter()
            .filter(|(widget_type, entry)| term.is_empty() || entry.matches(widget_type, &term))
            .map(|(widget_type, _)| widget_type)
            .collect()
    }

    /// Types whose winning definition is in `category`; `"all"` returns all
    pub fn filter_by_category(&self, category: &str) -> Vec<String> {
        self.winning_entries()
            .into_iter()
            .filter(|(_, entry)| {
                category == ALL_CATEGORIES || entry.metadata.category == category
            })
            .map(|(widget_type, _)| widget_type)
            .collect()
    }

    /// Diagnostics, highest priority first
    pub fn registry_info(&self) -> Vec<RegistryInfo> {
        self.slots
            .read()
            .values()
            .rev()
            .map(|slot| {
                let mut widget_types: Vec<String> = slot.entries.keys().cloned().collect();
                widget_types.sort();
                RegistryInfo {
                    name: slot.name.clone(),
                    priority: slot.priority,
                    widget_count: slot.entries.len(),
                    widget_types,
                }
            })
            .collect()
    }

    pub fn registry_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Every widget type paired with its winning definition, sorted by type
    fn winning_entries(&self) -> BTreeMap<String, WidgetRegistryEntry> {
        let slots = self.slots.read();
        let mut winners = BTreeMap::new();
        for slot in slots.values() {
            for (widget_type, entry) in &slot.entries {
                // Later (higher priority) slots overwrite earlier ones
                winners.insert(widget_type.clone(), entry.clone());
            }
        }
        winners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InlineWidget, WidgetMetadata};

    fn entry(component: &str, name: &str, category: &str) -> WidgetRegistryEntry {
        WidgetRegistryEntry::new(
            component,
            WidgetMetadata {
                name: name.into(),
                category: category.into(),
                ..Default::default()
            },
        )
    }

    fn entries(list: &[(&str, WidgetRegistryEntry)]) -> RegistryEntries {
        list.iter()
            .map(|(t, e)| (t.to_string(), e.clone()))
            .collect()
    }

    #[test]
    fn test_precedence_independent_of_registration_order() {
        for high_first in [true, false] {
            let resolver = WidgetRegistryResolver::new();
            let a = entries(&[("x", entry("A", "A-x", "misc"))]);
            let b = entries(&[("x", entry("B", "B-x", "misc"))]);
            if high_first {
                resolver.register_registry(b, 200, "B");
                resolver.register_registry(a, 100, "A");
            } else {
                resolver.register_registry(a, 100, "A");
                resolver.register_registry(b, 200, "B");
            }
            assert_eq!(resolver.resolve_metadata("x").unwrap().metadata.name, "B-x");
        }
    }

    #[test]
    fn test_same_priority_replaces() {
        let resolver = WidgetRegistryResolver::new();
        resolver.register_registry(entries(&[("x", entry("A", "A", ""))]), 100, "first");
        let replaced =
            resolver.register_registry(entries(&[("y", entry("B", "B", ""))]), 100, "second");

        assert_eq!(replaced.map(|s| s.name.clone()), Some("first".to_string()));
        assert_eq!(resolver.registry_count(), 1);
        assert!(resolver.resolve_component("x").is_none());
        assert!(resolver.resolve_component("y").is_some());
    }

    #[test]
    fn test_no_field_merging() {
        let resolver = WidgetRegistryResolver::new();
        let mut low = entry("Low", "Low", "layout");
        low.metadata.description = "from low".into();
        low.default_config
            .insert("columns".into(), serde_json::json!(3));
        resolver.register_registry(entries(&[("x", low)]), 1, "low");
        resolver.register_registry(entries(&[("x", entry("High", "High", ""))]), 2, "high");

        let winner = resolver.resolve_metadata("x").unwrap();
        assert_eq!(winner.metadata.description, "");
        assert!(resolver.resolve_default_config("x").is_empty());
        assert!(resolver.filter_by_category("layout").is_empty());
    }

    #[test]
    fn test_display_name_inline_wins() {
        let resolver = WidgetRegistryResolver::new();
        resolver.register_registry(entries(&[("x", entry("X", "Registry X", ""))]), 1, "r");

        let inline = InlineWidget {
            label: Some("My X".into()),
            widget_type: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(resolver.resolve_display_name(&inline, &[]), "My X");

        let unnamed = InlineWidget {
            widget_type: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(resolver.resolve_display_name(&unnamed, &[]), "Registry X");
    }

    #[test]
    fn test_display_name_fallback_chain() {
        let resolver = WidgetRegistryResolver::new();
        let fallback = vec![WidgetTypeDescriptor {
            widget_type: "api.Gallery".into(),
            name: None,
            label: Some("Gallery".into()),
        }];

        assert_eq!(resolver.resolve_display_name("api.Gallery", &fallback), "Gallery");
        assert_eq!(
            resolver.resolve_display_name("unknown.Widget", &[]),
            "unknown.Widget"
        );
    }

    #[test]
    fn test_category_all_sentinel() {
        let resolver = WidgetRegistryResolver::new();
        resolver.register_registry(
            entries(&[
                ("a", entry("A", "A", "layout")),
                ("b", entry("B", "B", "media")),
            ]),
            1,
            "r",
        );
        assert_eq!(resolver.filter_by_category("all"), vec!["a", "b"]);
        assert_eq!(resolver.filter_by_category("media"), vec!["b"]);
    }

    #[test]
    fn test_registry_info_highest_first() {
        let resolver = WidgetRegistryResolver::new();
        resolver.register_registry(entries(&[("a", entry("A", "A", ""))]), 10, "base");
        resolver.register_registry(
            entries(&[("b", entry("B", "B", "")), ("a", entry("A2", "A2", ""))]),
            20,
            "theme",
        );

        let info = resolver.registry_info();
        assert_eq!(info[0].name, "theme");
        assert_eq!(info[0].widget_count, 2);
        assert_eq!(info[0].widget_types, vec!["a", "b"]);
        assert_eq!(info[1].name, "base");
    }
}
