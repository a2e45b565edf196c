use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// A group of entries in the editor's properties panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub id: String,
    pub label: String,
    pub entries: Vec<String>,
}

/// Hook for reshaping the properties panel groups of a selected field.
pub trait PropertiesProvider: Send + Sync {
    fn get_groups(&self, field: &Value, groups: Vec<Group>) -> Vec<Group>;
}

pub const TOOLTIP_PROVIDER_PRIORITY: u32 = 500;

/// Providers run from highest to lowest priority, each receiving the
/// previous provider's output.
#[derive(Clone, Default)]
pub struct PropertiesPanel {
    providers: Vec<(u32, Arc<dyn PropertiesProvider>)>,
}

impl PropertiesPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, priority: u32, provider: Arc<dyn PropertiesProvider>) {
        self.providers.push((priority, provider));
        // stable: equal priorities keep registration order
        self.providers.sort_by(|a, b| b.0.cmp(&a.0));
    }

    pub fn groups(&self, field: &Value, base: Vec<Group>) -> Vec<Group> {
        self.providers
            .iter()
            .fold(base, |groups, (_, provider)| provider.get_groups(field, groups))
    }
}

/// The tooltip adds no groups of its own; its `text` entry comes from the
/// field config. Registered so custom groups have an obvious place to go.
pub struct TooltipPropertiesProvider;

impl TooltipPropertiesProvider {
    pub fn register(panel: &mut PropertiesPanel) {
        panel.register_provider(TOOLTIP_PROVIDER_PRIORITY, Arc::new(TooltipPropertiesProvider));
    }
}

impl PropertiesProvider for TooltipPropertiesProvider {
    fn get_groups(&self, _field: &Value, groups: Vec<Group>) -> Vec<Group> {
        groups
    }
}
