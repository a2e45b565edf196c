use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EvalError, Result};
use crate::template::EvalOptions;
use crate::view::INFO_ICON_SVG;

pub const TOOLTIP_TYPE: &str = "tooltip";
pub const DEFAULT_TEXT: &str = "Tooltip";

fn tooltip_type() -> String {
    TOOLTIP_TYPE.to_string()
}

fn default_text() -> String {
    DEFAULT_TEXT.to_string()
}

/// A tooltip field as stored in the form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TooltipField {
    #[serde(rename = "type", default = "tooltip_type")]
    pub kind: String,
    pub id: String,
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default)]
    pub strict: bool,
}

impl TooltipField {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { kind: tooltip_type(), id: id.into(), text: text.into(), strict: false }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Read a field out of raw schema JSON. A malformed field (wrong type tag,
    /// missing id, non-string text) is a contract violation.
    pub fn from_value(value: &Value) -> Result<Self> {
        let field: TooltipField = serde_json::from_value(value.clone())
            .map_err(|e| EvalError::Contract(format!("invalid tooltip field: {e}")))?;
        if field.kind != TOOLTIP_TYPE {
            return Err(EvalError::Contract(format!(
                "expected field type `{TOOLTIP_TYPE}`, got `{}`",
                field.kind
            )));
        }
        Ok(field)
    }

    pub fn options(&self) -> EvalOptions {
        EvalOptions { strict: self.strict }
    }

    /// Schema for a freshly created field: default text, overridden by
    /// whatever the editor passes in.
    pub fn create(options: Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("type".into(), Value::String(tooltip_type()));
        out.insert("text".into(), Value::String(default_text()));
        out.extend(options);
        out
    }
}

/// Palette and editor metadata for the tooltip field type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub label: &'static str,
    pub group: &'static str,
    pub icon_url: String,
    pub properties_panel_entries: Vec<&'static str>,
}

impl FieldConfig {
    pub fn tooltip() -> Self {
        Self {
            kind: TOOLTIP_TYPE,
            label: "Tooltip",
            group: "presentation",
            icon_url: format!("data:image/svg+xml;base64,{}", STANDARD.encode(INFO_ICON_SVG)),
            properties_panel_entries: vec!["text"],
        }
    }
}
