use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropInfo {
    pub name: String,
    /// Declared type as written in the source, e.g. `string` or `'a' | 'b'`.
    #[serde(rename = "type")]
    pub type_name: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl PropInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            required,
            default_value: None,
        }
    }
}

/// What the analyzer could guess about one source file. Every field is a
/// heuristic and may be incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub name: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub props: Vec<PropInfo>,
    #[serde(default)]
    pub interactions: Vec<String>,
    #[serde(default)]
    pub test_ids: Vec<String>,
    #[serde(default)]
    pub is_error_boundary: bool,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub has_state: bool,
    pub last_modified: DateTime<Utc>,
}

impl ComponentInfo {
    pub fn required_props(&self) -> impl Iterator<Item = &PropInfo> {
        self.props.iter().filter(|prop| prop.required)
    }
}
