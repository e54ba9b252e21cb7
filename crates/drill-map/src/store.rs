use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::component::ComponentInfo;
use crate::error::MapError;

pub const COMPONENT_MAP_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMap {
    pub schema_version: u32,
    pub last_updated: DateTime<Utc>,
    pub components: Vec<ComponentInfo>,
}

impl ComponentMap {
    pub fn new(components: Vec<ComponentInfo>) -> Self {
        Self {
            schema_version: COMPONENT_MAP_SCHEMA_VERSION,
            last_updated: Utc::now(),
            components,
        }
    }

    pub fn find(&self, name: &str) -> Option<&ComponentInfo> {
        self.components.iter().find(|component| component.name == name)
    }
}

pub fn save_component_map(path: impl AsRef<Path>, map: &ComponentMap) -> Result<(), MapError> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| MapError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let body = serde_json::to_string_pretty(map).map_err(MapError::Encode)?;
    fs::write(path_ref, body).map_err(|source| MapError::Write {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn load_component_map(path: impl AsRef<Path>) -> Result<ComponentMap, MapError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| MapError::ReadFile {
        path: path_ref.to_path_buf(),
        source,
    })?;
    let map: ComponentMap = serde_json::from_str(&body).map_err(|source| MapError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })?;
    if map.schema_version > COMPONENT_MAP_SCHEMA_VERSION {
        return Err(MapError::UnsupportedSchema {
            path: path_ref.to_path_buf(),
            found: map.schema_version,
            supported: COMPONENT_MAP_SCHEMA_VERSION,
        });
    }
    Ok(map)
}
