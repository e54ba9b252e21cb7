//! Regex and substring heuristics over UI component sources.
//!
//! None of this parses the language. It recognises the common shapes
//! (exported PascalCase components, a `FooProps` interface closed at column
//! zero, literal `data-testid` attributes) and silently misses the rest.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::Path;

use crate::component::{ComponentInfo, PropInfo};
use crate::error::MapError;

pub const INTERACTION_HANDLERS: &[&str] = &[
    "onClick",
    "onDoubleClick",
    "onChange",
    "onSubmit",
    "onInput",
    "onFocus",
    "onBlur",
    "onKeyDown",
    "onKeyUp",
    "onMouseEnter",
    "onMouseLeave",
    "onDragStart",
    "onDragEnd",
    "onDrop",
    "onScroll",
    "onSelect",
    "onToggle",
    "onOpen",
    "onClose",
];

const EXCLUDED_MARKERS: &[&str] = &[".test.", ".spec.", ".stories.", ".story."];

/// Test, spec and story files plus type declarations are never components.
pub fn is_excluded_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return true;
    };
    file_name.ends_with(".d.ts") || EXCLUDED_MARKERS.iter().any(|marker| file_name.contains(marker))
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    named_export: Regex,
    default_export: Regex,
    props_block: Regex,
    prop_line: Regex,
    destructured_params: Regex,
    default_value: Regex,
    test_id: Regex,
}

impl Analyzer {
    pub fn new() -> Result<Self, MapError> {
        Ok(Self {
            named_export: Regex::new(
                r"export\s+(?:const|function|class)\s+([A-Z][A-Za-z0-9_]*)",
            )?,
            default_export: Regex::new(
                r"export\s+default\s+(?:function\s+|class\s+)?([A-Z][A-Za-z0-9_]*)",
            )?,
            props_block: Regex::new(
                r"(?s)(?:interface|type)\s+([A-Za-z0-9_]*Props)\s*(?:extends\s+[^{=]+)?=?\s*\{(.*?)\n\}",
            )?,
            prop_line: Regex::new(
                r"^\s*(?:readonly\s+)?([A-Za-z_$][A-Za-z0-9_$]*)(\?)?\s*:\s*(.+?)\s*[;,]?\s*$",
            )?,
            destructured_params: Regex::new(
                r"(?s)\(\s*\{(.*?)\}\s*(?::\s*[A-Za-z0-9_<>.]+)?\s*\)",
            )?,
            default_value: Regex::new(
                r#"([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*('[^']*'|"[^"]*"|-?\d+(?:\.\d+)?|true|false|null|\[\]|\{\})"#,
            )?,
            test_id: Regex::new(r#"data-testid\s*=\s*\{?\s*["'`]([^"'`]+)["'`]"#)?,
        })
    }

    /// Returns `None` when nothing in the source suggests a component.
    pub fn analyze(
        &self,
        path: &Path,
        source: &str,
        last_modified: DateTime<Utc>,
    ) -> Option<ComponentInfo> {
        let exported = self.exported_name(source);
        let name = exported.clone().or_else(|| name_from_path(path))?;
        let mut props = self.props(source, &name);
        self.apply_defaults(source, &mut props);
        let has_markup = source.contains("/>") || source.contains("</");

        if exported.is_none() && props.is_empty() && !has_markup {
            return None;
        }

        Some(ComponentInfo {
            name,
            file_path: path.to_path_buf(),
            props,
            interactions: INTERACTION_HANDLERS
                .iter()
                .filter(|handler| source.contains(*handler))
                .map(|handler| handler.to_string())
                .collect(),
            test_ids: self.test_ids(source),
            is_error_boundary: source.contains("componentDidCatch")
                || source.contains("getDerivedStateFromError"),
            is_async: source.contains("async ")
                || source.contains("await ")
                || source.contains("fetch(")
                || source.contains(".then("),
            has_state: source.contains("useState")
                || source.contains("useReducer")
                || source.contains("this.state")
                || source.contains("setState"),
            last_modified,
        })
    }

    fn exported_name(&self, source: &str) -> Option<String> {
        self.named_export
            .captures(source)
            .or_else(|| self.default_export.captures(source))
            .map(|caps| caps[1].to_string())
    }

    /// Reads `<Name>Props`, falling back to the first `*Props` block.
    fn props(&self, source: &str, component: &str) -> Vec<PropInfo> {
        let wanted = format!("{component}Props");
        let mut first = None;
        for caps in self.props_block.captures_iter(source) {
            let body = caps.get(2).map_or("", |m| m.as_str());
            if &caps[1] == wanted {
                return self.prop_lines(body);
            }
            first.get_or_insert(body);
        }
        first.map(|body| self.prop_lines(body)).unwrap_or_default()
    }

    fn prop_lines(&self, body: &str) -> Vec<PropInfo> {
        let mut props = Vec::new();
        let mut depth: i32 = 0;
        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
                continue;
            }
            if depth == 0 {
                if let Some(caps) = self.prop_line.captures(line) {
                    let raw_type = caps[3].trim();
                    let type_name = if raw_type.ends_with('{') {
                        "object"
                    } else {
                        raw_type
                    };
                    props.push(PropInfo::new(&caps[1], type_name, caps.get(2).is_none()));
                }
            }
            depth += brace_delta(line);
            depth = depth.max(0);
        }
        props
    }

    fn apply_defaults(&self, source: &str, props: &mut [PropInfo]) {
        let Some(params) = self.destructured_params.captures(source) else {
            return;
        };
        let params = params.get(1).map_or("", |m| m.as_str());
        for caps in self.default_value.captures_iter(params) {
            if let Some(prop) = props.iter_mut().find(|prop| prop.name == caps[1]) {
                prop.default_value = Some(caps[2].to_string());
            }
        }
    }

    fn test_ids(&self, source: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for caps in self.test_id.captures_iter(source) {
            let id = caps[1].to_string();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

fn brace_delta(line: &str) -> i32 {
    line.chars().fold(0, |acc, ch| match ch {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// `MapView.tsx` gives `MapView`; `hazards/index.tsx` gives `hazards`.
fn name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem == "index" {
        return path
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .map(str::to_string);
    }
    Some(stem.to_string())
}
