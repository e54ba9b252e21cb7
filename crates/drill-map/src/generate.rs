//! Candidate prop values for brute-force component commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::component::{ComponentInfo, PropInfo};

pub const LONG_STRING_LEN: usize = 1000;
pub const SPECIAL_CHARACTERS: &str = "<script>alert('x')</script> & \"quotes\" 'apos' \\ / 日本語 🚒";

/// A value to pass for a prop. `Undefined` means the prop is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TestValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Array(Vec<TestValue>),
    Object(BTreeMap<String, TestValue>),
    Callback,
}

impl TestValue {
    pub fn text(value: impl Into<String>) -> Self {
        TestValue::Text(value.into())
    }

    /// JSON rendering for a prop payload; `None` for `Undefined`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value;
        Some(match self {
            TestValue::Undefined => return None,
            TestValue::Null => Value::Null,
            TestValue::Bool(value) => Value::Bool(*value),
            TestValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            TestValue::Text(value) => Value::String(value.clone()),
            TestValue::Array(items) => {
                Value::Array(items.iter().filter_map(TestValue::to_json).collect())
            }
            TestValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .filter_map(|(key, value)| value.to_json().map(|json| (key.clone(), json)))
                    .collect(),
            ),
            TestValue::Callback => Value::String("[callback]".to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropTestInput {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub required: bool,
    pub possible_values: Vec<TestValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentTestConfig {
    pub component: String,
    pub props: Vec<PropTestInput>,
    pub interactions: Vec<String>,
    pub test_ids: Vec<String>,
    pub expects_error_boundary: bool,
}

pub fn generate_test_config(component: &ComponentInfo) -> ComponentTestConfig {
    ComponentTestConfig {
        component: component.name.clone(),
        props: component.props.iter().map(prop_test_input).collect(),
        interactions: component.interactions.clone(),
        test_ids: component.test_ids.clone(),
        expects_error_boundary: component.is_error_boundary,
    }
}

pub fn prop_test_input(prop: &PropInfo) -> PropTestInput {
    PropTestInput {
        name: prop.name.clone(),
        type_name: prop.type_name.clone(),
        required: prop.required,
        possible_values: values_for_type(&prop.type_name),
    }
}

/// Every generated list ends with `Null` and `Undefined`, required or not;
/// rejecting them is part of what the component is tested on.
pub fn values_for_type(type_name: &str) -> Vec<TestValue> {
    let ty = type_name.trim();
    let mut values = if let Some(literals) = string_literal_union(ty) {
        let mut values: Vec<TestValue> = literals.into_iter().map(TestValue::Text).collect();
        values.push(TestValue::text("__invalid_option__"));
        values
    } else if ty.contains("=>") || ty == "Function" {
        vec![TestValue::Callback]
    } else if ty.ends_with("[]") || ty.starts_with("Array<") {
        let element = ty
            .strip_suffix("[]")
            .or_else(|| ty.strip_prefix("Array<").and_then(|rest| rest.strip_suffix('>')))
            .unwrap_or("unknown");
        let sample = values_for_type(element)
            .into_iter()
            .find(|value| !matches!(value, TestValue::Null | TestValue::Undefined))
            .unwrap_or(TestValue::Null);
        vec![
            TestValue::Array(Vec::new()),
            TestValue::Array(vec![sample.clone()]),
            TestValue::Array(vec![sample; 100]),
        ]
    } else {
        match ty {
            "string" => vec![
                TestValue::text(""),
                TestValue::text("Test String"),
                TestValue::text("a".repeat(LONG_STRING_LEN)),
                TestValue::text(SPECIAL_CHARACTERS),
            ],
            "number" => vec![
                TestValue::Number(0.0),
                TestValue::Number(1.0),
                TestValue::Number(-1.0),
                TestValue::Number(2.5),
                TestValue::Number(1e9),
                TestValue::Number(-1e9),
            ],
            "boolean" => vec![TestValue::Bool(true), TestValue::Bool(false)],
            _ if ty == "object" || ty.starts_with('{') || ty.starts_with("Record<") => vec![
                TestValue::Object(BTreeMap::new()),
                TestValue::Object(BTreeMap::from([(
                    "id".to_string(),
                    TestValue::text("test-id"),
                )])),
            ],
            _ => Vec::new(),
        }
    };
    values.push(TestValue::Null);
    values.push(TestValue::Undefined);
    values
}

/// `'a' | 'b'` or `"a" | "b"`; `None` when any member is not a literal.
fn string_literal_union(ty: &str) -> Option<Vec<String>> {
    let members: Vec<&str> = ty.split('|').map(str::trim).collect();
    let literals: Option<Vec<String>> = members
        .iter()
        .map(|member| {
            let quoted = (member.starts_with('\'') && member.ends_with('\''))
                || (member.starts_with('"') && member.ends_with('"'));
            (quoted && member.len() >= 2).then(|| member[1..member.len() - 1].to_string())
        })
        .collect();
    literals.filter(|values| !values.is_empty())
}

/// Bounded cartesian product over each prop's candidate values, in odometer
/// order with the last prop varying fastest. `Undefined` props are left out
/// of the combination.
pub fn prop_combinations(
    config: &ComponentTestConfig,
    limit: usize,
) -> Vec<BTreeMap<String, TestValue>> {
    if limit == 0 {
        return Vec::new();
    }
    if config.props.iter().any(|prop| prop.possible_values.is_empty()) {
        return Vec::new();
    }

    let mut combinations = Vec::new();
    let mut cursor = vec![0usize; config.props.len()];
    loop {
        let combination: BTreeMap<String, TestValue> = config
            .props
            .iter()
            .zip(&cursor)
            .filter_map(|(prop, &idx)| match &prop.possible_values[idx] {
                TestValue::Undefined => None,
                value => Some((prop.name.clone(), value.clone())),
            })
            .collect();
        combinations.push(combination);
        if combinations.len() >= limit {
            break;
        }

        // Advance the odometer; stop once every position has wrapped.
        let mut position = cursor.len();
        loop {
            if position == 0 {
                return combinations;
            }
            position -= 1;
            cursor[position] += 1;
            if cursor[position] < config.props[position].possible_values.len() {
                break;
            }
            cursor[position] = 0;
        }
    }
    combinations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn component(props: Vec<PropInfo>) -> ComponentInfo {
        ComponentInfo {
            name: "UnitCard".to_string(),
            file_path: PathBuf::from("src/UnitCard.tsx"),
            props,
            interactions: vec!["onClick".to_string()],
            test_ids: vec!["unit-card".to_string()],
            is_error_boundary: false,
            is_async: false,
            has_state: false,
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn required_string_prop_gets_empty_long_null_and_undefined() {
        let config = generate_test_config(&component(vec![PropInfo::new("x", "string", true)]));
        let values = &config.props[0].possible_values;

        assert!(values.contains(&TestValue::text("")));
        assert!(values
            .iter()
            .any(|value| matches!(value, TestValue::Text(text) if text.len() >= LONG_STRING_LEN)));
        assert!(values.contains(&TestValue::Null));
        assert!(values.contains(&TestValue::Undefined));
        assert!(config.props[0].required);
    }

    #[test]
    fn literal_unions_enumerate_members_plus_an_invalid_option() {
        let values = values_for_type("'low' | 'high' | \"critical\"");
        assert_eq!(
            values,
            vec![
                TestValue::text("low"),
                TestValue::text("high"),
                TestValue::text("critical"),
                TestValue::text("__invalid_option__"),
                TestValue::Null,
                TestValue::Undefined,
            ]
        );
    }

    #[test]
    fn arrays_sample_their_element_type() {
        let values = values_for_type("number[]");
        assert_eq!(values[0], TestValue::Array(Vec::new()));
        assert_eq!(values[1], TestValue::Array(vec![TestValue::Number(0.0)]));
        assert!(matches!(&values[2], TestValue::Array(items) if items.len() == 100));
    }

    #[test]
    fn callbacks_and_unknown_types_still_get_nullish_values() {
        assert_eq!(
            values_for_type("(id: string) => void"),
            vec![TestValue::Callback, TestValue::Null, TestValue::Undefined]
        );
        assert_eq!(
            values_for_type("HazardZone"),
            vec![TestValue::Null, TestValue::Undefined]
        );
    }

    #[test]
    fn combinations_respect_limit_and_drop_undefined_props() {
        let config = generate_test_config(&component(vec![
            PropInfo::new("visible", "boolean", true),
            PropInfo::new("label", "string", false),
        ]));
        // 4 boolean candidates times 6 string candidates.
        let all = prop_combinations(&config, usize::MAX);
        assert_eq!(all.len(), 24);
        assert_eq!(all[0].get("visible"), Some(&TestValue::Bool(true)));
        assert_eq!(all[0].get("label"), Some(&TestValue::text("")));
        assert!(all.iter().any(|combo| !combo.contains_key("label")));

        let capped = prop_combinations(&config, 5);
        assert_eq!(capped.len(), 5);
        assert_eq!(&all[..5], &capped[..]);
    }

    #[test]
    fn propless_component_yields_one_empty_combination() {
        let config = generate_test_config(&component(Vec::new()));
        assert_eq!(prop_combinations(&config, 10), vec![BTreeMap::new()]);
        assert!(prop_combinations(&config, 0).is_empty());
    }

    #[test]
    fn to_json_omits_undefined_and_keeps_null() {
        assert_eq!(TestValue::Undefined.to_json(), None);
        assert_eq!(TestValue::Null.to_json(), Some(serde_json::Value::Null));
        let object = TestValue::Object(BTreeMap::from([
            ("a".to_string(), TestValue::Bool(true)),
            ("b".to_string(), TestValue::Undefined),
        ]));
        assert_eq!(object.to_json(), Some(serde_json::json!({ "a": true })));
    }
}
