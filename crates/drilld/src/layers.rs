//! Evaluation of captured `validateLayers()` payloads from the in-page test API.

use async_trait::async_trait;
use drill_core::TestResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::time::Instant;

use crate::command::{Command, CommandContext, CommandError};

/// One layer's entry. Pages report different subsets of these flags; only
/// flags that are present are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerOverall {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub total_layers: u32,
    #[serde(default)]
    pub successful_layers: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// `{terrain, buildings, hazards, units, routes, overall}`; every object key
/// other than `overall` is a layer. Scalar keys such as a timestamp are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLayerReport")]
pub struct LayerReport {
    #[serde(default)]
    pub overall: LayerOverall,
    #[serde(flatten)]
    pub layers: BTreeMap<String, LayerStatus>,
}

#[derive(Deserialize)]
struct RawLayerReport {
    #[serde(default)]
    overall: LayerOverall,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawLayerReport> for LayerReport {
    type Error = serde_json::Error;

    fn try_from(raw: RawLayerReport) -> Result<Self, Self::Error> {
        let mut layers = BTreeMap::new();
        for (name, value) in raw.rest {
            if value.is_object() {
                layers.insert(name, serde_json::from_value(value)?);
            }
        }
        Ok(Self {
            overall: raw.overall,
            layers,
        })
    }
}

/// What the page returned. The test API is not installed on every build, so
/// its absence is a state of its own rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerValidation {
    Absent,
    Reported(LayerReport),
}

impl LayerValidation {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.is_null() {
            return Ok(LayerValidation::Absent);
        }
        serde_json::from_value(value).map(LayerValidation::Reported)
    }

    /// Problems found for the given layers; every layer is checked when
    /// `expected` is empty.
    pub fn problems(&self, expected: &[String]) -> Vec<String> {
        let LayerValidation::Reported(report) = self else {
            return Vec::new();
        };
        let mut problems = report.overall.errors.clone();
        let names: Vec<&String> = if expected.is_empty() {
            report.layers.keys().collect()
        } else {
            expected.iter().collect()
        };
        for name in names {
            let Some(status) = report.layers.get(name) else {
                problems.push(format!("layer {name} missing from validation payload"));
                continue;
            };
            if let Some(error) = &status.error {
                problems.push(format!("layer {name} reported error: {error}"));
            }
            if status.success == Some(false) && status.error.is_none() {
                problems.push(format!("layer {name} failed"));
            }
            if status.loaded == Some(false) {
                problems.push(format!("layer {name} not loaded"));
            }
            if status.visible == Some(false) {
                problems.push(format!("layer {name} not visible"));
            }
        }
        if !report.overall.success && problems.is_empty() {
            problems.push(format!(
                "layer validation failed ({}/{} layers ok)",
                report.overall.successful_layers, report.overall.total_layers
            ));
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerValidationCommand {
    pub name: String,
    pub payload_path: PathBuf,
    pub expected_layers: Vec<String>,
}

impl LayerValidationCommand {
    pub fn new(name: impl Into<String>, payload_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            payload_path: payload_path.into(),
            expected_layers: Vec::new(),
        }
    }

    pub fn expecting(mut self, layers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expected_layers = layers.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Command for LayerValidationCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &CommandContext) -> Result<TestResult, CommandError> {
        let started = Instant::now();
        let raw = match tokio::fs::read_to_string(&self.payload_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TestResult::passed(&self.name, 0).with_warning(format!(
                    "no layer validation payload at {}",
                    self.payload_path.display()
                )));
            }
            Err(source) => {
                return Err(CommandError::ReadPayload {
                    path: self.payload_path.clone(),
                    source,
                })
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let validation = match LayerValidation::from_json(&raw) {
            Ok(validation) => validation,
            Err(err) => {
                return Ok(TestResult::failed(
                    &self.name,
                    duration_ms,
                    format!("layer validation payload is not valid json: {err}"),
                ))
            }
        };

        let result = match &validation {
            LayerValidation::Absent => TestResult::passed(&self.name, duration_ms)
                .with_warning("map test api not available on this page"),
            LayerValidation::Reported(report) => {
                let problems = validation.problems(&self.expected_layers);
                let result = if problems.is_empty() {
                    TestResult::passed(&self.name, duration_ms)
                } else {
                    TestResult {
                        success: false,
                        errors: problems,
                        ..TestResult::passed(&self.name, duration_ms)
                    }
                };
                result.with_metadata("layers", serde_json::json!(report.layers))
            }
        };
        Ok(result.with_artifact(&self.payload_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::ctx;

    const HEALTHY: &str = r#"{
        "terrain": {"success": true, "visible": true},
        "hazards": {"success": true, "loaded": true, "error": null},
        "overall": {"success": true, "totalLayers": 2, "successfulLayers": 2, "errors": []}
    }"#;

    #[test]
    fn null_payload_means_the_api_is_absent() {
        assert_eq!(
            LayerValidation::from_json("null").expect("parse"),
            LayerValidation::Absent
        );
        assert!(LayerValidation::Absent.problems(&[]).is_empty());
    }

    #[test]
    fn problems_cover_errors_hidden_and_missing_layers() {
        let validation = LayerValidation::from_json(
            r#"{"hazards": {"visible": false, "loaded": true, "error": "tile 404"},
                "units": {"success": false},
                "overall": {"success": false, "totalLayers": 2, "successfulLayers": 0,
                            "errors": ["style failed"]}}"#,
        )
        .expect("parse");
        let problems = validation.problems(&[
            "hazards".to_string(),
            "units".to_string(),
            "routes".to_string(),
        ]);
        assert_eq!(
            problems,
            vec![
                "style failed".to_string(),
                "layer hazards reported error: tile 404".to_string(),
                "layer hazards not visible".to_string(),
                "layer units failed".to_string(),
                "layer routes missing from validation payload".to_string(),
            ]
        );
    }

    #[test]
    fn overall_failure_without_details_is_still_a_problem() {
        let validation = LayerValidation::from_json(
            r#"{"terrain": {"success": true},
                "overall": {"success": false, "totalLayers": 5, "successfulLayers": 4}}"#,
        )
        .expect("parse");
        assert_eq!(
            validation.problems(&[]),
            vec!["layer validation failed (4/5 layers ok)".to_string()]
        );
    }

    #[test]
    fn scalar_top_level_keys_are_not_layers() {
        let validation = LayerValidation::from_json(
            r#"{"timestamp": 1718000000, "page": "/dashboard",
                "terrain": {"success": true, "visible": true},
                "overall": {"success": true, "totalLayers": 1, "successfulLayers": 1}}"#,
        )
        .expect("parse");
        let LayerValidation::Reported(report) = &validation else {
            panic!("expected a reported payload");
        };
        assert_eq!(report.layers.keys().collect::<Vec<_>>(), vec!["terrain"]);
        assert!(validation.problems(&[]).is_empty());
    }

    #[test]
    fn malformed_layer_entry_is_a_parse_error() {
        assert!(LayerValidation::from_json(r#"{"terrain": {"visible": "yes"}}"#).is_err());
    }

    #[tokio::test]
    async fn healthy_payload_passes_with_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("layers.json");
        std::fs::write(&path, HEALTHY).expect("write payload");

        let cmd = LayerValidationCommand::new("layers", &path).expecting(["terrain", "hazards"]);
        let result = cmd.run(&ctx()).await.expect("run");
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.artifacts, vec![path]);
        assert_eq!(result.metadata["layers"]["terrain"]["visible"], true);
        assert!(result.metadata["layers"].get("overall").is_none());
    }

    #[tokio::test]
    async fn missing_file_and_absent_api_are_warnings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = LayerValidationCommand::new("layers", dir.path().join("nope.json"))
            .run(&ctx())
            .await
            .expect("run");
        assert!(missing.success);
        assert_eq!(missing.warnings.len(), 1);

        let path = dir.path().join("absent.json");
        std::fs::write(&path, "null").expect("write payload");
        let absent = LayerValidationCommand::new("layers", &path)
            .run(&ctx())
            .await
            .expect("run");
        assert!(absent.success);
        assert_eq!(
            absent.warnings,
            vec!["map test api not available on this page".to_string()]
        );
    }

    #[tokio::test]
    async fn garbage_payload_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("layers.json");
        std::fs::write(&path, "{not json").expect("write payload");
        let result = LayerValidationCommand::new("layers", &path)
            .run(&ctx())
            .await
            .expect("run");
        assert!(!result.success);
    }
}
