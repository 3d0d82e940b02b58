//! Loads orchestrator/workflow configuration from a named YAML workflow, an
//! inline JSON `OrchestratorConfig`, or a raw comma-separated stage list,
//! and builds each stage's `depends_on` chain.

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One stage's resolved position within a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfigEntry {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// The resolved, ordered list of enabled stages for one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub workflow_name: String,
    pub stages: Vec<StageConfigEntry>,
    /// Workflow-level failure policy override. Per SPEC_FULL.md, failure
    /// policy is "`continue_on_failure` in orchestrator config or workflow
    /// config" -- this is the workflow-config half of that `or`; the
    /// orchestrator ORs it with `OrchestratorConfig::continue_on_failure`.
    #[serde(default)]
    pub continue_on_failure: Option<bool>,
}

impl WorkflowConfig {
    /// Each stage's `depends_on` is the single stage before it; the first
    /// has none. This mirrors the linear plan->build->test->... pipeline;
    /// named YAML workflows may declare richer dependency graphs directly.
    pub fn from_stage_names(workflow_name: impl Into<String>, names: &[String]) -> Self {
        let stages = names
            .iter()
            .enumerate()
            .map(|(i, name)| StageConfigEntry {
                name: name.clone(),
                enabled: true,
                depends_on: if i == 0 {
                    Vec::new()
                } else {
                    vec![names[i - 1].clone()]
                },
                config: HashMap::new(),
            })
            .collect();

        Self {
            workflow_name: workflow_name.into(),
            stages,
            continue_on_failure: None,
        }
    }

    pub fn enabled_stage_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }
}

/// Orchestrator-wide run settings, parsed from `--config '<json>'`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub max_instances: Option<u32>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub model_set: Option<String>,
}

/// A raw, on-disk workflow YAML file: just the stage list and optional
/// per-stage config, before `depends_on` chains are computed.
#[derive(Debug, Clone, Deserialize)]
struct RawWorkflowFile {
    workflow_name: Option<String>,
    stages: Vec<RawWorkflowStage>,
    #[serde(default)]
    continue_on_failure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWorkflowStage {
    name: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    depends_on: Option<Vec<String>>,
    #[serde(default)]
    config: HashMap<String, Value>,
}

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// `ADW_CONFIG_DIR` overrides where named workflow YAML files are
    /// discovered; otherwise `./workflows`.
    pub fn new() -> Self {
        let config_dir = std::env::var("ADW_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("workflows"));
        Self { config_dir }
    }

    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Builds a `WorkflowConfig` directly from `--stages a,b,c`.
    pub fn from_stage_list(&self, stages_csv: &str) -> ConfigResult<WorkflowConfig> {
        let names: Vec<String> = stages_csv
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if names.is_empty() {
            return Err(ConfigError::Invalid("--stages produced an empty stage list".into()));
        }

        Ok(WorkflowConfig::from_stage_names(
            format!("dynamic_{}", names.join("_")),
            &names,
        ))
    }

    /// Loads `<config_dir>/<name>.yaml` (or `.yml`).
    pub async fn from_named_workflow(&self, name: &str) -> ConfigResult<WorkflowConfig> {
        let candidates = [
            self.config_dir.join(format!("{name}.yaml")),
            self.config_dir.join(format!("{name}.yml")),
        ];

        let path = candidates
            .iter()
            .find(|p| p.exists())
            .ok_or_else(|| ConfigError::NotFound(format!("workflow '{name}' under {}", self.config_dir.display())))?;

        self.load_workflow_file(path).await
    }

    async fn load_workflow_file(&self, path: &Path) -> ConfigResult<WorkflowConfig> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(ConfigError::IoError)?;

        let raw: RawWorkflowFile = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

        let names: Vec<String> = raw.stages.iter().map(|s| s.name.clone()).collect();
        let stages = raw
            .stages
            .into_iter()
            .enumerate()
            .map(|(i, raw_stage)| StageConfigEntry {
                name: raw_stage.name.clone(),
                enabled: raw_stage.enabled,
                depends_on: raw_stage.depends_on.unwrap_or_else(|| {
                    if i == 0 {
                        Vec::new()
                    } else {
                        vec![names[i - 1].clone()]
                    }
                }),
                config: raw_stage.config,
            })
            .collect();

        let workflow_name = raw
            .workflow_name
            .unwrap_or_else(|| path.file_stem().unwrap().to_string_lossy().to_string());

        Ok(WorkflowConfig {
            workflow_name,
            stages,
            continue_on_failure: raw.continue_on_failure,
        })
    }

    /// Parses `--config '<json>'` as an [`OrchestratorConfig`].
    pub fn parse_inline_config(&self, json: &str) -> ConfigResult<OrchestratorConfig> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_stage_list_builds_linear_depends_on_chain() {
        let loader = ConfigLoader::with_config_dir("/nonexistent");
        let config = loader.from_stage_list("plan,build,test").unwrap();
        assert_eq!(config.stages[0].depends_on, Vec::<String>::new());
        assert_eq!(config.stages[1].depends_on, vec!["plan".to_string()]);
        assert_eq!(config.stages[2].depends_on, vec!["build".to_string()]);
    }

    #[test]
    fn from_stage_list_rejects_empty_list() {
        let loader = ConfigLoader::with_config_dir("/nonexistent");
        assert!(loader.from_stage_list("  ,  ,").is_err());
    }

    #[test]
    fn parse_inline_config_reads_continue_on_failure() {
        let loader = ConfigLoader::with_config_dir("/nonexistent");
        let config = loader
            .parse_inline_config(r#"{"continue_on_failure": true, "max_instances": 3}"#)
            .unwrap();
        assert!(config.continue_on_failure);
        assert_eq!(config.max_instances, Some(3));
    }

    #[tokio::test]
    async fn named_workflow_not_found_is_config_error() {
        let loader = ConfigLoader::with_config_dir("/nonexistent/dir");
        let err = loader.from_named_workflow("missing").await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[tokio::test]
    async fn named_workflow_reads_continue_on_failure_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resilient.yaml");
        tokio::fs::write(
            &path,
            r#"
workflow_name: resilient_flow
continue_on_failure: true
stages:
  - name: plan
  - name: build
"#,
        )
        .await
        .unwrap();

        let loader = ConfigLoader::with_config_dir(dir.path());
        let config = loader.from_named_workflow("resilient").await.unwrap();
        assert_eq!(config.continue_on_failure, Some(true));
    }

    #[tokio::test]
    async fn named_workflow_loads_from_yaml_with_explicit_depends_on() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        tokio::fs::write(
            &path,
            r#"
workflow_name: custom_flow
stages:
  - name: plan
  - name: review
    depends_on: [plan]
    config:
      mode: security
"#,
        )
        .await
        .unwrap();

        let loader = ConfigLoader::with_config_dir(dir.path());
        let config = loader.from_named_workflow("custom").await.unwrap();
        assert_eq!(config.workflow_name, "custom_flow");
        assert_eq!(config.stages[1].depends_on, vec!["plan".to_string()]);
        assert_eq!(
            config.stages[1].config.get("mode").and_then(|v| v.as_str()),
            Some("security")
        );
    }
}
