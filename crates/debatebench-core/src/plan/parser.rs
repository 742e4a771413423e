//! Experiment plan parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_plan_schema;
use crate::analytics::RankingWeights;
use crate::types::EvaluatorConfig;

/// Errors that can occur when loading a plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to read plan file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Plan does not match schema: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Plan validation failed: {0}")]
    ValidationError(String),
}

/// Evaluator models and rubric variants to cross.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluators {
    /// Evaluator model identities
    pub models: Vec<String>,

    /// Rubric variant ids (e.g., "p0")
    pub rubrics: Vec<String>,
}

/// A debate to generate before judging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateSpec {
    pub topic: String,
    pub pro_model: String,
    pub con_model: String,
}

/// A stability experiment: who judges, how often, and what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentPlan {
    /// Version of the plan format
    pub plan_version: String,

    /// Human-readable name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub evaluators: Evaluators,

    /// Repeated runs per (config, exchange)
    pub runs_per_exchange: u32,

    /// Exchange ids to judge. Empty means every stored exchange.
    #[serde(default)]
    pub exchanges: Vec<String>,

    /// Exchanges to generate
    #[serde(default)]
    pub debates: Vec<DebateSpec>,

    /// Ranking weight overrides
    #[serde(default)]
    pub weights: RankingWeights,
}

impl ExperimentPlan {
    /// Parse a plan from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PlanError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a plan from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a plan file, choosing the format by extension (`.json`, else YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, PlanError> {
        validate_plan_schema(&value).map_err(PlanError::SchemaError)?;
        let plan: ExperimentPlan = serde_json::from_value(value)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Structural checks the schema cannot express.
    fn validate(&self) -> Result<(), PlanError> {
        if self.evaluators.models.is_empty() {
            return Err(PlanError::ValidationError(
                "evaluators.models must not be empty".to_string(),
            ));
        }
        if self.evaluators.rubrics.is_empty() {
            return Err(PlanError::ValidationError(
                "evaluators.rubrics must not be empty".to_string(),
            ));
        }
        if self.runs_per_exchange == 0 {
            return Err(PlanError::ValidationError(
                "runs_per_exchange must be at least 1".to_string(),
            ));
        }

        Self::ensure_unique("evaluators.models", &self.evaluators.models)?;
        Self::ensure_unique("evaluators.rubrics", &self.evaluators.rubrics)?;
        Self::ensure_unique("exchanges", &self.exchanges)?;

        Ok(())
    }

    fn ensure_unique(field: &str, values: &[String]) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for value in values {
            if !seen.insert(value) {
                return Err(PlanError::ValidationError(format!(
                    "Duplicate entry in {}: {}",
                    field, value
                )));
            }
        }
        Ok(())
    }

    /// Models × rubrics, in plan order.
    pub fn configs(&self) -> Vec<EvaluatorConfig> {
        self.evaluators
            .models
            .iter()
            .flat_map(|model| {
                self.evaluators
                    .rubrics
                    .iter()
                    .map(move |rubric| EvaluatorConfig::new(model.clone(), rubric.clone()))
            })
            .collect()
    }

    /// Total judgment units: configs × exchanges × runs.
    pub fn unit_count(&self, exchange_count: usize) -> usize {
        self.configs().len() * exchange_count * self.runs_per_exchange as usize
    }
}
