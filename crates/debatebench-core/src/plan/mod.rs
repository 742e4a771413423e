//! Experiment plan loading and validation.

mod parser;
pub mod schema;

pub use parser::{DebateSpec, Evaluators, ExperimentPlan, PlanError};
pub use schema::validate_plan_schema;
