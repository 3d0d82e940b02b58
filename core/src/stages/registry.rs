//! The compile-time stage registry: a closed map from stage name to
//! constructor, not a reflective directory scan.

use crate::stages::{BuildStage, DocumentStage, MergeStage, PlanStage, ReviewStage, TestStage};
use crate::traits::Stage;
use tracing::warn;

/// The closed set of stage names the registry knows how to construct,
/// in the conventional pipeline order.
pub const KNOWN_STAGES: &[&str] = &["plan", "build", "test", "review", "document", "merge"];

#[derive(Default)]
pub struct StageRegistry;

impl StageRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn list_stages(&self) -> &'static [&'static str] {
        KNOWN_STAGES
    }

    /// Instantiates the stage named `name`. Unknown names return `None`;
    /// callers log and skip rather than treating this as an error.
    pub fn create(&self, name: &str) -> Option<Box<dyn Stage>> {
        match name {
            "plan" => Some(Box::new(PlanStage)),
            "build" => Some(Box::new(BuildStage)),
            "test" => Some(Box::new(TestStage)),
            "review" => Some(Box::new(ReviewStage)),
            "document" => Some(Box::new(DocumentStage)),
            "merge" => Some(Box::new(MergeStage)),
            other => {
                warn!(stage = other, "unknown stage name, skipping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_every_known_stage() {
        let registry = StageRegistry::new();
        for name in KNOWN_STAGES {
            let stage = registry.create(name);
            assert!(stage.is_some(), "expected {name} to construct");
            assert_eq!(stage.unwrap().name(), *name);
        }
    }

    #[test]
    fn unknown_stage_name_returns_none() {
        let registry = StageRegistry::new();
        assert!(registry.create("not_a_real_stage").is_none());
    }

    #[test]
    fn dependency_chain_matches_conventional_pipeline_order() {
        let registry = StageRegistry::new();
        assert_eq!(registry.create("plan").unwrap().dependencies(), &[] as &[&str]);
        assert_eq!(registry.create("build").unwrap().dependencies(), &["plan"]);
        assert_eq!(registry.create("test").unwrap().dependencies(), &["build"]);
        assert_eq!(registry.create("review").unwrap().dependencies(), &["build"]);
        assert_eq!(registry.create("document").unwrap().dependencies(), &["build"]);
        assert_eq!(registry.create("merge").unwrap().dependencies(), &["build"]);
    }
}
