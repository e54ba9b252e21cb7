//! Drill harness: runs test suites, tracks their failures and writes reports.

pub mod chaos_command;
pub mod command;
pub mod component_command;
pub mod event_log;
pub mod http_client;
pub mod issue_tracker;
pub mod layers;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod suite_file;
pub mod validation_api;

pub use chaos_command::*;
pub use command::*;
pub use component_command::*;
pub use event_log::*;
pub use http_client::*;
pub use issue_tracker::*;
pub use layers::*;
pub use orchestrator::*;
pub use pipeline::*;
pub use report::*;
pub use suite_file::*;
pub use validation_api::*;

#[cfg(test)]
mod tests {
    use super::{
        classify, ChaosCommand, IssueTracker, JsonlEventLog, PipelineController, TestOrchestrator,
        TestSuite,
    };
    use drill_core::{IssueCategory, IssueSeverity};
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_orchestration_types() {
        let _ = TypeId::of::<TestOrchestrator>();
        let _ = TypeId::of::<TestSuite>();
        let _ = TypeId::of::<PipelineController>();
        let _ = TypeId::of::<IssueTracker>();
        let _ = TypeId::of::<ChaosCommand>();
        let _ = TypeId::of::<JsonlEventLog>();
    }

    #[test]
    fn crate_root_reexports_classifier() {
        assert_eq!(
            classify("connection refused"),
            (IssueCategory::Network, IssueSeverity::High)
        );
    }
}
