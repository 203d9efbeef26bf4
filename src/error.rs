//! The error taxonomy shared across registration, validation, and evaluation.
//!
//! One `thiserror`-derived enum covers every fallible engine operation, the
//! way the reference adapter and template-parsing errors each collapse their
//! failure modes into a single enum with one display message per variant.

use crate::model::RuleId;

/// Every way an engine operation can fail.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum EngineError {
    /// `add_rule` was called with an id already present in the graph.
    #[error("rule '{0}' is already registered")]
    DuplicateRule(RuleId),

    /// A rule's `dependencies` referenced an id absent from the graph.
    #[error("rule '{rule_id}' depends on unknown rule '{dependency_id}'")]
    MissingDependency {
        /// The rule whose dependency could not be resolved.
        rule_id: RuleId,
        /// The absent dependency id.
        dependency_id: RuleId,
    },

    /// The dependency graph contains a directed cycle.
    #[error("rule dependency graph contains a cycle")]
    CycleDetected,

    /// A deadline wrapper aborted the evaluation before it produced a manifest.
    #[error("evaluation exceeded its deadline")]
    Timeout,

    /// A rule failed construction-time validation.
    #[error("rule '{rule_id}' is invalid: {reason}")]
    InvalidRule {
        /// The offending rule's id.
        rule_id: RuleId,
        /// Why construction was rejected.
        reason: String,
    },
}
