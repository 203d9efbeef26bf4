//! A discount resolution engine for e-commerce carts.
//!
//! Rules are registered into a dependency graph ([`graph::RuleGraph`]),
//! ordered deterministically by topological sort with a priority/id
//! tie-break, then applied to a cart's running price under a conflict /
//! exclusivity / stacking policy ([`orchestrator::Engine`]). Every price
//! computation runs on an exact fixed-point [`decimal::Decimal`] rather than
//! binary floating point, and every evaluation produces an auditable,
//! timestamp-insensitive [`manifest::Manifest`].
//!
//! [`parallel::evaluate_parallel`] runs a batch of independent evaluations
//! across a CPU-bound thread pool; [`test_report`] is unrelated ambient
//! tooling for aggregating a test run's own pass/fail output and is never
//! reached from the pricing path.

#![cfg_attr(test, allow(unused_results))]

pub mod decimal;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod manifest;
pub mod model;
pub mod orchestrator;
pub mod parallel;
pub mod test_report;

pub use decimal::Decimal;
pub use error::EngineError;
pub use manifest::{Manifest, RuleApplication};
pub use model::{Cart, CartItem, Condition, Rule, RuleId, RuleMode, RuleType, StackOrder};
pub use orchestrator::Engine;
pub use parallel::{evaluate_parallel, evaluate_parallel_at};
