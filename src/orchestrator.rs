//! The evaluation orchestrator: turns a registered rule set, a cart, and an
//! evaluation instant into a [`Manifest`], applying the conflict /
//! exclusivity / stacking policy described in the module-level design.

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::EngineError;
use crate::evaluator;
use crate::graph::RuleGraph;
use crate::manifest::{Manifest, RuleApplication};
use crate::model::{Cart, Rule, RuleId, RuleMode, StackOrder};

/// The pricing engine: a registered rule set plus the operations to
/// validate and evaluate against it.
///
/// Registration takes the graph's write lock; evaluation (including the
/// parallel façade in [`crate::parallel`]) takes only the read lock, so any
/// number of concurrent evaluations can proceed without blocking each other,
/// and a completed registration is immediately visible to every subsequent
/// evaluation.
#[derive(Debug, Default)]
pub struct Engine {
    graph: RwLock<RuleGraph>,
}

impl Engine {
    /// Creates an engine with an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule. See [`RuleGraph::add_rule`].
    pub fn add_rule(&self, rule: Rule) -> Result<(), EngineError> {
        self.graph.write().add_rule(rule)
    }

    /// Validates the current rule set: every dependency resolves, and the
    /// graph has no cycle. `evaluate`/`evaluate_at` re-run this check
    /// themselves, so calling it ahead of time is optional but recommended
    /// so that a `MissingDependency`/`CycleDetected` surfaces at
    /// registration time rather than at first use.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.graph.read().validate()
    }

    /// Evaluates `cart` at the current wall-clock time, non-simulated.
    pub fn evaluate(&self, cart: &Cart) -> Result<Manifest, EngineError> {
        self.evaluate_at(cart, Utc::now(), false)
    }

    /// Evaluates `cart` as of `t`. When `is_simulation` is true the
    /// resulting manifest carries `snapshot_date = Some(t)`.
    pub fn evaluate_at(
        &self,
        cart: &Cart,
        t: DateTime<Utc>,
        is_simulation: bool,
    ) -> Result<Manifest, EngineError> {
        let start = Instant::now();
        let graph = self.graph.read();

        graph.validate()?;
        let order = graph.topological_sort()?;

        let survivors: Vec<&Rule> = order
            .iter()
            .filter_map(|id| graph.rule(id))
            .filter(|rule| rule.is_valid_at(t))
            .collect();

        let mut exclusive: Vec<&Rule> = Vec::new();
        let mut additive: Vec<&Rule> = Vec::new();
        let mut multiplicative: Vec<&Rule> = Vec::new();

        for rule in survivors {
            match (rule.mode, rule.stack_order) {
                (RuleMode::Exclusive, _) => exclusive.push(rule),
                (RuleMode::Stackable, StackOrder::Additive) => additive.push(rule),
                (RuleMode::Stackable, StackOrder::Multiplicative) => multiplicative.push(rule),
            }
        }

        let priority_then_id = |a: &&Rule, b: &&Rule| {
            b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
        };
        exclusive.sort_by(priority_then_id);
        additive.sort_by(priority_then_id);
        multiplicative.sort_by(priority_then_id);

        let mut stacking_pass: Vec<&Rule> = Vec::with_capacity(additive.len() + multiplicative.len());
        stacking_pass.extend(additive);
        stacking_pass.extend(multiplicative);

        let entry_price = cart.total();
        let mut running = entry_price;
        let mut rules_applied: Vec<RuleApplication> = Vec::new();
        let mut rules_skipped: Vec<RuleId> = Vec::new();
        let mut applied_exclusive_id: Option<RuleId> = None;

        // A plain `for` loop over `stacking_pass` would never scan the
        // exclusive list at all when there are no stackable rules; the
        // exclusive scan has to run at least once even then, so the walk is
        // index-driven instead and checks exclusivity before consulting
        // `stacking_pass.get(index)`.
        let mut index = 0usize;
        loop {
            // Exclusivity is re-scanned every iteration, as the algorithm
            // specifies, rather than precomputed once up front. Every
            // `Condition` variant this engine supports is price-independent
            // (it only inspects cart items), so in practice the first scan's
            // result would never change across iterations; the repeated
            // scan is kept anyway so a future price-dependent condition
            // would not silently break the exclusivity contract.
            if let Some(ex_rule) = exclusive.iter().find(|r| evaluator::should_apply(r, cart)) {
                let (new_price, description) = evaluator::apply(ex_rule, cart, running);
                rules_applied.push(RuleApplication {
                    rule_id: ex_rule.id.clone(),
                    rule_name: ex_rule.name.clone(),
                    rule_type: ex_rule.rule_type,
                    entry_price: running,
                    delta: running.sub(new_price),
                    exit_price: new_price,
                    applied_at: Utc::now(),
                    description,
                });
                running = new_price;
                applied_exclusive_id = Some(ex_rule.id.clone());

                for remaining in &stacking_pass[index..] {
                    rules_skipped.push(remaining.id.clone());
                }
                break;
            }

            let Some(rule) = stacking_pass.get(index) else {
                break;
            };

            if evaluator::should_apply(rule, cart) {
                let (new_price, description) = evaluator::apply(rule, cart, running);
                rules_applied.push(RuleApplication {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    rule_type: rule.rule_type,
                    entry_price: running,
                    delta: running.sub(new_price),
                    exit_price: new_price,
                    applied_at: Utc::now(),
                    description,
                });
                running = new_price;
            } else {
                rules_skipped.push(rule.id.clone());
            }

            index += 1;
        }

        // Every exclusive rule that didn't fire is a considered-but-skipped
        // rule too, so it lands in exactly one of the two lists.
        for ex_rule in &exclusive {
            if applied_exclusive_id.as_deref() != Some(ex_rule.id.as_str()) {
                rules_skipped.push(ex_rule.id.clone());
            }
        }

        let final_price = running.round_to_cents();
        let total_discount = entry_price.sub(final_price);

        let manifest = Manifest {
            cart_id: cart.id.clone(),
            entry_price,
            final_price,
            total_discount,
            rules_applied,
            rules_skipped,
            evaluation_time: start.elapsed(),
            snapshot_date: is_simulation.then_some(t),
            is_simulation,
        };

        tracing::info!(
            cart_id = %manifest.cart_id,
            applied = manifest.rules_applied.len(),
            skipped = manifest.rules_skipped.len(),
            final_price = %manifest.final_price,
            "evaluation complete"
        );

        Ok(manifest)
    }
}
