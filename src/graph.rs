//! The rule dependency graph: registration, cycle detection, and the
//! deterministic topological sort the orchestrator builds its ordering on.

use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::EngineError;
use crate::model::{Rule, RuleId};

/// An append-only collection of rules plus their dependency edges.
///
/// Registration (`add_rule`) and evaluation are treated as separate phases:
/// nothing in this type mutates a [`Rule`] once it is inserted, and
/// `topological_sort` never mutates the graph itself (it works over a
/// disposable copy of in-degrees).
#[derive(Debug, Default)]
pub struct RuleGraph {
    graph: DiGraph<RuleId, ()>,
    index_of: HashMap<RuleId, NodeIndex>,
    rules: HashMap<RuleId, Rule>,
}

impl RuleGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule and its dependency edges.
    ///
    /// Returns [`EngineError::DuplicateRule`] if `rule.id` is already present.
    /// Dependency targets are not required to exist yet; call
    /// [`RuleGraph::validate`] after all rules are registered to check that.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), EngineError> {
        if self.rules.contains_key(&rule.id) {
            return Err(EngineError::DuplicateRule(rule.id));
        }

        let node = self.graph.add_node(rule.id.clone());
        let _ = self.index_of.insert(rule.id.clone(), node);

        // Wire edges for dependencies already registered...
        for dependency_id in &rule.dependencies {
            if let Some(&dep_node) = self.index_of.get(dependency_id) {
                let _ = self.graph.add_edge(dep_node, node, ());
            }
        }
        // ...and wire edges for already-registered rules that depend on this
        // one, so registration order never matters for the final graph shape.
        for (other_id, other_node) in &self.index_of {
            if other_id == &rule.id {
                continue;
            }
            if let Some(other_rule) = self.rules.get(other_id) {
                if other_rule.dependencies.contains(&rule.id) {
                    let _ = self.graph.add_edge(node, *other_node, ());
                }
            }
        }

        tracing::debug!(rule_id = %rule.id, "registered rule");
        let _ = self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Returns the registered rule for `id`, if any.
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    /// Iterates every registered rule in unspecified order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rules have been registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks that every dependency referenced by a registered rule also
    /// exists, then checks for cycles. This is the single entry point a
    /// caller should run before the first `evaluate`. Takes `&self`: edges
    /// are already fully wired by `add_rule` regardless of registration
    /// order, so validation never needs to mutate the graph.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.validate_dependencies()?;
        self.detect_cycle()
    }

    /// Returns [`EngineError::MissingDependency`] for the first rule found
    /// whose `dependencies` references an id that was never registered.
    pub fn validate_dependencies(&self) -> Result<(), EngineError> {
        let mut rule_ids: Vec<&RuleId> = self.rules.keys().collect();
        rule_ids.sort();

        for rule_id in rule_ids {
            let rule = &self.rules[rule_id];
            let mut dependency_ids: Vec<&RuleId> = rule.dependencies.iter().collect();
            dependency_ids.sort();
            for dependency_id in dependency_ids {
                if !self.rules.contains_key(dependency_id) {
                    return Err(EngineError::MissingDependency {
                        rule_id: rule.id.clone(),
                        dependency_id: dependency_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Standalone, explicit-stack DFS cycle probe. Does not require
    /// `validate_dependencies` to have run first, but a graph with a missing
    /// dependency simply has fewer edges, which cannot itself create a cycle.
    pub fn detect_cycle(&self) -> Result<(), EngineError> {
        #[derive(Clone, Copy, Eq, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        let mut marks: HashMap<NodeIndex, Mark> = HashMap::with_capacity(self.graph.node_count());
        let mut node_ids: Vec<NodeIndex> = self.graph.node_indices().collect();
        node_ids.sort_by_key(|n| n.index());

        for start in node_ids {
            if marks.contains_key(&start) {
                continue;
            }

            // Explicit stack of (node, iterator-position-into-neighbors) so
            // that a 1,000+ node chain cannot overflow the native call stack.
            let mut stack: Vec<(NodeIndex, usize)> = vec![(start, 0)];
            let _ = marks.insert(start, Mark::Active);

            while let Some(&mut (node, ref mut next_child)) = stack.last_mut() {
                let neighbors: Vec<NodeIndex> =
                    self.graph.neighbors_directed(node, Direction::Outgoing).collect();

                if *next_child < neighbors.len() {
                    let child = neighbors[*next_child];
                    *next_child += 1;

                    match marks.get(&child) {
                        Some(Mark::Active) => return Err(EngineError::CycleDetected),
                        Some(Mark::Done) => {}
                        None => {
                            let _ = marks.insert(child, Mark::Active);
                            stack.push((child, 0));
                        }
                    }
                } else {
                    let _ = marks.insert(node, Mark::Done);
                    let _ = stack.pop();
                }
            }
        }

        Ok(())
    }

    /// Deterministic topological order: every rule appears after all of its
    /// dependencies, and ties (no dependency relation between two rules) are
    /// broken by higher `priority` first, then smaller `id`.
    ///
    /// Implemented as an iterative Kahn's algorithm: the ready queue is a
    /// binary heap ordered by `(priority, Reverse(id))` so the highest
    /// priority / lexicographically-smallest id is always drained first,
    /// regardless of the order rules were registered or how the backing
    /// hash maps happen to iterate.
    pub fn topological_sort(&self) -> Result<Vec<RuleId>, EngineError> {
        self.detect_cycle()?;

        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::with_capacity(self.graph.node_count());
        for node in self.graph.node_indices() {
            let _ = in_degree.insert(
                node,
                self.graph.neighbors_directed(node, Direction::Incoming).count(),
            );
        }

        #[derive(Eq, PartialEq)]
        struct Ready {
            priority: i32,
            id: RuleId,
            node: NodeIndex,
        }

        impl Ord for Ready {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                // BinaryHeap is a max-heap: higher priority must sort greater,
                // and for equal priority the *smaller* id must sort greater
                // (so it is popped first) -- hence the reversed id comparison.
                self.priority
                    .cmp(&other.priority)
                    .then_with(|| other.id.cmp(&self.id))
            }
        }
        impl PartialOrd for Ready {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut ready: BinaryHeap<Ready> = BinaryHeap::new();
        let mut node_ids: Vec<NodeIndex> = self.graph.node_indices().collect();
        node_ids.sort_by_key(|n| n.index());
        for node in node_ids {
            if in_degree[&node] == 0 {
                let id = self.graph[node].clone();
                let priority = self.rules[&id].priority;
                ready.push(Ready { priority, id, node });
            }
        }

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Ready { node, id, .. }) = ready.pop() {
            order.push(id);

            let mut newly_ready: Vec<NodeIndex> = Vec::new();
            for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = in_degree
                    .get_mut(&neighbor)
                    .expect("neighbor must have an in-degree entry");
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(neighbor);
                }
            }
            newly_ready.sort_by_key(|n| n.index());
            for neighbor in newly_ready {
                let neighbor_id = self.graph[neighbor].clone();
                let priority = self.rules[&neighbor_id].priority;
                ready.push(Ready {
                    priority,
                    id: neighbor_id,
                    node: neighbor,
                });
            }
        }

        if order.len() != self.graph.node_count() {
            // Ought to be unreachable since detect_cycle() above already
            // rejected any cycle, but guards against a logic error silently
            // dropping rules from the output.
            return Err(EngineError::CycleDetected);
        }

        tracing::info!(rule_count = order.len(), "topological sort complete");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::decimal::Decimal;
    use crate::model::{RuleMode, RuleType, StackOrder};

    fn rule(id: &str, priority: i32, deps: &[&str]) -> Rule {
        Rule::new(
            id,
            id,
            RuleType::Percentage,
            RuleMode::Stackable,
            StackOrder::Multiplicative,
            priority,
            deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            Decimal::from_units(10),
            1,
            1,
            None,
            None,
            None,
        )
        .expect("valid test rule")
    }

    #[test]
    fn duplicate_rule_is_rejected() {
        let mut graph = RuleGraph::new();
        graph
            .add_rule(rule("a", 0, &[]))
            .expect("first registration should succeed");
        let err = graph
            .add_rule(rule("a", 0, &[]))
            .expect_err("duplicate id should be rejected");
        assert!(matches!(err, EngineError::DuplicateRule(id) if id == "a"));
    }

    #[test]
    fn missing_dependency_is_detected() {
        let mut graph = RuleGraph::new();
        graph
            .add_rule(rule("b", 0, &["x"]))
            .expect("registration with an unresolved dependency still succeeds");
        let err = graph
            .validate_dependencies()
            .expect_err("dependency 'x' was never registered");
        assert!(matches!(
            err,
            EngineError::MissingDependency { rule_id, dependency_id }
                if rule_id == "b" && dependency_id == "x"
        ));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut graph = RuleGraph::new();
        graph.add_rule(rule("a", 0, &["c"])).expect("valid registration");
        graph.add_rule(rule("b", 0, &["a"])).expect("valid registration");
        graph.add_rule(rule("c", 0, &["b"])).expect("valid registration");
        let err = graph.validate().expect_err("a-b-c-a forms a cycle");
        assert!(matches!(err, EngineError::CycleDetected));
    }

    #[test]
    fn topological_order_respects_edges() {
        let mut graph = RuleGraph::new();
        graph.add_rule(rule("a", 0, &[])).expect("valid registration");
        graph.add_rule(rule("b", 0, &["a"])).expect("valid registration");
        graph.add_rule(rule("c", 0, &["b"])).expect("valid registration");
        graph.validate().expect("acyclic graph should validate");

        let order = graph.topological_sort().expect("acyclic graph should sort");
        let pos = |id: &str| {
            order
                .iter()
                .position(|x| x == id)
                .expect("id should be present in the order")
        };
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn ties_break_by_priority_then_id() {
        let mut graph = RuleGraph::new();
        graph.add_rule(rule("c", 5, &[])).expect("valid registration");
        graph.add_rule(rule("a", 10, &[])).expect("valid registration");
        graph.add_rule(rule("b", 10, &[])).expect("valid registration");
        graph.validate().expect("acyclic graph should validate");

        let order = graph.topological_sort().expect("acyclic graph should sort");
        assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn tie_break_is_independent_of_registration_order() {
        // Same rule set, rules inserted in a different order: the sort must
        // still be a pure function of (ids, priorities, edges).
        let mut graph = RuleGraph::new();
        graph.add_rule(rule("C", 0, &[])).expect("valid registration");
        graph.add_rule(rule("B", 0, &[])).expect("valid registration");
        graph.add_rule(rule("A", 0, &[])).expect("valid registration");
        graph.validate().expect("acyclic graph should validate");

        let order = graph.topological_sort().expect("acyclic graph should sort");
        assert_eq!(
            order,
            vec!["A".to_string(), "B".to_string(), "C".to_string()]
        );
    }

    #[test]
    fn deep_chain_does_not_overflow_stack() {
        let mut graph = RuleGraph::new();
        let count = 2_000;
        graph
            .add_rule(rule("rule-0", 0, &[]))
            .expect("valid registration");
        for i in 1..count {
            let id = format!("rule-{i}");
            let dep = format!("rule-{}", i - 1);
            graph
                .add_rule(rule(&id, 0, &[&dep]))
                .expect("valid registration");
        }
        graph.validate().expect("deep chain should still validate");
        let order = graph
            .topological_sort()
            .expect("deep chain should still sort");
        assert_eq!(order.len(), count);
        assert_eq!(order[0], "rule-0");
        assert_eq!(order[count - 1], format!("rule-{}", count - 1));
    }

    #[test]
    fn dependency_registered_after_its_dependent_is_still_wired() {
        let mut graph = RuleGraph::new();
        // "b" depends on "a", but "a" is registered second.
        graph.add_rule(rule("b", 0, &["a"])).expect("valid registration");
        graph.add_rule(rule("a", 0, &[])).expect("valid registration");
        graph.validate().expect("acyclic graph should validate");

        let order = graph.topological_sort().expect("acyclic graph should sort");
        let pos = |id: &str| {
            order
                .iter()
                .position(|x| x == id)
                .expect("id should be present in the order")
        };
        assert!(pos("a") < pos("b"));
    }
}
