//! The parallel evaluation façade: runs many independent cart evaluations
//! concurrently across a CPU-bound thread pool.
//!
//! Evaluation here is pure computation with no I/O and no cooperative yield
//! points, so a `rayon` data-parallel pass over OS threads is the natural
//! fit, rather than reaching for an async runtime whose value comes from
//! overlapping I/O wait time this workload never has.

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::error::EngineError;
use crate::manifest::Manifest;
use crate::model::Cart;
use crate::orchestrator::Engine;

/// Evaluates every cart in `carts` against `engine`, one evaluation per
/// cart, using as many worker threads as `rayon`'s global pool has
/// available. The result vector preserves the input order: `results[i]`
/// corresponds to `carts[i]`, independent of which order the pool actually
/// finished the work in.
///
/// `engine` only needs its read lock for each evaluation, so the whole
/// batch proceeds without the evaluations serializing against each other.
pub fn evaluate_parallel(engine: &Engine, carts: &[Cart]) -> Vec<Result<Manifest, EngineError>> {
    evaluate_parallel_at(engine, carts, Utc::now(), false)
}

/// As [`evaluate_parallel`], but every evaluation runs against the same
/// fixed instant `t` rather than the wall clock, so a batch of shadow
/// evaluations is reproducible.
pub fn evaluate_parallel_at(
    engine: &Engine,
    carts: &[Cart],
    t: DateTime<Utc>,
    is_simulation: bool,
) -> Vec<Result<Manifest, EngineError>> {
    carts
        .par_iter()
        .map(|cart| engine.evaluate_at(cart, t, is_simulation))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::decimal::Decimal;
    use crate::model::{CartItem, Rule, RuleMode, RuleType, StackOrder};

    use super::*;

    fn cart(id: &str, price: &str, qty: u32) -> Cart {
        Cart {
            id: id.to_owned(),
            items: vec![CartItem {
                id: "line-1".to_owned(),
                product_id: "sku-1".to_owned(),
                name: "Widget".to_owned(),
                quantity: qty,
                unit_price: Decimal::from_str_exact(price).expect("valid test price"),
                category: "widgets".to_owned(),
                tags: vec![],
            }],
            created_at: Utc::now(),
        }
    }

    fn ten_percent_off() -> Rule {
        Rule::new(
            "ten-off",
            "Ten percent off",
            RuleType::Percentage,
            RuleMode::Stackable,
            StackOrder::Multiplicative,
            0,
            BTreeSet::new(),
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
    fn results_preserve_input_order() {
        let engine = Engine::new();
        engine.add_rule(ten_percent_off()).expect("valid registration");

        let carts: Vec<Cart> = (0..50)
            .map(|i| cart(&format!("cart-{i}"), "10.00", 1))
            .collect();

        let results = evaluate_parallel(&engine, &carts);
        assert_eq!(results.len(), carts.len());
        for (i, result) in results.iter().enumerate() {
            let manifest = result.as_ref().expect("evaluation should succeed");
            assert_eq!(manifest.cart_id, format!("cart-{i}"));
        }
    }

    #[test]
    fn concurrent_evaluations_are_pairwise_deterministic() {
        let engine = Engine::new();
        engine.add_rule(ten_percent_off()).expect("valid registration");
        let one_cart = cart("cart-x", "33.33", 3);
        let carts: Vec<Cart> = (0..1000).map(|_| one_cart.clone()).collect();

        let results = evaluate_parallel(&engine, &carts);
        let manifests: Vec<Manifest> = results
            .into_iter()
            .map(|r| r.expect("evaluation should succeed").zero_timestamps())
            .collect();

        let first = &manifests[0];
        for other in &manifests[1..] {
            assert!(first.equal(other));
        }
    }
}
