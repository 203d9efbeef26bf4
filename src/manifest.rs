//! The calculation manifest: a structured, replayable audit record of one
//! evaluation, with equality defined independently of wall-clock timestamps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::model::RuleId;

/// One rule's effect on the running price during a single evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleApplication {
    /// The rule that was applied.
    pub rule_id: RuleId,
    /// The rule's name at the time it was applied.
    pub rule_name: String,
    /// The rule's type, for display without a second lookup.
    pub rule_type: crate::model::RuleType,
    /// The running price before this rule applied.
    pub entry_price: Decimal,
    /// How much the running price changed (`entry_price - exit_price`).
    pub delta: Decimal,
    /// The running price after this rule applied.
    pub exit_price: Decimal,
    /// Wall-clock time this application happened. Cosmetic: zeroed by
    /// [`Manifest::zero_timestamps`] before any equality comparison.
    pub applied_at: DateTime<Utc>,
    /// Human-readable explanation, e.g. "15% off" or "buy 2 get 1 free".
    pub description: String,
}

/// The complete, deterministic output of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Echoes the cart's id.
    pub cart_id: String,
    /// The cart's total before any rule applied.
    pub entry_price: Decimal,
    /// The price after every applied rule and the mandated final rounding.
    pub final_price: Decimal,
    /// `entry_price - final_price`.
    pub total_discount: Decimal,
    /// Rules applied, in the order they were applied.
    pub rules_applied: Vec<RuleApplication>,
    /// Ids of rules that were considered but not applied, in the order
    /// considered (includes rules pruned by an exclusive trigger).
    pub rules_skipped: Vec<RuleId>,
    /// Wall-clock duration the evaluation took. Cosmetic.
    pub evaluation_time: Duration,
    /// Present iff this was a shadow (simulation) evaluation.
    pub snapshot_date: Option<DateTime<Utc>>,
    /// True iff this was a shadow (simulation) evaluation.
    pub is_simulation: bool,
}

impl Manifest {
    /// Structural equality on `cart_id`, prices, the applied list (id, type,
    /// prices, delta, in order), and the skipped list. Timestamps and
    /// `evaluation_time` are intentionally excluded so that two runs
    /// differing only in wall-clock are equal.
    pub fn equal(&self, other: &Manifest) -> bool {
        if self.cart_id != other.cart_id
            || self.entry_price != other.entry_price
            || self.final_price != other.final_price
            || self.total_discount != other.total_discount
            || self.is_simulation != other.is_simulation
            || self.snapshot_date != other.snapshot_date
            || self.rules_skipped != other.rules_skipped
            || self.rules_applied.len() != other.rules_applied.len()
        {
            return false;
        }

        self.rules_applied
            .iter()
            .zip(other.rules_applied.iter())
            .all(|(a, b)| {
                a.rule_id == b.rule_id
                    && a.rule_type == b.rule_type
                    && a.entry_price == b.entry_price
                    && a.delta == b.delta
                    && a.exit_price == b.exit_price
            })
    }

    /// Returns a copy of this manifest with `evaluation_time` and every
    /// `applied_at` zeroed out, so byte-for-byte comparison (or [`Manifest::equal`])
    /// ignores wall-clock noise entirely.
    pub fn zero_timestamps(&self) -> Manifest {
        let mut clone = self.clone();
        clone.evaluation_time = Duration::ZERO;
        for application in &mut clone.rules_applied {
            application.applied_at = DateTime::<Utc>::UNIX_EPOCH;
        }
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleType;

    fn sample_manifest(applied_at: DateTime<Utc>, evaluation_time: Duration) -> Manifest {
        Manifest {
            cart_id: "cart-1".to_owned(),
            entry_price: Decimal::from_units(100),
            final_price: Decimal::from_units(90),
            total_discount: Decimal::from_units(10),
            rules_applied: vec![RuleApplication {
                rule_id: "r1".to_owned(),
                rule_name: "Ten off".to_owned(),
                rule_type: RuleType::Fixed,
                entry_price: Decimal::from_units(100),
                delta: Decimal::from_units(10),
                exit_price: Decimal::from_units(90),
                applied_at,
                description: "10.00 off".to_owned(),
            }],
            rules_skipped: vec!["r2".to_owned()],
            evaluation_time,
            snapshot_date: None,
            is_simulation: false,
        }
    }

    #[test]
    fn equal_ignores_timestamps_but_not_content() {
        let a = sample_manifest(Utc::now(), Duration::from_millis(3));
        let b = sample_manifest(Utc::now() - chrono::Duration::hours(1), Duration::from_millis(7));

        assert!(a.equal(&b));
        assert_eq!(a.zero_timestamps().evaluation_time, Duration::ZERO);
        assert_ne!(a.evaluation_time, b.evaluation_time);
    }

    #[test]
    fn equal_detects_content_differences() {
        let a = sample_manifest(Utc::now(), Duration::ZERO);
        let mut b = sample_manifest(Utc::now(), Duration::ZERO);
        b.final_price = Decimal::from_units(80);

        assert!(!a.equal(&b));
    }
}
