//! Immutable domain types: rules, cart items, carts, and validity windows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::EngineError;

/// Unique, opaque rule identifier. Also the deterministic tie-breaker in
/// topological ordering (smaller id wins ties), so ids compare
/// lexicographically as plain strings.
pub type RuleId = String;

/// The pricing mechanic a rule applies.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Percentage off the running price.
    Percentage,
    /// A flat amount off the running price.
    Fixed,
    /// Buy X, get Y free; see the evaluator for the cross-SKU mechanics.
    BuyXGetY,
    /// Bundle discount; evaluated identically to [`RuleType::Percentage`].
    Bundle,
    /// A surcharge that increases the running price.
    Surge,
}

/// Whether a rule may combine with other rules.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleMode {
    /// Triggering this rule prunes every remaining stackable rule.
    Exclusive,
    /// This rule combines with other stackable rules.
    Stackable,
}

/// Ordering tier within stackable rules. Only meaningful when `mode == Stackable`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackOrder {
    /// Subtracts a fixed amount; ordered before multiplicative rules.
    Additive,
    /// Subtracts a percentage of the running price; ordered after additive rules.
    Multiplicative,
}

/// A data-driven predicate over a single [`CartItem`], kept serializable so
/// rule sets can round-trip through JSON rather than carrying opaque closures.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// Matches items whose `category` equals the given string.
    CategoryEquals(String),
    /// Matches items whose `tags` include the given string.
    TagIncludes(String),
    /// Matches items with `quantity >= min_quantity`.
    MinQuantity(u32),
    /// Matches items with `unit_price >= min_unit_price`.
    MinUnitPrice(Decimal),
}

impl Condition {
    /// Evaluates this predicate against a single cart item.
    pub fn matches(&self, item: &CartItem) -> bool {
        match self {
            Condition::CategoryEquals(category) => &item.category == category,
            Condition::TagIncludes(tag) => item.tags.iter().any(|t| t == tag),
            Condition::MinQuantity(min) => item.quantity >= *min,
            Condition::MinUnitPrice(min) => item.unit_price >= *min,
        }
    }
}

/// A single promotion rule. Immutable after construction; the only way to
/// change a rule set is to register a new [`Rule`] into the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique opaque identifier and deterministic tie-breaker.
    pub id: RuleId,
    /// Human-readable name, shown in the manifest.
    pub name: String,
    /// Which pricing mechanic this rule applies.
    pub rule_type: RuleType,
    /// Exclusive vs. stackable.
    pub mode: RuleMode,
    /// Additive vs. multiplicative; only consulted when `mode == Stackable`.
    pub stack_order: StackOrder,
    /// Higher wins ordering ties among rules with no dependency relation.
    pub priority: i32,
    /// Rule ids that must be ordered before this one.
    pub dependencies: BTreeSet<RuleId>,
    /// Interpretation depends on `rule_type`; for `Percentage` this is the
    /// percent numerator over 100.
    pub value: Decimal,
    /// Required for `BuyXGetY`; must be positive.
    pub buy_quantity: u32,
    /// Required for `BuyXGetY`; must be positive.
    pub get_quantity: u32,
    /// Inclusive lower validity bound; `None` means unbounded below.
    pub valid_from: Option<DateTime<Utc>>,
    /// Inclusive upper validity bound; `None` means unbounded above.
    pub valid_to: Option<DateTime<Utc>>,
    /// Optional predicate; when present the rule only applies if at least
    /// one cart item matches.
    pub condition: Option<Condition>,
}

impl Rule {
    /// Constructs a rule, validating type-specific invariants.
    ///
    /// Returns [`EngineError::InvalidRule`] if `rule_type` is `BuyXGetY` and
    /// either `buy_quantity` or `get_quantity` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<RuleId>,
        name: impl Into<String>,
        rule_type: RuleType,
        mode: RuleMode,
        stack_order: StackOrder,
        priority: i32,
        dependencies: BTreeSet<RuleId>,
        value: Decimal,
        buy_quantity: u32,
        get_quantity: u32,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
        condition: Option<Condition>,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        if matches!(rule_type, RuleType::BuyXGetY) && (buy_quantity == 0 || get_quantity == 0) {
            return Err(EngineError::InvalidRule {
                rule_id: id,
                reason: "BUY_X_GET_Y requires buy_quantity > 0 and get_quantity > 0".to_owned(),
            });
        }

        Ok(Rule {
            id,
            name: name.into(),
            rule_type,
            mode,
            stack_order,
            priority,
            dependencies,
            value,
            buy_quantity,
            get_quantity,
            valid_from,
            valid_to,
            condition,
        })
    }

    /// Returns true iff `t` falls within both validity bounds (a missing
    /// bound is unbounded on that side).
    pub fn is_valid_at(&self, t: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if t < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if t > to {
                return false;
            }
        }
        true
    }
}

/// A single cart line: one product at a given quantity and unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    /// Line identifier, unique within the cart.
    pub id: String,
    /// Catalogue product identifier.
    pub product_id: String,
    /// Display name.
    pub name: String,
    /// Number of units on this line; must be positive.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Merchandising category, matched by [`Condition::CategoryEquals`].
    pub category: String,
    /// Free-form tags, matched by [`Condition::TagIncludes`].
    pub tags: Vec<String>,
}

impl CartItem {
    /// `unit_price * quantity`.
    pub fn total(&self) -> Decimal {
        self.unit_price.mul_by_int(i64::from(self.quantity))
    }
}

/// An ordered collection of cart items awaiting pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    /// Cart identifier, echoed into the resulting manifest.
    pub id: String,
    /// Ordered line items.
    pub items: Vec<CartItem>,
    /// When the cart was created (informational; not used in pricing math).
    pub created_at: DateTime<Utc>,
}

impl Cart {
    /// Sum of every line's total.
    pub fn total(&self) -> Decimal {
        self.items
            .iter()
            .fold(Decimal::ZERO, |acc, item| acc.add(item.total()))
    }

    /// Sum of every line's quantity.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}
