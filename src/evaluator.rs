//! Single-rule application: given one rule and the current running price,
//! computes the new running price. Also hosts the Buy-X-Get-Y mechanics,
//! which need the whole cart rather than just a scalar price.

use crate::decimal::Decimal;
use crate::model::{Cart, Rule, RuleType};

/// Returns true when `rule` has no condition, or when at least one cart item
/// satisfies it.
pub fn should_apply(rule: &Rule, cart: &Cart) -> bool {
    match &rule.condition {
        None => true,
        Some(condition) => cart.items.iter().any(|item| condition.matches(item)),
    }
}

/// Applies a single rule to `current`, returning the new running price and a
/// human-readable description of what happened.
///
/// `cart` is only consulted by `BuyXGetY`, which needs the full set of unit
/// prices rather than a single scalar.
pub fn apply(rule: &Rule, cart: &Cart, current: Decimal) -> (Decimal, String) {
    match rule.rule_type {
        RuleType::Percentage | RuleType::Bundle => {
            let discount = current.percent(rule.value);
            (current.sub(discount), format!("{}% off", rule.value))
        }
        RuleType::Fixed => (
            current.sub(rule.value),
            format!("{} off", rule.value),
        ),
        RuleType::Surge => {
            let surcharge = current.percent(rule.value);
            (current.add(surcharge), format!("{}% surge", rule.value))
        }
        RuleType::BuyXGetY => apply_buy_x_get_y(rule, cart, current),
    }
}

/// Buy-X-Get-Y: expand the cart into one unit price per unit of quantity,
/// sort ascending, and make the cheapest `free_units` units free. This is
/// deliberately cross-SKU (scope-neutral): the cheapest units are free
/// regardless of which product line they came from.
fn apply_buy_x_get_y(rule: &Rule, cart: &Cart, current: Decimal) -> (Decimal, String) {
    let group_size = rule.buy_quantity + rule.get_quantity;
    let total_qty: u32 = cart.item_count();

    if total_qty < group_size {
        return (current, "buy-x-get-y did not meet quantity threshold".to_owned());
    }

    let free_units = (total_qty / group_size) * rule.get_quantity;
    if free_units == 0 {
        return (current, "buy-x-get-y produced zero free units".to_owned());
    }

    let mut unit_prices: Vec<Decimal> = Vec::with_capacity(total_qty as usize);
    for item in &cart.items {
        for _ in 0..item.quantity {
            unit_prices.push(item.unit_price);
        }
    }
    unit_prices.sort();

    let discount = unit_prices
        .into_iter()
        .take(free_units as usize)
        .fold(Decimal::ZERO, Decimal::add);

    (
        current.sub(discount),
        format!(
            "buy {} get {} free ({} free units)",
            rule.buy_quantity, rule.get_quantity, free_units
        ),
    )
}
