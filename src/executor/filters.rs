//! In-memory condition filtering
//!
//! Used when the store cannot evaluate the full condition set. A row
//! matches when every `AND` condition holds and, if any `OR` condition is
//! present, at least one of them holds.

use crate::planner::{operator_spec, Connector, NormalizedCondition};
use crate::value::Item;

/// Evaluates normalized conditions against items
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if an item satisfies the condition set
    pub fn matches(item: &Item, conditions: &[NormalizedCondition]) -> bool {
        let all_and = conditions
            .iter()
            .filter(|c| c.connector == Connector::And)
            .all(|c| Self::matches_condition(item, c));
        if !all_and {
            return false;
        }

        let mut or_group = conditions
            .iter()
            .filter(|c| c.connector == Connector::Or)
            .peekable();
        if or_group.peek().is_none() {
            return true;
        }
        or_group.any(|c| Self::matches_condition(item, c))
    }

    /// Checks a single condition through the operator registry
    pub fn matches_condition(item: &Item, condition: &NormalizedCondition) -> bool {
        (operator_spec(condition.operator).evaluate)(item.get(&condition.field), &condition.value)
    }

    /// Keeps the matching items, preserving order
    pub fn apply(items: Vec<Item>, conditions: &[NormalizedCondition]) -> Vec<Item> {
        if conditions.is_empty() {
            return items;
        }
        items
            .into_iter()
            .filter(|item| Self::matches(item, conditions))
            .collect()
    }
}
