//! In-memory result sorting

use std::cmp::Ordering;

use serde_json::Value;

use crate::planner::{SortDirection, SortSpec};
use crate::value::{compare_values, is_missing, Item};

/// Sorts items by one field
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts items according to the sort specification.
    ///
    /// Sort is stable. Missing and null values go last in both directions;
    /// values of different types order by type.
    pub fn sort(items: &mut [Item], sort_spec: &SortSpec) {
        items.sort_by(|a, b| {
            Self::compare(a.get(&sort_spec.field), b.get(&sort_spec.field), sort_spec.direction)
        });
    }

    fn compare(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
        match (is_missing(a), is_missing(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = match (a, b) {
                    (Some(x), Some(y)) => {
                        compare_values(x, y).unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)))
                    }
                    _ => Ordering::Equal,
                };
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        }
    }
}

/// Cross-type order: bool < number < string < list < map
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_item(id: &str, age: Value) -> Item {
        let mut item = Item::new();
        item.insert("id".into(), json!(id));
        if !age.is_null() {
            item.insert("age".into(), age);
        }
        item
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_sort_ascending() {
        let mut items = vec![
            make_item("c", json!(30)),
            make_item("a", json!(20)),
            make_item("b", json!(25)),
        ];
        ResultSorter::sort(&mut items, &SortSpec::asc("age"));
        assert_eq!(ids(&items), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_descending() {
        let mut items = vec![
            make_item("c", json!(30)),
            make_item("a", json!(20)),
            make_item("b", json!(25)),
        ];
        ResultSorter::sort(&mut items, &SortSpec::desc("age"));
        assert_eq!(ids(&items), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_sort_stable() {
        let mut items = vec![
            make_item("a", json!(25)),
            make_item("b", json!(25)),
            make_item("c", json!(25)),
        ];
        ResultSorter::sort(&mut items, &SortSpec::desc("age"));
        assert_eq!(ids(&items), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_values_last_in_both_directions() {
        let mut items = vec![
            make_item("none", Value::Null),
            make_item("old", json!(50)),
            make_item("young", json!(10)),
        ];
        ResultSorter::sort(&mut items, &SortSpec::asc("age"));
        assert_eq!(ids(&items), vec!["young", "old", "none"]);

        ResultSorter::sort(&mut items, &SortSpec::desc("age"));
        assert_eq!(ids(&items), vec!["old", "young", "none"]);
    }

    #[test]
    fn test_explicit_null_sorts_last() {
        let mut items = vec![make_item("b", json!(2)), make_item("a", json!(1))];
        items[0].insert("age".into(), Value::Null);
        ResultSorter::sort(&mut items, &SortSpec::asc("age"));
        assert_eq!(ids(&items), vec!["a", "b"]);
    }

    #[test]
    fn test_dates_sort_chronologically() {
        let mut items = vec![
            make_item("later", json!("2024-03-01T00:00:00Z")),
            make_item("earlier", json!("2024-02-29T23:00:00-05:00")),
        ];
        // 2024-02-29T23:00-05:00 is 2024-03-01T04:00Z
        ResultSorter::sort(&mut items, &SortSpec::asc("age"));
        assert_eq!(ids(&items), vec!["later", "earlier"]);
    }
}
