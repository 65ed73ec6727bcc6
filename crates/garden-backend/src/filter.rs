//! Equality filters shared by queries and change feeds.
//!
//! Only `column = value` conditions are supported; that is all the
//! tracking layer asks for. The same filter renders to PostgREST query
//! parameters, to a Realtime `postgres_changes` filter, and evaluates
//! locally against JSON rows.

use serde_json::Value;

/// A single `column = value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub value: Value,
}

/// A conjunction of equality conditions. The empty filter matches all rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `column = value` condition.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Whether `row` satisfies every condition.
    ///
    /// A missing column counts as `null`.
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| {
            let actual = row.get(&c.column).unwrap_or(&Value::Null);
            actual == &c.value
        })
    }

    /// PostgREST query parameters, e.g. `("read", "eq.false")`.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|c| (c.column.clone(), format!("eq.{}", render_value(&c.value))))
            .collect()
    }

    /// Realtime `postgres_changes` filter string.
    ///
    /// Realtime accepts a single condition per listener, so only the first
    /// one is sent; callers re-check the rest with [`Filter::matches`].
    pub fn to_realtime_filter(&self) -> Option<String> {
        self.conditions
            .first()
            .map(|c| format!("{}=eq.{}", c.column, render_value(&c.value)))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
