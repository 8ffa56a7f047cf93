//! Row predicates, ordering and limits understood by every [`crate::Store`].

use std::cmp::Ordering;

use serde_json::Value;

use crate::row::Row;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column IS true|false`
    Is(String, bool),
    /// `column >= value`
    Gte(String, Value),
    /// Disjunction of conjunctions.
    AnyOf(Vec<Vec<Filter>>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn is(column: impl Into<String>, value: bool) -> Self {
        Filter::Is(column.into(), value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(column.into(), value.into())
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(col, want) => row.get(col).is_some_and(|have| loosely_equal(have, want)),
            Filter::Is(col, want) => row.get(col).and_then(Value::as_bool) == Some(*want),
            Filter::Gte(col, floor) => row
                .get(col)
                .is_some_and(|have| !have.is_null() && compare(Some(have), Some(floor)) != Ordering::Less),
            Filter::AnyOf(groups) => groups
                .iter()
                .any(|group| group.iter().all(|f| f.matches(row))),
        }
    }

    /// PostgREST operator form without the column, e.g. `eq.abc`.
    pub(crate) fn operator(&self) -> Option<(String, String)> {
        self.render(scalar_text)
    }

    fn render(&self, text: fn(&Value) -> String) -> Option<(String, String)> {
        match self {
            Filter::Eq(col, v) => Some((col.clone(), format!("eq.{}", text(v)))),
            Filter::Is(col, b) => Some((col.clone(), format!("is.{b}"))),
            Filter::Gte(col, v) => Some((col.clone(), format!("gte.{}", text(v)))),
            Filter::AnyOf(_) => None,
        }
    }

    /// Inline form used inside `or=(...)` groups, e.g. `sender_id.eq.abc`.
    pub(crate) fn inline(&self) -> String {
        match self {
            Filter::AnyOf(groups) => {
                let inner: Vec<String> = groups.iter().map(|g| conjunction(g)).collect();
                format!("or({})", inner.join(","))
            }
            other => match other.render(quoted_text) {
                Some((col, op)) => format!("{col}.{op}"),
                None => String::new(),
            },
        }
    }
}

pub(crate) fn conjunction(group: &[Filter]) -> String {
    let parts: Vec<String> = group.iter().map(Filter::inline).collect();
    format!("and({})", parts.join(","))
}

pub(crate) fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Value as written inside an `or=(...)` group. Anything PostgREST treats as
/// syntax there is wrapped in double quotes, with `"` and `\` escaped.
pub(crate) fn quoted_text(v: &Value) -> String {
    let text = scalar_text(v);
    let reserved = |c: char| matches!(c, ',' | '.' | ':' | '(' | ')' | '"' | '\\') || c.is_whitespace();
    if !text.is_empty() && !text.contains(reserved) {
        return text;
    }
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

// Ids come back as numbers from some tables and strings from others.
fn loosely_equal(have: &Value, want: &Value) -> bool {
    have == want || (!have.is_null() && scalar_text(have) == scalar_text(want))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    /// Rows to skip after ordering.
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending: true,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Filter, sort, skip and truncate an in-memory row set.
    pub fn apply(&self, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
        let mut out: Vec<Row> = rows.into_iter().filter(|r| self.matches(r)).collect();
        if let Some(order) = &self.order {
            out.sort_by(|a, b| {
                let ord = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(n) = self.offset {
            out.drain(..n.min(out.len()));
        }
        if let Some(n) = self.limit {
            out.truncate(n);
        }
        out
    }
}

fn rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
