//! Typed PromQL construction
//!
//! Tenant identifiers end up inside label matchers, so every value goes
//! through escaping here instead of being spliced into query text.

use std::fmt;
use std::time::Duration;

/// Label matching operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    NotEq,
    Regex,
}

impl MatchOp {
    fn as_str(&self) -> &'static str {
        match self {
            MatchOp::Eq => "=",
            MatchOp::NotEq => "!=",
            MatchOp::Regex => "=~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

/// A metric name plus label matchers, e.g. `metric{a="b"}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    metric: String,
    matchers: Vec<LabelMatcher>,
}

impl Selector {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            matchers: Vec::new(),
        }
    }

    fn with(mut self, name: &str, op: MatchOp, value: impl Into<String>) -> Self {
        self.matchers.push(LabelMatcher {
            name: name.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, MatchOp::Eq, value)
    }

    pub fn not_eq(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, MatchOp::NotEq, value)
    }

    /// Match every label value starting with `prefix` (at least one more char)
    pub fn has_prefix(self, name: &str, prefix: &str) -> Self {
        let pattern = format!("{}.+", escape_regex(prefix));
        self.with(name, MatchOp::Regex, pattern)
    }

    /// Same label matchers applied to another metric
    pub fn with_metric(&self, metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            matchers: self.matchers.clone(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.metric)?;
        if self.matchers.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, m) in self.matchers.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}{}\"{}\"", m.name, m.op.as_str(), escape_label_value(&m.value))?;
        }
        f.write_str("}")
    }
}

/// A complete PromQL expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromQuery(String);

impl PromQuery {
    pub fn select(selector: &Selector) -> Self {
        Self(selector.to_string())
    }

    /// `rate(selector[window])`
    pub fn rate(selector: &Selector, window: Duration) -> Self {
        Self(format!("rate({}[{}])", selector, format_duration(window)))
    }

    pub fn sum(self) -> Self {
        Self(format!("sum({})", self.0))
    }

    pub fn sum_by(self, labels: &[&str]) -> Self {
        Self(format!("sum by ({}) ({})", labels.join(", "), self.0))
    }

    pub fn avg(self) -> Self {
        Self(format!("avg({})", self.0))
    }

    pub fn count(self) -> Self {
        Self(format!("count({})", self.0))
    }

    pub fn count_by(self, labels: &[&str]) -> Self {
        Self(format!("count by ({}) ({})", labels.join(", "), self.0))
    }

    /// `(expr) * factor`
    pub fn scale(self, factor: f64) -> Self {
        Self(format!("({}) * {}", self.0, factor))
    }

    /// `(expr) / (rhs)`
    pub fn div(self, rhs: PromQuery) -> Self {
        Self(format!("({}) / ({})", self.0, rhs.0))
    }

    /// `1 - (expr)`
    pub fn one_minus(self) -> Self {
        Self(format!("1 - ({})", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape a label value for use inside double quotes
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape RE2 metacharacters so `literal` matches itself
pub fn escape_regex(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render a duration the way Prometheus expects (`90s`, `5m`, `1h`, `7d`)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs().max(1);
    const UNITS: &[(u64, &str)] = &[(86_400, "d"), (3_600, "h"), (60, "m")];

    for (size, unit) in UNITS {
        if secs % size == 0 {
            return format!("{}{}", secs / size, unit);
        }
    }
    format!("{}s", secs)
}
