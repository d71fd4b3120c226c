//! Declarative field constraints.

use std::fmt;
use verso_engine::Key;

/// Comparison operator in a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Exact match (`==`).
    Eq,
    /// Strictly greater (`>`).
    Gt,
    /// Greater or equal (`>=`).
    Gte,
    /// Strictly less (`<`).
    Lt,
    /// Less or equal (`<=`).
    Lte,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => "==",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        };
        f.write_str(symbol)
    }
}

/// One field/operator/value comparison.
///
/// The field names either the collection's primary key path or an index;
/// the value is compared in the engine's key order.
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Field (primary key path or index name) the comparison applies to.
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Value to compare against.
    pub value: Key,
}

impl Constraint {
    /// Builds a constraint.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Key>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field == value`
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Key>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    /// `field > value`
    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<Key>) -> Self {
        Self::new(field, Operator::Gt, value)
    }

    /// `field >= value`
    #[must_use]
    pub fn gte(field: impl Into<String>, value: impl Into<Key>) -> Self {
        Self::new(field, Operator::Gte, value)
    }

    /// `field < value`
    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<Key>) -> Self {
        Self::new(field, Operator::Lt, value)
    }

    /// `field <= value`
    #[must_use]
    pub fn lte(field: impl Into<String>, value: impl Into<Key>) -> Self {
        Self::new(field, Operator::Lte, value)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}
