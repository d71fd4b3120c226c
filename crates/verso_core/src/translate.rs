//! The key range translator.
//!
//! Compiles a list of constraints into one directional [`KeyRange`] plus
//! the index the query targets. Constraints fold left-to-right into five
//! slots keyed by operator — exact, lower-inclusive, lower-exclusive,
//! upper-inclusive, upper-exclusive — and a later constraint with the same
//! operator silently replaces the earlier one. An exact value wins over
//! any bounds. When both an inclusive and an exclusive bound land on the
//! same side, the inclusive slot supplies the value and the exclusive
//! slot's presence makes the bound open; this mirrors the historical
//! behavior callers depend on and is deliberately not "fixed".

use crate::constraint::{Constraint, Operator};
use crate::error::{DbError, DbResult};
use crate::schema::CollectionSchema;
use verso_engine::{Key, KeyRange};

/// The result of translating constraints: which index to drive, and the
/// key range to drive it over.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    /// Resolved index name; `None` targets the primary key space.
    pub index: Option<String>,
    /// The compiled range.
    pub range: KeyRange,
}

/// Compiles constraints against a collection's schema.
///
/// # Errors
///
/// - [`DbError::Validation`] when constraints name more than one field.
/// - [`DbError::IndexNotFound`] when the field is neither the primary key
///   path nor a declared index.
pub fn translate(
    constraints: &[Constraint],
    schema: &CollectionSchema,
) -> DbResult<TranslatedQuery> {
    let mut field: Option<&str> = None;
    let mut exact: Option<Key> = None;
    let mut lower_inclusive: Option<Key> = None;
    let mut lower_exclusive: Option<Key> = None;
    let mut upper_inclusive: Option<Key> = None;
    let mut upper_exclusive: Option<Key> = None;

    for constraint in constraints {
        match field {
            None => field = Some(&constraint.field),
            Some(current) if current != constraint.field => {
                return Err(DbError::validation(format!(
                    "constraints span fields {current} and {}; a query targets one field",
                    constraint.field
                )));
            }
            Some(_) => {}
        }
        let value = constraint.value.clone();
        match constraint.operator {
            Operator::Eq => exact = Some(value),
            Operator::Gte => lower_inclusive = Some(value),
            Operator::Gt => lower_exclusive = Some(value),
            Operator::Lte => upper_inclusive = Some(value),
            Operator::Lt => upper_exclusive = Some(value),
        }
    }

    let index = match field {
        None => None,
        Some(field) if field == schema.primary_key_path => None,
        Some(field) => {
            if schema.index(field).is_some() {
                Some(field.to_string())
            } else {
                return Err(DbError::index_not_found(field));
            }
        }
    };

    let range = if let Some(value) = exact {
        KeyRange::only(value)
    } else {
        let lower = fold_side(lower_inclusive, lower_exclusive);
        let upper = fold_side(upper_inclusive, upper_exclusive);
        match (lower, upper) {
            (Some((l, lo)), Some((u, uo))) => KeyRange::bound(l, u, lo, uo),
            (Some((l, lo)), None) => KeyRange::lower_bound(l, lo),
            (None, Some((u, uo))) => KeyRange::upper_bound(u, uo),
            (None, None) => KeyRange::unbounded(),
        }
    };

    Ok(TranslatedQuery { index, range })
}

/// Folds one side's inclusive and exclusive slots into a single bound.
fn fold_side(inclusive: Option<Key>, exclusive: Option<Key>) -> Option<(Key, bool)> {
    match (inclusive, exclusive) {
        (Some(value), exclusive) => Some((value, exclusive.is_some())),
        (None, Some(value)) => Some((value, true)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionDefinition, CollectionSchema};
    use verso_engine::Key;

    fn users() -> CollectionSchema {
        CollectionSchema::normalize(
            CollectionDefinition::new("users", "id").index("email"),
        )
        .unwrap()
    }

    #[test]
    fn no_constraints_is_an_unbounded_primary_scan() {
        let query = translate(&[], &users()).unwrap();
        assert!(query.index.is_none());
        assert!(query.range.is_unbounded());
    }

    #[test]
    fn primary_key_field_resolves_to_no_index() {
        let query = translate(&[Constraint::eq("id", 1)], &users()).unwrap();
        assert!(query.index.is_none());
        assert!(query.range.contains(&Key::from(1)));
        assert!(!query.range.contains(&Key::from(2)));
    }

    #[test]
    fn index_field_resolves_to_index_name() {
        let query = translate(&[Constraint::eq("email", "a@x.com")], &users()).unwrap();
        assert_eq!(query.index.as_deref(), Some("email"));
    }

    #[test]
    fn unknown_field_fails_naming_the_index() {
        let err = translate(&[Constraint::eq("age", 30)], &users()).unwrap_err();
        match err {
            DbError::IndexNotFound { name } => assert_eq!(name, "age"),
            other => panic!("expected IndexNotFound, got {other:?}"),
        }
    }

    #[test]
    fn mixed_fields_fail_validation() {
        let constraints = [Constraint::gte("id", 1), Constraint::lt("email", "z")];
        let err = translate(&constraints, &users()).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn bounds_on_both_sides_compile_to_a_bounded_range() {
        let constraints = [Constraint::gte("id", 10), Constraint::lt("id", 20)];
        let query = translate(&constraints, &users()).unwrap();
        assert!(query.range.contains(&Key::from(10)));
        assert!(query.range.contains(&Key::from(19)));
        assert!(!query.range.contains(&Key::from(20)));
        assert!(!query.range.contains(&Key::from(9)));
    }

    #[test]
    fn exact_value_wins_over_bounds() {
        let constraints = [
            Constraint::gte("id", 0),
            Constraint::eq("id", 5),
            Constraint::lt("id", 100),
        ];
        let query = translate(&constraints, &users()).unwrap();
        assert!(query.range.contains(&Key::from(5)));
        assert!(!query.range.contains(&Key::from(6)));
    }

    #[test]
    fn later_constraint_on_same_operator_wins() {
        let constraints = [Constraint::gte("id", 1), Constraint::gte("id", 7)];
        let query = translate(&constraints, &users()).unwrap();
        assert!(!query.range.contains(&Key::from(3)));
        assert!(query.range.contains(&Key::from(7)));
    }

    #[test]
    fn inclusive_value_with_exclusive_flag_quirk() {
        // Both >= 5 and > 8 recorded: the inclusive slot's value is kept,
        // the exclusive slot makes the bound open.
        let constraints = [Constraint::gte("id", 5), Constraint::gt("id", 8)];
        let query = translate(&constraints, &users()).unwrap();
        assert!(!query.range.contains(&Key::from(5)));
        assert!(query.range.contains(&Key::from(6)));
    }

    #[test]
    fn single_exclusive_bound() {
        let query = translate(&[Constraint::gt("id", 3)], &users()).unwrap();
        assert!(!query.range.contains(&Key::from(3)));
        assert!(query.range.contains(&Key::from(4)));
    }
}
