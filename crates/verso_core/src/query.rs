//! The cursor query engine.
//!
//! Each query opens one fresh cursor positioned by the translated range
//! and resolves exactly once; there is no resuming a query across calls.
//! Records flow through the stages in order: predicate (if any), then
//! skip accounting, then transform and limit accounting. Skip and limit
//! only ever advance for records the predicate accepted.

use crate::constraint::Constraint;
use crate::error::DbResult;
use crate::schema::CollectionSchema;
use crate::translate::translate;
use serde_json::Value;
use verso_engine::{Direction, Transaction};

/// Predicate deciding whether a record is part of the result.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Transform mapping an accepted record to its output shape.
pub type Transform = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// Options for a [`find`](crate::Store::find) query.
pub struct FindOptions {
    /// Constraints compiled through the key range translator.
    pub constraints: Vec<Constraint>,
    /// Records to skip before collecting results.
    pub skip: usize,
    /// Maximum records to collect; `None` is unbounded, `Some(0)` yields
    /// an empty result.
    pub limit: Option<usize>,
    /// Iteration direction.
    pub direction: Direction,
    /// Collapse duplicate index keys while iterating a non-unique index.
    pub unique: bool,
    /// Optional accept/reject predicate, evaluated before skip and limit.
    pub predicate: Option<Predicate>,
    /// Optional output transform for accepted records.
    pub transform: Option<Transform>,
}

impl FindOptions {
    /// Options matching everything, in ascending order, unbounded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
            skip: 0,
            limit: None,
            direction: Direction::Ascending,
            unique: false,
            predicate: None,
            transform: None,
        }
    }

    /// Adds one constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Replaces the constraint list.
    #[must_use]
    pub fn constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Skips the first `skip` accepted records.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Caps the result at `limit` records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Iterates in descending key order.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.direction = Direction::Descending;
        self
    }

    /// Collapses duplicate index keys.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the accept/reject predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Sets the output transform.
    #[must_use]
    pub fn transform(mut self, transform: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }
}

impl Default for FindOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FindOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindOptions")
            .field("constraints", &self.constraints)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("direction", &self.direction)
            .field("unique", &self.unique)
            .field("predicate", &self.predicate.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Runs a find query inside the given transaction.
pub(crate) fn run_find(
    txn: &Transaction<'_>,
    schema: &CollectionSchema,
    options: &FindOptions,
) -> DbResult<Vec<Value>> {
    let translated = translate(&options.constraints, schema)?;
    let mut cursor = txn.open_cursor(
        &schema.name,
        translated.index.as_deref(),
        &translated.range,
        options.direction,
        options.unique,
    )?;

    let mut items = Vec::new();
    let mut limit = match options.limit {
        Some(0) => return Ok(items),
        other => other,
    };
    let mut skip = options.skip;

    // Without a predicate the skip budget maps one-to-one onto cursor
    // positions, so it can be consumed in a single jump.
    if options.predicate.is_none() && skip > 0 {
        cursor.advance(skip);
        skip = 0;
    }

    for (_key, doc) in cursor {
        if let Some(predicate) = &options.predicate {
            if !predicate(&doc) {
                continue;
            }
        }
        if skip > 0 {
            skip -= 1;
            continue;
        }
        let item = match &options.transform {
            Some(transform) => transform(doc),
            None => doc,
        };
        items.push(item);
        if let Some(remaining) = &mut limit {
            *remaining -= 1;
            if *remaining == 0 {
                break;
            }
        }
    }
    Ok(items)
}
