//! Schema declarations and their normalized form.
//!
//! Callers declare collections up front; declarations are normalized once
//! at [`Database`](crate::Database) construction into [`CollectionSchema`]
//! values. Index declarations accept a string shorthand (`"email"` means an
//! index named `email` over the field `email`); composite key paths without
//! an explicit name derive one by joining the segments with `-`. After
//! normalization every index is addressed by its derived name, never by
//! raw key path.

use crate::error::{DbError, DbResult};
use std::collections::HashSet;
use verso_engine::KeyPath;

/// A declared index on a collection.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    /// Explicit index name; derived from the key path when absent.
    pub name: Option<String>,
    /// Field path (or ordered field paths) the index covers.
    pub key_path: KeyPath,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether an array value fans out into one entry per element.
    pub multi_entry: bool,
}

impl IndexSpec {
    /// An index over one field, named after it.
    #[must_use]
    pub fn field(path: impl Into<String>) -> Self {
        Self {
            name: None,
            key_path: KeyPath::Single(path.into()),
            unique: false,
            multi_entry: false,
        }
    }

    /// A composite index over several fields in order.
    #[must_use]
    pub fn composite<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            key_path: KeyPath::Composite(paths.into_iter().map(Into::into).collect()),
            unique: false,
            multi_entry: false,
        }
    }

    /// Overrides the derived name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the index multi-entry.
    #[must_use]
    pub fn multi_entry(mut self) -> Self {
        self.multi_entry = true;
        self
    }
}

impl From<&str> for IndexSpec {
    /// The string shorthand: an index named after the field it covers.
    fn from(path: &str) -> Self {
        Self::field(path)
    }
}

/// A declared collection.
#[derive(Debug, Clone)]
pub struct CollectionDefinition {
    /// Collection name.
    pub name: String,
    /// Field path the primary key is extracted from.
    pub primary_key_path: String,
    /// Whether missing primary keys are generated by the engine.
    pub auto_increment: bool,
    /// Declared indexes.
    pub indexes: Vec<IndexSpec>,
}

impl CollectionDefinition {
    /// Declares a collection with the given primary key path.
    #[must_use]
    pub fn new(name: impl Into<String>, primary_key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key_path: primary_key_path.into(),
            auto_increment: false,
            indexes: Vec::new(),
        }
    }

    /// Enables auto-increment key generation.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Adds an index declaration.
    #[must_use]
    pub fn index(mut self, spec: impl Into<IndexSpec>) -> Self {
        self.indexes.push(spec.into());
        self
    }
}

/// A normalized index: name resolved, shape fixed.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    /// Canonical index name.
    pub name: String,
    /// Field path(s) the index covers.
    pub key_path: KeyPath,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether an array value fans out into one entry per element.
    pub multi_entry: bool,
}

/// A normalized collection declaration.
///
/// Produced once at construction; nothing downstream branches on the
/// declaration shape again.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Field path the primary key is extracted from.
    pub primary_key_path: String,
    /// Whether missing primary keys are generated by the engine.
    pub auto_increment: bool,
    /// Normalized indexes.
    pub indexes: Vec<IndexDefinition>,
}

impl CollectionSchema {
    /// Normalizes a declaration.
    ///
    /// # Errors
    ///
    /// Returns a [`DbError::Validation`] when an index would shadow the
    /// primary key, two indexes resolve to the same name, or a multi-entry
    /// index uses a composite key path.
    pub fn normalize(definition: CollectionDefinition) -> DbResult<Self> {
        let mut indexes = Vec::with_capacity(definition.indexes.len());
        let mut seen: HashSet<String> = HashSet::new();
        for spec in definition.indexes {
            let name = match spec.name {
                Some(name) => name,
                None => match &spec.key_path {
                    KeyPath::Single(path) => path.clone(),
                    KeyPath::Composite(paths) => paths.join("-"),
                },
            };
            if name == definition.primary_key_path {
                return Err(DbError::validation(format!(
                    "index {name} on collection {} would shadow the primary key",
                    definition.name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(DbError::validation(format!(
                    "duplicate index name {name} on collection {}",
                    definition.name
                )));
            }
            if spec.multi_entry && spec.key_path.is_composite() {
                return Err(DbError::validation(format!(
                    "multi-entry index {name} on collection {} cannot use a composite key path",
                    definition.name
                )));
            }
            indexes.push(IndexDefinition {
                name,
                key_path: spec.key_path,
                unique: spec.unique,
                multi_entry: spec.multi_entry,
            });
        }
        Ok(Self {
            name: definition.name,
            primary_key_path: definition.primary_key_path,
            auto_increment: definition.auto_increment,
            indexes,
        })
    }

    /// The declared index of the given name, if any.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|index| index.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_shorthand_names_index_after_field() {
        let schema = CollectionSchema::normalize(
            CollectionDefinition::new("users", "id").index("email"),
        )
        .unwrap();
        assert_eq!(schema.indexes.len(), 1);
        assert_eq!(schema.indexes[0].name, "email");
        assert_eq!(schema.indexes[0].key_path, KeyPath::Single("email".into()));
    }

    #[test]
    fn composite_index_derives_joined_name() {
        let schema = CollectionSchema::normalize(
            CollectionDefinition::new("events", "id")
                .index(IndexSpec::composite(["kind", "at"])),
        )
        .unwrap();
        assert_eq!(schema.indexes[0].name, "kind-at");
    }

    #[test]
    fn explicit_name_wins() {
        let schema = CollectionSchema::normalize(
            CollectionDefinition::new("users", "id")
                .index(IndexSpec::field("email").named("by_email").unique()),
        )
        .unwrap();
        assert_eq!(schema.indexes[0].name, "by_email");
        assert!(schema.indexes[0].unique);
    }

    #[test]
    fn index_shadowing_primary_key_rejected() {
        let result = CollectionSchema::normalize(
            CollectionDefinition::new("users", "id").index("id"),
        );
        assert!(matches!(result, Err(DbError::Validation { .. })));
    }

    #[test]
    fn duplicate_index_names_rejected() {
        let result = CollectionSchema::normalize(
            CollectionDefinition::new("users", "id")
                .index("email")
                .index(IndexSpec::field("contact.email").named("email")),
        );
        assert!(matches!(result, Err(DbError::Validation { .. })));
    }

    #[test]
    fn multi_entry_composite_rejected() {
        let result = CollectionSchema::normalize(
            CollectionDefinition::new("posts", "id")
                .index(IndexSpec::composite(["a", "b"]).multi_entry()),
        );
        assert!(matches!(result, Err(DbError::Validation { .. })));
    }
}
