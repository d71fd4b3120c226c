//! Object stores: primary-key ordered record storage with index upkeep.

use crate::cursor::Direction;
use crate::error::{EngineError, EngineResult};
use crate::index::Index;
use crate::key::{extract_key, inject_key, Key, KeyPath};
use crate::range::KeyRange;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A single object store: documents ordered by primary key, plus the
/// secondary indexes maintained over them.
///
/// Writes validate first and mutate second, so a failed operation leaves
/// the store untouched even before the owning transaction rolls back.
#[derive(Debug, Clone)]
pub(crate) struct ObjectStore {
    name: String,
    key_path: String,
    auto_increment: bool,
    next_key: i64,
    records: BTreeMap<Key, Value>,
    indexes: HashMap<String, Index>,
}

impl ObjectStore {
    pub(crate) fn new(name: &str, key_path: &str, auto_increment: bool) -> Self {
        Self {
            name: name.to_string(),
            key_path: key_path.to_string(),
            auto_increment,
            next_key: 1,
            records: BTreeMap::new(),
            indexes: HashMap::new(),
        }
    }

    pub(crate) fn key_path(&self) -> &str {
        &self.key_path
    }

    pub(crate) fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Resolves the primary key for a document, generating and injecting
    /// one when the store auto-increments. Explicit numeric keys bump the
    /// generator past themselves.
    fn resolve_key(&mut self, doc: &mut Value) -> EngineResult<Key> {
        if !doc.is_object() {
            return Err(EngineError::data("record must be a JSON object"));
        }
        match extract_key(doc, &self.key_path) {
            Some(key) => {
                if self.auto_increment {
                    if let Key::Number(n) = &key {
                        if *n >= self.next_key as f64 {
                            self.next_key = (*n as i64) + 1;
                        }
                    }
                }
                Ok(key)
            }
            None if self.auto_increment => {
                let key = Key::from(self.next_key);
                self.next_key += 1;
                if !inject_key(doc, &self.key_path, &key) {
                    return Err(EngineError::data(format!(
                        "cannot write generated key at path {}",
                        self.key_path
                    )));
                }
                Ok(key)
            }
            None => Err(EngineError::data(format!(
                "record has no valid key at path {} and store {} does not auto-increment",
                self.key_path, self.name
            ))),
        }
    }

    fn check_unique_indexes(&self, primary: &Key, doc: &Value) -> EngineResult<()> {
        for (name, index) in &self.indexes {
            index.check_unique(&self.name, name, primary, doc)?;
        }
        Ok(())
    }

    fn index_insert(&mut self, primary: &Key, doc: &Value) {
        for index in self.indexes.values_mut() {
            index.insert_doc(primary, doc);
        }
    }

    fn index_remove(&mut self, primary: &Key, doc: &Value) {
        for index in self.indexes.values_mut() {
            index.remove_doc(primary, doc);
        }
    }

    /// Adds a new record. Fails if the primary key or any unique index key
    /// is already taken.
    pub(crate) fn add(&mut self, mut doc: Value) -> EngineResult<Value> {
        let key = self.resolve_key(&mut doc)?;
        if self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!(
                "store {} already contains primary key {key}",
                self.name
            )));
        }
        self.check_unique_indexes(&key, &doc)?;
        self.index_insert(&key, &doc);
        self.records.insert(key, doc.clone());
        Ok(doc)
    }

    /// Puts a record unconditionally, replacing any record at the same key.
    pub(crate) fn put(&mut self, mut doc: Value) -> EngineResult<Value> {
        let key = self.resolve_key(&mut doc)?;
        self.check_unique_indexes(&key, &doc)?;
        if let Some(previous) = self.records.remove(&key) {
            self.index_remove(&key, &previous);
        }
        self.index_insert(&key, &doc);
        self.records.insert(key, doc.clone());
        Ok(doc)
    }

    /// Deletes the record at a key, returning it. Missing keys are not an
    /// error.
    pub(crate) fn delete(&mut self, key: &Key) -> Option<Value> {
        let doc = self.records.remove(key)?;
        self.index_remove(key, &doc);
        Some(doc)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            *index = Index::new_like(index);
        }
    }

    /// Ordered `(cursor key, record)` pairs for a range over the primary
    /// key space or one index.
    pub(crate) fn scan(
        &self,
        index: Option<&str>,
        range: &KeyRange,
        direction: Direction,
        unique_keys: bool,
    ) -> EngineResult<Vec<(Key, Value)>> {
        match index {
            Some(name) => {
                let index = self
                    .indexes
                    .get(name)
                    .ok_or_else(|| EngineError::index_not_found(&self.name, name))?;
                Ok(index
                    .scan(range, direction, unique_keys)
                    .into_iter()
                    .filter_map(|(key, primary)| {
                        self.records.get(&primary).map(|doc| (key, doc.clone()))
                    })
                    .collect())
            }
            None => {
                if range.is_empty() {
                    return Ok(Vec::new());
                }
                let mut out: Vec<(Key, Value)> = self
                    .records
                    .range(range.to_bounds())
                    .map(|(key, doc)| (key.clone(), doc.clone()))
                    .collect();
                if direction == Direction::Descending {
                    out.reverse();
                }
                Ok(out)
            }
        }
    }

    pub(crate) fn get(&self, index: Option<&str>, range: &KeyRange) -> EngineResult<Option<Value>> {
        Ok(self
            .scan(index, range, Direction::Ascending, false)?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    pub(crate) fn get_all(
        &self,
        index: Option<&str>,
        range: &KeyRange,
        limit: Option<usize>,
    ) -> EngineResult<Vec<Value>> {
        let mut docs: Vec<Value> = self
            .scan(index, range, Direction::Ascending, false)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect();
        if let Some(limit) = limit {
            docs.truncate(limit);
        }
        Ok(docs)
    }

    pub(crate) fn count(&self, index: Option<&str>, range: &KeyRange) -> EngineResult<usize> {
        match index {
            Some(name) => {
                let index = self
                    .indexes
                    .get(name)
                    .ok_or_else(|| EngineError::index_not_found(&self.name, name))?;
                Ok(index.scan(range, Direction::Ascending, false).len())
            }
            None => {
                if range.is_empty() {
                    return Ok(0);
                }
                Ok(self.records.range(range.to_bounds()).count())
            }
        }
    }

    pub(crate) fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Creates an index and builds it over the existing records.
    pub(crate) fn create_index(
        &mut self,
        name: &str,
        key_path: KeyPath,
        unique: bool,
        multi_entry: bool,
    ) -> EngineResult<()> {
        if self.indexes.contains_key(name) {
            return Err(EngineError::constraint(format!(
                "index {name} already exists on store {}",
                self.name
            )));
        }
        if multi_entry && key_path.is_composite() {
            return Err(EngineError::data(
                "multi-entry indexes cannot use a composite key path",
            ));
        }
        let mut index = Index::new(key_path, unique, multi_entry);
        index.build(&self.name, name, self.records.iter())?;
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::index_not_found(&self.name, name))
    }

    pub(crate) fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.keys().cloned().collect();
        names.sort();
        names
    }
}
