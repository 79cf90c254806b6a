//! Live form state.
//!
//! [`FormStateStore`] owns the form data of one session. Every mutation
//! replaces the data tree, re-selects data-dependent branches, fills
//! defaults for newly introduced subtrees, rebuilds the id tree and then
//! notifies subscribers synchronously.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::defaults::{compute_defaults, default_form_state};
use crate::error::{SchemaError, ValidationError};
use crate::error_map::{map_errors, ErrorMap};
use crate::ids::{build_id_tree, IdNode};
use crate::prune::omit_extra_data;
use crate::resolver::{is_array_schema, item_schema, property_schema, resolve, resolve_at};
use crate::types::{FormConfig, PathSegment, ADDITIONAL_PROPERTY_FLAG};
use crate::ui::{item_hints, property_hints};
use crate::validator::Validator;

/// Handle returned by [`FormStateStore::subscribe`].
pub type SubscriptionId = usize;

type Callback = Box<dyn FnMut(&Change, &FormStateStore)>;

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Set { path: Vec<PathSegment> },
    Unset { path: Vec<PathSegment> },
    Insert { path: Vec<PathSegment>, index: usize },
    Remove { path: Vec<PathSegment>, index: usize },
    Move { path: Vec<PathSegment>, from: usize, to: usize },
    Errors,
    Reset,
}

/// Everything a renderer needs to draw one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub id: String,
    pub name: String,
    pub path: Vec<PathSegment>,
    /// Effective schema for the current data.
    pub schema: Value,
    /// UI hints for this field, passed through untouched.
    pub hints: Value,
    pub value: Option<Value>,
    pub required: bool,
    pub errors: Vec<ValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported: Option<SchemaError>,
}

/// Form data of one session plus everything derived from it.
pub struct FormStateStore {
    schema: Value,
    hints: Value,
    config: FormConfig,
    initial: Option<Value>,
    data: Option<Value>,
    ids: IdNode,
    errors: ErrorMap,
    revision: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
    next_subscription: SubscriptionId,
}

impl fmt::Debug for FormStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStateStore")
            .field("data", &self.data)
            .field("revision", &self.revision)
            .field("errors", &self.errors.len())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl FormStateStore {
    /// Start a session from explicit form data merged over schema defaults.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` when the root schema cannot be resolved.
    pub fn new(
        schema: Value,
        hints: Value,
        form_data: Option<Value>,
        config: FormConfig,
    ) -> Result<Self, SchemaError> {
        let initial = default_form_state(&schema, &schema, form_data.as_ref(), &config)?;
        let ids = build_id_tree(&schema, &schema, initial.as_ref(), &hints, &config);
        Ok(Self {
            schema,
            hints,
            config,
            data: initial.clone(),
            initial,
            ids,
            errors: ErrorMap::default(),
            revision: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn hints(&self) -> &Value {
        &self.hints
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    /// Current form data; `None` while nothing is known.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Data at `path`, if present.
    pub fn value_at(&self, path: &[PathSegment]) -> Option<&Value> {
        get_at(self.data.as_ref(), path)
    }

    pub fn ids(&self) -> &IdNode {
        &self.ids
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    /// Incremented by every data mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Effective schema at `path` for the current data.
    pub fn effective_schema(&self, path: &[PathSegment]) -> Result<Option<Value>, SchemaError> {
        resolve_at(&self.schema, &self.schema, self.data.as_ref(), path)
    }

    /// Data to hand out on submit, stripped of undeclared keys when
    /// `omit_extra_data` is configured.
    pub fn submit_data(&self) -> Option<Value> {
        let data = self.data.as_ref()?;
        if self.config.omit_extra_data {
            Some(omit_extra_data(&self.schema, &self.schema, data))
        } else {
            Some(data.clone())
        }
    }

    /// Register a callback run after every change.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Change, &FormStateStore) + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    // --- Mutations ---

    /// Set the value at `path`, creating intermediate objects and arrays
    /// as needed. A value landing where nothing was gets schema defaults.
    pub fn set_at(&mut self, path: &[PathSegment], value: Value) {
        tracing::trace!(path = ?path, "set");
        let before = self.data.clone();
        let value = if self.value_at(path).is_none() {
            self.with_defaults(path, value)
        } else {
            value
        };
        set_value(&mut self.data, path, value);
        self.reconcile_branches(before.as_ref(), path);
        self.refresh(Change::Set {
            path: path.to_vec(),
        });
    }

    /// Remove the value at `path`. Array slots become `null`; use
    /// [`Self::remove_array_item`] to shorten an array.
    pub fn unset_at(&mut self, path: &[PathSegment]) {
        tracing::trace!(path = ?path, "unset");
        let before = self.data.clone();
        remove_value(&mut self.data, path);
        self.reconcile_branches(before.as_ref(), path);
        self.refresh(Change::Unset {
            path: path.to_vec(),
        });
    }

    /// Insert an item into the array at `path`.
    ///
    /// The item is defaulted from the item schema; with `value` of `None` it
    /// is built from defaults alone. An index past the end appends. A
    /// non-array target is replaced by an empty array first.
    pub fn insert_array_item(&mut self, path: &[PathSegment], index: usize, value: Option<Value>) {
        let len = with_array(&mut self.data, path, |items| items.len());
        let index = index.min(len);

        let mut item_path = path.to_vec();
        item_path.push(PathSegment::Index(index));
        let item = match self.raw_schema_at(&item_path) {
            Some(schema) => compute_defaults(&self.schema, &schema, value.as_ref(), &self.config)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "inserting item without defaults");
                    value.clone()
                }),
            None => value,
        }
        .unwrap_or(Value::Null);

        tracing::trace!(path = ?path, index, "insert item");
        with_array(&mut self.data, path, |items| items.insert(index, item));
        self.discard_errors(path, index, None);
        self.refresh(Change::Insert {
            path: path.to_vec(),
            index,
        });
    }

    /// Remove item `index` from the array at `path`.
    ///
    /// Later items shift down and take over the ids of their predecessors;
    /// errors recorded for the removed item and every later one are dropped
    /// until the next validation.
    pub fn remove_array_item(&mut self, path: &[PathSegment], index: usize) {
        let removed = with_array(&mut self.data, path, |items| {
            if index < items.len() {
                items.remove(index);
                true
            } else {
                false
            }
        });
        if !removed {
            tracing::warn!(path = ?path, index, "remove index out of range");
        }
        self.discard_errors(path, index, None);
        self.refresh(Change::Remove {
            path: path.to_vec(),
            index,
        });
    }

    /// Move an item within the array at `path`.
    pub fn move_array_item(&mut self, path: &[PathSegment], from: usize, to: usize) {
        let moved = with_array(&mut self.data, path, |items| {
            if from < items.len() && to < items.len() {
                let item = items.remove(from);
                items.insert(to, item);
                true
            } else {
                false
            }
        });
        if !moved {
            tracing::warn!(path = ?path, from, to, "move index out of range");
        } else if from != to {
            self.discard_errors(path, from.min(to), Some(from.max(to)));
        }
        self.refresh(Change::Move {
            path: path.to_vec(),
            from,
            to,
        });
    }

    /// Return to the initial state and clear errors.
    pub fn reset(&mut self) {
        self.data = self.initial.clone();
        self.errors = ErrorMap::default();
        self.refresh(Change::Reset);
    }

    // --- Validation ---

    /// Validate the current data and fold the result in.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` when the validator cannot compile the schema.
    pub fn validate(&mut self, validator: &dyn Validator) -> Result<&ErrorMap, SchemaError> {
        let data = self.data.clone().unwrap_or(Value::Null);
        let raw = validator.validate(&self.schema, &data)?;
        self.apply_errors(raw);
        Ok(&self.errors)
    }

    /// Replace the current errors with a fresh validation result.
    pub fn apply_errors(&mut self, raw: Vec<ValidationError>) {
        self.errors = map_errors(&raw, &self.ids);
        self.notify(Change::Errors);
    }

    /// Apply a validation result only if the data has not changed since
    /// `revision`. Returns whether it was applied.
    pub fn apply_errors_if_current(&mut self, revision: u64, raw: Vec<ValidationError>) -> bool {
        if revision != self.revision {
            tracing::debug!(revision, current = self.revision, "discarding stale validation");
            return false;
        }
        self.apply_errors(raw);
        true
    }

    // --- Renderer view ---

    /// Every field of the form, parents before children.
    pub fn fields(&self) -> Vec<FieldView> {
        let mut out = Vec::new();
        self.collect_fields(
            &self.ids,
            &self.schema,
            self.data.as_ref(),
            &self.hints,
            Vec::new(),
            false,
            &mut out,
        );
        out
    }

    /// The field at `path`, if it exists in the current tree.
    ///
    /// Resolves only the nodes along `path`.
    pub fn field(&self, path: &[PathSegment]) -> Option<FieldView> {
        let mut node = &self.ids;
        let mut schema = self.schema.clone();
        let mut data = self.data.as_ref();
        let mut hints = &self.hints;
        let mut required = false;
        let mut walked = Vec::with_capacity(path.len());

        for segment in path {
            let effective = self.effective_for(node, &schema, data);
            let key = segment.as_key();
            if let Some(child) = node.properties.get(&key) {
                schema = property_schema(&effective, &key)?.clone();
                required = required_keys(&effective).contains(&key.as_str());
                data = data.and_then(|d| d.get(&key));
                hints = property_hints(hints, &key);
                walked.push(PathSegment::Key(key));
                node = child;
            } else {
                let index = segment.as_index()?;
                let child = node.items.get(index)?;
                schema = item_schema(&effective, index)?.clone();
                required = false;
                data = data.and_then(|d| d.get(index));
                hints = item_hints(hints, index);
                walked.push(PathSegment::Index(index));
                node = child;
            }
        }

        let effective = self.effective_for(node, &schema, data);
        Some(self.view(node, effective, data, hints, walked, required))
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_fields(
        &self,
        node: &IdNode,
        schema: &Value,
        data: Option<&Value>,
        hints: &Value,
        path: Vec<PathSegment>,
        required: bool,
        out: &mut Vec<FieldView>,
    ) {
        let effective = self.effective_for(node, schema, data);
        let required_props = required_keys(&effective);
        out.push(self.view(node, effective.clone(), data, hints, path.clone(), required));

        for (key, child) in &node.properties {
            let Some(child_schema) = property_schema(&effective, key) else {
                continue;
            };
            let mut child_path = path.clone();
            child_path.push(PathSegment::Key(key.clone()));
            self.collect_fields(
                child,
                child_schema,
                data.and_then(|d| d.get(key)),
                property_hints(hints, key),
                child_path,
                required_props.contains(&key.as_str()),
                out,
            );
        }
        for (index, child) in node.items.iter().enumerate() {
            let Some(child_schema) = item_schema(&effective, index) else {
                continue;
            };
            let mut child_path = path.clone();
            child_path.push(PathSegment::Index(index));
            self.collect_fields(
                child,
                child_schema,
                data.and_then(|d| d.get(index)),
                item_hints(hints, index),
                child_path,
                false,
                out,
            );
        }
    }

    /// Effective schema of a field; unsupported subtrees keep the raw schema.
    fn effective_for(&self, node: &IdNode, schema: &Value, data: Option<&Value>) -> Value {
        if node.unsupported.is_some() {
            return schema.clone();
        }
        resolve(&self.schema, schema, data).unwrap_or_else(|_| schema.clone())
    }

    fn view(
        &self,
        node: &IdNode,
        effective: Value,
        data: Option<&Value>,
        hints: &Value,
        path: Vec<PathSegment>,
        required: bool,
    ) -> FieldView {
        FieldView {
            id: node.id.clone(),
            name: node.name.clone(),
            path,
            schema: effective,
            hints: hints.clone(),
            value: data.cloned(),
            required,
            errors: self.errors.for_id(&node.id).to_vec(),
            unsupported: node.unsupported.clone(),
        }
    }

    // --- Internal implementation ---

    /// The unresolved schema governing `path`, looked up through the
    /// effective schema of its parent.
    fn raw_schema_at(&self, path: &[PathSegment]) -> Option<Value> {
        let Some((last, parent)) = path.split_last() else {
            return Some(self.schema.clone());
        };
        let parent_schema = resolve_at(&self.schema, &self.schema, self.data.as_ref(), parent)
            .ok()
            .flatten()?;
        match last.as_index() {
            Some(index) if is_array_schema(&parent_schema) => {
                item_schema(&parent_schema, index).cloned()
            }
            _ => property_schema(&parent_schema, &last.as_key()).cloned(),
        }
    }

    fn with_defaults(&self, path: &[PathSegment], value: Value) -> Value {
        let Some(schema) = self.raw_schema_at(path) else {
            return value;
        };
        match compute_defaults(&self.schema, &schema, Some(&value), &self.config) {
            Ok(Some(filled)) => filled,
            Ok(None) => value,
            Err(err) => {
                tracing::warn!(path = ?path, error = %err, "keeping value without defaults");
                value
            }
        }
    }

    /// Re-select data-dependent branches along `path` after a change.
    ///
    /// Where the set of declared properties changed, properties only the
    /// old branch declared are dropped and the new branch's defaults are
    /// filled in.
    fn reconcile_branches(&mut self, before: Option<&Value>, path: &[PathSegment]) {
        for depth in 0..=path.len() {
            let prefix = &path[..depth];
            let Some(schema) = self.raw_schema_at(prefix) else {
                break;
            };
            let old = resolve(&self.schema, &schema, get_at(before, prefix));
            let new = resolve(&self.schema, &schema, get_at(self.data.as_ref(), prefix));
            let (Ok(old), Ok(new)) = (old, new) else {
                continue;
            };

            let old_keys = property_names(&old);
            let new_keys = property_names(&new);
            if old_keys.len() == new_keys.len() && old_keys.iter().all(|k| new_keys.contains(k)) {
                continue;
            }
            let Some(Value::Object(mut object)) = get_at(self.data.as_ref(), prefix).cloned() else {
                continue;
            };

            let edited = path.get(depth).map(PathSegment::as_key);
            for key in old_keys.iter().filter(|k| !new_keys.contains(k)) {
                if edited.as_deref() != Some(key.as_str()) {
                    object.remove(key.as_str());
                }
            }
            tracing::debug!(path = ?prefix, "schema branch changed");

            let object = Value::Object(object);
            let filled = compute_defaults(&self.schema, &schema, Some(&object), &self.config)
                .ok()
                .flatten()
                .unwrap_or(object);
            set_value(&mut self.data, prefix, filled);
        }
    }

    /// Drop errors recorded for items `first..=last` of the array at `path`.
    fn discard_errors(&mut self, path: &[PathSegment], first: usize, last: Option<usize>) {
        let prefix: Vec<String> = path.iter().map(PathSegment::as_key).collect();
        self.errors.all.retain(|error| {
            let affected = error.path.len() > prefix.len()
                && error.path[..prefix.len()] == prefix[..]
                && error.path[prefix.len()]
                    .parse::<usize>()
                    .map_or(false, |i| i >= first && last.map_or(true, |l| i <= l));
            !affected
        });
    }

    fn refresh(&mut self, change: Change) {
        self.revision += 1;
        self.ids = build_id_tree(
            &self.schema,
            &self.schema,
            self.data.as_ref(),
            &self.hints,
            &self.config,
        );
        self.errors = map_errors(&self.errors.all, &self.ids);
        self.notify(change);
    }

    fn notify(&mut self, change: Change) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        for (_, callback) in subscribers.iter_mut() {
            callback(&change, &*self);
        }
        self.subscribers = subscribers;
    }
}

fn property_names(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter(|(_, schema)| schema.get(ADDITIONAL_PROPERTY_FLAG).is_none())
                .map(|(key, _)| key.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn required_keys(effective: &Value) -> Vec<&str> {
    effective
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect()
}

fn get_at<'a>(data: Option<&'a Value>, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(data?, |value, segment| match value {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => segment.as_index().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Slot for `segment` inside `value`, turning `value` into a container of
/// the right kind when it is not one.
fn child_slot<'a>(value: &'a mut Value, segment: &PathSegment) -> &'a mut Value {
    let index = match (&*value, segment) {
        (Value::Array(_), segment) => segment.as_index(),
        (Value::Object(_), _) => None,
        (_, PathSegment::Index(i)) => Some(*i),
        _ => None,
    };

    match index {
        Some(index) => {
            if !value.is_array() {
                *value = Value::Array(Vec::new());
            }
            match value {
                Value::Array(items) => {
                    if items.len() <= index {
                        items.resize(index + 1, Value::Null);
                    }
                    &mut items[index]
                }
                other => other,
            }
        }
        None => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            match value {
                Value::Object(map) => map.entry(segment.as_key()).or_insert(Value::Null),
                other => other,
            }
        }
    }
}

fn vivify<'a>(slot: &'a mut Option<Value>, path: &[PathSegment]) -> &'a mut Value {
    let root = slot.get_or_insert(Value::Null);
    path.iter().fold(root, child_slot)
}

fn set_value(slot: &mut Option<Value>, path: &[PathSegment], value: Value) {
    *vivify(slot, path) = value;
}

fn remove_value(slot: &mut Option<Value>, path: &[PathSegment]) {
    let Some((last, parent)) = path.split_last() else {
        *slot = None;
        return;
    };
    let Some(root) = slot.as_mut() else {
        return;
    };
    let parent = parent.iter().try_fold(root, |value, segment| match value {
        Value::Object(map) => map.get_mut(&segment.as_key()),
        Value::Array(items) => match segment.as_index() {
            Some(i) => items.get_mut(i),
            None => None,
        },
        _ => None,
    });
    match parent {
        Some(Value::Object(map)) => {
            map.remove(&last.as_key());
        }
        Some(Value::Array(items)) => {
            if let Some(item) = last.as_index().and_then(|i| items.get_mut(i)) {
                *item = Value::Null;
            }
        }
        _ => {}
    }
}

/// Run `f` on the array at `path`, creating it when the target is missing
/// or not an array.
fn with_array<R>(slot: &mut Option<Value>, path: &[PathSegment], f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    let target = vivify(slot, path);
    let mut items = match std::mem::take(target) {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    let result = f(&mut items);
    *target = Value::Array(items);
    result
}
