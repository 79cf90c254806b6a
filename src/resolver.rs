//! Schema resolution - computes the effective schema of a node for the
//! current form data.
//!
//! Resolution is shallow: `$ref`, `allOf`, `dependencies`, `if`/`then`/`else`
//! and `oneOf`/`anyOf` are folded into the node itself, while the schemas
//! under `properties` and `items` are left untouched until a caller descends
//! into them. Recursive schemas therefore resolve one level at a time and
//! never expand unboundedly.

use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::merge::{merge_all, merge_schemas};
use crate::node::{Combinator, SchemaNode};
use crate::types::{PathSegment, ADDITIONAL_PROPERTY_FLAG};

/// Upper bound on `$ref` hops and nesting followed by the structural
/// conformance check.
const MAX_CONFORMS_DEPTH: usize = 64;

/// Resolve `schema` into its effective form for `data`.
///
/// `root` is the document `$ref` pointers are resolved against. `data` is the
/// form data at the node's path (`None` when absent).
///
/// # Errors
///
/// Returns `SchemaError` for unresolvable references, reference cycles
/// without structure, contradictory merges and malformed combinators.
pub fn resolve(root: &Value, schema: &Value, data: Option<&Value>) -> Result<Value, SchemaError> {
    resolve_inner(root, schema, data, "#", &mut RefTrail::default())
}

/// Like [`resolve`], also returning every `$ref` followed on the way to the
/// effective schema, including those behind `allOf` and the selected
/// branches.
pub(crate) fn resolve_tracked(
    root: &Value,
    schema: &Value,
    data: Option<&Value>,
) -> Result<(Value, Vec<String>), SchemaError> {
    let mut trail = RefTrail::default();
    let effective = resolve_inner(root, schema, data, "#", &mut trail)?;
    Ok((effective, trail.followed))
}

/// Resolve the effective schema found by walking `path` from `schema`.
///
/// Each step resolves the current node against the data at that point and
/// descends into the matching property or item schema. Returns `Ok(None)`
/// when the path leaves the schema (schema-less data).
pub fn resolve_at(
    root: &Value,
    schema: &Value,
    data: Option<&Value>,
    path: &[PathSegment],
) -> Result<Option<Value>, SchemaError> {
    let mut effective = resolve(root, schema, data)?;
    let mut data = data;

    for segment in path {
        let child = match segment.as_index() {
            Some(index) if is_array_schema(&effective) => item_schema(&effective, index).cloned(),
            _ => property_schema(&effective, &segment.as_key()).cloned(),
        };
        let Some(child) = child else {
            return Ok(None);
        };
        data = data.and_then(|d| child_value(d, segment));
        effective = resolve(root, &child, data)?;
    }

    Ok(Some(effective))
}

/// Look up a `$ref` pointer inside the root document.
///
/// Supports `#`, `#/definitions/...`, `#/$defs/...` and arbitrary JSON
/// Pointers into the root.
pub fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Result<&'a Value, SchemaError> {
    if !reference.starts_with('#') {
        return Err(SchemaError::ref_not_found(reference));
    }
    crate::loader::lookup_fragment(root, reference)
        .ok_or_else(|| SchemaError::ref_not_found(reference))
}

/// Schema of property `key` in an effective object schema.
///
/// Falls back to `additionalProperties` (`true` reads as `{}`).
pub fn property_schema<'a>(effective: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(schema) = effective.get("properties").and_then(|p| p.get(key)) {
        return Some(schema);
    }
    match effective.get("additionalProperties") {
        Some(Value::Object(_)) => effective.get("additionalProperties"),
        Some(Value::Bool(true)) => Some(empty_schema()),
        _ => None,
    }
}

/// Schema of item `index` in an effective array schema.
///
/// Handles both the single `items` form and the tuple form with
/// `additionalItems`.
pub fn item_schema(effective: &Value, index: usize) -> Option<&Value> {
    match effective.get("items")? {
        Value::Array(tuple) => match tuple.get(index) {
            Some(schema) => Some(schema),
            None => match effective.get("additionalItems") {
                Some(Value::Object(_)) => effective.get("additionalItems"),
                Some(Value::Bool(true)) => Some(empty_schema()),
                _ => None,
            },
        },
        Value::Bool(true) => Some(empty_schema()),
        Value::Bool(false) => None,
        items => Some(items),
    }
}

/// True when an effective schema describes an object.
pub fn is_object_schema(effective: &Value) -> bool {
    matches!(SchemaNode::classify(effective, "#"), Ok(SchemaNode::Object(_)))
}

/// True when an effective schema describes an array.
pub fn is_array_schema(effective: &Value) -> bool {
    matches!(SchemaNode::classify(effective, "#"), Ok(SchemaNode::Array(_)))
}

/// Pick the active branch of a `oneOf`/`anyOf`.
///
/// With no data the first branch wins. Otherwise a `discriminator` property
/// is consulted first; failing that every branch is scored by how many of
/// its properties agree with the data in `const`, `enum` and `type`.
/// Branches whose `const`/`enum` contradicts the data are excluded. The
/// highest score wins, ties go to the lowest index.
pub fn select_branch(
    root: &Value,
    branches: &[Value],
    data: Option<&Value>,
    discriminator: Option<&str>,
) -> usize {
    select_inner(root, branches, data, discriminator, &RefTrail::default())
}

/// Structural check of `value` against `schema`.
///
/// Covers `$ref`, `type`, `const`, `enum`, `required`, `properties`, `items`,
/// numeric/length/count bounds and the boolean combinators. Keywords such as
/// `pattern` or `format` are not evaluated; use a [`crate::Validator`] for
/// full validation.
pub fn conforms(root: &Value, schema: &Value, value: &Value) -> bool {
    conforms_inner(root, schema, value, 0)
}

// --- Internal implementation ---

/// References seen during one shallow resolution.
#[derive(Default)]
struct RefTrail {
    /// Refs on the current expansion path; re-entering one is a cycle.
    active: Vec<String>,
    /// Every ref whose target contributed to the result.
    followed: Vec<String>,
}

fn resolve_inner(
    root: &Value,
    schema: &Value,
    data: Option<&Value>,
    pointer: &str,
    trail: &mut RefTrail,
) -> Result<Value, SchemaError> {
    let mark = trail.active.len();
    let result = resolve_steps(root, schema, data, pointer, trail);
    trail.active.truncate(mark);
    result
}

fn resolve_steps(
    root: &Value,
    schema: &Value,
    data: Option<&Value>,
    pointer: &str,
    trail: &mut RefTrail,
) -> Result<Value, SchemaError> {
    let mut current = schema.clone();
    let mut location = pointer.to_string();

    loop {
        let node = SchemaNode::classify(&current, &location)?;
        let next = match node {
            SchemaNode::Ref(reference) => {
                if trail.active.iter().any(|r| r == reference) {
                    return Err(SchemaError::circular_ref(reference));
                }
                let target = resolve_ref(root, reference)?;
                let siblings = without(&current, &["$ref"]);
                let reference = reference.to_string();
                let next = if siblings.as_object().map_or(true, Map::is_empty) {
                    target.clone()
                } else {
                    merge_schemas(&siblings, target, &reference)?
                };
                if !trail.followed.contains(&reference) {
                    trail.followed.push(reference.clone());
                }
                trail.active.push(reference.clone());
                location = reference;
                next
            }
            SchemaNode::Combinator(Combinator::AllOf, branches) => {
                let resolved = branches
                    .iter()
                    .enumerate()
                    .map(|(i, branch)| {
                        let branch_pointer = format!("{}/allOf/{}", location, i);
                        resolve_inner(root, branch, data, &branch_pointer, trail)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                merge_all(without(&current, &["allOf"]), &resolved, &location)?
            }
            SchemaNode::Dependencies(deps) => {
                let mut base = without(&current, &["dependencies"]);
                let present = data.and_then(Value::as_object);
                for (trigger, dependency) in deps {
                    if !present.map_or(false, |obj| obj.contains_key(trigger)) {
                        continue;
                    }
                    let dep_pointer = format!("{}/dependencies/{}", location, trigger);
                    let addition = match dependency {
                        Value::Array(names) => {
                            let mut required = Map::new();
                            required.insert("required".to_string(), Value::Array(names.clone()));
                            Value::Object(required)
                        }
                        schema => resolve_inner(root, schema, data, &dep_pointer, trail)?,
                    };
                    base = merge_schemas(&base, &addition, &dep_pointer)?;
                }
                base
            }
            SchemaNode::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let matched = evaluate_condition(root, condition, data);
                let base = without(&current, &["if", "then", "else"]);
                match if matched { then } else { otherwise } {
                    Some(branch) => {
                        let keyword = if matched { "then" } else { "else" };
                        let branch_pointer = format!("{}/{}", location, keyword);
                        let resolved = resolve_inner(root, branch, data, &branch_pointer, trail)?;
                        merge_schemas(&base, &resolved, &location)?
                    }
                    None => base,
                }
            }
            SchemaNode::Combinator(combinator, branches) => {
                let discriminator = current
                    .get("discriminator")
                    .and_then(|d| d.get("propertyName"))
                    .and_then(Value::as_str);
                let index = select_inner(root, branches, data, discriminator, trail);
                tracing::debug!(
                    pointer = %location,
                    combinator = combinator.keyword(),
                    index,
                    "selected branch"
                );
                let branch_pointer = format!("{}/{}/{}", location, combinator.keyword(), index);
                let resolved =
                    resolve_inner(root, &branches[index], data, &branch_pointer, trail)?;
                merge_schemas(
                    &without(&current, &[combinator.keyword(), "discriminator"]),
                    &resolved,
                    &location,
                )?
            }
            SchemaNode::Object(_)
            | SchemaNode::Array(_)
            | SchemaNode::Leaf(_)
            | SchemaNode::Never => break,
        };
        current = next;
    }

    Ok(stub_additional_properties(current, data))
}

fn select_inner(
    root: &Value,
    branches: &[Value],
    data: Option<&Value>,
    discriminator: Option<&str>,
    trail: &RefTrail,
) -> usize {
    let Some(data) = data else {
        return 0;
    };

    // Losing branches must not show up in the caller's followed refs.
    let resolved: Vec<Option<Value>> = branches
        .iter()
        .map(|branch| {
            let mut scratch = RefTrail {
                active: trail.active.clone(),
                followed: Vec::new(),
            };
            resolve_inner(root, branch, Some(data), "#", &mut scratch).ok()
        })
        .collect();

    if let Some(property) = discriminator {
        if let Some(value) = data.get(property) {
            let hit = resolved.iter().position(|branch| {
                branch
                    .as_ref()
                    .and_then(|b| b.get("properties"))
                    .and_then(|p| p.get(property))
                    .map_or(false, |prop| matches_literal(deref(root, prop), value) == Some(true))
            });
            if let Some(index) = hit {
                return index;
            }
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (index, branch) in resolved.iter().enumerate() {
        let Some(score) = branch.as_ref().and_then(|b| branch_score(root, b, data, 0)) else {
            continue;
        };
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.map_or(0, |(index, _)| index)
}

/// Score of one resolved branch against data; `None` excludes the branch.
fn branch_score(root: &Value, branch: &Value, data: &Value, depth: usize) -> Option<usize> {
    if depth > MAX_CONFORMS_DEPTH {
        return Some(0);
    }
    if let Some(declared) = branch.get("type") {
        if !type_matches(declared, data) {
            return None;
        }
    }
    if matches_literal(branch, data) == Some(false) {
        return None;
    }

    let Value::Object(obj) = data else {
        return Some(1);
    };
    let Some(props) = branch.get("properties").and_then(Value::as_object) else {
        return Some(0);
    };

    let mut score = 0;
    for (key, prop) in props {
        let Some(value) = obj.get(key) else {
            continue;
        };
        let prop = deref(root, prop);
        match matches_literal(prop, value) {
            Some(false) => return None,
            Some(true) => {
                score += 1;
                continue;
            }
            None => {}
        }
        let type_ok = prop.get("type").map_or(true, |t| type_matches(t, value));
        if !type_ok {
            continue;
        }
        score += 1;
        if value.is_object() && prop.get("properties").is_some() {
            score += branch_score(root, prop, value, depth + 1).unwrap_or(0);
        }
    }
    Some(score)
}

/// `Some(true)` when `const`/`enum` accept `value`, `Some(false)` when they
/// reject it, `None` when the schema declares neither.
fn matches_literal(schema: &Value, value: &Value) -> Option<bool> {
    if let Some(constant) = schema.get("const") {
        return Some(constant == value);
    }
    schema
        .get("enum")
        .and_then(Value::as_array)
        .map(|options| options.contains(value))
}

/// Follow a `$ref` chain without merging; returns the input when the chain
/// cannot be followed.
pub(crate) fn deref<'a>(root: &'a Value, schema: &'a Value) -> &'a Value {
    let mut current = schema;
    for _ in 0..MAX_CONFORMS_DEPTH {
        match current.get("$ref").and_then(Value::as_str) {
            Some(reference) => match resolve_ref(root, reference) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            None => return current,
        }
    }
    current
}

fn evaluate_condition(root: &Value, condition: &Value, data: Option<&Value>) -> bool {
    match data {
        Some(value) => conforms(root, condition, value),
        None => {
            let condition = deref(root, condition);
            let object_shaped = condition.get("properties").is_some()
                || condition.get("required").is_some()
                || condition.get("type").and_then(Value::as_str) == Some("object");
            object_shaped && conforms(root, condition, &Value::Object(Map::new()))
        }
    }
}

fn conforms_inner(root: &Value, schema: &Value, value: &Value, depth: usize) -> bool {
    if depth > MAX_CONFORMS_DEPTH {
        return true;
    }
    let map = match schema {
        Value::Bool(accept) => return *accept,
        Value::Object(map) => map,
        _ => return true,
    };

    if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
        match resolve_ref(root, reference) {
            Ok(target) => {
                if !conforms_inner(root, target, value, depth + 1) {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }

    if let Some(declared) = map.get("type") {
        if !type_matches(declared, value) {
            return false;
        }
    }
    if matches_literal(schema, value) == Some(false) {
        return false;
    }

    match value {
        Value::Object(obj) => {
            let missing = map
                .get("required")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .any(|key| !obj.contains_key(key));
            if missing {
                return false;
            }
            if let Some(props) = map.get("properties").and_then(Value::as_object) {
                for (key, prop) in props {
                    if let Some(child) = obj.get(key) {
                        if !conforms_inner(root, prop, child, depth + 1) {
                            return false;
                        }
                    }
                }
            }
            if !within(map, "minProperties", "maxProperties", obj.len() as f64) {
                return false;
            }
        }
        Value::Array(items) => {
            let all_items = match map.get("items") {
                Some(Value::Array(tuple)) => items
                    .iter()
                    .zip(tuple)
                    .all(|(item, s)| conforms_inner(root, s, item, depth + 1)),
                Some(items_schema) => items
                    .iter()
                    .all(|item| conforms_inner(root, items_schema, item, depth + 1)),
                None => true,
            };
            if !all_items || !within(map, "minItems", "maxItems", items.len() as f64) {
                return false;
            }
        }
        Value::String(s) => {
            if !within(map, "minLength", "maxLength", s.chars().count() as f64) {
                return false;
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if !within(map, "minimum", "maximum", n) {
                return false;
            }
            let exclusive_min = map.get("exclusiveMinimum").and_then(Value::as_f64);
            let exclusive_max = map.get("exclusiveMaximum").and_then(Value::as_f64);
            if exclusive_min.map_or(false, |min| n <= min) || exclusive_max.map_or(false, |max| n >= max) {
                return false;
            }
        }
        _ => {}
    }

    let check_all = |key: &str| -> Vec<bool> {
        map.get(key)
            .and_then(Value::as_array)
            .map(|branches| {
                branches
                    .iter()
                    .map(|b| conforms_inner(root, b, value, depth + 1))
                    .collect()
            })
            .unwrap_or_default()
    };
    if check_all("allOf").contains(&false) {
        return false;
    }
    let any_of = check_all("anyOf");
    if !any_of.is_empty() && !any_of.contains(&true) {
        return false;
    }
    let one_of = check_all("oneOf");
    if !one_of.is_empty() && one_of.iter().filter(|ok| **ok).count() != 1 {
        return false;
    }
    if let Some(negated) = map.get("not") {
        if conforms_inner(root, negated, value, depth + 1) {
            return false;
        }
    }

    true
}

fn within(map: &Map<String, Value>, min_key: &str, max_key: &str, n: f64) -> bool {
    let min_ok = map.get(min_key).and_then(Value::as_f64).map_or(true, |min| n >= min);
    let max_ok = map.get(max_key).and_then(Value::as_f64).map_or(true, |max| n <= max);
    min_ok && max_ok
}

fn type_matches(declared: &Value, value: &Value) -> bool {
    let single = |t: &str| match t {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.fract() == 0.0)
            }
            _ => false,
        },
        _ => true,
    };
    match declared {
        Value::String(t) => single(t),
        Value::Array(types) => types.iter().filter_map(Value::as_str).any(single),
        _ => true,
    }
}

fn child_value<'a>(data: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match data {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => segment.as_index().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Clone `schema` without the given keywords.
fn without(schema: &Value, keys: &[&str]) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Give data keys outside `properties` a schema taken from
/// `additionalProperties`, flagged so renderers can tell them apart.
fn stub_additional_properties(mut schema: Value, data: Option<&Value>) -> Value {
    let Some(Value::Object(data)) = data else {
        return schema;
    };
    let Some(map) = schema.as_object_mut() else {
        return schema;
    };
    let additional = match map.get("additionalProperties") {
        Some(Value::Object(additional)) => additional.clone(),
        Some(Value::Bool(true)) => Map::new(),
        _ => return schema,
    };

    let properties = map
        .entry("properties".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(properties) = properties {
        for key in data.keys() {
            if properties.contains_key(key) {
                continue;
            }
            let mut stub = additional.clone();
            stub.insert(ADDITIONAL_PROPERTY_FLAG.to_string(), Value::Bool(true));
            properties.insert(key.clone(), Value::Object(stub));
        }
    }
    schema
}

fn empty_schema() -> &'static Value {
    static EMPTY: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
    EMPTY.get_or_init(|| Value::Object(Map::new()))
}
