//! JSON utility functions
//!
//! Flattening maps nested JSON onto dotted wire keys (`a.b.0.c`), and
//! unflattening rebuilds the nested form. The two are inverses for any
//! object whose keys contain no `.` and are not purely numeric.

use serde_json::{Map, Value as JsonValue};

/// Largest list position honored by [`unflatten`]. Larger numeric segments
/// are treated as object keys so a single key cannot force a huge allocation.
pub const MAX_LIST_INDEX: usize = 65_535;

/// Flatten a nested object into dotted keys.
///
/// Scalars are copied verbatim. Empty objects and empty lists are kept as
/// leaves so they survive a round trip through [`unflatten`].
pub fn flatten(nested: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut out = Map::new();
    for (key, value) in nested {
        flatten_into(&mut out, key, value);
    }
    out
}

/// Flatten one value under `prefix`, writing leaves into `out`.
pub fn flatten_into(out: &mut Map<String, JsonValue>, prefix: &str, value: &JsonValue) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(out, &join_key(prefix, key), child);
            }
        }
        JsonValue::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(out, &join_key(prefix, &index.to_string()), child);
            }
        }
        _ => {
            out.insert(prefix.to_string(), value.clone());
        }
    }
}

/// Rebuild a nested object from dotted keys.
///
/// Numeric segments address list positions, padding gaps with `null`.
/// A new container is a list when the segment after it is numeric and an
/// object otherwise. When two keys disagree on the shape of a path, the
/// later key wins and replaces whatever the earlier one built.
pub fn unflatten(flat: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut root = JsonValue::Object(Map::new());
    for (key, value) in flat {
        insert_path(&mut root, key, value.clone());
    }
    match root {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}

/// Look up a dotted path inside a nested object. Numeric segments index
/// into lists.
pub fn get_path<'a>(nested: &'a Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let mut current = nested.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Decode a string that looks like a JSON object or list.
///
/// Returns `None` for plain strings and for text that fails to parse.
pub fn decode_json_string(raw: &str) -> Option<JsonValue> {
    let trimmed = raw.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn join_key(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

fn list_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse::<usize>().ok().filter(|i| *i <= MAX_LIST_INDEX)
}

fn insert_path(root: &mut JsonValue, key: &str, value: JsonValue) {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };

    let mut current = root;
    if let Some(parents) = parents {
        let mut segments = parents.split('.').peekable();
        while let Some(segment) = segments.next() {
            let next = segments.peek().copied().unwrap_or(leaf);
            let slot = child_slot(current, segment);
            prepare_container(slot, list_index(next).is_some());
            current = slot;
        }
    }
    *child_slot(current, leaf) = value;
}

/// Resolve `segment` inside `container`, reshaping the container when it
/// cannot hold that segment.
fn child_slot<'a>(container: &'a mut JsonValue, segment: &str) -> &'a mut JsonValue {
    let index = list_index(segment);
    let fits = matches!(
        (&*container, index),
        (JsonValue::Array(_), Some(_)) | (JsonValue::Object(_), _)
    );
    if !fits {
        *container = if index.is_some() {
            JsonValue::Array(Vec::new())
        } else {
            JsonValue::Object(Map::new())
        };
    }

    match (container, index) {
        (JsonValue::Array(items), Some(i)) => {
            if items.len() <= i {
                items.resize(i + 1, JsonValue::Null);
            }
            &mut items[i]
        }
        (JsonValue::Object(map), _) => map
            .entry(segment.to_string())
            .or_insert(JsonValue::Null),
        (other, _) => other,
    }
}

fn prepare_container(slot: &mut JsonValue, wants_list: bool) {
    if !slot.is_object() && !slot.is_array() {
        *slot = if wants_list {
            JsonValue::Array(Vec::new())
        } else {
            JsonValue::Object(Map::new())
        };
    }
}
