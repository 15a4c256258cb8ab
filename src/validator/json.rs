/*
 * Licensed to the Apache Software Foundation (ASF) under one or more
 * contributor license agreements.  See the NOTICE file distributed with
 * this work for additional information regarding copyright ownership.
 * The ASF licenses this file to You under the Apache License, Version 2.0
 * (the "License"); you may not use this file except in compliance with
 * the License.  You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use serde_json::Value;

/// `application/json` and any `+json` structured syntax suffix.
pub fn is_json_media_type(media_type: &str) -> bool {
    let media_type = media_type.trim().to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// Removes the member addressed by a dot-joined path. An empty path, or one
/// that does not resolve, leaves the value untouched.
pub fn remove_path(value: &mut Value, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = value;
    for segment in parents {
        let next = match current {
            Value::Object(map) => map.get_mut(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(child) => current = child,
            None => return false,
        }
    }

    match current {
        Value::Object(map) => map.shift_remove(*last).is_some(),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items.remove(index);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Rewrites every empty object below the root as an empty array. Request
/// bodies are validated this way, so an empty nested collection reads the
/// same whichever brackets the client sent. The root is left as sent.
pub fn nested_empty_objects_as_arrays(value: &mut Value) {
    match value {
        Value::Object(map) => map.values_mut().for_each(empty_object_as_array),
        Value::Array(items) => items.iter_mut().for_each(empty_object_as_array),
        _ => {}
    }
}

fn empty_object_as_array(value: &mut Value) {
    if value.as_object().is_some_and(|map| map.is_empty()) {
        *value = Value::Array(Vec::new());
    } else {
        nested_empty_objects_as_arrays(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/problem+json"));
        assert!(is_json_media_type("Application/JSON"));
        assert!(!is_json_media_type("text/plain"));
        assert!(!is_json_media_type("multipart/form-data"));
    }

    #[test]
    fn test_remove_path() {
        let mut value = json!({
            "foo": "test",
            "extra": "x",
            "items": [{"id": 1, "secret": true}, {"id": 2}],
            "nested": {"keep": 1, "drop": 2}
        });
        assert!(remove_path(&mut value, "extra"));
        assert!(remove_path(&mut value, "items.0.secret"));
        assert!(remove_path(&mut value, "nested.drop"));
        assert!(!remove_path(&mut value, "missing.path"));
        assert!(!remove_path(&mut value, ""));
        assert_eq!(
            value,
            json!({
                "foo": "test",
                "items": [{"id": 1}, {"id": 2}],
                "nested": {"keep": 1}
            })
        );
    }

    #[test]
    fn test_nested_empty_objects_as_arrays() {
        let mut value = json!({
            "foo": "test",
            "person": {},
            "items": [{}, {"a": {}}],
            "keep": {"b": 1}
        });
        nested_empty_objects_as_arrays(&mut value);
        assert_eq!(
            value,
            json!({
                "foo": "test",
                "person": [],
                "items": [[], {"a": []}],
                "keep": {"b": 1}
            })
        );

        let mut root = json!({});
        nested_empty_objects_as_arrays(&mut root);
        assert_eq!(root, json!({}));
    }

    #[test]
    fn test_remove_array_item() {
        let mut value = json!({"list": [1, null, 3]});
        assert!(remove_path(&mut value, "list.1"));
        assert_eq!(value, json!({"list": [1, 3]}));
    }
}
