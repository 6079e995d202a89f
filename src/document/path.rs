use serde_json::Value;

use super::{value_as_string, Document};
use crate::error::MappingError;

/// Trennzeichen für verschachtelte Pfade, z.B. `data/tenant`
pub const PATH_SEPARATOR: char = '/';

/// Löse einen `segment/segment/leaf` Pfad im Dokument auf.
///
/// Arrays auf dem Weg werden über ihr erstes Element betreten, so dass
/// `items/name` bei `{"items": [{"name": "a"}, {"name": "b"}]}` auf `"a"` zeigt.
pub fn resolve<'a>(doc: &'a Document, path: &str) -> Result<&'a Value, MappingError> {
    let mut segments = path.split(PATH_SEPARATOR).filter(|s| !s.is_empty());

    let first = segments.next().ok_or_else(|| MappingError::AmbiguousOrMalformed {
        path: path.to_string(),
        reason: "empty path".to_string(),
    })?;

    let mut current = first_element(doc.get(first), path)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => first_element(map.get(segment), path)?,
            _ => {
                return Err(MappingError::PathNotFound {
                    path: path.to_string(),
                })
            }
        };
    }

    Ok(current)
}

/// Wie [`resolve`], liefert aber den Blattwert als String.
pub fn resolve_str(doc: &Document, path: &str) -> Result<String, MappingError> {
    match resolve(doc, path)? {
        Value::Null => Err(MappingError::PathNotFound {
            path: path.to_string(),
        }),
        Value::Object(_) | Value::Array(_) => Err(MappingError::AmbiguousOrMalformed {
            path: path.to_string(),
            reason: "leaf is not a scalar value".to_string(),
        }),
        scalar => Ok(value_as_string(scalar)),
    }
}

fn first_element<'a>(value: Option<&'a Value>, path: &str) -> Result<&'a Value, MappingError> {
    match value {
        Some(Value::Array(items)) => items.first().ok_or_else(|| MappingError::PathNotFound {
            path: path.to_string(),
        }),
        Some(value) => Ok(value),
        None => Err(MappingError::PathNotFound {
            path: path.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_resolve_nested_path() {
        let d = doc(json!({"data": {"tenant": "t1", "meta": {"region": "eu"}}}));
        assert_eq!(resolve_str(&d, "data/tenant").unwrap(), "t1");
        assert_eq!(resolve_str(&d, "data/meta/region").unwrap(), "eu");
    }

    #[test]
    fn test_resolve_top_level_field() {
        let d = doc(json!({"pk": "value"}));
        assert_eq!(resolve_str(&d, "pk").unwrap(), "value");
    }

    #[test]
    fn test_missing_segment_is_path_not_found() {
        let d = doc(json!({"data": {"tenant": "t1"}}));
        assert_eq!(
            resolve_str(&d, "data/subproject"),
            Err(MappingError::PathNotFound {
                path: "data/subproject".to_string()
            })
        );
        assert!(matches!(
            resolve_str(&d, "other/tenant"),
            Err(MappingError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_descending_through_scalar_fails() {
        let d = doc(json!({"data": "flat"}));
        assert!(matches!(
            resolve(&d, "data/tenant"),
            Err(MappingError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_array_takes_first_element() {
        let d = doc(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(resolve_str(&d, "items/name").unwrap(), "a");

        let empty = doc(json!({"items": []}));
        assert!(matches!(
            resolve(&empty, "items/name"),
            Err(MappingError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_non_scalar_leaf_is_malformed() {
        let d = doc(json!({"data": {"meta": {"a": 1}}}));
        assert!(matches!(
            resolve_str(&d, "data/meta"),
            Err(MappingError::AmbiguousOrMalformed { .. })
        ));
    }

    #[test]
    fn test_numeric_leaf_rendered_as_string() {
        let d = doc(json!({"data": {"shard": 7}}));
        assert_eq!(resolve_str(&d, "data/shard").unwrap(), "7");
    }

    #[test]
    fn test_sees_fields_added_after_construction() {
        let mut d = doc(json!({"id": "1"}));
        d.set("data", json!({"tenant": "late"}));
        assert_eq!(resolve_str(&d, "data/tenant").unwrap(), "late");
    }

    #[test]
    fn test_empty_path_is_malformed() {
        let d = doc(json!({"id": "1"}));
        assert!(matches!(
            resolve(&d, "/"),
            Err(MappingError::AmbiguousOrMalformed { .. })
        ));
    }
}
