use crate::codec::{Key, KeyCodec};
use crate::core::{Error, Record, Result};
use crate::store::{AttributeValue, Item};
use serde::{Deserialize, Serialize};

/// Continuation point of a query or scan over one table or index.
///
/// Holds exactly the attributes the store needs to resume: the index key
/// plus the base table key. A cursor only resumes the index it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    index: Option<String>,
    key: Vec<(String, AttributeValue)>,
}

fn label(index: Option<&str>) -> String {
    index.unwrap_or("<table>").to_string()
}

impl Cursor {
    /// Builds a cursor from the last item a walk returned.
    pub fn build(keys: &KeyCodec<'_>, index: Option<&str>, last_item: &Item) -> Result<Self> {
        let mut key = Vec::new();
        for name in keys.continuation_attributes(index)? {
            let value = last_item.get(name).ok_or_else(|| Error::CursorMismatch {
                index: label(index),
                reason: format!("item has no '{}' attribute", name),
            })?;
            key.push((name.to_string(), value.clone()));
        }
        Ok(Self {
            index: index.map(str::to_string),
            key,
        })
    }

    /// Builds a cursor that resumes just after `record`.
    ///
    /// Fails with `CursorMismatch` when the record lacks an attribute the
    /// index needs, e.g. an entity that was never a member of that index.
    pub fn starting_after(keys: &KeyCodec<'_>, index: Option<&str>, record: &Record) -> Result<Self> {
        let mut key = Vec::new();
        for name in keys.continuation_attributes(index)? {
            let value = keys.part_value(name, record)?.ok_or_else(|| Error::CursorMismatch {
                index: label(index),
                reason: format!("entity has no value for '{}'", name),
            })?;
            key.push((name.to_string(), value));
        }
        Ok(Self {
            index: index.map(str::to_string),
            key,
        })
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn key(&self) -> Key {
        self.key
            .iter()
            .fold(Key::new(), |key, (name, value)| key.with(name.clone(), value.clone()))
    }

    /// Exclusive start key for a walk over `index`.
    pub fn resolve(&self, index: Option<&str>) -> Result<Item> {
        if self.index.as_deref() != index {
            return Err(Error::CursorMismatch {
                index: label(index),
                reason: format!("cursor was built for {}", label(self.index.as_deref())),
            });
        }
        Ok(self.key.iter().cloned().collect())
    }

    /// Opaque token form, safe to hand to remote callers.
    pub fn to_token(&self) -> Result<String> {
        let bytes = rmp_serde::to_vec(self).map_err(|e| Error::encoding("cursor", e.to_string()))?;
        Ok(hex::encode(bytes))
    }

    /// Parses a token and checks it belongs to `index`.
    pub fn from_token(token: &str, index: Option<&str>) -> Result<Self> {
        let mismatch = |reason: String| Error::CursorMismatch {
            index: label(index),
            reason,
        };
        let bytes =
            hex::decode(token).map_err(|e| mismatch(format!("cursor token is not hex: {}", e)))?;
        let cursor: Self = rmp_serde::from_slice(&bytes)
            .map_err(|e| mismatch(format!("malformed cursor token: {}", e)))?;
        cursor.resolve(index)?;
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ScalarType, Value};
    use crate::schema::{EntityDescriptor, IndexDef};

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Thing")
            .attribute("name", ScalarType::String, true)
            .attribute("version", ScalarType::Integer, true)
            .attribute("thingID", ScalarType::String, false)
            .primary_key("name", Some("version"))
            .index(IndexDef::new("thingID", "thingID", None))
            .build()
            .unwrap()
    }

    fn record(id: Option<&str>) -> Record {
        let mut record = Record::new();
        record.insert("name".to_string(), Value::from("a"));
        record.insert("version".to_string(), Value::from(1i64));
        if let Some(id) = id {
            record.insert("thingID".to_string(), Value::from(id));
        }
        record
    }

    #[test]
    fn test_index_cursor_carries_base_key() {
        let descriptor = descriptor();
        let keys = KeyCodec::new(&descriptor);
        let cursor = Cursor::starting_after(&keys, Some("thingID"), &record(Some("x"))).unwrap();
        let start = cursor.resolve(Some("thingID")).unwrap();
        assert_eq!(start.len(), 3);
        assert_eq!(start["thingID"], AttributeValue::S("x".to_string()));
    }

    #[test]
    fn test_cursor_rejects_other_index() {
        let descriptor = descriptor();
        let keys = KeyCodec::new(&descriptor);
        let cursor = Cursor::starting_after(&keys, None, &record(None)).unwrap();
        assert!(matches!(
            cursor.resolve(Some("thingID")),
            Err(Error::CursorMismatch { .. })
        ));
    }

    #[test]
    fn test_entity_outside_index_cannot_resume_it() {
        let descriptor = descriptor();
        let keys = KeyCodec::new(&descriptor);
        let err = Cursor::starting_after(&keys, Some("thingID"), &record(None)).unwrap_err();
        assert!(matches!(err, Error::CursorMismatch { ref index, .. } if index == "thingID"));
    }

    #[test]
    fn test_token_is_bound_to_its_index() {
        let descriptor = descriptor();
        let keys = KeyCodec::new(&descriptor);
        let cursor = Cursor::starting_after(&keys, Some("thingID"), &record(Some("x"))).unwrap();
        let token = cursor.to_token().unwrap();

        assert_eq!(Cursor::from_token(&token, Some("thingID")).unwrap(), cursor);
        assert!(Cursor::from_token(&token, None).is_err());
        assert!(matches!(
            Cursor::from_token("zz", Some("thingID")),
            Err(Error::CursorMismatch { ref reason, .. }) if reason.contains("not hex")
        ));
    }
}
