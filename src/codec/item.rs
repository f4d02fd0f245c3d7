use super::KeyCodec;
use crate::core::{Error, Record, Result, ScalarType, Value};
use crate::schema::{Entity, EntityDescriptor};
use crate::store::{AttributeValue, Item};

/// Converts records to and from the store's attribute-value items.
#[derive(Debug, Clone, Copy)]
pub struct ItemCodec<'a> {
    descriptor: &'a EntityDescriptor,
}

impl<'a> ItemCodec<'a> {
    pub fn new(descriptor: &'a EntityDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn keys(&self) -> KeyCodec<'a> {
        KeyCodec::new(self.descriptor)
    }

    /// Encodes a record into a sparse item.
    ///
    /// Absent optional attributes are omitted. Every composite attribute
    /// whose sources are present is computed and stored alongside, so the
    /// item is reachable on all of its indexes after a single write.
    pub fn encode(&self, record: &Record) -> Result<Item> {
        for name in record.keys() {
            if self.descriptor.attribute(name).is_none() {
                return Err(Error::encoding(
                    name.clone(),
                    format!("not declared on {}", self.descriptor.name()),
                ));
            }
        }

        let mut item = Item::with_capacity(record.len() + self.descriptor.composites().len());
        for attr in self.descriptor.attributes() {
            match record.get(&attr.name) {
                Some(value) => {
                    let value = match (attr.scalar, value) {
                        (ScalarType::Float, Value::Integer(i)) => Value::Float(*i as f64),
                        (scalar, value) if value.scalar_type() == scalar => value.clone(),
                        (scalar, value) => {
                            return Err(Error::encoding(
                                attr.name.clone(),
                                format!("expected {}, found {}", scalar, value.scalar_type()),
                            ));
                        }
                    };
                    item.insert(attr.name.clone(), value.to_attribute_value());
                }
                None if attr.required => {
                    return Err(Error::encoding(
                        attr.name.clone(),
                        "required attribute is missing",
                    ));
                }
                None => {}
            }
        }

        let keys = self.keys();
        for def in self.descriptor.composites() {
            if let Some(joined) = keys.composite_value(def, record)? {
                item.insert(def.name.clone(), AttributeValue::S(joined));
            }
        }
        Ok(item)
    }

    /// Decodes an item back into a record.
    ///
    /// Composite attributes present in the item are split back into any
    /// source fields the item does not carry itself, which is what makes
    /// items read through a keys-only index usable.
    pub fn decode(&self, item: &Item) -> Result<Record> {
        let mut record = Record::new();
        for attr in self.descriptor.attributes() {
            if let Some(raw) = item.get(&attr.name) {
                if let Some(value) = decode_value(&attr.name, attr.scalar, raw)? {
                    record.insert(attr.name.clone(), value);
                }
            }
        }

        let keys = self.keys();
        for def in self.descriptor.composites() {
            match item.get(&def.name) {
                Some(AttributeValue::S(raw)) => keys.parse_composite(&def.name, raw, &mut record)?,
                Some(other) => {
                    return Err(Error::decoding(
                        def.name.clone(),
                        format!("composite attribute stored as {}", other.type_tag()),
                    ));
                }
                None => {}
            }
        }
        Ok(record)
    }

    pub fn encode_entity<E: Entity>(&self, entity: &E) -> Result<Item> {
        self.encode(&entity.to_record())
    }

    pub fn decode_entity<E: Entity>(&self, item: &Item) -> Result<E> {
        E::from_record(self.decode(item)?)
    }
}

/// Wire value to scalar value; explicit nulls decode as absent.
fn decode_value(attribute: &str, scalar: ScalarType, raw: &AttributeValue) -> Result<Option<Value>> {
    let wrong = || {
        Error::decoding(
            attribute,
            format!("{} attribute stored as {}", scalar, raw.type_tag()),
        )
    };

    let value = match (scalar, raw) {
        (_, AttributeValue::Null(_)) => return Ok(None),
        (ScalarType::String, AttributeValue::S(s)) => Value::String(s.clone()),
        (ScalarType::Timestamp, AttributeValue::S(s))
        | (ScalarType::Integer, AttributeValue::N(s))
        | (ScalarType::Float, AttributeValue::N(s)) => {
            Value::parse(scalar, s).map_err(|reason| Error::decoding(attribute, reason))?
        }
        (ScalarType::Boolean, AttributeValue::Bool(b)) => Value::Boolean(*b),
        (ScalarType::Binary, AttributeValue::B(bytes)) => Value::Binary(bytes.clone()),
        _ => return Err(wrong()),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexDef, Projection};
    use chrono::{TimeZone, Utc};

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Reading")
            .attribute("device", ScalarType::String, true)
            .attribute("at", ScalarType::Timestamp, true)
            .attribute("celsius", ScalarType::Float, false)
            .attribute("raw", ScalarType::Binary, false)
            .attribute("ok", ScalarType::Boolean, false)
            .primary_key("device", Some("at"))
            .composite("device_at", &["device", "at"], '|')
            .index(IndexDef::new("byDeviceAt", "device_at", None).projection(Projection::KeysOnly))
            .build()
            .unwrap()
    }

    fn sample() -> Record {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::nanoseconds(42);
        let mut record = Record::new();
        record.insert("device".to_string(), Value::from("sensor-1"));
        record.insert("at".to_string(), Value::from(at));
        record.insert("celsius".to_string(), Value::from(21.5));
        record.insert("raw".to_string(), Value::from(vec![1u8, 2, 3]));
        record
    }

    #[test]
    fn test_encode_is_sparse_and_injects_composites() {
        let descriptor = descriptor();
        let codec = ItemCodec::new(&descriptor);
        let item = codec.encode(&sample()).unwrap();

        assert!(!item.contains_key("ok"));
        assert_eq!(item.get("celsius"), Some(&AttributeValue::N("21.5".to_string())));
        let composite = item.get("device_at").and_then(AttributeValue::as_s).unwrap();
        assert!(composite.starts_with("sensor-1|2024-01-02T03:04:05.000000042"));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let descriptor = descriptor();
        let codec = ItemCodec::new(&descriptor);
        let record = sample();
        let decoded = codec.decode(&codec.encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_recovers_fields_from_composite_only() {
        let descriptor = descriptor();
        let codec = ItemCodec::new(&descriptor);
        let full = codec.encode(&sample()).unwrap();

        let mut projected = Item::new();
        projected.insert("device_at".to_string(), full["device_at"].clone());
        let decoded = codec.decode(&projected).unwrap();
        assert_eq!(decoded.get("device"), Some(&Value::from("sensor-1")));
        assert_eq!(decoded.get("at"), sample().get("at"));
    }

    #[test]
    fn test_encode_rejects_missing_required_and_wrong_types() {
        let descriptor = descriptor();
        let codec = ItemCodec::new(&descriptor);

        let mut missing = sample();
        missing.remove("device");
        assert!(matches!(codec.encode(&missing), Err(Error::Encoding { .. })));

        let mut wrong = sample();
        wrong.insert("ok".to_string(), Value::from("yes"));
        assert!(matches!(codec.encode(&wrong), Err(Error::Encoding { .. })));
    }

    #[test]
    fn test_decode_treats_null_as_absent() {
        let descriptor = descriptor();
        let codec = ItemCodec::new(&descriptor);
        let mut item = codec.encode(&sample()).unwrap();
        item.insert("ok".to_string(), AttributeValue::Null(true));
        assert!(!codec.decode(&item).unwrap().contains_key("ok"));
    }
}
