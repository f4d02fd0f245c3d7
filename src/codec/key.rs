use crate::core::{Error, Record, Result, ScalarType, Value};
use crate::schema::{CompositeDef, EntityDescriptor, KeySchema};
use crate::store::{AttributeValue, Item};
use std::fmt;

/// Ordered attribute/value pairs identifying one item in a table or index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Key {
    parts: Vec<(String, AttributeValue)>,
}

impl Key {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: AttributeValue) {
        let name = name.into();
        if let Some(slot) = self.parts.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = value;
        } else {
            self.parts.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.parts
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn parts(&self) -> &[(String, AttributeValue)] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn to_item(&self) -> Item {
        self.parts.iter().cloned().collect()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:{}", name, value)?;
        }
        Ok(())
    }
}

/// Derives table and index keys from records, and composite attributes
/// back into their source fields.
#[derive(Debug, Clone, Copy)]
pub struct KeyCodec<'a> {
    descriptor: &'a EntityDescriptor,
}

impl<'a> KeyCodec<'a> {
    pub fn new(descriptor: &'a EntityDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &'a EntityDescriptor {
        self.descriptor
    }

    /// Primary key of a record. Every key part must be present.
    pub fn primary_key(&self, record: &Record) -> Result<Key> {
        let schema = self.descriptor.primary_key();
        self.key_of(schema, record)?.ok_or_else(|| {
            Error::encoding(
                schema.hash.clone(),
                format!("{} is missing a primary key attribute", self.descriptor.name()),
            )
        })
    }

    /// Key of a record on a secondary index.
    ///
    /// `None` when a key part is absent: the item is not a member of the index.
    pub fn index_key(&self, index: &str, record: &Record) -> Result<Option<Key>> {
        let schema = &self.descriptor.require_index(index)?.key;
        self.key_of(schema, record)
    }

    /// Builds a key from one value per key part (hash, then range).
    ///
    /// A composite part takes its already joined string; see [`compose`](Self::compose).
    pub fn key_from_parts(&self, index: Option<&str>, parts: &[Value]) -> Result<Key> {
        let schema = self.descriptor.key_schema(index)?;
        let names = schema.attributes();
        if names.len() != parts.len() {
            return Err(Error::InvalidOptions(format!(
                "{} key takes {} parts, got {}",
                self.descriptor.name(),
                names.len(),
                parts.len()
            )));
        }

        let mut key = Key::new();
        for (name, value) in names.into_iter().zip(parts) {
            key.push(name, self.encode_part(name, value)?);
        }
        Ok(key)
    }

    /// Wire value of a single key part supplied by a caller.
    pub fn encode_part(&self, part: &str, value: &Value) -> Result<AttributeValue> {
        match self.descriptor.composite(part) {
            Some(composite) => {
                let Value::String(raw) = value else {
                    return Err(Error::encoding(part, "composite key parts are strings"));
                };
                let pieces = raw.split(composite.separator).count();
                if pieces != composite.sources.len() {
                    return Err(Error::encoding(
                        part,
                        format!(
                            "expected {} parts joined by '{}', got {}",
                            composite.sources.len(),
                            composite.separator,
                            pieces
                        ),
                    ));
                }
                Ok(AttributeValue::S(raw.clone()))
            }
            None => {
                let scalar = self
                    .descriptor
                    .scalar_of(part)
                    .ok_or_else(|| Error::encoding(part, "not a declared attribute"))?;
                Ok(coerce(part, scalar, value)?.to_attribute_value())
            }
        }
    }

    /// Joins source values into a composite attribute's string form.
    pub fn compose(&self, composite: &str, sources: &[Value]) -> Result<String> {
        let def = self
            .descriptor
            .composite(composite)
            .ok_or_else(|| Error::encoding(composite, "not a composite attribute"))?;
        if def.sources.len() != sources.len() {
            return Err(Error::encoding(
                composite,
                format!("takes {} source values, got {}", def.sources.len(), sources.len()),
            ));
        }

        let mut record = Record::new();
        for (name, value) in def.sources.iter().zip(sources) {
            let scalar = self.descriptor.scalar_of(name).unwrap_or(ScalarType::String);
            record.insert(name.clone(), coerce(name, scalar, value)?);
        }
        join(def, &record).map(|joined| joined.unwrap_or_default())
    }

    /// Computes a composite attribute from a record.
    ///
    /// `None` when any source is absent.
    pub fn composite_value(&self, def: &CompositeDef, record: &Record) -> Result<Option<String>> {
        join(def, record)
    }

    /// Splits a composite value and assigns its parts to the source fields.
    ///
    /// Fields already present in `record` are left untouched.
    pub fn parse_composite(&self, name: &str, raw: &str, record: &mut Record) -> Result<()> {
        let def = self
            .descriptor
            .composite(name)
            .ok_or_else(|| Error::decoding(name, "not a composite attribute"))?;

        let pieces: Vec<&str> = raw.split(def.separator).collect();
        if pieces.len() != def.sources.len() {
            return Err(Error::decoding(
                name,
                format!(
                    "{:?} splits into {} parts on '{}', expected {}",
                    raw,
                    pieces.len(),
                    def.separator,
                    def.sources.len()
                ),
            ));
        }

        for (source, piece) in def.sources.iter().zip(pieces) {
            if record.contains_key(source) {
                continue;
            }
            let scalar = self.descriptor.scalar_of(source).unwrap_or(ScalarType::String);
            let value = Value::parse(scalar, piece).map_err(|reason| Error::decoding(source, reason))?;
            record.insert(source.clone(), value);
        }
        Ok(())
    }

    /// Attributes the store needs to resume a walk over the table or an index.
    ///
    /// Index key parts first, then any primary key parts not already listed.
    pub fn continuation_attributes(&self, index: Option<&str>) -> Result<Vec<&'a str>> {
        let mut names: Vec<&'a str> = Vec::new();
        if let Some(index) = index {
            names.extend(self.descriptor.require_index(index)?.key.attributes());
        }
        for name in self.descriptor.primary_key().attributes() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Wire value of a key part computed from a record; `None` if absent.
    pub fn part_value(&self, part: &str, record: &Record) -> Result<Option<AttributeValue>> {
        match self.descriptor.composite(part) {
            Some(def) => Ok(join(def, record)?.map(AttributeValue::S)),
            None => Ok(record.get(part).map(Value::to_attribute_value)),
        }
    }

    fn key_of(&self, schema: &KeySchema, record: &Record) -> Result<Option<Key>> {
        let mut key = Key::new();
        for part in schema.attributes() {
            match self.part_value(part, record)? {
                Some(value) => key.push(part, value),
                None => return Ok(None),
            }
        }
        Ok(Some(key))
    }
}

fn join(def: &CompositeDef, record: &Record) -> Result<Option<String>> {
    let mut rendered = Vec::with_capacity(def.sources.len());
    for source in &def.sources {
        let Some(value) = record.get(source) else {
            return Ok(None);
        };
        let text = value.render();
        if text.contains(def.separator) {
            return Err(Error::encoding(
                source.clone(),
                format!(
                    "value {:?} contains separator '{}' of composite '{}'",
                    text, def.separator, def.name
                ),
            ));
        }
        rendered.push(text);
    }
    Ok(Some(rendered.join(&def.separator.to_string())))
}

/// Checks a caller-supplied value against the declared type.
fn coerce(attribute: &str, scalar: ScalarType, value: &Value) -> Result<Value> {
    match (scalar, value) {
        (ScalarType::Float, Value::Integer(i)) => Ok(Value::Float(*i as f64)),
        (scalar, value) if value.scalar_type() == scalar => Ok(value.clone()),
        (scalar, value) => Err(Error::encoding(
            attribute,
            format!("expected {}, found {}", scalar, value.scalar_type()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexDef;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Thing")
            .attribute("name", ScalarType::String, true)
            .attribute("version", ScalarType::Integer, true)
            .attribute("id", ScalarType::String, false)
            .primary_key("name", Some("version"))
            .composite("name_version", &["name", "version"], '#')
            .index(IndexDef::new("thingID", "id", None))
            .index(IndexDef::new("byComposite", "name_version", None))
            .build()
            .unwrap()
    }

    fn record(name: &str, version: i64) -> Record {
        let mut record = Record::new();
        record.insert("name".to_string(), Value::from(name));
        record.insert("version".to_string(), Value::from(version));
        record
    }

    #[test]
    fn test_primary_key_in_declared_order() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        let key = codec.primary_key(&record("a", 1)).unwrap();
        assert_eq!(key.to_string(), "name:\"a\",version:1");
    }

    #[test]
    fn test_composite_index_key_joins_sources() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        let key = codec.index_key("byComposite", &record("a", 7)).unwrap().unwrap();
        assert_eq!(key.get("name_version"), Some(&AttributeValue::S("a#7".to_string())));
    }

    #[test]
    fn test_separator_in_source_is_rejected() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        let err = codec.index_key("byComposite", &record("a#b", 1)).unwrap_err();
        assert!(matches!(err, Error::Encoding { ref attribute, .. } if attribute == "name"));
    }

    #[test]
    fn test_sparse_and_unknown_indexes() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        assert_eq!(codec.index_key("thingID", &record("a", 1)).unwrap(), None);
        assert!(matches!(
            codec.index_key("nope", &record("a", 1)),
            Err(Error::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_parse_composite_fills_missing_fields() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        let mut out = Record::new();
        codec.parse_composite("name_version", "a#12", &mut out).unwrap();
        assert_eq!(out, record("a", 12));

        let err = codec
            .parse_composite("name_version", "a#b#12", &mut Record::new())
            .unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }));
    }

    #[test]
    fn test_key_from_parts_checks_types() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        let key = codec
            .key_from_parts(None, &[Value::from("a"), Value::from(1i64)])
            .unwrap();
        assert_eq!(key.len(), 2);

        assert!(codec.key_from_parts(None, &[Value::from("a")]).is_err());
        assert!(codec
            .key_from_parts(None, &[Value::from("a"), Value::from("1")])
            .is_err());
    }

    #[test]
    fn test_continuation_attributes_include_base_key() {
        let descriptor = descriptor();
        let codec = KeyCodec::new(&descriptor);
        assert_eq!(
            codec.continuation_attributes(Some("thingID")).unwrap(),
            vec!["id", "name", "version"]
        );
        assert_eq!(codec.continuation_attributes(None).unwrap(), vec!["name", "version"]);
    }
}
