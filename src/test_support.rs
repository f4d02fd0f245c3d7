use crate::core::{Record, Result, ScalarType};
use crate::schema::{Entity, EntityDescriptor, IndexDef, put_field, take_field};
use std::sync::OnceLock;

/// Hand-written entity used by unit tests: `name` hash, `version` range,
/// sparse `thingID` index.
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    pub name: String,
    pub version: i64,
    pub thing_id: Option<String>,
    pub label: Option<String>,
}

impl Thing {
    pub fn new(name: &str, version: i64) -> Self {
        Self {
            name: name.to_string(),
            version,
            thing_id: None,
            label: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.thing_id = Some(id.to_string());
        self
    }
}

impl Entity for Thing {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::builder("Thing")
                .table("things")
                .attribute("name", ScalarType::String, true)
                .attribute("version", ScalarType::Integer, true)
                .attribute("thingID", ScalarType::String, false)
                .attribute("label", ScalarType::String, false)
                .primary_key("name", Some("version"))
                .index(IndexDef::new("thingID", "thingID", None))
                .build()
                .unwrap()
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        put_field(&mut record, "name", &self.name);
        put_field(&mut record, "version", &self.version);
        put_field(&mut record, "thingID", &self.thing_id);
        put_field(&mut record, "label", &self.label);
        record
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            name: take_field(&mut record, "name")?,
            version: take_field(&mut record, "version")?,
            thing_id: take_field(&mut record, "thingID")?,
            label: take_field(&mut record, "label")?,
        })
    }
}
