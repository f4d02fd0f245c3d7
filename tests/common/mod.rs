#![allow(dead_code)]

use chrono::{DateTime, Utc};
use schemakv::{Adapter, AdapterConfig, Context, Entity, MemoryStore};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(name = "Thing", table = "things", hash = "name", range = "version")]
#[index(name = "thingID", hash = "thingID")]
pub struct Thing {
    pub name: String,
    pub version: i64,
    #[entity(rename = "thingID")]
    pub thing_id: Option<String>,
    pub note: Option<String>,
}

impl Thing {
    pub fn new(name: &str, version: i64) -> Self {
        Self {
            name: name.to_string(),
            version,
            thing_id: None,
            note: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.thing_id = Some(id.to_string());
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(name = "Reading", table = "readings", hash = "device", range = "taken_at")]
#[composite(name = "site_device", sources = ["site", "device"], separator = '#')]
#[index(name = "bySite", hash = "site_device", range = "taken_at", projection = "keys_only")]
pub struct Reading {
    pub device: String,
    pub taken_at: DateTime<Utc>,
    pub site: String,
    pub celsius: Option<f64>,
    pub raw: Option<Vec<u8>>,
    pub ok: Option<bool>,
}

pub async fn thing_adapter(store: &Arc<MemoryStore>, config: AdapterConfig) -> Adapter<Thing> {
    let adapter = Adapter::<Thing>::new(store.clone(), config).unwrap();
    adapter.create_table(&Context::background()).await.unwrap();
    adapter
}

pub async fn reading_adapter(store: &Arc<MemoryStore>) -> Adapter<Reading> {
    let adapter = Adapter::<Reading>::new(store.clone(), AdapterConfig::default()).unwrap();
    adapter.create_table(&Context::background()).await.unwrap();
    adapter
}

/// Saves `name`/1..=count, every one carrying a `thingID`.
pub async fn seed(adapter: &Adapter<Thing>, name: &str, count: i64) -> Vec<Thing> {
    let ctx = Context::background();
    let mut saved = Vec::new();
    for version in 1..=count {
        let thing = Thing::new(name, version).with_id(&format!("{name}-{version}"));
        adapter.save(&ctx, &thing).await.unwrap();
        saved.push(thing);
    }
    saved
}
