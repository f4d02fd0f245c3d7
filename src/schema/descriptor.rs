use crate::core::{Error, Result, ScalarType};
use crate::store::{IndexSchema, Projection, TableSchema};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    pub scalar: ScalarType,
    pub required: bool,
}

/// A string attribute synthesized by joining source attributes.
///
/// No source value may contain `separator`; the key codec checks this on
/// every encode.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDef {
    pub name: String,
    pub sources: Vec<String>,
    pub separator: char,
}

/// Hash attribute plus optional range attribute.
///
/// Either may name a declared attribute or a composite attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySchema {
    pub hash: String,
    pub range: Option<String>,
}

impl KeySchema {
    pub fn new(hash: impl Into<String>, range: Option<&str>) -> Self {
        Self {
            hash: hash.into(),
            range: range.map(str::to_string),
        }
    }

    pub fn attributes(&self) -> Vec<&str> {
        let mut names = vec![self.hash.as_str()];
        if let Some(range) = &self.range {
            names.push(range);
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub key: KeySchema,
    pub projection: Projection,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, hash: impl Into<String>, range: Option<&str>) -> Self {
        Self {
            name: name.into(),
            key: KeySchema::new(hash, range),
            projection: Projection::All,
        }
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// Static metadata for one modeled entity.
///
/// Built once, validated on build, and shared read-only by every adapter
/// for that entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    attributes: Vec<AttributeDef>,
    primary_key: KeySchema,
    indexes: Vec<IndexDef>,
    composites: Vec<CompositeDef>,
}

impl EntityDescriptor {
    pub fn builder(name: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn primary_key(&self) -> &KeySchema {
        &self.primary_key
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Like [`index`](Self::index) but reporting `UnknownIndex`.
    pub fn require_index(&self, name: &str) -> Result<&IndexDef> {
        self.index(name).ok_or_else(|| Error::UnknownIndex {
            entity: self.name.clone(),
            index: name.to_string(),
        })
    }

    /// Key schema of the base table (`None`) or of a named index.
    pub fn key_schema(&self, index: Option<&str>) -> Result<&KeySchema> {
        match index {
            None => Ok(&self.primary_key),
            Some(name) => self.require_index(name).map(|index| &index.key),
        }
    }

    pub fn composites(&self) -> &[CompositeDef] {
        &self.composites
    }

    pub fn composite(&self, name: &str) -> Option<&CompositeDef> {
        self.composites.iter().find(|c| c.name == name)
    }

    /// Scalar type of a declared or composite attribute.
    pub fn scalar_of(&self, name: &str) -> Option<ScalarType> {
        self.attribute(name)
            .map(|attr| attr.scalar)
            .or_else(|| self.composite(name).map(|_| ScalarType::String))
    }

    /// Declared attributes a key part is derived from, in order.
    pub fn sources_of<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        match self.composite(name) {
            Some(composite) => composite.sources.iter().map(String::as_str).collect(),
            None => vec![name],
        }
    }

    /// Provisioning request for this entity's table and indexes.
    pub fn table_schema(&self, table_name: &str) -> TableSchema {
        TableSchema {
            table_name: table_name.to_string(),
            hash_key: self.primary_key.hash.clone(),
            range_key: self.primary_key.range.clone(),
            indexes: self
                .indexes
                .iter()
                .map(|index| IndexSchema {
                    name: index.name.clone(),
                    hash_key: index.key.hash.clone(),
                    range_key: index.key.range.clone(),
                    projection: index.projection.clone(),
                })
                .collect(),
        }
    }
}

pub struct EntityDescriptorBuilder {
    name: String,
    table: Option<String>,
    attributes: Vec<AttributeDef>,
    primary_key: Option<KeySchema>,
    indexes: Vec<IndexDef>,
    composites: Vec<CompositeDef>,
}

impl EntityDescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            attributes: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            composites: Vec::new(),
        }
    }

    /// Table name; defaults to the entity name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, scalar: ScalarType, required: bool) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            scalar,
            required,
        });
        self
    }

    pub fn primary_key(mut self, hash: impl Into<String>, range: Option<&str>) -> Self {
        self.primary_key = Some(KeySchema::new(hash, range));
        self
    }

    pub fn composite(mut self, name: impl Into<String>, sources: &[&str], separator: char) -> Self {
        self.composites.push(CompositeDef {
            name: name.into(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            separator,
        });
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn build(self) -> Result<EntityDescriptor> {
        let schema_err = |msg: String| Error::Schema(format!("entity '{}': {}", self.name, msg));

        if self.name.is_empty() {
            return Err(Error::Schema("entity name cannot be empty".to_string()));
        }

        let mut names = HashSet::new();
        for attr in &self.attributes {
            if attr.name.is_empty() || !names.insert(attr.name.as_str()) {
                return Err(schema_err(format!("duplicate or empty attribute '{}'", attr.name)));
            }
        }

        for composite in &self.composites {
            if !names.insert(composite.name.as_str()) {
                return Err(schema_err(format!(
                    "composite '{}' collides with another attribute",
                    composite.name
                )));
            }
            if composite.sources.is_empty() {
                return Err(schema_err(format!("composite '{}' has no sources", composite.name)));
            }
            for source in &composite.sources {
                if !self.attributes.iter().any(|attr| &attr.name == source) {
                    return Err(schema_err(format!(
                        "composite '{}' source '{}' is not a declared attribute",
                        composite.name, source
                    )));
                }
            }
        }

        let primary_key = self
            .primary_key
            .clone()
            .ok_or_else(|| schema_err("no primary key declared".to_string()))?;

        let descriptor = EntityDescriptor {
            table: self.table.clone().unwrap_or_else(|| self.name.clone()),
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            primary_key,
            indexes: self.indexes.clone(),
            composites: self.composites.clone(),
        };

        for part in descriptor.primary_key.attributes() {
            descriptor.check_key_part(part, true)?;
        }

        let mut index_names = HashSet::new();
        for index in &descriptor.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(schema_err(format!("duplicate index '{}'", index.name)));
            }
            for part in index.key.attributes() {
                descriptor.check_key_part(part, false)?;
            }
        }

        Ok(descriptor)
    }
}

impl EntityDescriptor {
    /// A key part must resolve to a key-typed attribute; primary key parts
    /// must also be derived only from required attributes.
    fn check_key_part(&self, part: &str, primary: bool) -> Result<()> {
        let scalar = self.scalar_of(part).ok_or_else(|| {
            Error::Schema(format!(
                "entity '{}': key attribute '{}' is not declared",
                self.name, part
            ))
        })?;

        if !scalar.is_key_type() {
            return Err(Error::Schema(format!(
                "entity '{}': {} attribute '{}' cannot be a key",
                self.name, scalar, part
            )));
        }

        if primary {
            for source in self.sources_of(part) {
                let required = self.attribute(source).is_some_and(|attr| attr.required);
                if !required {
                    return Err(Error::Schema(format!(
                        "entity '{}': primary key source '{}' must be required",
                        self.name, source
                    )));
                }
            }
        }
        Ok(())
    }
}
