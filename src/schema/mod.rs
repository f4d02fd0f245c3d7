pub mod descriptor;
pub mod entity;

pub use crate::store::Projection;
pub use descriptor::{
    AttributeDef, CompositeDef, EntityDescriptor, EntityDescriptorBuilder, IndexDef, KeySchema,
};
pub use entity::{Entity, FieldValue, put_field, take_field};
