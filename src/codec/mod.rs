pub mod item;
pub mod key;

pub use item::ItemCodec;
pub use key::{Key, KeyCodec};
