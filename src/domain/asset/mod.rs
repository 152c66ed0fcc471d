pub mod entity;
pub mod invariants;

pub use entity::{AssetDescriptor, AssetKind};
pub use invariants::validate_asset;
