use serde::{Deserialize, Serialize};

/// Identifies a single photo or video item in an asset store.
///
/// Descriptors are produced by the asset enumeration layer and consumed,
/// never mutated, by the resolver. The id is opaque: it is never used as a
/// path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Opaque store-assigned identifier
    pub id: String,

    /// Native media kind
    pub kind: AssetKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetDescriptor {
    pub fn new(id: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn image(id: impl Into<String>) -> Self {
        Self::new(id, AssetKind::Image)
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self::new(id, AssetKind::Video)
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Image => write!(f, "image"),
            AssetKind::Video => write!(f, "video"),
        }
    }
}
