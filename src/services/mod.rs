// src/services/mod.rs
//
// Services Module - Orchestration Layer
//
// PathResolver is the entry point; the rest are the parts it drives.

pub mod conversion_cache;
pub mod conversion_engine;
pub mod negative_cache;
pub mod path_resolver;
pub mod request_coordinator;


pub use conversion_cache::{CacheSource, ConversionCache};

pub use conversion_engine::{ConversionEngine, ImageConversionEngine};

pub use negative_cache::NegativeCache;

pub use path_resolver::{PathResolver, ResolverStats};

pub use request_coordinator::{
    Coordinated,
    FollowerHandle,
    LeaderPermit,
    Participation,
    RequestCoordinator,
    Role,
};
