//! skiff-core — shared types for the skiff relay server.
//! All other skiff crates depend on this one.

pub mod config;
pub mod frame;
pub mod hash;
pub mod ids;
pub mod manifest;

pub use config::SkiffConfig;
pub use frame::{Frame, FrameKind};
pub use manifest::{ChunkInfo, ManifestError, UploadManifest};
