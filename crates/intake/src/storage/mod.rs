pub mod filesystem;

pub use filesystem::{ArtifactPaths, FileStorage, StagedFile};
