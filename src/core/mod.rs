// Public modules
pub mod artifact;
pub mod batch;
pub mod build;
pub mod config;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod git;
pub mod github;
pub mod params;
pub mod platform;
pub mod release;
pub mod resolver;
pub mod target;
pub mod version;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use params::{Param, Parameters};
pub use target::{TargetDef, TargetGraph};
