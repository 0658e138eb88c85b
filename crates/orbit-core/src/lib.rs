//! Shared configuration, study profile and error types for the orbit workspace.

pub mod config;
pub mod error;
pub mod profile;

pub use config::OrbitConfig;
pub use error::{OrbitError, Result};
pub use profile::StudyProfile;
