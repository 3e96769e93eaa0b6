//! Common utilities and data structures shared by the navcrowd crates

mod geometry;
mod status;
mod vector;

pub use geometry::*;
pub use status::Status;
pub use vector::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("agent {0} not found")]
    AgentNotFound(usize),

    #[error("navigation query failed: {0}")]
    Query(#[from] Status),
}

/// Result type for navcrowd operations
pub type Result<T> = std::result::Result<T, Error>;
