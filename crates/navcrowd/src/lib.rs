//! Multi-agent crowd steering on navigation meshes
//!
//! This crate moves many agents over a shared navigation mesh. Each agent
//! follows a path corridor toward its target while local steering keeps it
//! clear of walls and other agents.
//!
//! # Features
//!
//! - **Agent Management**: Fixed pool of agent slots with reusable indices
//! - **Path Following**: Corridors that are trimmed, shortcut and repaired as the mesh changes
//! - **Amortized Planning**: Long searches are queued and advanced a bounded amount per tick
//! - **Collision Avoidance**: Sampled velocity obstacles against neighbours and walls
//! - **Proximity Queries**: Spatial hash grid for neighbour lookups
//! - **Off-Mesh Links**: Animated traversal of jumps and other off-mesh connections
//!
//! # Example
//!
//! ```rust,ignore
//! use navcrowd::{AgentParams, Crowd};
//! use navcrowd_query::PolyMesh;
//!
//! let mesh = PolyMesh::grid(16, 16, 1.0, [0.0; 3], |_, _| true)?;
//! let mut crowd = Crowd::new(32, 0.6, mesh)?;
//!
//! let agent = crowd.add_agent(&[0.5, 0.0, 0.5], &AgentParams::default())?;
//! let (target, pos) = crowd.get_nav_query().find_nearest_poly(
//!     &[15.5, 0.0, 15.5],
//!     crowd.get_query_half_extents(),
//!     &Default::default(),
//! )?;
//! crowd.request_move_target(agent, target, &pos)?;
//!
//! for _ in 0..100 {
//!     crowd.update(0.1, None);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Crowd`]: Owns the agents and runs the per-tick pipeline
//! - [`PathCorridor`]: Polygon path an agent is currently following
//! - [`PathQueue`]: Sliced path searches shared by all agents
//! - [`LocalBoundary`]: Cached wall segments around an agent
//! - [`ObstacleAvoidanceQuery`]: Velocity sampling against circles and segments
//! - [`ProximityGrid`]: Spatial indexing for neighbour queries
//! - [`MoveRequestState`]: Explicit state machine of an agent's move request

pub mod crowd;
pub mod local_boundary;
pub mod move_request;
pub mod obstacle_avoidance;
pub mod path_corridor;
pub mod path_queue;
pub mod proximity_grid;

pub use crowd::*;
pub use local_boundary::*;
pub use move_request::*;
pub use obstacle_avoidance::*;
pub use path_corridor::*;
pub use path_queue::*;
pub use proximity_grid::*;

#[cfg(test)]
mod test_mesh_helpers;
