//! Navigation mesh query layer used by the crowd
//!
//! The crowd consumes a navigation mesh through the [`NavMeshQuery`] trait:
//! nearest-polygon lookup, sliced A* search, straight-path extraction,
//! surface-constrained movement and raycasts. [`PolyMesh`] is a compact
//! reference implementation over convex polygons with shared-edge adjacency
//! and optional off-mesh connections.
//!
//! # Example
//!
//! ```rust
//! use navcrowd_query::{NavMeshQuery, PolyMesh, QueryFilter};
//!
//! let mesh = PolyMesh::grid(4, 4, 1.0, [0.0; 3], |_, _| true).unwrap();
//! let filter = QueryFilter::default();
//! let (start, start_pos) = mesh
//!     .find_nearest_poly(&[0.5, 0.0, 0.5], &[0.5, 1.0, 0.5], &filter)
//!     .unwrap();
//! let (end, end_pos) = mesh
//!     .find_nearest_poly(&[3.5, 0.0, 3.5], &[0.5, 1.0, 0.5], &filter)
//!     .unwrap();
//! let result = mesh
//!     .find_path(start, end, &start_pos, &end_pos, &filter, 256)
//!     .unwrap();
//! assert!(!result.partial);
//! ```

mod nav_mesh_query;
mod poly_mesh;
mod poly_mesh_query;
mod query_filter;
mod raycast_hit;
mod sliced_pathfinding;

#[cfg(test)]
pub mod test_mesh_helpers;

pub use nav_mesh_query::*;
pub use poly_mesh::{OffMeshConnection, PolyMesh, PolyMeshStats};
pub use query_filter::QueryFilter;
pub use raycast_hit::RaycastHit;
pub use sliced_pathfinding::SlicedSearch;

pub use navcrowd_common::Status;

/// Result type for navigation mesh queries
pub type QueryResult<T> = std::result::Result<T, Status>;

/// Reference to a polygon in the navigation mesh
///
/// The zero reference is the null polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PolyRef(u32);

impl PolyRef {
    /// The null polygon reference
    pub const NULL: PolyRef = PolyRef(0);

    /// Creates a new polygon reference
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw reference value
    pub fn id(&self) -> u32 {
        self.0
    }

    /// Checks if the reference is non-null
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Reference for the polygon stored at `index` in a mesh
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    /// Storage index of the polygon, `None` for the null reference
    pub(crate) fn index(&self) -> Option<usize> {
        self.0.checked_sub(1).map(|i| i as usize)
    }
}

impl From<u32> for PolyRef {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PolyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Flags used to control polygon traversal through a [`QueryFilter`]
pub struct PolyFlags;

impl PolyFlags {
    /// Ability to walk (ground, grass, road)
    pub const WALK: u16 = 0x01;
    /// Ability to swim (water)
    pub const SWIM: u16 = 0x02;
    /// Ability to move through doors
    pub const DOOR: u16 = 0x04;
    /// Ability to jump
    pub const JUMP: u16 = 0x08;
    /// Disabled polygon
    pub const DISABLED: u16 = 0x10;
    /// All abilities
    pub const ALL: u16 = 0xffff;
}

/// Polygon type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolyType {
    /// Walkable ground polygon
    #[default]
    Ground,
    /// Two-point off-mesh connection
    OffMeshConnection,
}
