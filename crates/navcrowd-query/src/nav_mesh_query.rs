//! Navigation mesh query contract
//!
//! This module defines the query surface the crowd relies on. Implementations
//! must be shareable across worker threads: the crowd runs per-agent phases in
//! parallel with read-only access to the query.

use crate::{PolyRef, QueryFilter, QueryResult, RaycastHit, Status};

/// Straight path vertex flags
pub struct StraightPathFlags;

impl StraightPathFlags {
    /// The vertex is the start position of the path
    pub const START: u8 = 0x01;
    /// The vertex is the end position of the path
    pub const END: u8 = 0x02;
    /// The vertex is the start of an off-mesh connection
    pub const OFFMESH_CONNECTION: u8 = 0x04;
}

/// A vertex of a straightened path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    /// Position of the vertex
    pub pos: [f32; 3],
    /// Combination of [`StraightPathFlags`]
    pub flags: u8,
    /// Polygon entered at this vertex, null for the end vertex
    pub poly: PolyRef,
}

/// A polygon path produced by a search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathResult {
    /// Polygons from start to end
    pub path: Vec<PolyRef>,
    /// True when the end polygon could not be reached
    pub partial: bool,
}

/// Result of constrained movement along the mesh surface
#[derive(Debug, Clone, PartialEq)]
pub struct MoveAlongSurfaceResult {
    /// Reachable position closest to the requested end position
    pub pos: [f32; 3],
    /// Polygons visited from start to the polygon containing `pos`
    pub visited: Vec<PolyRef>,
}

/// A wall segment of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSegment {
    pub start: [f32; 3],
    pub end: [f32; 3],
}

/// Query interface over a navigation mesh
pub trait NavMeshQuery: Send + Sync {
    /// State of an incremental path search, owned by the caller
    type SlicedSearch: Send;

    /// Checks that `poly_ref` exists and passes `filter`
    fn is_valid_poly_ref(&self, poly_ref: PolyRef, filter: &QueryFilter) -> bool;

    /// Finds the polygon nearest to `center` within the given half extents
    fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> QueryResult<(PolyRef, [f32; 3])>;

    /// Height of the polygon surface at the XZ location of `pos`
    fn get_poly_height(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> QueryResult<f32>;

    /// Closest point on the polygon, and whether `pos` was over the polygon
    fn closest_point_on_poly(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> QueryResult<([f32; 3], bool)>;

    /// Closest point on the polygon boundary, or `pos` itself when inside
    fn closest_point_on_poly_boundary(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> QueryResult<[f32; 3]>;

    /// Starts an incremental path search
    fn init_sliced_find_path(
        &self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> QueryResult<Self::SlicedSearch>;

    /// Runs up to `max_iter` search iterations.
    ///
    /// Returns the number of iterations performed and the search status:
    /// `InProgress` while work remains, a success status once done, or a
    /// failure status.
    fn update_sliced_find_path(&self, search: &mut Self::SlicedSearch, max_iter: usize) -> (usize, Status);

    /// Extracts the path of a finished search
    fn finalize_sliced_find_path(&self, search: &mut Self::SlicedSearch, max_path: usize) -> QueryResult<PathResult>;

    /// Extracts the path toward the furthest polygon of `existing` reached by
    /// a search, used when a search was stopped early.
    fn finalize_sliced_find_path_partial(
        &self,
        search: &mut Self::SlicedSearch,
        existing: &[PolyRef],
        max_path: usize,
    ) -> QueryResult<PathResult>;

    /// Full path search, driving the sliced search to completion
    fn find_path(
        &self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_path: usize,
    ) -> QueryResult<PathResult> {
        let mut search = self.init_sliced_find_path(start_ref, end_ref, start_pos, end_pos, filter)?;
        let (_, status) = self.update_sliced_find_path(&mut search, usize::MAX);
        if status.is_failure() {
            return Err(status);
        }
        self.finalize_sliced_find_path(&mut search, max_path)
    }

    /// Straightens a polygon path into line-of-sight vertices
    fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
    ) -> QueryResult<Vec<StraightPathPoint>>;

    /// Moves from `start_pos` toward `end_pos` while staying on the surface
    fn move_along_surface(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_visited: usize,
    ) -> QueryResult<MoveAlongSurfaceResult>;

    /// Casts a walkability ray along the surface
    fn raycast(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_path: usize,
    ) -> QueryResult<RaycastHit>;

    /// Polygons connected to `start_ref` whose shared edges lie within
    /// `radius` of `center`
    fn find_local_neighbourhood(
        &self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &QueryFilter,
        max_result: usize,
    ) -> QueryResult<Vec<PolyRef>>;

    /// Edges of a polygon that do not lead to a passable neighbour
    fn get_poly_wall_segments(
        &self,
        poly_ref: PolyRef,
        filter: &QueryFilter,
        max_segments: usize,
    ) -> QueryResult<Vec<WallSegment>>;

    /// Start and end points of an off-mesh connection entered from `prev_ref`
    fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> QueryResult<([f32; 3], [f32; 3])>;
}
