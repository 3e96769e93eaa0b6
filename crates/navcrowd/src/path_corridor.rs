//! Path corridor
//!
//! A corridor is the sequence of polygons an agent currently claims, from the
//! polygon containing its position to the polygon containing its target.
//! Movement happens through the corridor so the position stays on the mesh,
//! and the polygon sequence is patched locally as the agent or target moves.
//!
//! Operations never fail: when the mesh refuses an update the corridor keeps
//! its previous state, and the caller detects staleness through
//! [`PathCorridor::is_valid`].

use log::trace;
use navcrowd_common::{vadd, vdist_2d, vdist_2d_sqr, vscale, vsub};
use navcrowd_query::{NavMeshQuery, PolyRef, QueryFilter, StraightPathFlags, StraightPathPoint};

/// Default maximum number of polygons in a corridor
pub const MAX_PATH_POLYS: usize = 256;

/// Corners closer than this to the position are skipped
const MIN_TARGET_DIST: f32 = 0.01;

/// Polygon budget of constrained movement per call
const MAX_VISITED: usize = 16;

/// Search iterations spent by a topology optimization
const TOPOLOGY_MAX_ITER: usize = 32;

/// Maximum length of a shortcut found by an optimization
const MAX_RES: usize = 32;

/// Path corridor for smooth path following
#[derive(Debug, Clone)]
pub struct PathCorridor {
    pos: [f32; 3],
    target: [f32; 3],
    path: Vec<PolyRef>,
    max_path: usize,
}

impl Default for PathCorridor {
    fn default() -> Self {
        Self::new(MAX_PATH_POLYS)
    }
}

impl PathCorridor {
    /// Creates an empty corridor holding at most `max_path` polygons
    pub fn new(max_path: usize) -> Self {
        Self {
            pos: [0.0; 3],
            target: [0.0; 3],
            path: Vec::with_capacity(max_path.max(1)),
            max_path: max_path.max(1),
        }
    }

    /// Collapses the corridor to a single polygon at `pos`
    pub fn reset(&mut self, poly: PolyRef, pos: [f32; 3]) {
        self.pos = pos;
        self.target = pos;
        self.path.clear();
        if poly.is_valid() {
            self.path.push(poly);
        }
    }

    /// Loads a new path and target.
    ///
    /// When the current first polygon appears in `path`, everything before it
    /// is dropped and the position is kept. Otherwise the position is snapped
    /// onto the new first polygon.
    pub fn set_corridor<Q: NavMeshQuery>(&mut self, target: &[f32; 3], path: &[PolyRef], navquery: &Q) {
        if path.is_empty() {
            return;
        }

        let start = self
            .path
            .first()
            .and_then(|first| path.iter().position(|p| p == first));

        self.path.clear();
        match start {
            Some(i) => self.path.extend_from_slice(&path[i..]),
            None => {
                self.path.extend_from_slice(path);
                if let Ok((pos, _)) = navquery.closest_point_on_poly(path[0], &self.pos) {
                    self.pos = pos;
                }
            }
        }
        self.path.truncate(self.max_path);
        self.target = *target;
    }

    /// Straightened path corners from the position toward the target.
    ///
    /// Corners too close to the position are dropped, and the list ends at the
    /// first off-mesh connection.
    pub fn find_corners<Q: NavMeshQuery>(&self, max_corners: usize, navquery: &Q) -> Vec<StraightPathPoint> {
        if self.path.is_empty() || max_corners == 0 {
            return Vec::new();
        }

        let Ok(mut corners) = navquery.find_straight_path(&self.pos, &self.target, &self.path, max_corners) else {
            return Vec::new();
        };

        // Prune points in the beginning of the path which are too close
        let skip = corners
            .iter()
            .take_while(|c| {
                c.flags & StraightPathFlags::OFFMESH_CONNECTION == 0
                    && vdist_2d_sqr(&c.pos, &self.pos) <= MIN_TARGET_DIST * MIN_TARGET_DIST
            })
            .count();
        corners.drain(..skip);

        // Prune points after an off-mesh connection
        if let Some(i) = corners
            .iter()
            .position(|c| c.flags & StraightPathFlags::OFFMESH_CONNECTION != 0)
        {
            corners.truncate(i + 1);
        }

        corners
    }

    /// Shortcuts the corridor toward `next` when it is visible.
    ///
    /// A ray is cast from the position toward `next`, lengthened to
    /// `path_optimization_range`. If it travels unobstructed the polygons it
    /// crossed replace the head of the corridor.
    pub fn optimize_path_visibility<Q: NavMeshQuery>(
        &mut self,
        next: &[f32; 3],
        path_optimization_range: f32,
        navquery: &Q,
        filter: &QueryFilter,
    ) {
        if self.path.is_empty() {
            return;
        }

        let dist = vdist_2d(&self.pos, next);
        // If too close to the goal, do not try to optimize
        if dist < 0.01 {
            return;
        }

        // Overshoot a little
        let dist = (dist + 0.01).min(path_optimization_range);
        let delta = vsub(next, &self.pos);
        let goal = vadd(&self.pos, &vscale(&delta, path_optimization_range / dist));

        let Ok(hit) = navquery.raycast(self.path[0], &self.pos, &goal, filter, MAX_RES) else {
            return;
        };
        if hit.path.len() > 1 && hit.t > 0.99 {
            merge_corridor_start_shortcut(&mut self.path, self.max_path, &hit.path);
        }
    }

    /// Runs a short local search toward the target and splices the result in
    /// when it improves the corridor head. Returns true when a search result
    /// was merged.
    pub fn optimize_path_topology<Q: NavMeshQuery>(&mut self, navquery: &Q, filter: &QueryFilter) -> bool {
        if self.path.len() < 3 {
            return false;
        }

        let last = self.path[self.path.len() - 1];
        let Ok(mut search) = navquery.init_sliced_find_path(self.path[0], last, &self.pos, &self.target, filter)
        else {
            return false;
        };
        navquery.update_sliced_find_path(&mut search, TOPOLOGY_MAX_ITER);
        let Ok(result) = navquery.finalize_sliced_find_path_partial(&mut search, &self.path, MAX_RES) else {
            return false;
        };

        if result.path.is_empty() {
            return false;
        }
        merge_corridor_start_shortcut(&mut self.path, self.max_path, &result.path);
        true
    }

    /// Advances the corridor over the off-mesh connection `offmesh_con_ref`.
    ///
    /// Returns the polygon before the connection, the connection itself, and
    /// the connection end points in travel direction. The position jumps to
    /// the end point and the corridor continues from the polygon after the
    /// connection.
    pub fn move_over_offmesh_connection<Q: NavMeshQuery>(
        &mut self,
        offmesh_con_ref: PolyRef,
        navquery: &Q,
    ) -> Option<([PolyRef; 2], [f32; 3], [f32; 3])> {
        let k = self.path.iter().position(|&p| p == offmesh_con_ref)?;
        if k == 0 || k + 1 >= self.path.len() {
            return None;
        }

        let refs = [self.path[k - 1], offmesh_con_ref];
        let (start, end) = navquery
            .get_off_mesh_connection_poly_end_points(refs[0], refs[1])
            .ok()?;

        self.path.drain(..=k);
        self.pos = end;
        Some((refs, start, end))
    }

    /// Moves the position to `safe_pos` inside `safe_ref`, collapsing the
    /// corridor to that polygon. The target is kept so the owner can replan.
    pub fn fix_path_start(&mut self, safe_ref: PolyRef, safe_pos: &[f32; 3]) {
        self.pos = *safe_pos;
        self.path.clear();
        self.path.push(safe_ref);
    }

    /// Cuts the corridor at the first polygon that is no longer valid for
    /// `filter`, and clamps the target onto the new last polygon. Returns
    /// true when something was trimmed.
    pub fn trim_invalid_path<Q: NavMeshQuery>(
        &mut self,
        safe_ref: PolyRef,
        safe_pos: &[f32; 3],
        navquery: &Q,
        filter: &QueryFilter,
    ) -> bool {
        let n = self
            .path
            .iter()
            .take_while(|&&p| navquery.is_valid_poly_ref(p, filter))
            .count();

        if n == self.path.len() {
            return false;
        }

        if n == 0 {
            // The first polygon is invalid, fall back to the safe location
            self.pos = *safe_pos;
            self.path.clear();
            self.path.push(safe_ref);
        } else {
            self.path.truncate(n);
        }

        // Clamp target pos to the last polygon
        let last = self.path[self.path.len() - 1];
        if let Ok(target) = navquery.closest_point_on_poly_boundary(last, &self.target) {
            self.target = target;
        }
        trace!("Corridor trimmed to {} polys", self.path.len());
        true
    }

    /// Checks the first `max_look_ahead` polygons against `filter`
    pub fn is_valid<Q: NavMeshQuery>(&self, max_look_ahead: usize, navquery: &Q, filter: &QueryFilter) -> bool {
        self.path
            .iter()
            .take(max_look_ahead)
            .all(|&p| navquery.is_valid_poly_ref(p, filter))
    }

    /// Moves the position toward `npos` along the mesh surface.
    ///
    /// Returns false when the mesh refused the move; the corridor is then
    /// unchanged.
    pub fn move_position<Q: NavMeshQuery>(&mut self, npos: &[f32; 3], navquery: &Q, filter: &QueryFilter) -> bool {
        if self.path.is_empty() {
            return false;
        }

        let Ok(result) = navquery.move_along_surface(self.path[0], &self.pos, npos, filter, MAX_VISITED) else {
            return false;
        };
        merge_corridor_start_moved(&mut self.path, self.max_path, &result.visited);

        // Adjust the position to stay on top of the navmesh
        let mut pos = result.pos;
        if let Ok(h) = navquery.get_poly_height(self.path[0], &pos) {
            pos[1] = h;
        }
        self.pos = pos;
        true
    }

    /// Moves the target toward `npos` along the mesh surface
    pub fn move_target_position<Q: NavMeshQuery>(
        &mut self,
        npos: &[f32; 3],
        navquery: &Q,
        filter: &QueryFilter,
    ) -> bool {
        let Some(&last) = self.path.last() else {
            return false;
        };

        let Ok(result) = navquery.move_along_surface(last, &self.target, npos, filter, MAX_VISITED) else {
            return false;
        };
        merge_corridor_end_moved(&mut self.path, self.max_path, &result.visited);
        self.target = result.pos;
        true
    }

    pub fn get_pos(&self) -> [f32; 3] {
        self.pos
    }

    pub fn get_target(&self) -> [f32; 3] {
        self.target
    }

    pub fn get_path(&self) -> &[PolyRef] {
        &self.path
    }

    pub fn get_path_count(&self) -> usize {
        self.path.len()
    }

    pub fn get_max_path(&self) -> usize {
        self.max_path
    }

    /// Gets the first polygon in the corridor
    pub fn get_first_poly(&self) -> PolyRef {
        self.path.first().copied().unwrap_or(PolyRef::NULL)
    }

    /// Gets the last polygon in the corridor
    pub fn get_last_poly(&self) -> PolyRef {
        self.path.last().copied().unwrap_or(PolyRef::NULL)
    }
}

/// Finds the first path index, in `order`, that also appears in `visited`,
/// paired with its earliest position in `visited`
fn find_common(
    order: impl Iterator<Item = usize>,
    path: &[PolyRef],
    visited: &[PolyRef],
) -> Option<(usize, usize)> {
    order
        .into_iter()
        .find_map(|i| visited.iter().position(|v| *v == path[i]).map(|j| (i, j)))
}

/// Merges the polygons visited while moving the start of a corridor.
///
/// `visited` runs from the old start polygon to the polygon containing the
/// new position. The corridor is rewritten to begin at that last polygon and
/// rejoins the old corridor at the furthest polygon both share.
pub fn merge_corridor_start_moved(path: &mut Vec<PolyRef>, max_path: usize, visited: &[PolyRef]) {
    let Some((fp, fv)) = find_common((0..path.len()).rev(), path, visited) else {
        return;
    };

    let mut merged: Vec<PolyRef> = visited[fv..].iter().rev().copied().collect();
    merged.extend_from_slice(&path[fp + 1..]);
    merged.truncate(max_path);
    *path = merged;
}

/// Merges the polygons visited while moving the end of a corridor.
///
/// The corridor is cut at the first polygon shared with `visited`, and the
/// visited polygons past that point are appended.
pub fn merge_corridor_end_moved(path: &mut Vec<PolyRef>, max_path: usize, visited: &[PolyRef]) {
    let Some((fp, fv)) = find_common(0..path.len(), path, visited) else {
        return;
    };

    path.truncate(fp + 1);
    path.extend_from_slice(&visited[fv + 1..]);
    path.truncate(max_path);
}

/// Merges a shortcut found from the start of a corridor.
///
/// `visited` starts at the corridor's first polygon. It replaces the corridor
/// up to the furthest polygon both share.
pub fn merge_corridor_start_shortcut(path: &mut Vec<PolyRef>, max_path: usize, visited: &[PolyRef]) {
    let Some((fp, fv)) = find_common((0..path.len()).rev(), path, visited) else {
        return;
    };

    // Nothing to gain when the shortcut joins at its own start
    if fv == 0 {
        return;
    }

    let mut merged: Vec<PolyRef> = visited[..fv].to_vec();
    merged.extend_from_slice(&path[fp..]);
    merged.truncate(max_path);
    *path = merged;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;
    use approx::assert_relative_eq;
    use navcrowd_query::PolyMesh;

    fn refs(ids: &[u32]) -> Vec<PolyRef> {
        ids.iter().map(|&i| PolyRef::new(i)).collect()
    }

    #[test]
    fn test_reset_corridor() {
        let mut corridor = PathCorridor::new(16);
        corridor.reset(PolyRef::new(42), [10.0, 5.0, 10.0]);

        assert_eq!(corridor.get_pos(), [10.0, 5.0, 10.0]);
        assert_eq!(corridor.get_target(), [10.0, 5.0, 10.0]);
        assert_eq!(corridor.get_path(), &[PolyRef::new(42)]);
        assert_eq!(corridor.get_first_poly(), corridor.get_last_poly());

        corridor.reset(PolyRef::NULL, [0.0; 3]);
        assert_eq!(corridor.get_path_count(), 0);
        assert_eq!(corridor.get_first_poly(), PolyRef::NULL);
    }

    #[test]
    fn test_merge_start_moved_forward() {
        let mut path = refs(&[1, 2, 3, 4]);
        merge_corridor_start_moved(&mut path, 256, &refs(&[1, 2, 3]));
        assert_eq!(path, refs(&[3, 4]));
    }

    #[test]
    fn test_merge_start_moved_backward() {
        let mut path = refs(&[2, 3, 4]);
        merge_corridor_start_moved(&mut path, 256, &refs(&[2, 1]));
        assert_eq!(path, refs(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_merge_start_moved_respects_capacity() {
        let mut path = refs(&[2, 3, 4]);
        merge_corridor_start_moved(&mut path, 3, &refs(&[2, 1]));
        assert_eq!(path, refs(&[1, 2, 3]));
    }

    #[test]
    fn test_merge_without_common_poly_is_noop() {
        let mut path = refs(&[1, 2]);
        merge_corridor_start_moved(&mut path, 256, &refs(&[7, 8]));
        merge_corridor_end_moved(&mut path, 256, &refs(&[7, 8]));
        merge_corridor_start_shortcut(&mut path, 256, &refs(&[7, 8]));
        assert_eq!(path, refs(&[1, 2]));
    }

    #[test]
    fn test_merge_end_moved() {
        let mut path = refs(&[1, 2, 3]);
        merge_corridor_end_moved(&mut path, 256, &refs(&[3, 4, 5]));
        assert_eq!(path, refs(&[1, 2, 3, 4, 5]));

        // Target moved back into the corridor
        let mut path = refs(&[1, 2, 3, 4]);
        merge_corridor_end_moved(&mut path, 256, &refs(&[4, 3, 2]));
        assert_eq!(path, refs(&[1, 2]));
    }

    #[test]
    fn test_merge_start_shortcut() {
        let mut path = refs(&[1, 2, 3, 4, 5, 6]);
        merge_corridor_start_shortcut(&mut path, 256, &refs(&[1, 9, 5]));
        assert_eq!(path, refs(&[1, 9, 5, 6]));

        // Shortcut that only touches the start changes nothing
        let mut path = refs(&[1, 2, 3]);
        merge_corridor_start_shortcut(&mut path, 256, &refs(&[1, 8]));
        assert_eq!(path, refs(&[1, 2, 3]));
    }

    fn straight_corridor(mesh: &PolyMesh, cols: usize) -> PathCorridor {
        let mut corridor = PathCorridor::new(256);
        corridor.reset(cell_ref(mesh, 0, 0), [0.5, 0.0, 0.5]);
        let path: Vec<PolyRef> = (0..cols).map(|c| cell_ref(mesh, c, 0)).collect();
        corridor.set_corridor(&[cols as f32 - 0.5, 0.0, 0.5], &path, mesh);
        corridor
    }

    #[test]
    fn test_set_corridor_keeps_position() {
        let mesh = open_grid(4, 1);
        let mut corridor = straight_corridor(&mesh, 4);
        assert_eq!(corridor.get_pos(), [0.5, 0.0, 0.5]);
        assert_eq!(corridor.get_path_count(), 4);

        // New path that starts behind the current polygon drops the prefix
        corridor.move_position(&[1.5, 0.0, 0.5], &mesh, &QueryFilter::default());
        let path: Vec<PolyRef> = (0..4).map(|c| cell_ref(&mesh, c, 0)).collect();
        corridor.set_corridor(&[3.5, 0.0, 0.5], &path, &mesh);
        assert_eq!(corridor.get_first_poly(), cell_ref(&mesh, 1, 0));
        assert_eq!(corridor.get_pos(), [1.5, 0.0, 0.5]);
    }

    #[test]
    fn test_set_corridor_snaps_to_new_start() {
        let mesh = open_grid(4, 1);
        let mut corridor = PathCorridor::new(256);
        corridor.reset(cell_ref(&mesh, 0, 0), [0.5, 0.0, 0.5]);
        corridor.set_corridor(&[3.5, 0.0, 0.5], &[cell_ref(&mesh, 2, 0), cell_ref(&mesh, 3, 0)], &mesh);
        assert_eq!(corridor.get_first_poly(), cell_ref(&mesh, 2, 0));
        assert_relative_eq!(corridor.get_pos()[0], 2.0);
    }

    #[test]
    fn test_find_corners_open_field() {
        let mesh = open_grid(5, 1);
        let corridor = straight_corridor(&mesh, 5);
        let corners = corridor.find_corners(4, &mesh);
        // The start point is pruned, only the end remains
        assert_eq!(corners.len(), 1);
        assert_eq!(corners[0].flags, StraightPathFlags::END);
        assert_relative_eq!(corners[0].pos[0], 4.5);
    }

    #[test]
    fn test_find_corners_around_corner() {
        let mesh = PolyMesh::grid(2, 2, 1.0, [0.0; 3], |c, r| !(c == 0 && r == 1)).unwrap();
        let mut corridor = PathCorridor::new(256);
        corridor.reset(cell_ref(&mesh, 0, 0), [0.5, 0.0, 0.5]);
        let path = [cell_ref(&mesh, 0, 0), cell_ref(&mesh, 1, 0), cell_ref(&mesh, 1, 1)];
        corridor.set_corridor(&[1.5, 0.0, 1.5], &path, &mesh);

        let corners = corridor.find_corners(4, &mesh);
        assert_eq!(corners.len(), 2);
        assert_relative_eq!(corners[0].pos[0], 1.0);
        assert_relative_eq!(corners[0].pos[2], 1.0);
        // Every corner lies within the corridor's polygons
        for c in &corners {
            assert!(c.pos[0] >= 0.0 && c.pos[0] <= 2.0 && c.pos[2] >= 0.0 && c.pos[2] <= 2.0);
        }
    }

    #[test]
    fn test_find_corners_stops_at_offmesh() {
        let (mesh, con) = islands_with_jump(2);
        let mut corridor = PathCorridor::new(256);
        corridor.reset(cell_ref(&mesh, 0, 0), [0.5, 0.0, 0.5]);
        let path = [
            cell_ref(&mesh, 0, 0),
            cell_ref(&mesh, 1, 0),
            con,
            cell_ref(&mesh, 3, 0),
            cell_ref(&mesh, 4, 0),
        ];
        corridor.set_corridor(&[4.5, 0.0, 0.5], &path, &mesh);

        let corners = corridor.find_corners(4, &mesh);
        let last = corners.last().unwrap();
        assert_ne!(last.flags & StraightPathFlags::OFFMESH_CONNECTION, 0);
        assert_eq!(last.poly, con);

        let (refs, start, end) = corridor.move_over_offmesh_connection(con, &mesh).unwrap();
        assert_eq!(refs, [cell_ref(&mesh, 1, 0), con]);
        assert_relative_eq!(start[0], 1.8);
        assert_relative_eq!(end[0], 3.2);
        assert_eq!(corridor.get_first_poly(), cell_ref(&mesh, 3, 0));
        assert_eq!(corridor.get_pos(), end);

        assert!(corridor.move_over_offmesh_connection(con, &mesh).is_none());
    }

    #[test]
    fn test_move_position_follows_corridor() {
        let mesh = open_grid(5, 1);
        let filter = QueryFilter::default();
        let mut corridor = straight_corridor(&mesh, 5);

        assert!(corridor.move_position(&[2.3, 0.0, 0.5], &mesh, &filter));
        assert_eq!(corridor.get_first_poly(), cell_ref(&mesh, 2, 0));
        assert_eq!(corridor.get_path_count(), 3);
        assert_relative_eq!(corridor.get_pos()[0], 2.3);
    }

    #[test]
    fn test_move_position_clamps_at_wall() {
        let mesh = open_grid(5, 1);
        let filter = QueryFilter::default();
        let mut corridor = straight_corridor(&mesh, 5);

        corridor.move_position(&[0.5, 0.0, -2.0], &mesh, &filter);
        assert_relative_eq!(corridor.get_pos()[2], 0.0);
        assert_eq!(corridor.get_first_poly(), cell_ref(&mesh, 0, 0));
    }

    #[test]
    fn test_move_target_position() {
        let mesh = open_grid(6, 1);
        let filter = QueryFilter::default();
        let mut corridor = straight_corridor(&mesh, 4);

        assert!(corridor.move_target_position(&[5.5, 0.0, 0.5], &mesh, &filter));
        assert_eq!(corridor.get_last_poly(), cell_ref(&mesh, 5, 0));
        assert_eq!(corridor.get_path_count(), 6);
        assert_relative_eq!(corridor.get_target()[0], 5.5);
    }

    #[test]
    fn test_visibility_shortcut() {
        // Roundabout path through the row above while the direct row is open
        let mesh = open_grid(4, 2);
        let filter = QueryFilter::default();
        let mut corridor = PathCorridor::new(256);
        corridor.reset(cell_ref(&mesh, 0, 0), [0.5, 0.0, 0.5]);
        let path = [
            cell_ref(&mesh, 0, 0),
            cell_ref(&mesh, 0, 1),
            cell_ref(&mesh, 1, 1),
            cell_ref(&mesh, 2, 1),
            cell_ref(&mesh, 3, 1),
            cell_ref(&mesh, 3, 0),
        ];
        corridor.set_corridor(&[3.5, 0.0, 0.5], &path, &mesh);

        corridor.optimize_path_visibility(&[3.5, 0.0, 0.5], 3.2, &mesh, &filter);
        assert_eq!(
            corridor.get_path(),
            &[
                cell_ref(&mesh, 0, 0),
                cell_ref(&mesh, 1, 0),
                cell_ref(&mesh, 2, 0),
                cell_ref(&mesh, 3, 0)
            ]
        );
    }

    #[test]
    fn test_topology_optimization() {
        let mesh = open_grid(3, 2);
        let filter = QueryFilter::default();
        let mut corridor = PathCorridor::new(256);
        corridor.reset(cell_ref(&mesh, 0, 0), [0.5, 0.0, 0.5]);
        let path = [
            cell_ref(&mesh, 0, 0),
            cell_ref(&mesh, 0, 1),
            cell_ref(&mesh, 1, 1),
            cell_ref(&mesh, 2, 1),
            cell_ref(&mesh, 2, 0),
        ];
        corridor.set_corridor(&[2.5, 0.0, 0.5], &path, &mesh);

        assert!(corridor.optimize_path_topology(&mesh, &filter));
        assert_eq!(corridor.get_path_count(), 3);
        assert_eq!(corridor.get_last_poly(), cell_ref(&mesh, 2, 0));

        // Short corridors are left alone
        corridor.reset(cell_ref(&mesh, 0, 0), [0.5, 0.0, 0.5]);
        assert!(!corridor.optimize_path_topology(&mesh, &filter));
    }

    #[test]
    fn test_validity_and_trim() {
        let mut mesh = open_grid(5, 1);
        let filter = QueryFilter::default();
        let mut corridor = straight_corridor(&mesh, 5);
        assert!(corridor.is_valid(10, &mesh, &filter));

        mesh.set_poly_flags(cell_ref(&mesh, 3, 0), 0).unwrap();
        assert!(corridor.is_valid(3, &mesh, &filter));
        assert!(!corridor.is_valid(10, &mesh, &filter));

        let safe = cell_ref(&mesh, 0, 0);
        assert!(corridor.trim_invalid_path(safe, &[0.5, 0.0, 0.5], &mesh, &filter));
        assert_eq!(corridor.get_path_count(), 3);
        // Target clamped onto the remaining corridor
        assert_relative_eq!(corridor.get_target()[0], 3.0);
        assert!(!corridor.trim_invalid_path(safe, &[0.5, 0.0, 0.5], &mesh, &filter));
    }

    #[test]
    fn test_fix_path_start() {
        let mesh = open_grid(5, 1);
        let mut corridor = straight_corridor(&mesh, 5);
        let safe = cell_ref(&mesh, 1, 0);
        corridor.fix_path_start(safe, &[1.5, 0.0, 0.5]);
        assert_eq!(corridor.get_path(), &[safe]);
        assert_eq!(corridor.get_pos(), [1.5, 0.0, 0.5]);
        assert_relative_eq!(corridor.get_target()[0], 4.5);
    }
}
