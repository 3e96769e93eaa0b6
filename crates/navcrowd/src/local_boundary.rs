//! Cached wall segments around an agent
//!
//! The boundary collects the walls of the polygons near an agent and keeps
//! the closest ones, which the avoidance solver treats as static obstacles.

use navcrowd_common::{dist_pt_seg_sqr_2d, sqr};
use navcrowd_query::{NavMeshQuery, PolyRef, QueryFilter};

pub const MAX_LOCAL_SEGS: usize = 8;
const MAX_LOCAL_POLYS: usize = 16;
const MAX_SEGS_PER_POLY: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    /// Segment start/end (start_x, start_y, start_z, end_x, end_y, end_z)
    s: [f32; 6],
    /// Squared distance for pruning
    d: f32,
}

#[derive(Debug, Clone)]
pub struct LocalBoundary {
    center: [f32; 3],
    segs: Vec<Segment>,
    polys: Vec<PolyRef>,
}

impl LocalBoundary {
    pub fn new() -> Self {
        Self {
            center: [f32::MAX; 3],
            segs: Vec::with_capacity(MAX_LOCAL_SEGS),
            polys: Vec::with_capacity(MAX_LOCAL_POLYS),
        }
    }

    pub fn reset(&mut self) {
        self.center = [f32::MAX; 3];
        self.segs.clear();
        self.polys.clear();
    }

    /// Recollects the walls within `collision_query_range` of `pos`
    pub fn update<Q: NavMeshQuery>(
        &mut self,
        poly_ref: PolyRef,
        pos: &[f32; 3],
        collision_query_range: f32,
        navquery: &Q,
        filter: &QueryFilter,
    ) {
        if !poly_ref.is_valid() {
            self.reset();
            return;
        }

        self.center = *pos;
        self.segs.clear();

        // First query non-overlapping polygons
        self.polys = navquery
            .find_local_neighbourhood(poly_ref, pos, collision_query_range, filter, MAX_LOCAL_POLYS)
            .unwrap_or_default();

        // Secondly, store all polygon edges
        let range_sqr = sqr(collision_query_range);
        for i in 0..self.polys.len() {
            let Ok(walls) = navquery.get_poly_wall_segments(self.polys[i], filter, MAX_SEGS_PER_POLY) else {
                continue;
            };
            for wall in walls {
                let (dist_sqr, _) = dist_pt_seg_sqr_2d(pos, &wall.start, &wall.end);
                if dist_sqr > range_sqr {
                    continue;
                }
                let s = [
                    wall.start[0],
                    wall.start[1],
                    wall.start[2],
                    wall.end[0],
                    wall.end[1],
                    wall.end[2],
                ];
                self.add_segment(dist_sqr, s);
            }
        }
    }

    /// Checks that every cached polygon still passes `filter`
    pub fn is_valid<Q: NavMeshQuery>(&self, navquery: &Q, filter: &QueryFilter) -> bool {
        if self.polys.is_empty() {
            return false;
        }
        self.polys.iter().all(|&p| navquery.is_valid_poly_ref(p, filter))
    }

    /// Position the boundary was last collected at
    pub fn get_center(&self) -> &[f32; 3] {
        &self.center
    }

    pub fn get_segment_count(&self) -> usize {
        self.segs.len()
    }

    pub fn get_segment(&self, i: usize) -> Option<&[f32; 6]> {
        self.segs.get(i).map(|seg| &seg.s)
    }

    fn add_segment(&mut self, dist: f32, s: [f32; 6]) {
        // Insert in sorted order, closest first
        let idx = self.segs.partition_point(|seg| seg.d <= dist);
        if idx >= MAX_LOCAL_SEGS {
            return;
        }
        self.segs.insert(idx, Segment { s, d: dist });
        self.segs.truncate(MAX_LOCAL_SEGS);
    }
}

impl Default for LocalBoundary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;

    #[test]
    fn test_collects_nearby_walls() {
        let mesh = open_grid(3, 3);
        let filter = QueryFilter::default();
        let mut boundary = LocalBoundary::new();

        // Close to the lower left corner
        let pos = [0.2, 0.0, 0.3];
        boundary.update(cell_ref(&mesh, 0, 0), &pos, 0.6, &mesh, &filter);
        assert_eq!(boundary.get_center(), &pos);
        assert!(boundary.is_valid(&mesh, &filter));

        // Left wall at 0.2 and bottom wall at 0.3
        assert_eq!(boundary.get_segment_count(), 2);
        let first = boundary.get_segment(0).unwrap();
        assert_eq!(first[0], 0.0);
        assert_eq!(first[3], 0.0);
        assert!(boundary.get_segment(2).is_none());
    }

    #[test]
    fn test_open_space_has_no_walls() {
        let mesh = open_grid(5, 5);
        let filter = QueryFilter::default();
        let mut boundary = LocalBoundary::new();
        boundary.update(cell_ref(&mesh, 2, 2), &[2.5, 0.0, 2.5], 1.0, &mesh, &filter);
        assert_eq!(boundary.get_segment_count(), 0);
    }

    #[test]
    fn test_keeps_closest_segments() {
        let mut boundary = LocalBoundary::new();
        for i in 0..12 {
            let d = (12 - i) as f32;
            boundary.add_segment(d, [d, 0.0, 0.0, d, 0.0, 1.0]);
        }
        assert_eq!(boundary.get_segment_count(), MAX_LOCAL_SEGS);
        assert_eq!(boundary.get_segment(0).unwrap()[0], 1.0);
        assert_eq!(boundary.get_segment(MAX_LOCAL_SEGS - 1).unwrap()[0], 8.0);
    }

    #[test]
    fn test_invalidated_by_flag_change() {
        let mut mesh = open_grid(3, 1);
        let filter = QueryFilter::default();
        let mut boundary = LocalBoundary::new();
        boundary.update(cell_ref(&mesh, 1, 0), &[1.5, 0.0, 0.5], 1.0, &mesh, &filter);
        assert!(boundary.is_valid(&mesh, &filter));

        mesh.set_poly_flags(cell_ref(&mesh, 2, 0), 0).unwrap();
        assert!(!boundary.is_valid(&mesh, &filter));

        boundary.reset();
        assert!(!boundary.is_valid(&mesh, &filter));
        assert_eq!(boundary.get_segment_count(), 0);
    }
}
