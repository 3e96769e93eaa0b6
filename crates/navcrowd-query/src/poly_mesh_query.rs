//! [`NavMeshQuery`] implementation for [`PolyMesh`]

use std::collections::{HashSet, VecDeque};

use navcrowd_common::{
    closest_height_point_triangle, dist_pt_seg_sqr_2d, distance_pt_poly_edges_sqr, intersect_segment_poly_2d,
    point_in_polygon, sqr, tri_area_2d, vdist, vdist_sqr, vequal, vlerp, vsub,
};

use crate::poly_mesh::{Poly, PolyMesh};
use crate::{
    MoveAlongSurfaceResult, NavMeshQuery, PathResult, PolyRef, PolyType, QueryFilter, QueryResult, RaycastHit,
    SlicedSearch, Status, StraightPathFlags, StraightPathPoint, WallSegment,
};

/// Maximum breadth of the local searches
const MAX_STACK: usize = 48;

enum Append {
    InProgress,
    Done,
}

fn append_vertex(
    out: &mut Vec<StraightPathPoint>,
    pos: &[f32; 3],
    flags: u8,
    poly: PolyRef,
    max_points: usize,
) -> Append {
    if let Some(last) = out.last_mut() {
        if vequal(&last.pos, pos) {
            // The vertices are equal, update flags and poly
            last.flags = flags;
            last.poly = poly;
            return Append::InProgress;
        }
    }
    out.push(StraightPathPoint {
        pos: *pos,
        flags,
        poly,
    });
    if out.len() >= max_points || flags == StraightPathFlags::END {
        Append::Done
    } else {
        Append::InProgress
    }
}

impl PolyMesh {
    /// Left and right end points of the portal from `from` to `to`, with the
    /// types of both polygons.
    pub(crate) fn portal_points(
        &self,
        from: PolyRef,
        to: PolyRef,
    ) -> QueryResult<([f32; 3], [f32; 3], PolyType, PolyType)> {
        let from_poly = self.poly(from)?;
        let to_poly = self.poly(to)?;
        let to_idx = to.index().ok_or(Status::InvalidParam)?;
        let from_idx = from.index().ok_or(Status::InvalidParam)?;

        let link = from_poly
            .links
            .iter()
            .find(|l| l.poly == to_idx)
            .ok_or(Status::InvalidParam)?;

        if from_poly.poly_type == PolyType::OffMeshConnection {
            let v = from_poly.verts[link.edge as usize];
            return Ok((v, v, from_poly.poly_type, to_poly.poly_type));
        }

        if to_poly.poly_type == PolyType::OffMeshConnection {
            let back = to_poly
                .links
                .iter()
                .find(|l| l.poly == from_idx)
                .ok_or(Status::InvalidParam)?;
            let v = to_poly.verts[back.edge as usize];
            return Ok((v, v, from_poly.poly_type, to_poly.poly_type));
        }

        let n = from_poly.verts.len();
        let e = link.edge as usize;
        Ok((
            from_poly.verts[e],
            from_poly.verts[(e + 1) % n],
            from_poly.poly_type,
            to_poly.poly_type,
        ))
    }

    pub(crate) fn edge_mid_point(&self, from: PolyRef, to: PolyRef) -> QueryResult<[f32; 3]> {
        let (left, right, _, _) = self.portal_points(from, to)?;
        Ok(vlerp(&left, &right, 0.5))
    }

    pub(crate) fn nearest_ground_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> QueryResult<(PolyRef, [f32; 3])> {
        let bmin = vsub(center, half_extents);
        let bmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];

        let mut best: Option<(PolyRef, [f32; 3])> = None;
        let mut best_dist = f32::MAX;
        for (i, poly) in self.polys.iter().enumerate() {
            if poly.poly_type != PolyType::Ground || !filter.pass_filter(poly.flags) {
                continue;
            }
            let overlap = (0..3).all(|k| bmin[k] <= poly.bmax[k] && bmax[k] >= poly.bmin[k]);
            if !overlap {
                continue;
            }
            let (closest, over) = closest_point_on_ground(poly, center);
            // A point directly over a polygon only pays for the height difference
            let d = if over {
                sqr(center[1] - closest[1])
            } else {
                vdist_sqr(center, &closest)
            };
            if d < best_dist {
                best_dist = d;
                best = Some((PolyRef::from_index(i), closest));
            }
        }
        best.ok_or(Status::NotFound)
    }
}

fn ground_height(poly: &Poly, pos: &[f32; 3]) -> Option<f32> {
    let v = &poly.verts;
    (1..v.len() - 1).find_map(|i| closest_height_point_triangle(pos, &v[0], &v[i], &v[i + 1]))
}

fn closest_point_on_ground(poly: &Poly, pos: &[f32; 3]) -> ([f32; 3], bool) {
    if point_in_polygon(pos, &poly.verts) {
        let h = ground_height(poly, pos).unwrap_or(pos[1]);
        return ([pos[0], h, pos[2]], true);
    }
    let closest = closest_point_on_boundary(poly, pos);
    let h = ground_height(poly, &closest).unwrap_or(closest[1]);
    ([closest[0], h, closest[2]], false)
}

fn closest_point_on_boundary(poly: &Poly, pos: &[f32; 3]) -> [f32; 3] {
    let (_, ed, et) = distance_pt_poly_edges_sqr(pos, &poly.verts);
    let n = poly.verts.len();
    let mut imin = 0;
    for i in 1..n {
        if ed[i] < ed[imin] {
            imin = i;
        }
    }
    vlerp(&poly.verts[imin], &poly.verts[(imin + 1) % n], et[imin])
}

impl NavMeshQuery for PolyMesh {
    type SlicedSearch = SlicedSearch;

    fn is_valid_poly_ref(&self, poly_ref: PolyRef, filter: &QueryFilter) -> bool {
        self.poly(poly_ref)
            .map(|p| filter.pass_filter(p.flags))
            .unwrap_or(false)
    }

    fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> QueryResult<(PolyRef, [f32; 3])> {
        self.nearest_ground_poly(center, half_extents, filter)
    }

    fn get_poly_height(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> QueryResult<f32> {
        let poly = self.poly(poly_ref)?;
        match poly.poly_type {
            PolyType::OffMeshConnection => {
                let (v0, v1) = (&poly.verts[0], &poly.verts[1]);
                let (_, t) = dist_pt_seg_sqr_2d(pos, v0, v1);
                Ok(v0[1] + (v1[1] - v0[1]) * t)
            }
            PolyType::Ground => ground_height(poly, pos).ok_or(Status::InvalidParam),
        }
    }

    fn closest_point_on_poly(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> QueryResult<([f32; 3], bool)> {
        let poly = self.poly(poly_ref)?;
        match poly.poly_type {
            PolyType::OffMeshConnection => {
                let (v0, v1) = (&poly.verts[0], &poly.verts[1]);
                let (_, t) = dist_pt_seg_sqr_2d(pos, v0, v1);
                Ok((vlerp(v0, v1, t), false))
            }
            PolyType::Ground => Ok(closest_point_on_ground(poly, pos)),
        }
    }

    fn closest_point_on_poly_boundary(&self, poly_ref: PolyRef, pos: &[f32; 3]) -> QueryResult<[f32; 3]> {
        let poly = self.poly(poly_ref)?;
        let (inside, _, _) = distance_pt_poly_edges_sqr(pos, &poly.verts);
        if inside && poly.poly_type == PolyType::Ground {
            Ok(*pos)
        } else {
            Ok(closest_point_on_boundary(poly, pos))
        }
    }

    fn init_sliced_find_path(
        &self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> QueryResult<SlicedSearch> {
        SlicedSearch::new(self, start_ref, end_ref, start_pos, end_pos, filter)
    }

    fn update_sliced_find_path(&self, search: &mut SlicedSearch, max_iter: usize) -> (usize, Status) {
        search.update(self, max_iter)
    }

    fn finalize_sliced_find_path(&self, search: &mut SlicedSearch, max_path: usize) -> QueryResult<PathResult> {
        search.finalize(max_path)
    }

    fn finalize_sliced_find_path_partial(
        &self,
        search: &mut SlicedSearch,
        existing: &[PolyRef],
        max_path: usize,
    ) -> QueryResult<PathResult> {
        search.finalize_partial(existing, max_path)
    }

    fn find_straight_path(
        &self,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        path: &[PolyRef],
        max_points: usize,
    ) -> QueryResult<Vec<StraightPathPoint>> {
        if path.is_empty() || max_points == 0 {
            return Err(Status::InvalidParam);
        }
        let n = path.len();
        let closest_start = self.closest_point_on_poly_boundary(path[0], start_pos)?;
        let closest_end = self.closest_point_on_poly_boundary(path[n - 1], end_pos)?;

        let mut out = Vec::with_capacity(max_points.min(n + 1));
        if let Append::Done = append_vertex(&mut out, &closest_start, StraightPathFlags::START, path[0], max_points) {
            return Ok(out);
        }

        if n > 1 {
            let mut apex = closest_start;
            let mut left = apex;
            let mut right = apex;
            let mut apex_index = 0;
            let mut left_index = 0;
            let mut right_index = 0;
            let mut left_type = PolyType::Ground;
            let mut right_type = PolyType::Ground;
            let mut left_ref = path[0];
            let mut right_ref = path[0];

            let mut i = 0;
            while i < n {
                let (pl, pr, to_type) = if i + 1 < n {
                    match self.portal_points(path[i], path[i + 1]) {
                        Ok((pl, pr, _, to_type)) => {
                            // Starting really close to the first portal, advance
                            if i == 0 {
                                let (d, _) = dist_pt_seg_sqr_2d(&apex, &pl, &pr);
                                if d < sqr(0.001) {
                                    i += 1;
                                    continue;
                                }
                            }
                            (pl, pr, to_type)
                        }
                        Err(_) => {
                            // path[i + 1] is not connected, clamp the end to path[i]
                            let end = self.closest_point_on_poly_boundary(path[i], end_pos)?;
                            append_vertex(&mut out, &end, 0, path[i], max_points);
                            return Ok(out);
                        }
                    }
                } else {
                    (closest_end, closest_end, PolyType::Ground)
                };
                let next_ref = if i + 1 < n { path[i + 1] } else { PolyRef::NULL };

                // Right vertex
                if tri_area_2d(&apex, &right, &pr) <= 0.0 {
                    if vequal(&apex, &right) || tri_area_2d(&apex, &left, &pr) > 0.0 {
                        right = pr;
                        right_ref = next_ref;
                        right_type = to_type;
                        right_index = i;
                    } else {
                        // Right over left, the left point becomes a corner
                        apex = left;
                        apex_index = left_index;
                        let flags = corner_flags(left_ref, left_type);
                        if let Append::Done = append_vertex(&mut out, &apex, flags, left_ref, max_points) {
                            return Ok(out);
                        }
                        left = apex;
                        right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                // Left vertex
                if tri_area_2d(&apex, &left, &pl) >= 0.0 {
                    if vequal(&apex, &left) || tri_area_2d(&apex, &right, &pl) < 0.0 {
                        left = pl;
                        left_ref = next_ref;
                        left_type = to_type;
                        left_index = i;
                    } else {
                        // Left over right, the right point becomes a corner
                        apex = right;
                        apex_index = right_index;
                        let flags = corner_flags(right_ref, right_type);
                        if let Append::Done = append_vertex(&mut out, &apex, flags, right_ref, max_points) {
                            return Ok(out);
                        }
                        left = apex;
                        right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }
        }

        append_vertex(&mut out, &closest_end, StraightPathFlags::END, PolyRef::NULL, max_points);
        Ok(out)
    }

    fn move_along_surface(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_visited: usize,
    ) -> QueryResult<MoveAlongSurfaceResult> {
        if !self.is_valid_poly_ref(start_ref, filter) {
            return Err(Status::InvalidParam);
        }

        // (polygon, parent node)
        let mut nodes: Vec<(PolyRef, Option<usize>)> = vec![(start_ref, None)];
        let mut seen: HashSet<PolyRef> = HashSet::from([start_ref]);
        let mut stack: VecDeque<usize> = VecDeque::from([0]);

        let mut best_pos = *start_pos;
        let mut best_dist = f32::MAX;
        let mut best_node = 0;

        // Search constraint
        let search_pos = vlerp(start_pos, end_pos, 0.5);
        let search_rad_sqr = sqr(vdist(start_pos, end_pos) / 2.0 + 0.001);

        while let Some(cur) = stack.pop_front() {
            let poly = self.poly(nodes[cur].0)?;
            let verts = &poly.verts;

            // If target is inside the poly, stop search
            if point_in_polygon(end_pos, verts) {
                best_node = cur;
                best_pos = *end_pos;
                break;
            }

            let nv = verts.len();
            let mut j = nv - 1;
            for i in 0..nv {
                let neis: Vec<usize> = poly
                    .links_through(j)
                    .filter(|l| self.polys.get(l.poly).is_some_and(|p| filter.pass_filter(p.flags)))
                    .map(|l| l.poly)
                    .collect();

                if neis.is_empty() {
                    // Wall edge, track the closest point on it
                    let (d, t) = dist_pt_seg_sqr_2d(end_pos, &verts[j], &verts[i]);
                    if d < best_dist {
                        best_pos = vlerp(&verts[j], &verts[i], t);
                        best_dist = d;
                        best_node = cur;
                    }
                } else {
                    for nei in neis {
                        let nei_ref = PolyRef::from_index(nei);
                        if seen.contains(&nei_ref) {
                            continue;
                        }
                        // Skip the link if it is too far from the search constraint
                        let (d, _) = dist_pt_seg_sqr_2d(&search_pos, &verts[j], &verts[i]);
                        if d > search_rad_sqr {
                            continue;
                        }
                        seen.insert(nei_ref);
                        nodes.push((nei_ref, Some(cur)));
                        if stack.len() < MAX_STACK {
                            stack.push_back(nodes.len() - 1);
                        }
                    }
                }
                j = i;
            }
        }

        let mut visited = Vec::new();
        let mut cur = Some(best_node);
        while let Some(i) = cur {
            visited.push(nodes[i].0);
            cur = nodes[i].1;
        }
        visited.reverse();
        visited.truncate(max_visited.max(1));

        Ok(MoveAlongSurfaceResult {
            pos: best_pos,
            visited,
        })
    }

    fn raycast(
        &self,
        start_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
        max_path: usize,
    ) -> QueryResult<RaycastHit> {
        if !self.is_valid_poly_ref(start_ref, filter) {
            return Err(Status::InvalidParam);
        }

        let mut hit = RaycastHit {
            t: 0.0,
            hit_normal: [0.0; 3],
            hit_edge_index: None,
            path: Vec::new(),
        };

        let mut cur = start_ref;
        loop {
            let poly = self.poly(cur)?;
            let Some(clip) = intersect_segment_poly_2d(start_pos, end_pos, &poly.verts) else {
                // Could be a polygon with no area
                return Ok(hit);
            };
            hit.hit_edge_index = clip.seg_max;
            if clip.tmax > hit.t {
                hit.t = clip.tmax;
            }

            if hit.path.len() >= max_path {
                return Ok(hit);
            }
            hit.path.push(cur);

            // Ray end is completely inside the polygon
            let Some(seg_max) = clip.seg_max else {
                hit.t = f32::MAX;
                return Ok(hit);
            };

            let next = poly
                .links_through(seg_max)
                .map(|l| l.poly)
                .find(|&i| {
                    self.polys
                        .get(i)
                        .is_some_and(|p| p.poly_type == PolyType::Ground && filter.pass_filter(p.flags))
                });

            match next {
                Some(i) => cur = PolyRef::from_index(i),
                None => {
                    // No neighbour, we hit a wall
                    let nv = poly.verts.len();
                    let va = &poly.verts[seg_max];
                    let vb = &poly.verts[(seg_max + 1) % nv];
                    let dx = vb[0] - va[0];
                    let dz = vb[2] - va[2];
                    let len = (dx * dx + dz * dz).sqrt();
                    if len > 0.0 {
                        hit.hit_normal = [dz / len, 0.0, -dx / len];
                    }
                    return Ok(hit);
                }
            }
        }
    }

    fn find_local_neighbourhood(
        &self,
        start_ref: PolyRef,
        center: &[f32; 3],
        radius: f32,
        filter: &QueryFilter,
        max_result: usize,
    ) -> QueryResult<Vec<PolyRef>> {
        if !self.is_valid_poly_ref(start_ref, filter) || max_result == 0 {
            return Err(Status::InvalidParam);
        }

        let radius_sqr = sqr(radius);
        let mut result = vec![start_ref];
        let mut seen: HashSet<PolyRef> = HashSet::from([start_ref]);
        let mut stack: VecDeque<PolyRef> = VecDeque::from([start_ref]);

        while let Some(cur) = stack.pop_front() {
            let poly = self.poly(cur)?;
            for link in &poly.links {
                let nei_ref = PolyRef::from_index(link.poly);
                let Some(nei) = self.polys.get(link.poly) else {
                    continue;
                };
                if nei.poly_type == PolyType::OffMeshConnection
                    || seen.contains(&nei_ref)
                    || !filter.pass_filter(nei.flags)
                {
                    continue;
                }
                let Ok((va, vb, _, _)) = self.portal_points(cur, nei_ref) else {
                    continue;
                };
                // Only follow edges that touch the circle
                let (d, _) = dist_pt_seg_sqr_2d(center, &va, &vb);
                if d > radius_sqr {
                    continue;
                }
                seen.insert(nei_ref);
                if result.len() < max_result {
                    result.push(nei_ref);
                }
                if stack.len() < MAX_STACK {
                    stack.push_back(nei_ref);
                }
            }
        }

        Ok(result)
    }

    fn get_poly_wall_segments(
        &self,
        poly_ref: PolyRef,
        filter: &QueryFilter,
        max_segments: usize,
    ) -> QueryResult<Vec<WallSegment>> {
        let poly = self.poly(poly_ref)?;
        if poly.poly_type == PolyType::OffMeshConnection {
            return Ok(Vec::new());
        }
        let nv = poly.verts.len();
        let mut segs = Vec::new();
        for j in 0..nv {
            let passable = poly
                .links_through(j)
                .any(|l| self.polys.get(l.poly).is_some_and(|p| filter.pass_filter(p.flags)));
            if passable {
                continue;
            }
            if segs.len() >= max_segments {
                break;
            }
            segs.push(WallSegment {
                start: poly.verts[j],
                end: poly.verts[(j + 1) % nv],
            });
        }
        Ok(segs)
    }

    fn get_off_mesh_connection_poly_end_points(
        &self,
        prev_ref: PolyRef,
        poly_ref: PolyRef,
    ) -> QueryResult<([f32; 3], [f32; 3])> {
        let poly = self.poly(poly_ref)?;
        if poly.poly_type != PolyType::OffMeshConnection {
            return Err(Status::InvalidParam);
        }

        // Hand out the end points in travel direction
        let mut idx0 = 0;
        let mut idx1 = 1;
        if let Some(link) = poly.links.iter().find(|l| l.edge == 0) {
            if PolyRef::from_index(link.poly) != prev_ref {
                idx0 = 1;
                idx1 = 0;
            }
        }
        Ok((poly.verts[idx0], poly.verts[idx1]))
    }
}

fn corner_flags(poly: PolyRef, poly_type: PolyType) -> u8 {
    if !poly.is_valid() {
        StraightPathFlags::END
    } else if poly_type == PolyType::OffMeshConnection {
        StraightPathFlags::OFFMESH_CONNECTION
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mesh_helpers::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_find_nearest_poly() {
        let mesh = open_grid(4, 4);
        let filter = QueryFilter::default();
        let (r, p) = mesh
            .find_nearest_poly(&[1.5, 0.3, 2.5], &test_extents(), &filter)
            .unwrap();
        assert_eq!(r, cell_ref(&mesh, 1, 2));
        assert_relative_eq!(p[1], 0.0);

        // Outside the mesh, snapped onto the border
        let (_, p) = mesh
            .find_nearest_poly(&[-0.2, 0.0, 0.5], &[0.5, 1.0, 0.5], &filter)
            .unwrap();
        assert_relative_eq!(p[0], 0.0);

        assert_eq!(
            mesh.find_nearest_poly(&[10.0, 0.0, 10.0], &[0.5, 1.0, 0.5], &filter),
            Err(Status::NotFound)
        );
    }

    #[test]
    fn test_find_path_straight_line() {
        let mesh = open_grid(5, 1);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let end = cell_ref(&mesh, 4, 0);
        let result = mesh
            .find_path(start, end, &[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &filter, 256)
            .unwrap();
        assert!(!result.partial);
        assert_eq!(result.path.len(), 5);
        assert_eq!(result.path[0], start);
        assert_eq!(*result.path.last().unwrap(), end);
    }

    #[test]
    fn test_find_path_around_wall() {
        // Wall at column 2 except the top row
        let mesh = PolyMesh::grid(5, 5, 1.0, [0.0; 3], |c, r| c != 2 || r == 4).unwrap();
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let end = cell_ref(&mesh, 4, 0);
        let result = mesh
            .find_path(start, end, &[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &filter, 256)
            .unwrap();
        assert!(!result.partial);
        assert!(result.path.contains(&cell_ref(&mesh, 2, 4)));
    }

    #[test]
    fn test_find_path_unreachable_is_partial() {
        let mesh = PolyMesh::grid(5, 1, 1.0, [0.0; 3], |c, _| c != 2).unwrap();
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let end = cell_ref(&mesh, 4, 0);
        let result = mesh
            .find_path(start, end, &[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &filter, 256)
            .unwrap();
        assert!(result.partial);
        assert_eq!(*result.path.last().unwrap(), cell_ref(&mesh, 1, 0));
    }

    #[test]
    fn test_sliced_search_respects_budget() {
        let mesh = open_grid(20, 1);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let end = cell_ref(&mesh, 19, 0);
        let mut search = mesh
            .init_sliced_find_path(start, end, &[0.5, 0.0, 0.5], &[19.5, 0.0, 0.5], &filter)
            .unwrap();

        let (iters, status) = mesh.update_sliced_find_path(&mut search, 5);
        assert_eq!(iters, 5);
        assert_eq!(status, Status::InProgress);

        let mut total = iters;
        loop {
            let (iters, status) = mesh.update_sliced_find_path(&mut search, 5);
            total += iters;
            if !status.is_in_progress() {
                break;
            }
        }
        assert_eq!(total, 20);
        let result = mesh.finalize_sliced_find_path(&mut search, 256).unwrap();
        assert_eq!(result.path.len(), 20);
    }

    #[test]
    fn test_finalize_partial_prefers_existing_path() {
        let mesh = open_grid(10, 1);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let end = cell_ref(&mesh, 9, 0);
        let mut search = mesh
            .init_sliced_find_path(start, end, &[0.5, 0.0, 0.5], &[9.5, 0.0, 0.5], &filter)
            .unwrap();
        mesh.update_sliced_find_path(&mut search, 3);

        let existing: Vec<PolyRef> = (0..10).map(|c| cell_ref(&mesh, c, 0)).collect();
        let result = mesh
            .finalize_sliced_find_path_partial(&mut search, &existing, 256)
            .unwrap();
        assert!(result.partial);
        assert_eq!(result.path[0], start);
        assert!(result.path.len() >= 3);
        assert_eq!(&existing[..result.path.len()], &result.path[..]);
    }

    #[test]
    fn test_straight_path_corner() {
        // L shaped corridor: (0,0) -> (1,0) -> (1,1)
        let mesh = PolyMesh::grid(2, 2, 1.0, [0.0; 3], |c, r| !(c == 0 && r == 1)).unwrap();
        let path = [cell_ref(&mesh, 0, 0), cell_ref(&mesh, 1, 0), cell_ref(&mesh, 1, 1)];
        let points = mesh
            .find_straight_path(&[0.5, 0.0, 0.5], &[1.5, 0.0, 1.5], &path, 8)
            .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].flags, StraightPathFlags::START);
        assert_relative_eq!(points[1].pos[0], 1.0);
        assert_relative_eq!(points[1].pos[2], 1.0);
        assert_eq!(points[2].flags, StraightPathFlags::END);
    }

    #[test]
    fn test_straight_path_open_field() {
        let mesh = open_grid(5, 1);
        let path: Vec<PolyRef> = (0..5).map(|c| cell_ref(&mesh, c, 0)).collect();
        let points = mesh
            .find_straight_path(&[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &path, 8)
            .unwrap();
        assert_eq!(points.len(), 2);

        let truncated = mesh
            .find_straight_path(&[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &path, 1)
            .unwrap();
        assert_eq!(truncated.len(), 1);
    }

    #[test]
    fn test_move_along_surface_clamps_at_wall() {
        let mesh = open_grid(3, 1);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let result = mesh
            .move_along_surface(start, &[0.5, 0.0, 0.5], &[1.5, 0.0, 2.0], &filter, 16)
            .unwrap();
        assert_relative_eq!(result.pos[2], 1.0);
        assert_relative_eq!(result.pos[0], 1.5);
        assert_eq!(result.visited, vec![start, cell_ref(&mesh, 1, 0)]);
    }

    #[test]
    fn test_move_along_surface_reaches_target() {
        let mesh = open_grid(3, 3);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let result = mesh
            .move_along_surface(start, &[0.5, 0.0, 0.5], &[1.2, 0.0, 0.7], &filter, 16)
            .unwrap();
        assert_eq!(result.pos, [1.2, 0.0, 0.7]);
        assert_eq!(*result.visited.last().unwrap(), cell_ref(&mesh, 1, 0));
    }

    #[test]
    fn test_raycast() {
        let mesh = open_grid(4, 1);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);

        let clear = mesh
            .raycast(start, &[0.5, 0.0, 0.5], &[3.5, 0.0, 0.5], &filter, 32)
            .unwrap();
        assert!(!clear.hit_wall());
        assert_eq!(clear.path.len(), 4);

        let blocked = mesh
            .raycast(start, &[0.5, 0.0, 0.5], &[0.5, 0.0, 2.5], &filter, 32)
            .unwrap();
        assert!(blocked.hit_wall());
        assert_relative_eq!(blocked.t, 0.25, epsilon = 1e-5);
        assert_relative_eq!(blocked.hit_normal[2], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_local_neighbourhood_and_walls() {
        let mesh = open_grid(3, 3);
        let filter = QueryFilter::default();
        let center = cell_ref(&mesh, 1, 1);
        let polys = mesh
            .find_local_neighbourhood(center, &[1.5, 0.0, 1.5], 0.6, &filter, 16)
            .unwrap();
        assert_eq!(polys[0], center);
        assert_eq!(polys.len(), 5);

        let corner = cell_ref(&mesh, 0, 0);
        let walls = mesh.get_poly_wall_segments(corner, &filter, 8).unwrap();
        assert_eq!(walls.len(), 2);
        assert!(mesh.get_poly_wall_segments(center, &filter, 8).unwrap().is_empty());
    }

    #[test]
    fn test_disabled_polys_are_walls() {
        let mut mesh = open_grid(3, 1);
        let filter = QueryFilter::default();
        let middle = cell_ref(&mesh, 1, 0);
        mesh.set_poly_flags(middle, 0).unwrap();
        assert!(!mesh.is_valid_poly_ref(middle, &filter));

        let start = cell_ref(&mesh, 0, 0);
        let walls = mesh.get_poly_wall_segments(start, &filter, 8).unwrap();
        assert_eq!(walls.len(), 4);
    }

    #[test]
    fn test_off_mesh_connection_path() {
        let (mesh, con_ref) = islands_with_jump(2);
        let filter = QueryFilter::default();
        let start = cell_ref(&mesh, 0, 0);
        let end = cell_ref(&mesh, 4, 0);
        let result = mesh
            .find_path(start, end, &[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &filter, 256)
            .unwrap();
        assert!(!result.partial);
        assert!(result.path.contains(&con_ref));

        let points = mesh
            .find_straight_path(&[0.5, 0.0, 0.5], &[4.5, 0.0, 0.5], &result.path, 8)
            .unwrap();
        let offmesh: Vec<_> = points
            .iter()
            .filter(|p| p.flags & StraightPathFlags::OFFMESH_CONNECTION != 0)
            .collect();
        assert_eq!(offmesh.len(), 1);
        assert_eq!(offmesh[0].poly, con_ref);
        assert_relative_eq!(offmesh[0].pos[0], 1.8);

        let prev = cell_ref(&mesh, 1, 0);
        let (s, e) = mesh.get_off_mesh_connection_poly_end_points(prev, con_ref).unwrap();
        assert_relative_eq!(s[0], 1.8);
        assert_relative_eq!(e[0], 3.2);

        // Not traversable backwards
        let back = mesh
            .find_path(end, start, &[4.5, 0.0, 0.5], &[0.5, 0.0, 0.5], &filter, 256)
            .unwrap();
        assert!(back.partial);
    }
}
