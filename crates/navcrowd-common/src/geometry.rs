//! 2D geometry on the XZ plane
//!
//! Polygons are convex and wound clockwise when viewed with +x to the right
//! and +z up (the winding a navigation mesh hands out). The y component of
//! every input is ignored unless noted otherwise.

/// Twice the signed area of triangle `abc` on the XZ plane.
///
/// Positive when `c` lies to the right of the ray `a -> b`, using the
/// x-right, z-up convention.
#[inline]
pub fn tri_area_2d(a: &[f32; 3], b: &[f32; 3], c: &[f32; 3]) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Dot product of two vectors on the XZ plane
#[inline]
pub fn vdot_2d(u: &[f32; 3], v: &[f32; 3]) -> f32 {
    u[0] * v[0] + u[2] * v[2]
}

/// Perp product of two vectors on the XZ plane
#[inline]
pub fn vperp_2d(u: &[f32; 3], v: &[f32; 3]) -> f32 {
    u[2] * v[0] - u[0] * v[2]
}

#[inline]
pub fn vdist_2d(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    vdist_2d_sqr(a, b).sqrt()
}

#[inline]
pub fn vdist_2d_sqr(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = b[0] - a[0];
    let dz = b[2] - a[2];
    dx * dx + dz * dz
}

/// Squared distance from `pt` to segment `pq` on the XZ plane.
///
/// Returns the distance together with the parametric position of the closest
/// point along the segment.
pub fn dist_pt_seg_sqr_2d(pt: &[f32; 3], p: &[f32; 3], q: &[f32; 3]) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqz = q[2] - p[2];
    let dx = pt[0] - p[0];
    let dz = pt[2] - p[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = p[0] + t * pqx - pt[0];
    let dz = p[2] + t * pqz - pt[2];
    (dx * dx + dz * dz, t)
}

/// Crossing test for a point against a polygon on the XZ plane
pub fn point_in_polygon(pt: &[f32; 3], verts: &[[f32; 3]]) -> bool {
    let mut inside = false;
    let n = verts.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = &verts[i];
        let vj = &verts[j];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance from a point to every edge of a polygon.
///
/// Returns whether the point is inside the polygon, and for each edge
/// `verts[j] -> verts[i]` (with `j = i - 1`) the squared distance and the
/// parametric position along that edge. Entry `j` describes edge `j`.
pub fn distance_pt_poly_edges_sqr(pt: &[f32; 3], verts: &[[f32; 3]]) -> (bool, Vec<f32>, Vec<f32>) {
    let n = verts.len();
    let mut ed = vec![0.0; n];
    let mut et = vec![0.0; n];
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = &verts[i];
        let vj = &verts[j];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            inside = !inside;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, vj, vi);
        ed[j] = d;
        et[j] = t;
        j = i;
    }
    (inside, ed, et)
}

/// Result of clipping a segment against a convex polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPolyHit {
    /// Parametric entry point along the segment
    pub tmin: f32,
    /// Parametric exit point along the segment
    pub tmax: f32,
    /// Edge index through which the segment enters, if it starts outside
    pub seg_min: Option<usize>,
    /// Edge index through which the segment leaves, if it ends outside
    pub seg_max: Option<usize>,
}

/// Clips segment `p0 -> p1` against a convex polygon on the XZ plane.
///
/// Edge `j` runs from `verts[j]` to `verts[j + 1]`. Returns `None` when the
/// segment misses the polygon.
pub fn intersect_segment_poly_2d(
    p0: &[f32; 3],
    p1: &[f32; 3],
    verts: &[[f32; 3]],
) -> Option<SegmentPolyHit> {
    const EPS: f32 = 0.000001;

    let mut hit = SegmentPolyHit {
        tmin: 0.0,
        tmax: 1.0,
        seg_min: None,
        seg_max: None,
    };
    let dir = [p1[0] - p0[0], 0.0, p1[2] - p0[2]];

    let n = verts.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let edge = [verts[i][0] - verts[j][0], 0.0, verts[i][2] - verts[j][2]];
        let diff = [p0[0] - verts[j][0], 0.0, p0[2] - verts[j][2]];
        let num = vperp_2d(&edge, &diff);
        let den = vperp_2d(&dir, &edge);
        if den.abs() < EPS {
            // Parallel to this edge
            if num < 0.0 {
                return None;
            }
            j = i;
            continue;
        }
        let t = num / den;
        if den < 0.0 {
            // Entering across this edge
            if t > hit.tmin {
                hit.tmin = t;
                hit.seg_min = Some(j);
                if hit.tmin > hit.tmax {
                    return None;
                }
            }
        } else if t < hit.tmax {
            // Leaving across this edge
            hit.tmax = t;
            hit.seg_max = Some(j);
            if hit.tmax < hit.tmin {
                return None;
            }
        }
        j = i;
    }

    Some(hit)
}

/// Height of the point on triangle `abc` directly above or below `p`.
///
/// Returns `None` when `p` falls outside the triangle on the XZ plane.
pub fn closest_height_point_triangle(
    p: &[f32; 3],
    a: &[f32; 3],
    b: &[f32; 3],
    c: &[f32; 3],
) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let v1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v2 = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];

    // Barycentric coordinates on the XZ plane
    let denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];
    if denom < 0.0 {
        u = -u;
        v = -v;
    }
    let denom = denom.abs();

    if u >= -EPS * denom && v >= -EPS * denom && (u + v) <= denom * (1.0 + EPS) {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

/// Signed area of a polygon outline on the XZ plane.
///
/// Negative for the clockwise winding used by navigation polygons.
pub fn poly_area_2d(verts: &[[f32; 3]]) -> f32 {
    let n = verts.len();
    let mut area = 0.0;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        area += verts[j][0] * verts[i][2] - verts[i][0] * verts[j][2];
        j = i;
    }
    area * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Unit square, clockwise in x-right/z-up
    fn square() -> Vec<[f32; 3]> {
        vec![
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
        ]
    }

    #[test]
    fn test_tri_area_sign() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        assert!(tri_area_2d(&a, &b, &[0.5, 0.0, 1.0]) < 0.0);
        assert!(tri_area_2d(&a, &b, &[0.5, 0.0, -1.0]) > 0.0);
        assert_eq!(tri_area_2d(&a, &b, &[2.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_dist_pt_seg() {
        let (d, t) = dist_pt_seg_sqr_2d(&[0.5, 5.0, 1.0], &[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert_relative_eq!(d, 1.0);
        assert_relative_eq!(t, 0.5);

        let (d, t) = dist_pt_seg_sqr_2d(&[-1.0, 0.0, 0.0], &[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert_relative_eq!(d, 1.0);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_point_in_polygon() {
        let sq = square();
        assert!(point_in_polygon(&[0.5, 0.0, 0.5], &sq));
        assert!(!point_in_polygon(&[1.5, 0.0, 0.5], &sq));
        assert!(!point_in_polygon(&[0.5, 0.0, -0.1], &sq));
    }

    #[test]
    fn test_segment_leaves_through_right_edge() {
        let sq = square();
        let hit = intersect_segment_poly_2d(&[0.5, 0.0, 0.5], &[2.0, 0.0, 0.5], &sq).unwrap();
        assert_eq!(hit.tmin, 0.0);
        assert!(hit.seg_min.is_none());
        assert_relative_eq!(hit.tmax, 1.0 / 3.0, epsilon = 1e-5);
        // Edge 2 runs from (1,1) to (1,0)
        assert_eq!(hit.seg_max, Some(2));
    }

    #[test]
    fn test_segment_inside_has_no_exit() {
        let sq = square();
        let hit = intersect_segment_poly_2d(&[0.2, 0.0, 0.2], &[0.8, 0.0, 0.8], &sq).unwrap();
        assert!(hit.seg_max.is_none());
        assert!(intersect_segment_poly_2d(&[2.0, 0.0, 2.0], &[3.0, 0.0, 3.0], &sq).is_none());
    }

    #[test]
    fn test_closest_height() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 2.0, 1.0];
        let c = [1.0, 0.0, 0.0];
        let h = closest_height_point_triangle(&[0.25, 0.0, 0.5], &a, &b, &c).unwrap();
        assert_relative_eq!(h, 1.0, epsilon = 1e-5);
        assert!(closest_height_point_triangle(&[2.0, 0.0, 2.0], &a, &b, &c).is_none());
    }

    #[test]
    fn test_poly_area_winding() {
        assert!(poly_area_2d(&square()) < 0.0);
        let mut ccw = square();
        ccw.reverse();
        assert!(poly_area_2d(&ccw) > 0.0);
    }
}
