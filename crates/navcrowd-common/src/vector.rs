//! Vector utilities over `[f32; 3]`
//!
//! Hot paths in the crowd keep positions as plain arrays; these helpers cover
//! the arithmetic. Conversions to and from `glam::Vec3` are provided for the
//! edges of the API.

use glam::Vec3;

/// Threshold under which two points are treated as identical
const EQUAL_THRESHOLD_SQR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);

#[inline]
pub fn sqr(a: f32) -> f32 {
    a * a
}

#[inline]
pub fn vadd(a: &[f32; 3], b: &[f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vsub(a: &[f32; 3], b: &[f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vscale(v: &[f32; 3], s: f32) -> [f32; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}

/// Scaled vector addition: `a + b * s`
#[inline]
pub fn vmad(a: &[f32; 3], b: &[f32; 3], s: f32) -> [f32; 3] {
    [a[0] + b[0] * s, a[1] + b[1] * s, a[2] + b[2] * s]
}

/// Linear interpolation between `a` and `b`
#[inline]
pub fn vlerp(a: &[f32; 3], b: &[f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

#[inline]
pub fn vdot(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vlen(v: &[f32; 3]) -> f32 {
    vlen_sqr(v).sqrt()
}

#[inline]
pub fn vlen_sqr(v: &[f32; 3]) -> f32 {
    vdot(v, v)
}

#[inline]
pub fn vdist(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    vlen(&vsub(b, a))
}

#[inline]
pub fn vdist_sqr(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    vlen_sqr(&vsub(b, a))
}

/// Returns `v` scaled to unit length, or `v` unchanged when it is zero
#[inline]
pub fn vnormalize(v: &[f32; 3]) -> [f32; 3] {
    let len = vlen(v);
    if len > 0.0 {
        vscale(v, 1.0 / len)
    } else {
        *v
    }
}

/// Checks whether two points are close enough to be considered equal
#[inline]
pub fn vequal(a: &[f32; 3], b: &[f32; 3]) -> bool {
    vdist_sqr(a, b) < EQUAL_THRESHOLD_SQR
}

#[inline]
pub fn visfinite(v: &[f32; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}

#[inline]
pub fn vmin(a: &[f32; 3], b: &[f32; 3]) -> [f32; 3] {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])]
}

#[inline]
pub fn vmax(a: &[f32; 3], b: &[f32; 3]) -> [f32; 3] {
    [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])]
}

/// Converts a position to a `glam::Vec3`
#[inline]
pub fn to_vec3(v: &[f32; 3]) -> Vec3 {
    Vec3::from_array(*v)
}

/// Converts a `glam::Vec3` to a position array
#[inline]
pub fn from_vec3(v: Vec3) -> [f32; 3] {
    v.to_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vmad_and_lerp() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 0.0, -2.0];
        assert_eq!(vmad(&a, &b, 0.5), [2.0, 2.0, 2.0]);
        assert_eq!(vlerp(&a, &b, 0.0), a);
        assert_eq!(vlerp(&a, &b, 1.0), b);
    }

    #[test]
    fn test_normalize() {
        let n = vnormalize(&[3.0, 0.0, 4.0]);
        assert_relative_eq!(vlen(&n), 1.0, epsilon = 1e-6);
        assert_eq!(vnormalize(&[0.0; 3]), [0.0; 3]);
    }

    #[test]
    fn test_equal_threshold() {
        assert!(vequal(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.00001]));
        assert!(!vequal(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.01]));
    }

    #[test]
    fn test_glam_conversion() {
        let v = [1.5, -2.0, 0.25];
        assert_eq!(from_vec3(to_vec3(&v)), v);
    }
}
