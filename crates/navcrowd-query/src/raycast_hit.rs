//! Raycast hit information

use crate::PolyRef;

/// Result of a walkability raycast along the mesh surface
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastHit {
    /// The hit parameter along the ray, `f32::MAX` when no wall was hit
    pub t: f32,

    /// The normal of the nearest wall hit
    pub hit_normal: [f32; 3],

    /// The edge on the final polygon where the wall was hit
    pub hit_edge_index: Option<usize>,

    /// Polygons visited along the ray
    pub path: Vec<PolyRef>,
}

impl RaycastHit {
    /// Creates a hit record for a ray that reached its end point
    pub fn no_hit(path: Vec<PolyRef>) -> Self {
        Self {
            t: f32::MAX,
            hit_normal: [0.0; 3],
            hit_edge_index: None,
            path,
        }
    }

    /// Checks if this represents a wall hit
    pub fn hit_wall(&self) -> bool {
        self.t < f32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_hit() {
        let hit = RaycastHit::no_hit(vec![PolyRef::new(1)]);
        assert!(!hit.hit_wall());
        assert_eq!(hit.path.len(), 1);
    }
}
