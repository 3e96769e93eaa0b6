//! Polygon filter used by searches and validity checks

use serde::{Deserialize, Serialize};

use crate::PolyFlags;

/// Maximum number of polygon area types
pub const MAX_AREAS: usize = 64;

/// Defines which polygons are passable and what traversing them costs
///
/// A polygon passes the filter when it has at least one include flag and
/// none of the exclude flags. Traversal cost is the travelled distance
/// scaled by the cost of the polygon's area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Flags a polygon must have at least one of
    pub include_flags: u16,
    /// Flags a polygon must not have
    pub exclude_flags: u16,
    /// Cost multiplier per area type
    #[serde(with = "area_costs")]
    pub area_cost: [f32; MAX_AREAS],
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::ALL,
            exclude_flags: 0,
            area_cost: [1.0; MAX_AREAS],
        }
    }
}

impl QueryFilter {
    /// Creates a filter with the given include and exclude flags
    pub fn new(include_flags: u16, exclude_flags: u16) -> Self {
        Self {
            include_flags,
            exclude_flags,
            ..Default::default()
        }
    }

    /// Checks whether a polygon with `flags` may be traversed
    #[inline]
    pub fn pass_filter(&self, flags: u16) -> bool {
        (flags & self.include_flags) != 0 && (flags & self.exclude_flags) == 0
    }

    /// Cost of moving from `pa` to `pb` across a polygon of area `area`
    #[inline]
    pub fn get_cost(&self, pa: &[f32; 3], pb: &[f32; 3], area: u8) -> f32 {
        let dx = pb[0] - pa[0];
        let dy = pb[1] - pa[1];
        let dz = pb[2] - pa[2];
        (dx * dx + dy * dy + dz * dz).sqrt() * self.get_area_cost(area)
    }

    /// Returns the traversal cost multiplier of an area
    pub fn get_area_cost(&self, area: u8) -> f32 {
        self.area_cost
            .get(area as usize)
            .copied()
            .unwrap_or(1.0)
    }

    /// Sets the traversal cost multiplier of an area
    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        if let Some(c) = self.area_cost.get_mut(area as usize) {
            *c = cost;
        }
    }
}

// Serde only derives fixed arrays up to 32 elements.
mod area_costs {
    use super::MAX_AREAS;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(costs: &[f32; MAX_AREAS], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(costs.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[f32; MAX_AREAS], D::Error> {
        let values = Vec::<f32>::deserialize(d)?;
        if values.len() > MAX_AREAS {
            return Err(D::Error::invalid_length(values.len(), &"at most 64 area costs"));
        }
        let mut costs = [1.0; MAX_AREAS];
        costs[..values.len()].copy_from_slice(&values);
        Ok(costs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_filter() {
        let filter = QueryFilter::new(PolyFlags::WALK, PolyFlags::DISABLED);
        assert!(filter.pass_filter(PolyFlags::WALK));
        assert!(!filter.pass_filter(PolyFlags::SWIM));
        assert!(!filter.pass_filter(PolyFlags::WALK | PolyFlags::DISABLED));
        assert!(!filter.pass_filter(0));
    }

    #[test]
    fn test_area_cost() {
        let mut filter = QueryFilter::default();
        filter.set_area_cost(3, 4.0);
        assert_eq!(filter.get_cost(&[0.0; 3], &[1.0, 0.0, 0.0], 3), 4.0);
        assert_eq!(filter.get_cost(&[0.0; 3], &[1.0, 0.0, 0.0], 0), 1.0);
        // Out of range areas fall back to unit cost
        filter.set_area_cost(200, 9.0);
        assert_eq!(filter.get_area_cost(200), 1.0);
    }
}
