//! Proximity grid for neighbour queries in crowd simulation
//!
//! A uniform spatial hash over the XZ plane. Every item is inserted with its
//! footprint rectangle and stored in each cell the rectangle overlaps, so a
//! rectangle query only needs to visit the cells it overlaps itself. The grid
//! is rebuilt from scratch every simulation tick.

use std::collections::HashMap;

/// Grid cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridCoord {
    x: i32,
    z: i32,
}

impl GridCoord {
    fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Spatial hash of item ids keyed by grid cell
#[derive(Debug, Clone)]
pub struct ProximityGrid {
    cells: HashMap<GridCoord, Vec<usize>>,
    cell_size: f32,
    inv_cell_size: f32,
    /// Inclusive cell bounds touched since the last clear
    bounds: Option<(GridCoord, GridCoord)>,
    item_count: usize,
}

impl ProximityGrid {
    /// Creates an empty grid with square cells of `cell_size`
    pub fn new(cell_size: f32) -> Self {
        // Keep the cell size positive so floor division stays meaningful
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cells: HashMap::new(),
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            bounds: None,
            item_count: 0,
        }
    }

    /// Removes every item
    pub fn clear(&mut self) {
        // Keep the bucket allocations around for the next rebuild
        for ids in self.cells.values_mut() {
            ids.clear();
        }
        self.bounds = None;
        self.item_count = 0;
    }

    fn cell_range(&self, minx: f32, minz: f32, maxx: f32, maxz: f32) -> (GridCoord, GridCoord) {
        let lo = GridCoord::new(
            (minx * self.inv_cell_size).floor() as i32,
            (minz * self.inv_cell_size).floor() as i32,
        );
        let hi = GridCoord::new(
            (maxx * self.inv_cell_size).floor() as i32,
            (maxz * self.inv_cell_size).floor() as i32,
        );
        (lo, hi)
    }

    /// Inserts `id` into every cell overlapped by the rectangle
    pub fn insert(&mut self, id: usize, minx: f32, minz: f32, maxx: f32, maxz: f32) {
        let (lo, hi) = self.cell_range(minx, minz, maxx, maxz);

        for z in lo.z..=hi.z {
            for x in lo.x..=hi.x {
                self.cells.entry(GridCoord::new(x, z)).or_default().push(id);
            }
        }

        self.bounds = Some(match self.bounds {
            None => (lo, hi),
            Some((bmin, bmax)) => (
                GridCoord::new(bmin.x.min(lo.x), bmin.z.min(lo.z)),
                GridCoord::new(bmax.x.max(hi.x), bmax.z.max(hi.z)),
            ),
        });
        self.item_count += 1;
    }

    /// Ids stored in any cell overlapped by the rectangle.
    ///
    /// The result is sorted and free of duplicates. It may contain items whose
    /// footprint does not overlap the rectangle itself, but never misses one
    /// that does.
    pub fn query_items(&self, minx: f32, minz: f32, maxx: f32, maxz: f32) -> Vec<usize> {
        let (lo, hi) = self.cell_range(minx, minz, maxx, maxz);

        let mut result = Vec::new();
        for z in lo.z..=hi.z {
            for x in lo.x..=hi.x {
                if let Some(ids) = self.cells.get(&GridCoord::new(x, z)) {
                    result.extend_from_slice(ids);
                }
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Number of items stored in the cell containing `(x, z)`
    pub fn item_count_at(&self, x: f32, z: f32) -> usize {
        let (c, _) = self.cell_range(x, z, x, z);
        self.cells.get(&c).map_or(0, Vec::len)
    }

    /// Inclusive cell bounds `[minx, minz, maxx, maxz]` of all insertions
    /// since the last clear, `None` when empty
    pub fn bounds(&self) -> Option<[i32; 4]> {
        self.bounds.map(|(lo, hi)| [lo.x, lo.z, hi.x, hi.z])
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Gets grid statistics for debugging
    pub fn stats(&self) -> ProximityGridStats {
        let mut active_cells = 0;
        let mut max_items_per_cell = 0;
        let mut entries = 0;
        for ids in self.cells.values().filter(|ids| !ids.is_empty()) {
            active_cells += 1;
            max_items_per_cell = max_items_per_cell.max(ids.len());
            entries += ids.len();
        }

        ProximityGridStats {
            items: self.item_count,
            entries,
            active_cells,
            max_items_per_cell,
            cell_size: self.cell_size,
        }
    }
}

/// Statistics for the proximity grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityGridStats {
    /// Number of inserted items
    pub items: usize,
    /// Number of (cell, id) entries, items spanning several cells count once
    /// per cell
    pub entries: usize,
    /// Number of non-empty cells
    pub active_cells: usize,
    /// Largest bucket
    pub max_items_per_cell: usize,
    /// Cell size in world units
    pub cell_size: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_circle(grid: &mut ProximityGrid, id: usize, x: f32, z: f32, r: f32) {
        grid.insert(id, x - r, z - r, x + r, z + r);
    }

    #[test]
    fn test_insert_spans_cells() {
        let mut grid = ProximityGrid::new(2.0);
        // Straddles the four cells around the origin
        insert_circle(&mut grid, 7, 0.0, 0.0, 0.5);

        assert_eq!(grid.item_count_at(-0.1, -0.1), 1);
        assert_eq!(grid.item_count_at(0.1, 0.1), 1);
        assert_eq!(grid.item_count_at(-0.1, 0.1), 1);
        assert_eq!(grid.item_count_at(3.0, 3.0), 0);
        assert_eq!(grid.bounds(), Some([-1, -1, 0, 0]));

        let stats = grid.stats();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.entries, 4);
        assert_eq!(stats.active_cells, 4);
    }

    #[test]
    fn test_query_is_deduplicated() {
        let mut grid = ProximityGrid::new(1.0);
        insert_circle(&mut grid, 3, 0.0, 0.0, 1.5);
        insert_circle(&mut grid, 1, 0.5, 0.5, 0.2);

        let items = grid.query_items(-2.0, -2.0, 2.0, 2.0);
        assert_eq!(items, vec![1, 3]);
    }

    #[test]
    fn test_query_has_no_false_negatives() {
        let mut grid = ProximityGrid::new(1.8);
        let mut circles = Vec::new();
        for i in 0..40 {
            let x = (i % 8) as f32 * 1.3 - 4.0;
            let z = (i / 8) as f32 * 1.7 - 3.0;
            insert_circle(&mut grid, i, x, z, 0.6);
            circles.push((x, z));
        }

        let (qx, qz, qr) = (0.4, -0.3, 2.5);
        let items = grid.query_items(qx - qr, qz - qr, qx + qr, qz + qr);
        for (i, &(x, z)) in circles.iter().enumerate() {
            let overlaps = (x - qx).abs() <= qr + 0.6 && (z - qz).abs() <= qr + 0.6;
            if overlaps {
                assert!(items.contains(&i), "item {} missing", i);
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut grid = ProximityGrid::new(2.0);
        insert_circle(&mut grid, 1, 1.0, 1.0, 0.5);
        grid.clear();

        assert!(grid.query_items(-10.0, -10.0, 10.0, 10.0).is_empty());
        assert_eq!(grid.bounds(), None);
        assert_eq!(grid.stats().items, 0);
        assert_eq!(grid.stats().active_cells, 0);
    }

    #[test]
    fn test_negative_coordinates_use_floor() {
        let mut grid = ProximityGrid::new(2.0);
        insert_circle(&mut grid, 1, -1.5, -3.7, 0.1);
        assert_eq!(grid.bounds(), Some([-1, -2, -1, -2]));
    }

    #[test]
    fn test_invalid_cell_size() {
        let grid = ProximityGrid::new(0.0);
        assert_eq!(grid.cell_size(), 1.0);
    }
}
