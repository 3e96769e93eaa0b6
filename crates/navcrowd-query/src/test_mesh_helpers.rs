//! Test mesh creation helpers
//!
//! Small grid meshes with unit cells at the origin, plus a lookup from grid
//! cell to polygon reference that works when cells were left out.

use crate::{OffMeshConnection, PolyFlags, PolyMesh, PolyRef, PolyType};

/// A fully walkable `cols x rows` grid of unit cells
pub fn open_grid(cols: usize, rows: usize) -> PolyMesh {
    PolyMesh::grid(cols, rows, 1.0, [0.0; 3], |_, _| true).unwrap()
}

/// Two islands of `cols` cells separated by a one cell gap, joined by a
/// one-way off-mesh connection across the gap.
pub fn islands_with_jump(cols: usize) -> (PolyMesh, PolyRef) {
    let gap = cols;
    let mut mesh = PolyMesh::grid(cols * 2 + 1, 1, 1.0, [0.0; 3], |c, _| c != gap).unwrap();
    let con = mesh
        .add_off_mesh_connection(&OffMeshConnection {
            start: [gap as f32 - 0.2, 0.0, 0.5],
            end: [gap as f32 + 1.2, 0.0, 0.5],
            radius: 0.5,
            bidirectional: false,
            flags: PolyFlags::JUMP,
            area: 0,
        })
        .unwrap();
    (mesh, con)
}

/// Reference of the ground polygon covering grid cell `(col, row)`
pub fn cell_ref(mesh: &PolyMesh, col: usize, row: usize) -> PolyRef {
    let center = [col as f32 + 0.5, 0.0, row as f32 + 0.5];
    mesh.poly_refs()
        .filter(|&r| mesh.get_poly_type(r).unwrap() == PolyType::Ground)
        .find(|&r| {
            let c = mesh.get_poly_center(r).unwrap();
            (c[0] - center[0]).abs() < 1e-4 && (c[2] - center[2]).abs() < 1e-4
        })
        .unwrap_or_else(|| panic!("no polygon at cell ({}, {})", col, row))
}

/// Search extents suitable for the unit grids
pub fn test_extents() -> [f32; 3] {
    [0.5, 1.0, 0.5]
}
