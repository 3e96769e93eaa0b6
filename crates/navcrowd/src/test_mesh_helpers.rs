//! Test meshes and crowd fixtures
//!
//! Grid meshes use unit cells with the lower left corner at the origin, so
//! cell `(col, row)` has its centre at `(col + 0.5, 0, row + 0.5)`.

use navcrowd_query::{OffMeshConnection, PolyFlags, PolyMesh, PolyRef, PolyType};

use crate::{AgentParams, Crowd, CrowdConfig, UpdateFlags};

/// A fully walkable `cols x rows` grid of unit cells
pub fn open_grid(cols: usize, rows: usize) -> PolyMesh {
    PolyMesh::grid(cols, rows, 1.0, [0.0; 3], |_, _| true).unwrap()
}

/// A `cols x rows` grid with the listed cells left out
pub fn grid_with_holes(cols: usize, rows: usize, holes: &[(usize, usize)]) -> PolyMesh {
    PolyMesh::grid(cols, rows, 1.0, [0.0; 3], |c, r| !holes.contains(&(c, r))).unwrap()
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

/// Small agents that fit the unit cells
pub fn small_agent() -> AgentParams {
    AgentParams {
        radius: 0.3,
        height: 2.0,
        max_acceleration: 20.0,
        max_speed: 2.0,
        collision_query_range: 2.4,
        path_optimization_range: 6.0,
        separation_weight: 2.0,
        update_flags: UpdateFlags::ANTICIPATE_TURNS
            | UpdateFlags::OBSTACLE_AVOIDANCE
            | UpdateFlags::SEPARATION
            | UpdateFlags::OPTIMIZE_VIS
            | UpdateFlags::OPTIMIZE_TOPO,
        obstacle_avoidance_type: 0,
        query_filter_type: 0,
    }
}

/// Crowd of up to `max_agents` small agents on `mesh`
pub fn crowd_on(mesh: PolyMesh, max_agents: usize) -> Crowd<PolyMesh> {
    let config = CrowdConfig {
        max_agents,
        max_agent_radius: 0.3,
        ..Default::default()
    };
    Crowd::with_config(config, mesh).unwrap()
}

/// Whether `pos` lies over a walkable ground polygon of `mesh`
pub fn is_on_mesh(mesh: &PolyMesh, pos: &[f32; 3]) -> bool {
    mesh.poly_refs()
        .filter(|&r| mesh.get_poly_type(r).unwrap() == PolyType::Ground)
        .filter(|&r| mesh.get_poly_flags(r).unwrap() != 0)
        .any(|r| {
            let verts = mesh.get_poly_verts(r).unwrap();
            let (minx, maxx) = verts.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v[0]), hi.max(v[0])));
            let (minz, maxz) = verts.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v[2]), hi.max(v[2])));
            const EPS: f32 = 1e-3;
            pos[0] >= minx - EPS && pos[0] <= maxx + EPS && pos[2] >= minz - EPS && pos[2] <= maxz + EPS
        })
}
