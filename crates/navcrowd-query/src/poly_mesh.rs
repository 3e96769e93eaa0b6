//! Convex polygon navigation mesh
//!
//! A flat list of convex polygons with adjacency derived from shared edges.
//! Off-mesh connections are stored as two-vertex polygons linked to the
//! ground polygons at their end points.

use std::collections::HashMap;

use glam::Vec3;
use log::debug;
use navcrowd_common::{poly_area_2d, vmax, vmin};

use crate::{PolyFlags, PolyRef, PolyType, QueryFilter, QueryResult, Status};

/// Edge value of links that do not cross a polygon edge
pub(crate) const EXT_LINK: u8 = 0xff;

/// Connection from one polygon to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    /// Index of the target polygon
    pub poly: usize,
    /// Edge of the owning polygon the link crosses.
    ///
    /// For off-mesh connection polygons this is the end point index (0 or 1);
    /// for ground polygons linked to a connection it is [`EXT_LINK`].
    pub edge: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct Poly {
    pub verts: Vec<[f32; 3]>,
    pub links: Vec<Link>,
    pub flags: u16,
    pub area: u8,
    pub poly_type: PolyType,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
}

impl Poly {
    fn new(verts: Vec<[f32; 3]>, poly_type: PolyType) -> Self {
        let mut bmin = verts[0];
        let mut bmax = verts[0];
        for v in &verts[1..] {
            bmin = vmin(&bmin, v);
            bmax = vmax(&bmax, v);
        }
        Self {
            verts,
            links: Vec::new(),
            flags: PolyFlags::WALK,
            area: 0,
            poly_type,
            bmin,
            bmax,
        }
    }

    /// Links that cross edge `edge`
    pub fn links_through(&self, edge: usize) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.edge as usize == edge)
    }
}

/// Description of an off-mesh connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffMeshConnection {
    /// Start point of the connection
    pub start: [f32; 3],
    /// End point of the connection
    pub end: [f32; 3],
    /// Snap radius used to attach each end point to the mesh
    pub radius: f32,
    /// Whether the connection can be traversed from end to start
    pub bidirectional: bool,
    /// Polygon flags of the connection
    pub flags: u16,
    /// Area type of the connection
    pub area: u8,
}

/// Summary statistics of a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyMeshStats {
    pub ground_polys: usize,
    pub off_mesh_connections: usize,
    pub links: usize,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
}

/// Navigation mesh made of convex polygons
#[derive(Debug, Clone)]
pub struct PolyMesh {
    pub(crate) polys: Vec<Poly>,
    pub(crate) max_search_nodes: usize,
}

impl PolyMesh {
    /// Default capacity of the search node pool
    pub const DEFAULT_MAX_SEARCH_NODES: usize = 2048;

    /// Builds a mesh from shared vertices and polygons given as vertex index
    /// lists.
    ///
    /// Polygons must be convex; either winding is accepted. Two polygons are
    /// connected when they share an edge (the same pair of vertex indices).
    pub fn new(verts: &[[f32; 3]], polys: &[Vec<usize>]) -> QueryResult<Self> {
        let mut out = Vec::with_capacity(polys.len());
        let mut indices = Vec::with_capacity(polys.len());

        for (i, poly) in polys.iter().enumerate() {
            if poly.len() < 3 || poly.iter().any(|&v| v >= verts.len()) {
                debug!("Rejecting polygon {} with vertex list {:?}", i, poly);
                return Err(Status::InvalidParam);
            }
            let mut idx = poly.clone();
            let mut pverts: Vec<[f32; 3]> = idx.iter().map(|&v| verts[v]).collect();
            if poly_area_2d(&pverts) > 0.0 {
                idx.reverse();
                pverts.reverse();
            }
            out.push(Poly::new(pverts, PolyType::Ground));
            indices.push(idx);
        }

        // Connect polygons through shared edges
        let mut edges: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
        for (pi, idx) in indices.iter().enumerate() {
            let n = idx.len();
            for e in 0..n {
                let a = idx[e];
                let b = idx[(e + 1) % n];
                let key = (a.min(b), a.max(b));
                if let Some(&(pj, ej)) = edges.get(&key) {
                    out[pi].links.push(Link {
                        poly: pj,
                        edge: e as u8,
                    });
                    out[pj].links.push(Link {
                        poly: pi,
                        edge: ej as u8,
                    });
                } else {
                    edges.insert(key, (pi, e));
                }
            }
        }

        Ok(Self {
            polys: out,
            max_search_nodes: Self::DEFAULT_MAX_SEARCH_NODES,
        })
    }

    /// Builds a flat grid of square cells.
    ///
    /// Cell `(col, row)` spans `[origin.x + col * cell_size, +cell_size]` on x
    /// and the same on z. Cells for which `walkable` returns false are left
    /// out, producing holes with walls around them.
    pub fn grid(
        cols: usize,
        rows: usize,
        cell_size: f32,
        origin: impl Into<Vec3>,
        walkable: impl Fn(usize, usize) -> bool,
    ) -> QueryResult<Self> {
        if cols == 0 || rows == 0 || cell_size <= 0.0 {
            return Err(Status::InvalidParam);
        }
        let origin = origin.into();

        let mut verts = Vec::with_capacity((cols + 1) * (rows + 1));
        for r in 0..=rows {
            for c in 0..=cols {
                let v = origin + Vec3::new(c as f32 * cell_size, 0.0, r as f32 * cell_size);
                verts.push(v.to_array());
            }
        }

        let vi = |c: usize, r: usize| r * (cols + 1) + c;
        let mut polys = Vec::new();
        for r in 0..rows {
            for c in 0..cols {
                if walkable(c, r) {
                    polys.push(vec![vi(c, r), vi(c, r + 1), vi(c + 1, r + 1), vi(c + 1, r)]);
                }
            }
        }
        if polys.is_empty() {
            return Err(Status::InvalidParam);
        }

        Self::new(&verts, &polys)
    }

    /// Adds an off-mesh connection between the ground polygons nearest to its
    /// end points.
    pub fn add_off_mesh_connection(&mut self, con: &OffMeshConnection) -> QueryResult<PolyRef> {
        if con.radius <= 0.0 {
            return Err(Status::InvalidParam);
        }
        let ext = [con.radius, con.radius * 2.0, con.radius];
        let filter = QueryFilter::default();
        let (start_ref, start_pos) = self.nearest_ground_poly(&con.start, &ext, &filter)?;
        let (end_ref, end_pos) = self.nearest_ground_poly(&con.end, &ext, &filter)?;
        let (Some(start_idx), Some(end_idx)) = (start_ref.index(), end_ref.index()) else {
            return Err(Status::NotFound);
        };

        let idx = self.polys.len();
        let mut poly = Poly::new(vec![start_pos, end_pos], PolyType::OffMeshConnection);
        poly.flags = con.flags;
        poly.area = con.area;
        poly.links.push(Link {
            poly: start_idx,
            edge: 0,
        });
        poly.links.push(Link {
            poly: end_idx,
            edge: 1,
        });
        self.polys.push(poly);

        self.polys[start_idx].links.push(Link {
            poly: idx,
            edge: EXT_LINK,
        });
        if con.bidirectional {
            self.polys[end_idx].links.push(Link {
                poly: idx,
                edge: EXT_LINK,
            });
        }

        let con_ref = PolyRef::from_index(idx);
        debug!(
            "Added off-mesh connection {} from {} to {}",
            con_ref, start_ref, end_ref
        );
        Ok(con_ref)
    }

    /// Sets the flags of a polygon
    pub fn set_poly_flags(&mut self, poly_ref: PolyRef, flags: u16) -> QueryResult<()> {
        self.poly_mut(poly_ref)?.flags = flags;
        Ok(())
    }

    /// Returns the flags of a polygon
    pub fn get_poly_flags(&self, poly_ref: PolyRef) -> QueryResult<u16> {
        Ok(self.poly(poly_ref)?.flags)
    }

    /// Sets the area type of a polygon
    pub fn set_poly_area(&mut self, poly_ref: PolyRef, area: u8) -> QueryResult<()> {
        self.poly_mut(poly_ref)?.area = area;
        Ok(())
    }

    /// Returns the area type of a polygon
    pub fn get_poly_area(&self, poly_ref: PolyRef) -> QueryResult<u8> {
        Ok(self.poly(poly_ref)?.area)
    }

    /// Returns the type of a polygon
    pub fn get_poly_type(&self, poly_ref: PolyRef) -> QueryResult<PolyType> {
        Ok(self.poly(poly_ref)?.poly_type)
    }

    /// Returns the vertices of a polygon
    pub fn get_poly_verts(&self, poly_ref: PolyRef) -> QueryResult<&[[f32; 3]]> {
        Ok(&self.poly(poly_ref)?.verts)
    }

    /// Returns the centroid of a polygon
    pub fn get_poly_center(&self, poly_ref: PolyRef) -> QueryResult<[f32; 3]> {
        let poly = self.poly(poly_ref)?;
        let mut c = [0.0; 3];
        for v in &poly.verts {
            c[0] += v[0];
            c[1] += v[1];
            c[2] += v[2];
        }
        let s = 1.0 / poly.verts.len() as f32;
        Ok([c[0] * s, c[1] * s, c[2] * s])
    }

    /// Polygons directly connected to `poly_ref`
    pub fn get_neighbours(&self, poly_ref: PolyRef) -> QueryResult<Vec<PolyRef>> {
        Ok(self
            .poly(poly_ref)?
            .links
            .iter()
            .map(|l| PolyRef::from_index(l.poly))
            .collect())
    }

    /// Number of polygons, off-mesh connections included
    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    /// Iterates over all polygon references
    pub fn poly_refs(&self) -> impl Iterator<Item = PolyRef> + '_ {
        (0..self.polys.len()).map(PolyRef::from_index)
    }

    /// Sets the capacity of the node pool used by path searches
    pub fn set_max_search_nodes(&mut self, max_nodes: usize) {
        self.max_search_nodes = max_nodes.max(1);
    }

    /// Collects summary statistics
    pub fn stats(&self) -> PolyMeshStats {
        let mut stats = PolyMeshStats {
            ground_polys: 0,
            off_mesh_connections: 0,
            links: 0,
            bmin: [f32::MAX; 3],
            bmax: [f32::MIN; 3],
        };
        for poly in &self.polys {
            match poly.poly_type {
                PolyType::Ground => stats.ground_polys += 1,
                PolyType::OffMeshConnection => stats.off_mesh_connections += 1,
            }
            stats.links += poly.links.len();
            stats.bmin = vmin(&stats.bmin, &poly.bmin);
            stats.bmax = vmax(&stats.bmax, &poly.bmax);
        }
        stats
    }

    pub(crate) fn poly(&self, poly_ref: PolyRef) -> QueryResult<&Poly> {
        poly_ref
            .index()
            .and_then(|i| self.polys.get(i))
            .ok_or(Status::InvalidParam)
    }

    fn poly_mut(&mut self, poly_ref: PolyRef) -> QueryResult<&mut Poly> {
        poly_ref
            .index()
            .and_then(|i| self.polys.get_mut(i))
            .ok_or(Status::InvalidParam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_adjacency() {
        let mesh = PolyMesh::grid(3, 2, 1.0, [0.0; 3], |_, _| true).unwrap();
        assert_eq!(mesh.poly_count(), 6);

        let stats = mesh.stats();
        assert_eq!(stats.ground_polys, 6);
        assert_eq!(stats.off_mesh_connections, 0);
        // 7 interior edges, linked both ways
        assert_eq!(stats.links, 14);
        assert_eq!(stats.bmax, [3.0, 0.0, 2.0]);
    }

    #[test]
    fn test_grid_holes() {
        let mesh = PolyMesh::grid(3, 3, 1.0, [0.0; 3], |c, r| !(c == 1 && r == 1)).unwrap();
        assert_eq!(mesh.poly_count(), 8);
        assert!(PolyMesh::grid(2, 2, 1.0, [0.0; 3], |_, _| false).is_err());
    }

    #[test]
    fn test_winding_is_normalized() {
        let verts = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
        ];
        let mesh = PolyMesh::new(&verts, &[vec![0, 1, 2, 3]]).unwrap();
        let pverts = mesh.get_poly_verts(PolyRef::new(1)).unwrap();
        assert!(poly_area_2d(pverts) < 0.0);
    }

    #[test]
    fn test_rejects_bad_polygons() {
        let verts = [[0.0; 3], [1.0, 0.0, 0.0]];
        assert_eq!(
            PolyMesh::new(&verts, &[vec![0, 1]]).unwrap_err(),
            Status::InvalidParam
        );
        assert_eq!(
            PolyMesh::new(&verts, &[vec![0, 1, 5]]).unwrap_err(),
            Status::InvalidParam
        );
    }

    #[test]
    fn test_poly_flags() {
        let mut mesh = PolyMesh::grid(2, 1, 1.0, [0.0; 3], |_, _| true).unwrap();
        let r = PolyRef::new(2);
        assert_eq!(mesh.get_poly_flags(r).unwrap(), PolyFlags::WALK);
        mesh.set_poly_flags(r, PolyFlags::DISABLED).unwrap();
        assert_eq!(mesh.get_poly_flags(r).unwrap(), PolyFlags::DISABLED);
        assert!(mesh.set_poly_flags(PolyRef::new(9), 0).is_err());
        assert!(mesh.set_poly_flags(PolyRef::NULL, 0).is_err());
    }

    #[test]
    fn test_off_mesh_connection_links() {
        // Two islands separated by a gap column
        let mut mesh = PolyMesh::grid(5, 1, 1.0, [0.0; 3], |c, _| c != 2).unwrap();
        let con = OffMeshConnection {
            start: [1.5, 0.0, 0.5],
            end: [3.5, 0.0, 0.5],
            radius: 0.5,
            bidirectional: false,
            flags: PolyFlags::JUMP,
            area: 1,
        };
        let con_ref = mesh.add_off_mesh_connection(&con).unwrap();
        assert_eq!(mesh.get_poly_type(con_ref).unwrap(), PolyType::OffMeshConnection);
        assert_eq!(mesh.stats().off_mesh_connections, 1);
        assert_eq!(mesh.get_neighbours(con_ref).unwrap().len(), 2);
    }
}
