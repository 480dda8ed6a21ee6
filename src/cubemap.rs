use crate::image_io::Image;
use glam::Vec3;

/// Cube faces in the order they are indexed everywhere in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    PX,
    NX,
    PY,
    NY,
    PZ,
    NZ,
}

impl Face {
    pub const ALL: [Face; 6] = [Face::PX, Face::NX, Face::PY, Face::NY, Face::PZ, Face::NZ];

    pub fn name(self) -> &'static str {
        match self {
            Face::PX => "px",
            Face::NX => "nx",
            Face::PY => "py",
            Face::NY => "ny",
            Face::PZ => "pz",
            Face::NZ => "nz",
        }
    }

    /// Face origin inside the horizontal-cross backing image, in units of the
    /// face dimension.
    fn cross_origin(self) -> (usize, usize) {
        match self {
            Face::NX => (0, 1),
            Face::PZ => (1, 1),
            Face::PX => (2, 1),
            Face::NZ => (3, 1),
            Face::PY => (1, 0),
            Face::NY => (1, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

impl Edge {
    const ALL: [Edge; 4] = [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right];
}

/// Six equal square faces over a packed horizontal-cross backing image.
///
/// The one-texel border ring of every face is a guard band: after
/// `make_seamless` it duplicates the first interior row/column of the
/// adjacent face, so bilinear fetches near a seam blend the same values no
/// matter which face they go through.
pub struct Cubemap {
    dim: usize,
    image: Image,
}

impl Cubemap {
    /// Allocates a cubemap of the given face dimension. The dimension must be
    /// a power of two; callers validate user-provided sizes before reaching
    /// this point.
    pub fn new(dim: usize) -> Self {
        debug_assert!(dim.is_power_of_two(), "cubemap dimension must be a power of two");
        Self { dim, image: Image::new(4 * dim, 3 * dim) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    fn face_origin(&self, face: Face) -> (usize, usize) {
        let (ox, oy) = face.cross_origin();
        (ox * self.dim, oy * self.dim)
    }

    pub fn texel(&self, face: Face, x: usize, y: usize) -> Vec3 {
        let (ox, oy) = self.face_origin(face);
        self.image.pixel(ox + x, oy + y)
    }

    pub fn set_texel(&mut self, face: Face, x: usize, y: usize, value: Vec3) {
        let (ox, oy) = self.face_origin(face);
        self.image.set_pixel(ox + x, oy + y, value);
    }

    /// Direction through the center of a texel.
    pub fn direction_for(&self, face: Face, x: usize, y: usize) -> Vec3 {
        let cx = (2.0 * (x as f32 + 0.5)) / self.dim as f32 - 1.0;
        let cy = 1.0 - (2.0 * (y as f32 + 0.5)) / self.dim as f32;
        direction_at(face, cx, cy)
    }

    /// Inverse of the direction mapping: the face the direction lands on and
    /// continuous texel coordinates on it (integers are texel centers).
    pub fn address_of(&self, dir: Vec3) -> (Face, f32, f32) {
        let (face, cx, cy) = face_address(dir);
        let x = (cx + 1.0) * 0.5 * self.dim as f32 - 0.5;
        let y = (1.0 - cy) * 0.5 * self.dim as f32 - 0.5;
        (face, x, y)
    }

    /// Bilinear fetch along a direction. Taps are clamped to the face, which
    /// is where the guard ring earns its keep: the clamped taps hold the
    /// neighboring face's content.
    pub fn sample_filtered(&self, dir: Vec3) -> Vec3 {
        let (face, x, y) = self.address_of(dir);
        self.filter_at(face, x, y)
    }

    pub fn filter_at(&self, face: Face, x: f32, y: f32) -> Vec3 {
        let max = (self.dim - 1) as f32;
        let x0f = x.floor();
        let y0f = y.floor();
        let tx = x - x0f;
        let ty = y - y0f;
        let x0 = x0f.clamp(0.0, max) as usize;
        let x1 = (x0f + 1.0).clamp(0.0, max) as usize;
        let y0 = y0f.clamp(0.0, max) as usize;
        let y1 = (y0f + 1.0).clamp(0.0, max) as usize;
        let c00 = self.texel(face, x0, y0);
        let c10 = self.texel(face, x1, y0);
        let c01 = self.texel(face, x0, y1);
        let c11 = self.texel(face, x1, y1);
        let c0 = c00 * (1.0 - tx) + c10 * tx;
        let c1 = c01 * (1.0 - tx) + c11 * tx;
        c0 * (1.0 - ty) + c1 * ty
    }

    /// Differential solid angle subtended by a texel. Texels near cube
    /// corners subtend less; every integral over the direction domain weights
    /// by this.
    pub fn solid_angle(dim: usize, x: usize, y: usize) -> f64 {
        let idim = 1.0 / dim as f64;
        let s = 2.0 * (x as f64 + 0.5) * idim - 1.0;
        let t = 2.0 * (y as f64 + 0.5) * idim - 1.0;
        let x0 = s - idim;
        let y0 = t - idim;
        let x1 = s + idim;
        let y1 = t + idim;
        sphere_quadrant_area(x0, y0) - sphere_quadrant_area(x0, y1) - sphere_quadrant_area(x1, y0)
            + sphere_quadrant_area(x1, y1)
    }

    /// Rewrites every face's guard ring from its neighbors' first interior
    /// texels, then fills corner texels with the average of their two
    /// adjacent ring texels. Interior texels are never touched. Must run
    /// after every content write and before anything samples across seams.
    pub fn make_seamless(&mut self) {
        let dim = self.dim;
        if dim < 4 {
            // No interior rows exist to duplicate from; the guard-band model
            // degenerates and the texels keep their projected values.
            return;
        }
        for face in Face::ALL {
            for edge in Edge::ALL {
                let link = self.edge_link(face, edge);
                for i in 1..dim - 1 {
                    let j = if link.reversed { dim - 1 - i } else { i };
                    let (sx, sy) = interior_texel(link.edge, j, dim);
                    let v = self.texel(link.face, sx, sy);
                    let (dx, dy) = border_texel(edge, i, dim);
                    self.set_texel(face, dx, dy, v);
                }
            }
        }
        for face in Face::ALL {
            let m = dim - 1;
            let corners = [
                ((0, 0), (1, 0), (0, 1)),
                ((m, 0), (m - 1, 0), (m, 1)),
                ((0, m), (1, m), (0, m - 1)),
                ((m, m), (m - 1, m), (m, m - 1)),
            ];
            for (corner, a, b) in corners {
                let value = (self.texel(face, a.0, a.1) + self.texel(face, b.0, b.1)) * 0.5;
                self.set_texel(face, corner.0, corner.1, value);
            }
        }
    }

    /// Which face/edge lies across a given edge, and whether indices run the
    /// other way. Derived from the direction mapping itself by probing just
    /// beyond the edge, so it can never disagree with the projection math.
    fn edge_link(&self, face: Face, edge: Edge) -> EdgeLink {
        let probe = |t: f32| -> (Face, Edge, f32) {
            let delta = 0.5 / self.dim as f32;
            let (cx, cy) = match edge {
                Edge::Top => (2.0 * t - 1.0, 1.0 + delta),
                Edge::Bottom => (2.0 * t - 1.0, -1.0 - delta),
                Edge::Left => (-1.0 - delta, 1.0 - 2.0 * t),
                Edge::Right => (1.0 + delta, 1.0 - 2.0 * t),
            };
            let dir = direction_at(face, cx, cy);
            let (other, x, y) = self.address_of(dir);
            let max = self.dim as f32 - 0.5;
            let distances = [
                (y + 0.5, Edge::Top),
                (max - y, Edge::Bottom),
                (x + 0.5, Edge::Left),
                (max - x, Edge::Right),
            ];
            let (_, other_edge) = distances
                .into_iter()
                .fold((f32::MAX, Edge::Top), |best, (d, e)| if d < best.0 { (d, e) } else { best });
            let along = match other_edge {
                Edge::Top | Edge::Bottom => x,
                Edge::Left | Edge::Right => y,
            };
            (other, other_edge, along)
        };
        let (face_a, edge_a, along_a) = probe(0.3);
        let (face_b, edge_b, along_b) = probe(0.7);
        debug_assert_eq!(face_a, face_b);
        debug_assert_eq!(edge_a, edge_b);
        EdgeLink { face: face_a, edge: edge_a, reversed: along_b < along_a }
    }
}

struct EdgeLink {
    face: Face,
    edge: Edge,
    reversed: bool,
}

/// Border texel at index `i` along an edge.
fn border_texel(edge: Edge, i: usize, dim: usize) -> (usize, usize) {
    match edge {
        Edge::Top => (i, 0),
        Edge::Bottom => (i, dim - 1),
        Edge::Left => (0, i),
        Edge::Right => (dim - 1, i),
    }
}

/// First interior texel (one step inward from the guard ring) at index `i`
/// along an edge.
fn interior_texel(edge: Edge, i: usize, dim: usize) -> (usize, usize) {
    match edge {
        Edge::Top => (i, 1),
        Edge::Bottom => (i, dim - 2),
        Edge::Left => (1, i),
        Edge::Right => (dim - 2, i),
    }
}

/// Continuous face coordinates to a unit direction. `cx` runs left to right,
/// `cy` bottom to top, both [-1, 1] on the face.
pub fn direction_at(face: Face, cx: f32, cy: f32) -> Vec3 {
    match face {
        Face::PX => Vec3::new(1.0, cy, -cx),
        Face::NX => Vec3::new(-1.0, cy, cx),
        Face::PY => Vec3::new(cx, 1.0, -cy),
        Face::NY => Vec3::new(cx, -1.0, cy),
        Face::PZ => Vec3::new(cx, cy, 1.0),
        Face::NZ => Vec3::new(-cx, cy, -1.0),
    }
    .normalize()
}

/// Major-axis face selection plus the face-local coordinates of a direction.
fn face_address(dir: Vec3) -> (Face, f32, f32) {
    let ax = dir.x.abs();
    let ay = dir.y.abs();
    let az = dir.z.abs();
    if ax >= ay && ax >= az {
        if dir.x > 0.0 {
            (Face::PX, -dir.z / ax, dir.y / ax)
        } else {
            (Face::NX, dir.z / ax, dir.y / ax)
        }
    } else if ay >= az {
        if dir.y > 0.0 {
            (Face::PY, dir.x / ay, -dir.z / ay)
        } else {
            (Face::NY, dir.x / ay, dir.z / ay)
        }
    } else if dir.z > 0.0 {
        (Face::PZ, dir.x / az, dir.y / az)
    } else {
        (Face::NZ, -dir.x / az, dir.y / az)
    }
}

fn sphere_quadrant_area(x: f64, y: f64) -> f64 {
    (x * y).atan2((x * x + y * y + 1.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(dir: Vec3) -> Vec3 {
        // Smooth, face-asymmetric content so index bugs show up as mismatches.
        Vec3::new(
            0.5 + 0.5 * dir.x,
            0.5 + 0.25 * dir.y + 0.25 * dir.z * dir.x,
            0.5 + 0.5 * dir.z * dir.y,
        )
    }

    fn projected(dim: usize) -> Cubemap {
        let mut cm = Cubemap::new(dim);
        for face in Face::ALL {
            for y in 0..dim {
                for x in 0..dim {
                    let dir = cm.direction_for(face, x, y);
                    cm.set_texel(face, x, y, checker(dir));
                }
            }
        }
        cm
    }

    #[test]
    fn direction_mapping_is_a_bijection() {
        for dim in [8usize, 32] {
            let cm = Cubemap::new(dim);
            for face in Face::ALL {
                for y in 0..dim {
                    for x in 0..dim {
                        let dir = cm.direction_for(face, x, y);
                        let (face2, fx, fy) = cm.address_of(dir);
                        assert_eq!(face, face2, "face changed at {face:?} {x},{y} dim {dim}");
                        assert!(
                            (fx - x as f32).abs() < 1e-3 && (fy - y as f32).abs() < 1e-3,
                            "texel drifted: {face:?} ({x},{y}) -> ({fx},{fy})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn solid_angles_cover_the_sphere() {
        for dim in [4usize, 16, 64] {
            let mut total = 0.0;
            for y in 0..dim {
                for x in 0..dim {
                    total += Cubemap::solid_angle(dim, x, y);
                }
            }
            total *= 6.0;
            let expected = 4.0 * std::f64::consts::PI;
            assert!(
                (total - expected).abs() < 1e-9,
                "solid angles sum to {total}, expected {expected} (dim {dim})"
            );
        }
    }

    #[test]
    fn make_seamless_duplicates_neighbor_interiors() {
        let dim = 16;
        let mut cm = projected(dim);
        cm.make_seamless();
        for face in Face::ALL {
            for edge in Edge::ALL {
                let link = cm.edge_link(face, edge);
                for i in 1..dim - 1 {
                    let j = if link.reversed { dim - 1 - i } else { i };
                    let (bx, by) = border_texel(edge, i, dim);
                    let (sx, sy) = interior_texel(link.edge, j, dim);
                    let border = cm.texel(face, bx, by);
                    let source = cm.texel(link.face, sx, sy);
                    assert_eq!(border, source, "seam copy differs at {face:?}/{edge:?} i={i}");
                    // The two texels must be physically close on the sphere;
                    // this catches a topologically wrong link even though the
                    // copy above would still "pass".
                    let d0 = cm.direction_for(face, bx, by);
                    let d1 = cm.direction_for(link.face, sx, sy);
                    let texel_angle = 2.0 / dim as f32;
                    assert!(
                        d0.dot(d1) > (3.0 * texel_angle).cos(),
                        "linked texels are far apart at {face:?}/{edge:?} i={i}"
                    );
                }
            }
        }
    }

    #[test]
    fn make_seamless_leaves_interior_untouched() {
        let dim = 8;
        let mut cm = projected(dim);
        let before = cm.image().data().to_vec();
        cm.make_seamless();
        for face in Face::ALL {
            for y in 1..dim - 1 {
                for x in 1..dim - 1 {
                    let dir = cm.direction_for(face, x, y);
                    assert_eq!(cm.texel(face, x, y), checker(dir), "interior changed at {face:?} {x},{y}");
                }
            }
        }
        // At least one ring texel must have changed for this test to mean anything.
        assert_ne!(before, cm.image().data(), "make_seamless wrote nothing");
    }

    #[test]
    fn make_seamless_keeps_constant_cubemaps_constant() {
        let dim = 8;
        let mut cm = Cubemap::new(dim);
        for face in Face::ALL {
            for y in 0..dim {
                for x in 0..dim {
                    cm.set_texel(face, x, y, Vec3::splat(0.42));
                }
            }
        }
        cm.make_seamless();
        for face in Face::ALL {
            for y in 0..dim {
                for x in 0..dim {
                    assert_eq!(cm.texel(face, x, y), Vec3::splat(0.42));
                }
            }
        }
    }

    #[test]
    fn corner_texels_average_their_ring_neighbors() {
        let dim = 16;
        let mut cm = projected(dim);
        cm.make_seamless();
        for face in Face::ALL {
            let m = dim - 1;
            let expected = (cm.texel(face, 1, 0) + cm.texel(face, 0, 1)) * 0.5;
            assert_eq!(cm.texel(face, 0, 0), expected, "corner rule broken on {face:?}");
            let expected = (cm.texel(face, m - 1, m) + cm.texel(face, m, m - 1)) * 0.5;
            assert_eq!(cm.texel(face, m, m), expected, "corner rule broken on {face:?}");
        }
    }
}
