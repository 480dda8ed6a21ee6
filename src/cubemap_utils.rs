use crate::cubemap::{Cubemap, Face};
use crate::image_io::Image;
use glam::Vec3;
use std::f32::consts::{PI, TAU};

/// Copies a cross-layout source image into a cubemap. Accepts the horizontal
/// (4:3) layout the backing store uses and the vertical (3:4) layout, whose
/// bottom face holds -Z rotated 180 degrees. Size and aspect validation is
/// the caller's job.
pub fn copy_cross_image(dst: &mut Cubemap, src: &Image, horizontal: bool) {
    let dim = dst.dim();
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let (sx, sy) = cross_source_texel(face, x, y, dim, horizontal);
                dst.set_texel(face, x, y, src.pixel(sx, sy));
            }
        }
    }
}

fn cross_source_texel(face: Face, x: usize, y: usize, dim: usize, horizontal: bool) -> (usize, usize) {
    if horizontal {
        let (ox, oy) = match face {
            Face::NX => (0, 1),
            Face::PZ => (1, 1),
            Face::PX => (2, 1),
            Face::NZ => (3, 1),
            Face::PY => (1, 0),
            Face::NY => (1, 2),
        };
        (ox * dim + x, oy * dim + y)
    } else {
        match face {
            Face::NX => (x, dim + y),
            Face::PZ => (dim + x, dim + y),
            Face::PX => (2 * dim + x, dim + y),
            Face::PY => (dim + x, y),
            Face::NY => (dim + x, 2 * dim + y),
            // Bottom arm of the vertical cross stores -Z upside down.
            Face::NZ => (dim + (dim - 1 - x), 3 * dim + (dim - 1 - y)),
        }
    }
}

/// Projects an equirectangular (2:1 longitude/latitude) image onto a cubemap
/// with one bilinear source fetch per destination texel.
pub fn equirectangular_to_cubemap(dst: &mut Cubemap, src: &Image) {
    let dim = dst.dim();
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let dir = dst.direction_for(face, x, y);
                dst.set_texel(face, x, y, sample_equirect(src, dir));
            }
        }
    }
}

pub fn sample_equirect(src: &Image, dir: Vec3) -> Vec3 {
    let d = dir.normalize();
    let theta = d.y.clamp(-1.0, 1.0).acos();
    let phi = d.z.atan2(d.x);
    let u = (phi + PI) / TAU;
    let v = theta / PI;
    src.sample_wrapped(u, v)
}

/// Reflects the direction domain across the X axis, converting between
/// renderer handedness conventions: the two X faces swap and every face
/// flips horizontally. Exact texel remap, no resampling.
pub fn mirror_cubemap(dst: &mut Cubemap, src: &Cubemap) {
    debug_assert_eq!(dst.dim(), src.dim());
    let dim = dst.dim();
    for face in Face::ALL {
        let source_face = match face {
            Face::PX => Face::NX,
            Face::NX => Face::PX,
            other => other,
        };
        for y in 0..dim {
            for x in 0..dim {
                dst.set_texel(face, x, y, src.texel(source_face, dim - 1 - x, y));
            }
        }
    }
}

/// Deterministic per-face debug pattern: a grid of `density` cells per face
/// over a light background, lines tinted by face.
pub fn generate_uv_grid(dst: &mut Cubemap, density: usize) {
    let dim = dst.dim();
    let cells = density.clamp(1, dim);
    let cell = (dim / cells).max(1);
    let thickness = (dim / 32).max(1);
    for face in Face::ALL {
        let tint = face_tint(face);
        for y in 0..dim {
            for x in 0..dim {
                let on_line = x % cell < thickness || y % cell < thickness;
                let value = if on_line { tint } else { Vec3::splat(0.9) };
                dst.set_texel(face, x, y, value);
            }
        }
    }
}

fn face_tint(face: Face) -> Vec3 {
    match face {
        Face::PX => Vec3::new(0.8, 0.1, 0.1),
        Face::NX => Vec3::new(0.4, 0.05, 0.05),
        Face::PY => Vec3::new(0.1, 0.8, 0.1),
        Face::NY => Vec3::new(0.05, 0.4, 0.05),
        Face::PZ => Vec3::new(0.1, 0.1, 0.8),
        Face::NZ => Vec3::new(0.05, 0.05, 0.4),
    }
}

/// Box-filters one mip level into the next. Each 2x2 block is averaged with
/// per-texel solid-angle weights; a plain planar average over-weights texels
/// near cube edges.
pub fn downsample(dst: &mut Cubemap, src: &Cubemap) {
    debug_assert_eq!(src.dim(), dst.dim() * 2);
    let dim = dst.dim();
    let sdim = src.dim();
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let mut sum = Vec3::ZERO;
                let mut weight = 0.0f32;
                for dy in 0..2 {
                    for dx in 0..2 {
                        let sx = 2 * x + dx;
                        let sy = 2 * y + dy;
                        let w = Cubemap::solid_angle(sdim, sx, sy) as f32;
                        sum += src.texel(face, sx, sy) * w;
                        weight += w;
                    }
                }
                dst.set_texel(face, x, y, sum / weight);
            }
        }
    }
}

/// Builds the full mip pyramid from a seamless base level, re-repairing
/// seams after each downsample. A base of dimension D yields log2(D)+1
/// levels, the last of dimension 1.
pub fn generate_mipmaps(base: Cubemap) -> Vec<Cubemap> {
    let mut levels = vec![base];
    while levels.last().map(Cubemap::dim) != Some(1) {
        let src = levels.last().expect("at least the base level exists");
        let mut next = Cubemap::new(src.dim() / 2);
        downsample(&mut next, src);
        next.make_seamless();
        levels.push(next);
    }
    levels
}
