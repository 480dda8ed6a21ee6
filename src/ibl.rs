use crate::cubemap::{Cubemap, Face};
use crate::image_io::Image;
use glam::{DVec2, DVec3, Vec3};
use std::f64::consts::PI;

/// Filtering broadening applied on top of the PDF-implied sample footprint
/// when choosing a source mip level.
const FILTER_K: f64 = 4.0;

pub fn hammersley(i: u32, count: u32) -> DVec2 {
    DVec2::new(i as f64 / count as f64, radical_inverse_vdc(i))
}

fn radical_inverse_vdc(bits: u32) -> f64 {
    let mut b = bits;
    b = (b << 16) | (b >> 16);
    b = ((b & 0x5555_5555) << 1) | ((b & 0xAAAA_AAAA) >> 1);
    b = ((b & 0x3333_3333) << 2) | ((b & 0xCCCC_CCCC) >> 2);
    b = ((b & 0x0F0F_0F0F) << 4) | ((b & 0xF0F0_F0F0) >> 4);
    b = ((b & 0x00FF_00FF) << 8) | ((b & 0xFF00_FF00) >> 8);
    b as f64 * 2.328_306_436_538_696_3e-10
}

/// GGX-distributed half vector in tangent space (+Z up), importance sampled
/// from the NDF for the given linear roughness.
pub fn importance_sample_ggx(u: DVec2, linear_roughness: f64) -> DVec3 {
    let a = linear_roughness.max(1.0e-4);
    let phi = 2.0 * PI * u.x;
    let cos_theta = ((1.0 - u.y) / (1.0 + (a * a - 1.0) * u.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    DVec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

pub fn d_ggx(noh: f64, linear_roughness: f64) -> f64 {
    let a = linear_roughness;
    let f = (a * a - 1.0) * noh * noh + 1.0;
    a * a / (PI * f * f)
}

/// Height-correlated Smith visibility for GGX; includes the 1/(4 NoV NoL)
/// of the specular BRDF denominator.
pub fn visibility_smith_ggx(nov: f64, nol: f64, linear_roughness: f64) -> f64 {
    let a2 = linear_roughness * linear_roughness;
    let lambda_v = nol * (nov * nov * (1.0 - a2) + a2).sqrt();
    let lambda_l = nov * (nol * nol * (1.0 - a2) + a2).sqrt();
    0.5 / (lambda_v + lambda_l)
}

fn tangent_frame(normal: DVec3) -> (DVec3, DVec3) {
    let up = if normal.z.abs() < 0.999 { DVec3::Z } else { DVec3::X };
    let tangent = normal.cross(up).normalize();
    let bitangent = normal.cross(tangent);
    (tangent, bitangent)
}

struct PrefilterSample {
    direction: DVec3,
    weight: f64,
    level: usize,
    next_level: usize,
    level_blend: f32,
}

/// GGX-convolves a whole mip chain into one destination cubemap at the given
/// linear roughness.
///
/// With N == V (the split-sum IBL approximation) the importance-sampled set
/// is the same in every texel's tangent frame, so it is built once: each
/// sample keeps its reflected direction, NdotL weight and the source mip
/// whose solid angle per texel best matches the sample's PDF footprint
/// (filtered importance sampling). Per texel, the set is rotated into the
/// world frame and accumulated with trilinear fetches, normalized by the
/// summed weight.
pub fn roughness_filter(dst: &mut Cubemap, levels: &[Cubemap], linear_roughness: f64, samples: usize) {
    let dim = dst.dim();
    let base = &levels[0];
    if linear_roughness == 0.0 {
        // A mirror level has no blur to apply; sampling noise would only
        // degrade it. Resample the base level directly.
        for face in Face::ALL {
            for y in 0..dim {
                for x in 0..dim {
                    let dir = dst.direction_for(face, x, y);
                    dst.set_texel(face, x, y, base.sample_filtered(dir));
                }
            }
        }
        return;
    }

    let max_level = levels.len() - 1;
    let base_dim = base.dim() as f64;
    // Solid angle of one base-level texel, as if texels split the sphere evenly.
    let omega_p = 4.0 * PI / (6.0 * base_dim * base_dim);

    let mut cache = Vec::with_capacity(samples);
    let mut total_weight = 0.0f64;
    for i in 0..samples {
        let u = hammersley(i as u32, samples as u32);
        let h = importance_sample_ggx(u, linear_roughness);
        // N == V == +Z in tangent space; reflecting V about H gives L.
        let l = 2.0 * h.z * h - DVec3::Z;
        let nol = l.z;
        if nol <= 0.0 {
            continue;
        }
        let noh = h.z;
        // With V == N, VoH == NoH and the PDF collapses to D/4.
        let pdf = d_ggx(noh, linear_roughness) * noh / (4.0 * noh);
        let omega_s = 1.0 / (samples as f64 * pdf);
        let level = log4(omega_s) - log4(omega_p) + log4(FILTER_K);
        let level = level.clamp(0.0, max_level as f64);
        let l0 = level.floor() as usize;
        cache.push(PrefilterSample {
            direction: l,
            weight: nol,
            level: l0,
            next_level: (l0 + 1).min(max_level),
            level_blend: (level - l0 as f64) as f32,
        });
        total_weight += nol;
    }

    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let normal = dst.direction_for(face, x, y).as_dvec3();
                let (tangent, bitangent) = tangent_frame(normal);
                let mut color = Vec3::ZERO;
                for sample in &cache {
                    let l = sample.direction;
                    let world = (tangent * l.x + bitangent * l.y + normal * l.z).as_vec3();
                    let lo = levels[sample.level].sample_filtered(world);
                    let hi = levels[sample.next_level].sample_filtered(world);
                    let radiance = lo + (hi - lo) * sample.level_blend;
                    color += radiance * sample.weight as f32;
                }
                dst.set_texel(face, x, y, color / total_weight as f32);
            }
        }
    }
}

fn log4(x: f64) -> f64 {
    0.5 * x.log2()
}

/// Debug cubemap visualizing the GGX specular lobe for N == V == +Z: each
/// texel holds the BRDF (unit F0) times NdotL for its direction.
pub fn brdf_lobe(dst: &mut Cubemap, linear_roughness: f64) {
    let dim = dst.dim();
    // A perfectly smooth lobe is a dirac; keep the distribution evaluable.
    let linear_roughness = linear_roughness.max(1.0e-4);
    let n = DVec3::Z;
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let l = dst.direction_for(face, x, y).as_dvec3();
                let nol = n.dot(l);
                let value = if nol > 0.0 {
                    let h = (l + n).normalize();
                    let noh = n.dot(h);
                    d_ggx(noh, linear_roughness) * visibility_smith_ggx(1.0, nol, linear_roughness) * nol
                } else {
                    0.0
                };
                dst.set_texel(face, x, y, Vec3::splat(value as f32));
            }
        }
    }
}

/// Precomputed BRDF directional-albedo table over (NdotV, roughness).
pub struct DfgLut {
    pub size: usize,
    pub channels: usize,
    data: Vec<f32>,
}

impl DfgLut {
    pub fn texel(&self, x: usize, y: usize) -> &[f32] {
        let idx = (y * self.size + x) * self.channels;
        &self.data[idx..idx + self.channels]
    }

    pub fn to_image(&self) -> Image {
        let mut img = Image::new(self.size, self.size);
        for y in 0..self.size {
            for x in 0..self.size {
                let t = self.texel(x, y);
                let b = if self.channels > 2 { t[2] } else { 0.0 };
                img.set_pixel(x, y, Vec3::new(t[0], t[1], b));
            }
        }
        img
    }

    /// Flat float array in NdotV-major order, for source-literal emission.
    pub fn flat_ndotv_major(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.size * self.size * self.channels);
        for x in 0..self.size {
            for y in 0..self.size {
                out.extend_from_slice(self.texel(x, y));
            }
        }
        out
    }
}

/// Single-scatter split-sum integral: returns the Fresnel-Schlick scale and
/// bias terms for one (NdotV, roughness) cell.
pub fn dfv(nov: f64, linear_roughness: f64, samples: usize) -> (f64, f64) {
    let v = DVec3::new((1.0 - nov * nov).max(0.0).sqrt(), 0.0, nov);
    let mut scale = 0.0;
    let mut bias = 0.0;
    for i in 0..samples {
        let u = hammersley(i as u32, samples as u32);
        let h = importance_sample_ggx(u, linear_roughness);
        let l = 2.0 * v.dot(h) * h - v;
        let voh = v.dot(h).max(0.0);
        let nol = l.z.max(0.0);
        let noh = h.z.max(0.0);
        if nol > 0.0 {
            let g = visibility_smith_ggx(nov, nol, linear_roughness) * nol * (voh / noh.max(1.0e-8));
            let fc = (1.0 - voh).powi(5);
            scale += g * (1.0 - fc);
            bias += g * fc;
        }
    }
    let norm = 4.0 / samples as f64;
    (scale * norm, bias * norm)
}

/// Multiscatter variant: the energy-preserving reformulation keeps the
/// Fresnel factor on the first channel and the raw visibility sum on the
/// second.
pub fn dfv_multiscatter(nov: f64, linear_roughness: f64, samples: usize) -> (f64, f64) {
    let v = DVec3::new((1.0 - nov * nov).max(0.0).sqrt(), 0.0, nov);
    let mut scale = 0.0;
    let mut bias = 0.0;
    for i in 0..samples {
        let u = hammersley(i as u32, samples as u32);
        let h = importance_sample_ggx(u, linear_roughness);
        let l = 2.0 * v.dot(h) * h - v;
        let voh = v.dot(h).max(0.0);
        let nol = l.z.max(0.0);
        let noh = h.z.max(0.0);
        if nol > 0.0 {
            let g = visibility_smith_ggx(nov, nol, linear_roughness) * nol * (voh / noh.max(1.0e-8));
            let fc = (1.0 - voh).powi(5);
            scale += g * fc;
            bias += g;
        }
    }
    let norm = 4.0 / samples as f64;
    (scale * norm, bias * norm)
}

/// Integrates the DFG LUT. X axis is NdotV, Y axis is roughness, both at
/// cell centers. Two channels for single scatter; the multiscatter table
/// adds the single-scatter directional albedo as a third channel, from which
/// a runtime derives its energy compensation term.
pub fn dfg_lut(size: usize, multiscatter: bool, samples: usize) -> DfgLut {
    let channels = if multiscatter { 3 } else { 2 };
    let mut data = vec![0.0f32; size * size * channels];
    for y in 0..size {
        let coord = (y as f64 + 0.5) / size as f64;
        let linear_roughness = coord * coord;
        for x in 0..size {
            let nov = (x as f64 + 0.5) / size as f64;
            let idx = (y * size + x) * channels;
            if multiscatter {
                let (scale, bias) = dfv_multiscatter(nov, linear_roughness, samples);
                let (ss_scale, ss_bias) = dfv(nov, linear_roughness, samples);
                data[idx] = scale as f32;
                data[idx + 1] = bias as f32;
                data[idx + 2] = (ss_scale + ss_bias) as f32;
            } else {
                let (scale, bias) = dfv(nov, linear_roughness, samples);
                data[idx] = scale as f32;
                data[idx + 1] = bias as f32;
            }
        }
    }
    DfgLut { size, channels, data }
}
