use crate::cubemap::{Cubemap, Face};
use anyhow::{ensure, Context, Result};
use glam::DVec3;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const MAX_BANDS: usize = 3;

// Orthonormalization constants for the real SH basis up to band 2.
const K00: f64 = 0.282_094_791_773_878_14;
const K1: f64 = 0.488_602_511_902_919_92;
const K2_OFF: f64 = 1.092_548_430_592_079_2;
const K20: f64 = 0.315_391_565_252_520_05;
const K22: f64 = 0.546_274_215_296_039_6;

// Truncated cosine lobe per band: convolving radiance with these turns the
// projection into irradiance.
const COS_LOBE: [f64; MAX_BANDS] = [
    std::f64::consts::PI,
    2.0 * std::f64::consts::PI / 3.0,
    std::f64::consts::PI / 4.0,
];

/// Basis values at a direction, band-major, `bands * bands` entries.
pub fn basis(dir: DVec3, bands: usize, out: &mut [f64]) {
    debug_assert!(bands >= 1 && bands <= MAX_BANDS);
    debug_assert_eq!(out.len(), bands * bands);
    let (x, y, z) = (dir.x, dir.y, dir.z);
    out[0] = K00;
    if bands > 1 {
        out[1] = K1 * y;
        out[2] = K1 * z;
        out[3] = K1 * x;
    }
    if bands > 2 {
        out[4] = K2_OFF * x * y;
        out[5] = K2_OFF * y * z;
        out[6] = K20 * (3.0 * z * z - 1.0);
        out[7] = K2_OFF * x * z;
        out[8] = K22 * (x * x - y * y);
    }
}

fn band_of(index: usize) -> usize {
    (index as f64).sqrt() as usize
}

/// Normalization constant of coefficient `index`, for folding the basis into
/// shader-side polynomial evaluation.
fn k_of(index: usize) -> f64 {
    match index {
        0 => K00,
        1..=3 => K1,
        4 | 5 | 7 => K2_OFF,
        6 => K20,
        _ => K22,
    }
}

/// Projects a cubemap's radiance onto the SH basis: for each coefficient,
/// the sum of radiance x basis x texel solid angle over every texel of every
/// face. Accumulation runs in f64; low-frequency bands cancel catastrophically
/// in f32.
pub fn project_cubemap(cm: &Cubemap, bands: usize) -> Vec<DVec3> {
    debug_assert!(bands >= 1 && bands <= MAX_BANDS);
    let count = bands * bands;
    let mut coefficients = vec![DVec3::ZERO; count];
    let mut values = vec![0.0f64; count];
    let dim = cm.dim();
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let dir = cm.direction_for(face, x, y).as_dvec3().normalize();
                let radiance = cm.texel(face, x, y).as_dvec3();
                let weight = Cubemap::solid_angle(dim, x, y);
                basis(dir, bands, &mut values);
                for (coefficient, value) in coefficients.iter_mut().zip(&values) {
                    *coefficient += radiance * (value * weight);
                }
            }
        }
    }
    coefficients
}

/// Scales each band by the truncated-cosine lobe, turning projected radiance
/// into irradiance.
pub fn convolve_irradiance(coefficients: &mut [DVec3]) {
    for (index, coefficient) in coefficients.iter_mut().enumerate() {
        *coefficient *= COS_LOBE[band_of(index)];
    }
}

/// Folds the Lambertian 1/pi and the basis normalization into the
/// coefficients so a shader evaluates plain polynomials
/// (1, y, z, x, xy, yz, 3z^2-1, xz, x^2-y^2) and dot-products directly.
/// Expects irradiance-convolved input.
pub fn rescale_for_shader(coefficients: &mut [DVec3]) {
    for (index, coefficient) in coefficients.iter_mut().enumerate() {
        *coefficient *= k_of(index) / std::f64::consts::PI;
    }
}

/// Reconstructs the SH approximation back into a cubemap, for visual
/// inspection of what the coefficients actually encode.
pub fn render_to_cubemap(coefficients: &[DVec3], bands: usize, dim: usize) -> Cubemap {
    let mut cm = Cubemap::new(dim);
    let mut values = vec![0.0f64; bands * bands];
    for face in Face::ALL {
        for y in 0..dim {
            for x in 0..dim {
                let dir = cm.direction_for(face, x, y).as_dvec3().normalize();
                basis(dir, bands, &mut values);
                let mut color = DVec3::ZERO;
                for (coefficient, value) in coefficients.iter().zip(&values) {
                    color += *coefficient * *value;
                }
                cm.set_texel(face, x, y, color.as_vec3());
            }
        }
    }
    cm
}

/// One coefficient per line, `R G B`, band-major order.
pub fn format_text(coefficients: &[DVec3]) -> String {
    let mut out = String::new();
    for c in coefficients {
        let _ = writeln!(out, "{:.9} {:.9} {:.9}", c.x, c.y, c.z);
    }
    out
}

pub fn write_text(coefficients: &[DVec3], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory '{}'", parent.display()))?;
        }
    }
    fs::write(path, format_text(coefficients))
        .with_context(|| format!("writing SH coefficients to '{}'", path.display()))
}

pub fn parse_bands(raw: &str, fallback: usize) -> Result<usize> {
    match raw.parse::<usize>() {
        // An unparsable band count keeps the prior default.
        Err(_) => Ok(fallback),
        Ok(bands) => {
            ensure!(
                (1..=MAX_BANDS).contains(&bands),
                "SH band count must be between 1 and {MAX_BANDS}, got {bands}"
            );
            Ok(bands)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn constant_cubemap(dim: usize, value: Vec3) -> Cubemap {
        let mut cm = Cubemap::new(dim);
        for face in Face::ALL {
            for y in 0..dim {
                for x in 0..dim {
                    cm.set_texel(face, x, y, value);
                }
            }
        }
        cm
    }

    #[test]
    fn constant_radiance_projects_onto_band_zero_only() {
        let gray = Vec3::splat(0.5);
        let cm = constant_cubemap(32, gray);
        let coefficients = project_cubemap(&cm, 3);
        // Band 0 carries the constant: c0 = C * K00 * 4pi.
        let expected = 0.5 * K00 * 4.0 * std::f64::consts::PI;
        assert!(
            (coefficients[0].x - expected).abs() < 1e-6,
            "band 0 off: {} vs {expected}",
            coefficients[0].x
        );
        for (index, c) in coefficients.iter().enumerate().skip(1) {
            assert!(
                c.abs().max_element() < 1e-9,
                "band {index} should vanish for constant radiance, got {c:?}"
            );
        }
    }

    #[test]
    fn reconstruction_recovers_a_constant() {
        let cm = constant_cubemap(16, Vec3::new(0.2, 0.5, 0.8));
        let coefficients = project_cubemap(&cm, 3);
        let rendered = render_to_cubemap(&coefficients, 3, 8);
        for face in Face::ALL {
            for y in 0..8 {
                for x in 0..8 {
                    let texel = rendered.texel(face, x, y);
                    assert!(
                        (texel - Vec3::new(0.2, 0.5, 0.8)).abs().max_element() < 1e-4,
                        "reconstruction drifted at {face:?} {x},{y}: {texel:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn shader_scaling_turns_a_constant_into_itself() {
        // For constant radiance C the shader pipeline (project, convolve,
        // rescale) must hand the shader exactly C in coefficient 0, since the
        // polynomial basis starts with 1.
        let cm = constant_cubemap(32, Vec3::splat(0.73));
        let mut coefficients = project_cubemap(&cm, 3);
        convolve_irradiance(&mut coefficients);
        rescale_for_shader(&mut coefficients);
        assert!(
            (coefficients[0].x - 0.73).abs() < 1e-6,
            "shader coefficient 0 should equal the constant, got {}",
            coefficients[0].x
        );
    }

    #[test]
    fn text_output_is_band_major_one_line_per_coefficient() {
        let coefficients = vec![DVec3::new(1.0, 2.0, 3.0), DVec3::new(-0.5, 0.0, 0.25)];
        let text = format_text(&coefficients);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Vec<f64> = lines[0].split_whitespace().map(|v| v.parse().unwrap()).collect();
        assert_eq!(first, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn band_count_parsing_keeps_default_on_garbage() {
        assert_eq!(parse_bands("definitely-not-a-number", 3).unwrap(), 3);
        assert_eq!(parse_bands("2", 3).unwrap(), 2);
        assert!(parse_bands("7", 3).is_err());
    }

    #[test]
    fn basis_matches_known_directions() {
        let mut values = [0.0f64; 9];
        basis(DVec3::Z, 3, &mut values);
        assert!((values[0] - K00).abs() < 1e-12);
        assert!((values[2] - K1).abs() < 1e-12);
        assert!((values[6] - K20 * 2.0).abs() < 1e-12);
        assert!(values[1].abs() < 1e-12 && values[3].abs() < 1e-12);
    }
}
