use crate::cli::DFG_SOURCE_EXTENSIONS;
use crate::config::{BakeConfig, DfgOptions, InputSource, ShOptions};
use crate::cubemap::{Cubemap, Face};
use crate::cubemap_utils;
use crate::ibl::{self, DfgLut};
use crate::image_io::{self, Image, OutputFormat};
use crate::sh;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Runs a full bake. Stages execute in a fixed order because each consumes
/// the seamless output of the previous one: decode/generate, mip chain,
/// mirror, then SH / mipmap dump / prefilter / extraction.
pub fn run(config: &BakeConfig) -> Result<()> {
    if let Some(dfg) = &config.dfg {
        progress(config, "Generating IBL DFG LUT...");
        write_dfg(config, dfg)?;
    }

    let Some(input) = &config.input else {
        return Ok(());
    };

    let base = load_base_cubemap(config, input)?;
    let mut levels = cubemap_utils::generate_mipmaps(base);

    if config.mirror {
        progress(config, "Mirroring...");
        levels = mirror_levels(&levels);
    }

    if let Some(sh_options) = &config.sh {
        progress(config, "Spherical harmonics...");
        output_sh(config, sh_options, &levels[0])?;
    }

    if let Some(dir) = &config.is_mipmap_dir {
        progress(config, "IBL mipmaps for prefiltered importance sampling...");
        write_mipmap_chain(config, &levels, dir)?;
    }

    if let Some(dir) = &config.prefilter_dir {
        progress(config, "IBL prefiltering...");
        write_prefiltered_levels(config, &levels, dir)?;
    }

    if let Some(dir) = &config.extract_dir {
        let source;
        let cubemap = if config.extract_blur != 0.0 {
            progress(config, "Blurring...");
            let linear_roughness = config.extract_blur * config.extract_blur;
            let dim = config.size.unwrap_or(levels[0].dim());
            let mut blurred = Cubemap::new(dim);
            ibl::roughness_filter(&mut blurred, &levels, linear_roughness, config.samples);
            blurred.make_seamless();
            source = blurred;
            &source
        } else {
            &levels[0]
        };
        progress(config, "Extracting faces...");
        write_faces(config, cubemap, dir)?;
    }

    if let Some(dir) = &config.deploy_dir {
        write_manifest(config, input, &levels, dir)?;
    }

    Ok(())
}

/// Builds the seamless base level from the input descriptor. File inputs are
/// classified by aspect ratio: 4:3 / 3:4 crosses (power-of-two face
/// dimension) are copied, 2:1 equirectangular images are projected.
pub fn load_base_cubemap(config: &BakeConfig, input: &InputSource) -> Result<Cubemap> {
    let mut cubemap = match input {
        InputSource::File(path) => {
            progress(config, "Decoding image...");
            let mut img = image_io::decode(path)?;
            img.clamp_channels();
            let (w, h) = (img.width(), img.height());
            if w * 3 == h * 4 && (w / 4).is_power_of_two() {
                progress(config, "Loading horizontal cross...");
                let mut cm = Cubemap::new(w / 4);
                cubemap_utils::copy_cross_image(&mut cm, &img, true);
                cm
            } else if h * 3 == w * 4 && (h / 4).is_power_of_two() {
                progress(config, "Loading vertical cross...");
                let mut cm = Cubemap::new(h / 4);
                cubemap_utils::copy_cross_image(&mut cm, &img, false);
                cm
            } else if w == 2 * h {
                progress(config, "Converting equirectangular image...");
                let mut cm = Cubemap::new(config.base_size());
                cubemap_utils::equirectangular_to_cubemap(&mut cm, &img);
                cm
            } else {
                bail!(
                    "aspect ratio {w}x{h} not supported; expected 2:1 equirectangular, \
                     4:3 horizontal cross or 3:4 vertical cross (power-of-two faces)"
                );
            }
        }
        InputSource::UvGrid(density) => {
            progress(config, "Generating UV grid...");
            let mut cm = Cubemap::new(config.base_size());
            cubemap_utils::generate_uv_grid(&mut cm, *density);
            cm
        }
        InputSource::BrdfLobe(param) => {
            progress(config, "Generating BRDF lobe...");
            let dim = config.base_size();
            let linear_roughness = (*param as f64 / (dim as f64).log2()).powi(2);
            let mut cm = Cubemap::new(dim);
            ibl::brdf_lobe(&mut cm, linear_roughness);
            cm
        }
    };
    cubemap.make_seamless();
    Ok(cubemap)
}

fn mirror_levels(levels: &[Cubemap]) -> Vec<Cubemap> {
    levels
        .iter()
        .map(|level| {
            let mut mirrored = Cubemap::new(level.dim());
            cubemap_utils::mirror_cubemap(&mut mirrored, level);
            mirrored.make_seamless();
            mirrored
        })
        .collect()
}

fn output_sh(config: &BakeConfig, options: &ShOptions, base: &Cubemap) -> Result<()> {
    let mut coefficients = sh::project_cubemap(base, options.bands);
    if options.irradiance {
        sh::convolve_irradiance(&mut coefficients);
    }
    if options.shader {
        sh::rescale_for_shader(&mut coefficients);
    }
    if !config.quiet {
        print!("{}", sh::format_text(&coefficients));
    }
    if let Some(path) = &options.output {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        if ext == "txt" {
            sh::write_text(&coefficients, path)?;
        } else {
            // Image destination: render the reconstruction so the
            // coefficients can be eyeballed next to the source.
            let rendered = sh::render_to_cubemap(&coefficients, options.bands, base.dim());
            let format = OutputFormat::from_name(&ext)?;
            image_io::encode(rendered.image(), path, format, config.compression.as_deref())?;
        }
    }
    Ok(())
}

fn write_mipmap_chain(config: &BakeConfig, levels: &[Cubemap], dir: &Path) -> Result<()> {
    let ext = config.format.extension();
    for (index, level) in levels.iter().enumerate() {
        let path = dir.join(format!("is_m{index}.{ext}"));
        image_io::encode(level.image(), &path, config.format, config.compression.as_deref())?;
    }
    Ok(())
}

fn write_prefiltered_levels(config: &BakeConfig, levels: &[Cubemap], dir: &Path) -> Result<()> {
    let ext = config.format.extension();
    let count = levels.len();
    let mut samples = config.samples;
    for index in 0..count {
        let dim = levels[0].dim() >> index;
        // Rougher levels integrate a wider lobe; give them more samples.
        if index >= 2 {
            samples *= 2;
        }
        let roughness = if count > 1 { index as f64 / (count - 1) as f64 } else { 0.0 };
        let linear_roughness = roughness * roughness;
        if !config.quiet {
            println!("  level {index}: {dim}x{dim}, roughness {roughness:.3}, {samples} samples");
        }
        let mut filtered = Cubemap::new(dim);
        ibl::roughness_filter(&mut filtered, levels, linear_roughness, samples);
        filtered.make_seamless();
        let path = dir.join(format!("m{index}.{ext}"));
        image_io::encode(filtered.image(), &path, config.format, config.compression.as_deref())?;
    }
    Ok(())
}

fn write_faces(config: &BakeConfig, cubemap: &Cubemap, dir: &Path) -> Result<()> {
    let ext = config.format.extension();
    for face in Face::ALL {
        let img = extract_face_image(cubemap, face);
        let path = dir.join(format!("{}.{ext}", face.name()));
        image_io::encode(&img, &path, config.format, config.compression.as_deref())?;
    }
    Ok(())
}

pub fn extract_face_image(cubemap: &Cubemap, face: Face) -> Image {
    let dim = cubemap.dim();
    let mut img = Image::new(dim, dim);
    for y in 0..dim {
        for x in 0..dim {
            img.set_pixel(x, y, cubemap.texel(face, x, y));
        }
    }
    img
}

fn write_dfg(config: &BakeConfig, options: &DfgOptions) -> Result<()> {
    let size = config.dfg_size();
    let lut = ibl::dfg_lut(size, options.multiscatter, config.samples);
    let ext = options
        .output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if let Some(parent) = options.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory '{}'", parent.display()))?;
        }
    }
    if DFG_SOURCE_EXTENSIONS.contains(&ext.as_str()) {
        let body = format_dfg_source(&lut, &ext);
        fs::write(&options.output, body)
            .with_context(|| format!("writing DFG table to '{}'", options.output.display()))?;
    } else {
        let format = OutputFormat::from_name(&ext)?;
        image_io::encode(&lut.to_image(), &options.output, format, config.compression.as_deref())?;
    }
    Ok(())
}

/// Source-embeddable emission of the LUT: a flat float array in NdotV-major
/// order. Plain numbers for .txt, a C declaration for the code extensions.
pub fn format_dfg_source(lut: &DfgLut, ext: &str) -> String {
    let values = lut.flat_ndotv_major();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// DFG LUT: {0}x{0} texels, {1} channels, NdotV-major",
        lut.size, lut.channels
    );
    let declaration = ext != "txt";
    if declaration {
        let _ = writeln!(out, "const float DFG_LUT[{}] = {{", values.len());
    }
    for cell in values.chunks(lut.channels) {
        let line: Vec<String> = cell.iter().map(|v| format!("{v:.9}")).collect();
        if declaration {
            let _ = writeln!(out, "    {},", line.join(", "));
        } else {
            let _ = writeln!(out, "{}", line.join(" "));
        }
    }
    if declaration {
        let _ = writeln!(out, "}};");
    }
    out
}

#[derive(Serialize)]
struct BakeManifest {
    name: String,
    base_size: usize,
    mip_count: usize,
    format: String,
    sh_bands: Option<usize>,
    faces: Vec<String>,
    prefiltered: Vec<String>,
}

/// Deploy runs index their outputs in a small JSON manifest so a consuming
/// runtime can locate the baked set without globbing.
fn write_manifest(config: &BakeConfig, input: &InputSource, levels: &[Cubemap], dir: &Path) -> Result<()> {
    let ext = config.format.extension();
    let manifest = BakeManifest {
        name: input.stem(),
        base_size: levels[0].dim(),
        mip_count: levels.len(),
        format: ext.to_string(),
        sh_bands: config.sh.as_ref().map(|sh| sh.bands),
        faces: Face::ALL.iter().map(|face| format!("{}.{ext}", face.name())).collect(),
        prefiltered: (0..levels.len()).map(|index| format!("m{index}.{ext}")).collect(),
    };
    let path = dir.join("env.json");
    let body = serde_json::to_string_pretty(&manifest).context("serializing bake manifest")?;
    fs::create_dir_all(dir)
        .with_context(|| format!("creating deploy directory '{}'", dir.display()))?;
    fs::write(&path, body).with_context(|| format!("writing manifest '{}'", path.display()))?;
    Ok(())
}

fn progress(config: &BakeConfig, message: &str) {
    if !config.quiet {
        println!("{message}");
    }
}
