use crate::config::{BakeConfig, DfgOptions, InputSource, ShOptions};
use crate::image_io::OutputFormat;
use crate::sh;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const DFG_SOURCE_EXTENSIONS: [&str; 6] = ["h", "hpp", "c", "cpp", "inc", "txt"];

#[derive(Debug)]
pub enum Invocation {
    Run(BakeConfig),
    Help,
}

pub fn parse_from_env() -> Result<Invocation> {
    parse(env::args())
}

pub fn parse<I, S>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut config = BakeConfig::default();
    let mut sh_options = ShOptions::default();
    let mut sh_requested = false;
    let mut format_specified = false;
    let mut dfg_output: Option<PathBuf> = None;
    let mut dfg_multiscatter = false;
    let mut positional: Option<String> = None;

    let mut iter = args.into_iter();
    let _ = iter.next(); // program name
    while let Some(raw) = iter.next() {
        let arg = raw.as_ref();
        if !arg.starts_with('-') {
            if positional.is_some() {
                bail!("unexpected extra argument '{arg}'");
            }
            positional = Some(arg.to_string());
            continue;
        }
        let (flag, attached) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg, None),
        };
        let value = |iter: &mut dyn Iterator<Item = S>| -> Result<String> {
            if let Some(attached) = attached.clone() {
                return Ok(attached);
            }
            iter.next().map(|v| v.as_ref().to_string()).ok_or_else(|| anyhow!("expected a value after '{flag}'"))
        };
        match flag {
            "--help" | "-h" => return Ok(Invocation::Help),
            "--quiet" | "-q" => config.quiet = true,
            "--debug" | "-d" => config.debug = true,
            "--mirror" => config.mirror = true,
            "--format" | "-f" => {
                config.format = OutputFormat::from_name(&value(&mut iter)?)?;
                format_specified = true;
            }
            "--compression" | "-c" => config.compression = Some(value(&mut iter)?),
            "--size" | "-s" => {
                let raw = value(&mut iter)?;
                let size: usize =
                    raw.parse().with_context(|| format!("invalid size '{raw}'"))?;
                if !size.is_power_of_two() {
                    bail!("output size must be a power of two, got {size}");
                }
                config.size = Some(size);
            }
            "--ibl-samples" => {
                let raw = value(&mut iter)?;
                let samples: usize =
                    raw.parse().with_context(|| format!("invalid sample count '{raw}'"))?;
                if samples == 0 {
                    bail!("sample count must be at least 1");
                }
                config.samples = samples;
            }
            "--sh" => {
                sh_requested = true;
                if let Some(raw) = attached.clone() {
                    sh_options.bands = sh::parse_bands(&raw, ShOptions::default_bands())?;
                }
            }
            "--sh-output" => {
                sh_requested = true;
                let path = PathBuf::from(value(&mut iter)?);
                validate_sh_output(&path)?;
                sh_options.output = Some(path);
            }
            "--sh-irradiance" | "-i" => {
                sh_requested = true;
                sh_options.irradiance = true;
            }
            "--sh-shader" => {
                sh_requested = true;
                sh_options.irradiance = true;
                sh_options.shader = true;
            }
            "--ibl-ld" => config.prefilter_dir = Some(PathBuf::from(value(&mut iter)?)),
            "--ibl-is-mipmap" => config.is_mipmap_dir = Some(PathBuf::from(value(&mut iter)?)),
            "--ibl-dfg" => {
                let path = PathBuf::from(value(&mut iter)?);
                validate_dfg_output(&path)?;
                dfg_output = Some(path);
            }
            "--ibl-dfg-multiscatter" => dfg_multiscatter = true,
            "--extract" => config.extract_dir = Some(PathBuf::from(value(&mut iter)?)),
            "--extract-blur" => {
                let raw = value(&mut iter)?;
                let blur: f64 =
                    raw.parse().with_context(|| format!("invalid roughness '{raw}'"))?;
                if !(0.0..=1.0).contains(&blur) {
                    bail!("roughness (blur) parameter must be between 0.0 and 1.0, got {blur}");
                }
                config.extract_blur = blur;
            }
            "--deploy" | "-x" => config.deploy_dir = Some(PathBuf::from(value(&mut iter)?)),
            other => bail!("unknown flag '{other}'; run with --help for the option list"),
        }
    }

    if let Some(output) = dfg_output {
        config.dfg = Some(DfgOptions { output, multiscatter: dfg_multiscatter });
    }
    config.input = positional.map(|name| classify_input(&name)).transpose()?;

    if config.input.is_none() {
        if config.dfg.is_none() {
            return Ok(Invocation::Help);
        }
        return Ok(Invocation::Run(config));
    }

    if let Some(deploy_dir) = config.deploy_dir.clone() {
        // Deploy is shorthand for the full set a runtime consumes: shader-ready
        // SH, extracted faces and the prefiltered chain, all under one
        // directory named after the input.
        let out_dir =
            deploy_dir.join(config.input.as_ref().expect("deploy requires an input").stem());
        if !format_specified {
            config.format = OutputFormat::Rgbm;
        }
        sh_requested = true;
        sh_options.bands = ShOptions::default_bands();
        sh_options.irradiance = true;
        sh_options.shader = true;
        sh_options.output = Some(out_dir.join("sh.txt"));
        config.extract_dir = Some(out_dir.clone());
        config.prefilter_dir = Some(out_dir.clone());
        config.deploy_dir = Some(out_dir);
    }

    if sh_requested {
        config.sh = Some(sh_options);
    }

    if config.debug && config.prefilter_dir.is_some() && config.is_mipmap_dir.is_none() {
        config.is_mipmap_dir = config.prefilter_dir.clone();
    }

    Ok(Invocation::Run(config))
}

/// Maps the positional argument to an input descriptor: an existing file
/// wins; otherwise the procedural names `uvN` and `brdfN` are recognized.
fn classify_input(name: &str) -> Result<InputSource> {
    let path = Path::new(name);
    if path.exists() {
        return Ok(InputSource::File(path.to_path_buf()));
    }
    if let Some(density) = name.strip_prefix("uv").and_then(|v| v.parse::<usize>().ok()) {
        return Ok(InputSource::UvGrid(density.max(1)));
    }
    if let Some(param) = name.strip_prefix("brdf").and_then(|v| v.parse::<usize>().ok()) {
        return Ok(InputSource::BrdfLobe(param));
    }
    bail!("input '{name}' is neither an existing file nor a procedural name (uvN, brdfN)")
}

fn validate_sh_output(path: &Path) -> Result<()> {
    let ext = extension_of(path)?;
    if ext == "txt" {
        return Ok(());
    }
    OutputFormat::from_name(&ext)
        .with_context(|| format!("unsupported SH output '{}'", path.display()))?;
    Ok(())
}

fn validate_dfg_output(path: &Path) -> Result<()> {
    let ext = extension_of(path)?;
    if DFG_SOURCE_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(());
    }
    OutputFormat::from_name(&ext)
        .with_context(|| format!("unsupported DFG output '{}'", path.display()))?;
    Ok(())
}

fn extension_of(path: &Path) -> Result<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("output '{}' needs a file extension", path.display()))
}

pub fn print_usage() {
    eprintln!(
        "envbake generates SH coefficients and prefiltered mipmap levels from an
environment map. Cubemap crosses and equirectangular images are both
supported, detected from the aspect ratio of the source image.

Usage:
  envbake [options] <input-file>
  envbake [options] <uvN | brdfN>

Options:
  --help, -h                  show this message
  --quiet, -q                 suppress progress output
  --format=F, -f F            output format: png, hdr, exr, rgbm
  --compression=C, -c C       format-specific compression hint
  --size=N, -s N              cubemap base dimension, power of two (default 256)
  --deploy=dir, -x dir        bake everything a runtime needs into dir
  --extract=dir               write the six cubemap faces into dir
  --extract-blur=roughness    blur with the given roughness before extracting
  --mirror                    mirror generated cubemaps for reflections
  --ibl-samples=N             sample count for IBL integrations (default 1024)
  --ibl-dfg=file              compute the DFG LUT; source extensions
                              (h, hpp, c, cpp, inc, txt) emit a literal table
  --ibl-dfg-multiscatter      add the multiscatter energy term to the DFG LUT
  --ibl-is-mipmap=dir         write the mipmap chain for runtime importance sampling
  --ibl-ld=dir                roughness prefilter into dir, one image per level
  --sh[=bands]                SH decomposition of the input (default 3 bands)
  --sh-output=file            SH destination: .txt for text, image extensions render
  --sh-irradiance, -i         convolve SH with the cosine lobe (irradiance)
  --sh-shader                 rescale irradiance SH for direct shader evaluation
  --debug, -d                 emit extra data for debugging
"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> BakeConfig {
        let mut full = vec!["envbake"];
        full.extend_from_slice(args);
        match parse(full).expect("parse") {
            Invocation::Run(config) => config,
            Invocation::Help => panic!("expected a run invocation"),
        }
    }

    #[test]
    fn parses_core_flags_in_both_forms() {
        let config = run(&["--size=64", "-f", "hdr", "--ibl-samples", "32", "--quiet", "uv4"]);
        assert_eq!(config.size, Some(64));
        assert_eq!(config.format, OutputFormat::Hdr);
        assert_eq!(config.samples, 32);
        assert!(config.quiet);
        assert_eq!(config.input, Some(InputSource::UvGrid(4)));
    }

    #[test]
    fn rejects_non_power_of_two_sizes() {
        let mut full = vec!["envbake", "--size", "100", "uv1"];
        let err = parse(full.drain(..)).unwrap_err();
        assert!(err.to_string().contains("power of two"), "got: {err}");
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = parse(["envbake", "--frobnicate", "uv1"]).unwrap_err();
        assert!(err.to_string().contains("unknown flag"), "got: {err}");
    }

    #[test]
    fn sh_band_garbage_keeps_the_default() {
        let config = run(&["--sh=pineapple", "uv1"]);
        assert_eq!(config.sh.as_ref().map(|sh| sh.bands), Some(3));
        let config = run(&["--sh=2", "uv1"]);
        assert_eq!(config.sh.as_ref().map(|sh| sh.bands), Some(2));
    }

    #[test]
    fn sh_shader_implies_irradiance() {
        let config = run(&["--sh-shader", "uv1"]);
        let sh = config.sh.expect("sh options");
        assert!(sh.shader && sh.irradiance);
    }

    #[test]
    fn procedural_names_dispatch_to_variants() {
        assert_eq!(run(&["uv16"]).input, Some(InputSource::UvGrid(16)));
        assert_eq!(run(&["brdf3"]).input, Some(InputSource::BrdfLobe(3)));
        let err = parse(["envbake", "nosuchfile.hdr"]).unwrap_err();
        assert!(err.to_string().contains("neither an existing file"), "got: {err}");
    }

    #[test]
    fn dfg_without_input_still_runs() {
        let config = run(&["--ibl-dfg=lut.h", "--ibl-dfg-multiscatter"]);
        let dfg = config.dfg.expect("dfg options");
        assert_eq!(dfg.output, PathBuf::from("lut.h"));
        assert!(dfg.multiscatter);
        assert!(config.input.is_none());
    }

    #[test]
    fn dfg_rejects_unknown_extensions() {
        let err = parse(["envbake", "--ibl-dfg=lut.tiff"]).unwrap_err();
        assert!(err.to_string().contains("lut.tiff"), "got: {err}");
    }

    #[test]
    fn no_arguments_asks_for_help() {
        assert!(matches!(parse(["envbake"]).expect("parse"), Invocation::Help));
    }

    #[test]
    fn deploy_expands_to_sh_faces_and_prefilter() {
        let config = run(&["--deploy", "out", "uv2"]);
        assert_eq!(config.format, OutputFormat::Rgbm);
        let sh = config.sh.expect("deploy enables sh");
        assert!(sh.shader && sh.irradiance);
        assert_eq!(sh.output, Some(PathBuf::from("out/uv2/sh.txt")));
        assert_eq!(config.extract_dir, Some(PathBuf::from("out/uv2")));
        assert_eq!(config.prefilter_dir, Some(PathBuf::from("out/uv2")));
        assert_eq!(config.deploy_dir, Some(PathBuf::from("out/uv2")));
    }

    #[test]
    fn debug_prefilter_also_emits_the_source_mipmaps() {
        let config = run(&["--debug", "--ibl-ld=out", "uv1"]);
        assert_eq!(config.is_mipmap_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn extract_blur_range_is_validated() {
        let err = parse(["envbake", "--extract-blur=1.5", "uv1"]).unwrap_err();
        assert!(err.to_string().contains("between 0.0 and 1.0"), "got: {err}");
    }
}
