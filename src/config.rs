use crate::image_io::OutputFormat;
use std::path::PathBuf;

/// What the pipeline bakes from. Decided once at the CLI boundary; the core
/// never re-inspects names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// An image file; cross vs. equirectangular is detected from its aspect
    /// ratio after decoding.
    File(PathBuf),
    /// Procedural UV debug grid with the given cell density.
    UvGrid(usize),
    /// Procedural GGX lobe visualization with the given lobe parameter.
    BrdfLobe(usize),
}

impl InputSource {
    /// Stem used to derive output names.
    pub fn stem(&self) -> String {
        match self {
            InputSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "env".to_string()),
            InputSource::UvGrid(density) => format!("uv{density}"),
            InputSource::BrdfLobe(param) => format!("brdf{param}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShOptions {
    pub bands: usize,
    pub irradiance: bool,
    pub shader: bool,
    pub output: Option<PathBuf>,
}

impl Default for ShOptions {
    fn default() -> Self {
        Self { bands: Self::default_bands(), irradiance: false, shader: false, output: None }
    }
}

impl ShOptions {
    pub const fn default_bands() -> usize {
        3
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfgOptions {
    pub output: PathBuf,
    pub multiscatter: bool,
}

/// Immutable per-run configuration, built once by the CLI layer and passed
/// by reference into every pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeConfig {
    pub quiet: bool,
    pub debug: bool,
    pub mirror: bool,
    /// Base cubemap dimension override; power-of-two, validated at parse time.
    pub size: Option<usize>,
    pub format: OutputFormat,
    pub compression: Option<String>,
    /// Sample count for the IBL integrations.
    pub samples: usize,
    pub sh: Option<ShOptions>,
    pub prefilter_dir: Option<PathBuf>,
    pub is_mipmap_dir: Option<PathBuf>,
    pub extract_dir: Option<PathBuf>,
    /// Perceptual roughness applied before face extraction; 0 disables the blur.
    pub extract_blur: f64,
    pub dfg: Option<DfgOptions>,
    pub deploy_dir: Option<PathBuf>,
    pub input: Option<InputSource>,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            debug: false,
            mirror: false,
            size: None,
            format: OutputFormat::Png,
            compression: None,
            samples: Self::default_samples(),
            sh: None,
            prefilter_dir: None,
            is_mipmap_dir: None,
            extract_dir: None,
            extract_blur: 0.0,
            dfg: None,
            deploy_dir: None,
            input: None,
        }
    }
}

impl BakeConfig {
    pub const fn default_samples() -> usize {
        1024
    }

    pub const fn default_size() -> usize {
        256
    }

    pub const fn default_dfg_size() -> usize {
        128
    }

    pub fn base_size(&self) -> usize {
        self.size.unwrap_or(Self::default_size())
    }

    pub fn dfg_size(&self) -> usize {
        self.size.unwrap_or(Self::default_dfg_size())
    }
}
