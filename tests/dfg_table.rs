use envbake::cli::{self, Invocation};
use envbake::pipeline;
use tempfile::tempdir;

fn run_dfg(args: &[String]) {
    let mut full = vec!["envbake".to_string()];
    full.extend_from_slice(args);
    let config = match cli::parse(full).expect("parse dfg args") {
        Invocation::Run(config) => config,
        Invocation::Help => panic!("expected a run"),
    };
    pipeline::run(&config).expect("dfg run");
}

#[test]
fn source_extension_emits_a_literal_table() {
    let dir = tempdir().expect("temp dir");
    let out = dir.path().join("dfg.h");
    run_dfg(&[
        format!("--ibl-dfg={}", out.display()),
        "--size=8".to_string(),
        "--ibl-samples=16".to_string(),
        "--quiet".to_string(),
    ]);

    let body = std::fs::read_to_string(&out).expect("read table");
    assert!(body.contains("const float DFG_LUT[128]"), "8x8x2 floats expected:\n{body}");
    assert!(body.trim_end().ends_with("};"));
    let cells = body.lines().filter(|line| line.starts_with("    ")).count();
    assert_eq!(cells, 64, "one emitted cell per LUT texel");
}

#[test]
fn txt_extension_emits_plain_rows() {
    let dir = tempdir().expect("temp dir");
    let out = dir.path().join("dfg.txt");
    run_dfg(&[
        format!("--ibl-dfg={}", out.display()),
        "--ibl-dfg-multiscatter".to_string(),
        "--size=4".to_string(),
        "--ibl-samples=16".to_string(),
        "--quiet".to_string(),
    ]);

    let body = std::fs::read_to_string(&out).expect("read table");
    let rows: Vec<&str> = body.lines().filter(|line| !line.starts_with("//")).collect();
    assert_eq!(rows.len(), 16, "4x4 cells");
    for row in rows {
        let values: Vec<f32> =
            row.split_whitespace().map(|v| v.parse().expect("float cell")).collect();
        assert_eq!(values.len(), 3, "multiscatter tables carry 3 channels");
    }
}

#[test]
fn image_extension_encodes_the_lut() {
    let dir = tempdir().expect("temp dir");
    let out = dir.path().join("dfg.exr");
    run_dfg(&[
        format!("--ibl-dfg={}", out.display()),
        "--size=8".to_string(),
        "--ibl-samples=16".to_string(),
        "--quiet".to_string(),
    ]);
    let img = envbake::image_io::decode(&out).expect("decode LUT image");
    assert_eq!((img.width(), img.height()), (8, 8));
    // Mirror corner: NdotV -> 1, roughness -> 0 has scale near 1, bias near 0.
    let corner = img.pixel(7, 0);
    assert!(corner.x > 0.9, "scale should approach 1, got {}", corner.x);
    assert!(corner.y < 0.1, "bias should approach 0, got {}", corner.y);
}
