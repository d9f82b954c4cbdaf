// build.rs
// Compiles GLSL under resources/shaders to SPIR-V in target/shaders
//
// `gbuffer.vert` becomes `gbuffer.vert.spv`, the name `ShaderPaths::spirv` expects.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_DIR: &str = "../../resources/shaders";
const OUTPUT_DIR: &str = "../../target/shaders";
const STAGES: [&str; 6] = ["vert", "frag", "comp", "geom", "tesc", "tese"];

fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn compile(glslc: &str, source: &Path, output: &Path) {
    let status = Command::new(glslc)
        .arg("-I")
        .arg(SHADER_DIR)
        .arg(source)
        .arg("-o")
        .arg(output)
        .status();

    match status {
        Ok(s) if s.success() => eprintln!("info: Compiled {} -> {}", source.display(), output.display()),
        Ok(s) => panic!("glslc failed for {} with exit code {}", source.display(), s.code().unwrap_or(-1)),
        Err(e) => panic!("Failed to run glslc for {}: {e}", source.display()),
    }
}

fn main() {
    println!("cargo:rerun-if-changed={SHADER_DIR}");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };
    let glslc = if cfg!(target_os = "windows") {
        format!("{vulkan_sdk}\\Bin\\glslc.exe")
    } else {
        format!("{vulkan_sdk}/bin/glslc")
    };
    if !Path::new(&glslc).exists() {
        panic!("glslc not found at {glslc}");
    }

    let output_dir = PathBuf::from(OUTPUT_DIR);
    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("warning: Failed to create {}: {e}", output_dir.display());
        return;
    }

    let Ok(entries) = std::fs::read_dir(SHADER_DIR) else {
        eprintln!("info: No shader directory found at {SHADER_DIR}");
        return;
    };

    let mut compiled = 0;
    for path in entries.filter_map(Result::ok).map(|e| e.path()) {
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| STAGES.contains(&ext));
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_stage {
            continue;
        }

        let output = output_dir.join(format!("{file_name}.spv"));
        if is_stale(&path, &output) {
            compile(&glslc, &path, &output);
            compiled += 1;
        }
    }
    eprintln!("info: {compiled} shader(s) compiled");
}
