// build.rs
// Compiles the demo's GLSL shaders to SPIR-V when the Vulkan SDK is around.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: precompiled .spv files next to the sources are used as-is");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{vulkan_sdk}\\Bin\\glslc.exe")
    } else {
        format!("{vulkan_sdk}/bin/glslc")
    };
    if !Path::new(&glslc).exists() {
        eprintln!("warning: glslc not found at {glslc}, shader compilation skipped");
        return;
    }

    let shader_dir = PathBuf::from("shaders");
    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: no shader directory at {shader_dir:?}");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_shader = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("vert" | "frag")
        );
        if !is_shader {
            continue;
        }

        let out_file = PathBuf::from(format!("{}.spv", path.display()));
        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => {
                eprintln!("info: compiled {path:?} -> {out_file:?}");
            }
            Ok(s) => {
                eprintln!("error: glslc failed for {path:?} with exit code {:?}", s.code());
                panic!("shader compilation failed");
            }
            Err(e) => {
                eprintln!("error: failed to run glslc for {path:?}: {e}");
                panic!("failed to execute shader compiler");
            }
        }
    }
}
