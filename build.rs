// Build script to compile the triangle GLSL shaders to SPIR-V

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/triangle.vert");
    println!("cargo:rerun-if-changed=shaders/triangle.frag");

    // Output names match the defaults in [assets] of config.toml
    compile_shader("shaders/triangle.vert", "shaders/vertex.spv");
    compile_shader("shaders/triangle.frag", "shaders/fragment.spv");
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {
            println!("Compiled {} -> {}", input, output);
        }
        Ok(status) => {
            panic!("Failed to compile {}: exit code {:?}", input, status.code());
        }
        Err(e) => {
            // Without the .spv files the renderer fails at startup with a shader file error
            println!("cargo:warning=glslc not found ({}), skipping {}", e, input);
        }
    }
}
