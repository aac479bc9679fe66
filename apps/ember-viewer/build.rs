//! Build script compiling the viewer's GLSL shaders to SPIR-V in the assets root.

use shaderc::{Compiler, ShaderKind};
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    let shader_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders");

    println!("cargo:rerun-if-changed={}", shader_dir.join("shader.vert").display());
    println!("cargo:rerun-if-changed={}", shader_dir.join("shader.frag").display());

    let compiler = Compiler::new().expect("Failed to create shader compiler");

    compile_shader(
        &compiler,
        shader_dir.join("shader.vert"),
        shader_dir.join("vert.spv"),
        ShaderKind::Vertex,
    );
    compile_shader(
        &compiler,
        shader_dir.join("shader.frag"),
        shader_dir.join("frag.spv"),
        ShaderKind::Fragment,
    );
}

fn compile_shader(
    compiler: &Compiler,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    kind: ShaderKind,
) {
    let input_path = input.as_ref();
    let output_path = output.as_ref();

    let source = fs::read_to_string(input_path)
        .unwrap_or_else(|e| panic!("Failed to read shader {:?}: {}", input_path, e));

    let file_name = input_path.file_name().unwrap().to_str().unwrap();

    let mut options = shaderc::CompileOptions::new().expect("Failed to create compile options");
    // The renderer targets Vulkan 1.0.
    options.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    options.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let result = compiler
        .compile_into_spirv(&source, kind, file_name, "main", Some(&options))
        .unwrap_or_else(|e| panic!("Failed to compile shader {:?}: {}", input_path, e));

    if result.get_num_warnings() > 0 {
        println!(
            "cargo:warning=Shader warnings in {:?}: {}",
            input_path,
            result.get_warning_messages()
        );
    }

    fs::write(
        output_path,
        bytemuck::cast_slice::<u32, u8>(result.as_binary()),
    )
    .unwrap_or_else(|e| panic!("Failed to write shader {:?}: {}", output_path, e));
}
