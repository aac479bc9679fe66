//! The build script leaves loadable SPIR-V next to the GLSL sources.

use std::path::PathBuf;

use ember_gpu::shader::{load_spirv, SPIRV_MAGIC};

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
}

#[test]
fn compiled_shaders_load_from_assets_root() {
    for name in ["vert.spv", "frag.spv"] {
        let words = load_spirv(shader_dir().join(name)).unwrap();
        assert!(words.len() > 5, "{name} has no instructions");
        assert_eq!(words[0], SPIRV_MAGIC);
    }
}
