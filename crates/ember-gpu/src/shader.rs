//! SPIR-V loading.

use std::io::{Read, Seek};
use std::path::Path;

use crate::error::{GpuError, Result};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a whole SPIR-V file into words.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let shader_error = |reason: String| GpuError::ShaderLoad {
        path: path.display().to_string(),
        reason,
    };

    let mut file = std::fs::File::open(path).map_err(|e| shader_error(e.to_string()))?;
    let words = read_spirv(&mut file).map_err(shader_error)?;

    tracing::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(words)
}

fn read_spirv<R: Read + Seek>(reader: &mut R) -> std::result::Result<Vec<u32>, String> {
    let words = ash::util::read_spv(reader).map_err(|e| e.to_string())?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(format!("bad magic number {other:#010x}")),
        None => Err("file is empty".to_string()),
    }
}
