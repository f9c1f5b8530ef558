//! Runtime loading of compiled SPIR-V shaders.
//!
//! Shaders are read from the directory named by `MERIDIAN_SHADER_DIR`, or
//! `shaders/` next to the working directory when unset. The sources in the
//! repository's `shaders/` directory compile with `glslc` into the `.spv`
//! files loaded here.

use std::env;
use std::fs;
use std::path::PathBuf;

use super::error::RendererError;

pub fn shader_directory() -> PathBuf {
    env::var_os("MERIDIAN_SHADER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shaders"))
}

/// Reads `<dir>/<name>.spv` into memory.
pub fn load(name: &str) -> Result<Vec<u8>, RendererError> {
    let path = shader_directory().join(format!("{name}.spv"));
    fs::read(&path).map_err(|e| {
        RendererError::Pipeline(format!("failed to read shader `{}`: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shader_names_the_path_in_the_error() {
        let result = load("does-not-exist");

        match result {
            Err(RendererError::Pipeline(message)) => {
                assert!(message.contains("does-not-exist.spv"));
            }
            other => panic!("expected Pipeline error, got {:?}", other),
        }
    }
}
