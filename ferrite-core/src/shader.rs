use std::path::Path;

use naga::back::spv;
use naga::front::glsl;

use crate::{FerriteError, FerriteResult};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

pub enum ShaderSource<'a> {
    SpirV(&'a [u8]),
    Glsl { source: &'a str, stage: naga::ShaderStage },
    Wgsl(&'a str),
}

impl<'a> ShaderSource<'a> {
    /// Picks the source kind from the file extension: `spv`, `vert`, `frag` or `wgsl`.
    pub fn from_extension(extension: &str, contents: &'a [u8]) -> Result<Self, String> {
        let text = || std::str::from_utf8(contents).map_err(|e| format!("Shader source is not UTF-8: {}", e));
        match extension {
            "spv" => Ok(ShaderSource::SpirV(contents)),
            "vert" => Ok(ShaderSource::Glsl { source: text()?, stage: naga::ShaderStage::Vertex }),
            "frag" => Ok(ShaderSource::Glsl { source: text()?, stage: naga::ShaderStage::Fragment }),
            "wgsl" => Ok(ShaderSource::Wgsl(text()?)),
            other => Err(format!("Unrecognized shader extension '{}'", other)),
        }
    }
}

/// Reinterprets a SPIR-V blob as words. The blob must be a non-empty multiple of four
/// bytes and start with the SPIR-V magic number in either byte order.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(format!("SPIR-V length {} is not a non-zero multiple of 4", bytes.len()));
    }

    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words[0] {
        SPIRV_MAGIC => Ok(words),
        swapped if swapped == SPIRV_MAGIC.swap_bytes() => {
            for word in &mut words {
                *word = word.swap_bytes();
            }
            Ok(words)
        }
        other => Err(format!("Bad SPIR-V magic number {:#010x}", other)),
    }
}

pub fn compile_shader(source: ShaderSource) -> Result<Vec<u32>, String> {
    let module = match source {
        ShaderSource::SpirV(bytes) => return parse_spirv(bytes),
        ShaderSource::Wgsl(src) => naga::front::wgsl::Frontend::new()
            .parse(src)
            .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(src)))?,
        ShaderSource::Glsl { source, stage } => glsl::Frontend::default()
            .parse(&glsl::Options::from(stage), source)
            .map_err(|e| format!("GLSL parse error: {:?}", e))?,
    };

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| format!("Naga validation error: {:?}", e))?;

    spv::write_vec(&module, &info, &spv::Options::default(), None)
        .map_err(|e| format!("SPIR-V write error: {:?}", e))
}

/// Reads a shader from disk and returns SPIR-V words ready for module creation.
pub fn load_shader(path: &Path) -> FerriteResult<Vec<u32>> {
    let failed = |reason: String| FerriteError::ShaderLoadFailed { path: path.to_path_buf(), reason };

    let contents = std::fs::read(path).map_err(|e| failed(e.to_string()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let source = ShaderSource::from_extension(extension, &contents).map_err(failed)?;
    let words = compile_shader(source).map_err(failed)?;

    log::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(words)
}
