// Shader module loading
//
// Vulkan consumes SPIR-V as 32-bit words. Files are read at bootstrap
// time from the configured shader directory.

use ash::vk;
use std::io;
use std::path::Path;

use super::error::{BootstrapError, BootstrapResult};

/// Decode SPIR-V bytes into words, fixing endianness from the magic number.
pub fn decode_spirv(bytes: &[u8]) -> io::Result<Vec<u32>> {
    ash::util::read_spv(&mut io::Cursor::new(bytes))
}

/// Read a compiled shader from disk
pub fn read_spirv(path: &Path) -> BootstrapResult<Vec<u32>> {
    let shader_error = |source| BootstrapError::ShaderFile {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(shader_error)?;
    let words = decode_spirv(&bytes).map_err(shader_error)?;

    log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
    Ok(words)
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> BootstrapResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.create_shader_module(&create_info, None) }
        .map_err(BootstrapError::GraphicsPipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u32 = 0x0723_0203;

    fn bytes_le(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_endian_words() {
        let words = [MAGIC, 0x0001_0000, 7];
        assert_eq!(decode_spirv(&bytes_le(&words)).unwrap(), words);
    }

    #[test]
    fn swaps_big_endian_modules() {
        let words = [MAGIC, 0x0001_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        assert_eq!(decode_spirv(&bytes).unwrap(), words);
    }

    #[test]
    fn rejects_truncated_modules() {
        let mut bytes = bytes_le(&[MAGIC, 1]);
        bytes.pop();
        assert!(decode_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(decode_spirv(&bytes_le(&[0xdead_beef])).is_err());
        assert!(decode_spirv(&[]).is_err());
    }

    #[test]
    fn missing_file_reports_its_path() {
        let path = Path::new("does/not/exist/vertex.spv");
        match read_spirv(path) {
            Err(BootstrapError::ShaderFile { path: reported, source }) => {
                assert_eq!(reported, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result: {:?}", other.map(|w| w.len())),
        }
    }
}
