//! Text and binary serde encodings selected by file extension.
//!
//! The binary encoding is bincode (serde mode) compressed with lz4 and
//! prefixed with the uncompressed size as a little-endian `u32`.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("failed to get file extension of {0}")]
    MissingFileExtension(String),
    #[error("unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error(transparent)]
    Extension(#[from] FileExtensionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml encode: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("toml decode: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("bincode encode: {0}")]
    BinEncode(#[from] bincode::error::EncodeError),
    #[error("bincode decode: {0}")]
    BinDecode(#[from] bincode::error::DecodeError),
    #[error("lz4 decompress: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    #[error("binary payload should be fully consumed")]
    TrailingBytes,
}

pub type Result<T> = std::result::Result<T, SerdeFormatError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerdeFormat {
    Yaml,
    Json,
    Toml,
    Bin,
}

impl SerdeFormat {
    pub fn all_formats_for_testing() -> [Self; 4] {
        [Self::Yaml, Self::Json, Self::Toml, Self::Bin]
    }

    pub fn from_path(path: &Path) -> std::result::Result<Self, FileExtensionError> {
        let display = path.display().to_string();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| FileExtensionError::MissingFileExtension(display.clone()))?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if ext.eq_ignore_ascii_case("toml") {
            Ok(Self::Toml)
        } else if ext.eq_ignore_ascii_case("bin") {
            Ok(Self::Bin)
        } else {
            Err(FileExtensionError::UnsupportedFileExtension(display))
        }
    }

    pub fn serialize<T: Serialize>(self, value: &T) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match self {
            Self::Yaml => buffer.extend_from_slice(serde_yml::to_string(value)?.as_bytes()),
            Self::Json => buffer.extend_from_slice(serde_json::to_string_pretty(value)?.as_bytes()),
            Self::Toml => buffer.extend_from_slice(toml::to_string(value)?.as_bytes()),
            Self::Bin => {
                let encoded = bincode::serde::encode_to_vec(value, bincode::config::standard())?;

                // Prepend uncompressed size (4 bytes, little-endian)
                buffer.write_all(&(encoded.len() as u32).to_le_bytes())?;
                buffer.extend_from_slice(&lz4_flex::block::compress(&encoded));
            }
        }
        Ok(buffer)
    }

    pub fn deserialize<T: DeserializeOwned>(self, serialized: &[u8]) -> Result<T> {
        match self {
            Self::Yaml => Ok(serde_yml::from_str(std::str::from_utf8(serialized)?)?),
            Self::Json => Ok(serde_json::from_str(std::str::from_utf8(serialized)?)?),
            Self::Toml => Ok(toml::from_str(std::str::from_utf8(serialized)?)?),
            Self::Bin => {
                let decompressed = lz4_flex::decompress_size_prepended(serialized)?;
                let (decoded, read) =
                    bincode::serde::decode_from_slice(&decompressed, bincode::config::standard())?;
                if read != decompressed.len() {
                    return Err(SerdeFormatError::TrailingBytes);
                }
                Ok(decoded)
            }
        }
    }
}

/// Serializes `value` into `path`, picking the format from the extension.
pub fn save_to_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let format = SerdeFormat::from_path(path)?;
    let bytes = format.serialize(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Reads `path` and deserializes it, picking the format from the extension.
pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = SerdeFormat::from_path(path)?;
    let bytes = std::fs::read(path)?;
    format.deserialize(&bytes)
}
