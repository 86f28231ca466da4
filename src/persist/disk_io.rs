//! Layer stack serialization and disk I/O

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::layer::LayerStack;

const MAGIC: &str = "strata-stack";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    magic: &'a str,
    version: u32,
    stack: &'a LayerStack,
}

#[derive(Deserialize)]
struct Envelope {
    magic: String,
    version: u32,
    stack: LayerStack,
}

/// Serialize a stack to JSON bytes (uncompressed).
///
/// Every layer's flags, blend mode, channel grids, stencils, entities and
/// tombstones are stored. Dirty subscribers are not.
pub fn serialize_stack(stack: &LayerStack) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        magic: MAGIC,
        version: FORMAT_VERSION,
        stack,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Deserialize a stack from JSON bytes (uncompressed).
///
/// Channel grids are checked for consistent tiling while parsing, so a
/// stack that loads can always be queried.
pub fn deserialize_stack(data: &[u8]) -> Result<LayerStack> {
    let envelope: Envelope = serde_json::from_slice(data)?;
    if envelope.magic != MAGIC {
        return Err(Error::Serialization(format!("not a layer stack file (magic '{}')", envelope.magic)));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(Error::Serialization(format!(
            "unsupported layer stack version {} (expected {})",
            envelope.version, FORMAT_VERSION
        )));
    }
    envelope.stack.config().validate()?;
    let layers = envelope.stack.layers();
    for (i, layer) in layers.iter().enumerate() {
        if layers[..i].iter().any(|l| l.name() == layer.name()) {
            return Err(Error::Serialization(format!("duplicate layer '{}'", layer.name())));
        }
    }
    Ok(envelope.stack)
}

/// Serialize and compress a stack using LZ4.
pub fn compress_stack(stack: &LayerStack) -> Result<Vec<u8>> {
    let serialized = serialize_stack(stack)?;
    Ok(lz4_flex::compress_prepend_size(&serialized))
}

/// Decompress and deserialize a stack.
pub fn decompress_stack(data: &[u8]) -> Result<LayerStack> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Serialization(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_stack(&decompressed)
}

/// File path for the stack of surface `name`.
pub fn stack_path(base_dir: &Path, name: &str) -> PathBuf {
    base_dir.join(format!("{}.strata", name))
}

/// Save a stack to disk (compressed). Returns the written path.
pub fn save_stack(base_dir: &Path, stack: &LayerStack) -> Result<PathBuf> {
    let path = stack_path(base_dir, stack.name());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let compressed = compress_stack(stack)?;
    std::fs::write(&path, &compressed)?;
    log::info!(
        "Saved surface '{}' ({} layers, {} bytes) to {}",
        stack.name(),
        stack.len(),
        compressed.len(),
        path.display()
    );
    Ok(path)
}

/// Load the stack of surface `name`, if saved.
pub fn load_stack(base_dir: &Path, name: &str) -> Result<Option<LayerStack>> {
    let path = stack_path(base_dir, name);
    if !path.exists() {
        return Ok(None);
    }
    let compressed = std::fs::read(&path)?;
    let stack = decompress_stack(&compressed)?;
    log::debug!("Loaded surface '{}' from {}", name, path.display());
    Ok(Some(stack))
}

/// Delete a saved stack.
pub fn delete_stack(base_dir: &Path, name: &str) -> Result<()> {
    let path = stack_path(base_dir, name);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

pub fn stack_exists(base_dir: &Path, name: &str) -> bool {
    stack_path(base_dir, name).exists()
}
