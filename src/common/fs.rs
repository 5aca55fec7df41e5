use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::{common::io::TileFormat, fragment::TileId};

/// Create the directory if it doesn’t exist; error if a non-directory exists there.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Error unless the directory already exists.
pub fn require_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Directory does not exist: {}", path.display());
    }
    if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Parse the `z/x/y.<ext>` suffix of a tile path relative to the tile root.
pub fn tile_id_from_path(relative: &Path) -> Option<TileId> {
    let mut parts = relative.iter().rev();
    let y = Path::new(parts.next()?).file_stem()?.to_str()?.parse().ok()?;
    let x = parts.next()?.to_str()?.parse().ok()?;
    let z = parts.next()?.to_str()?.parse().ok()?;
    Some(TileId::new(z, x, y))
}

/// List the tiles of a `z/x/y` directory tree in the given format, ordered by tile id.
/// Files that don't follow the layout are skipped.
pub fn list_tile_files(root: &Path, format: TileFormat) -> Result<Vec<(TileId, PathBuf)>> {
    require_dir_exists(root)?;

    let mut tiles = Vec::new();
    for entry in WalkDir::new(root).min_depth(3).max_depth(3) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some(format.extension()) {
            continue
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        match tile_id_from_path(relative) {
            Some(tile) => tiles.push((tile, path.to_path_buf())),
            None => debug!(path = %path.display(), "skipping file outside the z/x/y layout"),
        }
    }
    tiles.sort_by_key(|(tile, _)| *tile);
    Ok(tiles)
}
