use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

// Layout under the configured data directory
pub const DOCUMENT_CACHE_DIR: &str = "form4/cache";
pub const DAILY_INDEX_DIR: &str = "edgar/daily-index";
pub const OUTPUT_DIR: &str = "insider_ceo";

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn document_cache_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(DOCUMENT_CACHE_DIR)
}

pub fn daily_index_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(DAILY_INDEX_DIR)
}

pub fn output_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(OUTPUT_DIR)
}

pub fn ensure_data_dirs(data_dir: &Path) -> Result<()> {
    ensure_dir(data_dir)?;
    ensure_dir(&document_cache_dir(data_dir))?;
    ensure_dir(&daily_index_dir(data_dir))?;
    ensure_dir(&output_dir(data_dir))?;
    Ok(())
}
