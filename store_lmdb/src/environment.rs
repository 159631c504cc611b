//! Environment setup.

use crate::map_err;
use heed::{Env, EnvOpenOptions};
use lattica_store::StoreError;
use std::path::Path;

/// Tuning knobs for the LMDB environment.
#[derive(Clone, Debug)]
pub struct LmdbConfig {
    /// Memory-map size in bytes. The map is sparse; this is an upper bound,
    /// not an allocation.
    pub map_size: usize,
    pub max_readers: u32,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            map_size: 16 * 1024 * 1024 * 1024,
            max_readers: 512,
        }
    }
}

pub(crate) fn open_env(path: &Path, config: &LmdbConfig) -> Result<Env, StoreError> {
    std::fs::create_dir_all(path)
        .map_err(|e| StoreError::Backend(format!("create data dir: {e}")))?;
    // SAFETY: the environment directory is only opened once per process;
    // opening the same file twice is the documented UB heed guards against.
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(config.map_size)
            .max_readers(config.max_readers)
            .max_dbs(16)
            .open(path)
    }
    .map_err(map_err)?;
    Ok(env)
}
