//! Builders to construct worker pools from toolkit configuration.

use std::collections::HashMap;

use tracing::info;

use crate::config::{ToolkitConfig, WorkerPoolConfig};
use crate::core::{BoundedWorkerPool, PoolError, WorkerPool};

/// Build one [`BoundedWorkerPool`] per named pool in `cfg`.
///
/// Pools left on the default thread name prefix have their threads named
/// after the pool. Pools are only returned if every one of them started; any
/// pool created before a failure is shut down again.
///
/// # Errors
///
/// Returns `PoolError::InvalidArgument` when the configuration does not
/// validate, or the first pool construction error.
pub fn build_pools(cfg: &ToolkitConfig) -> Result<HashMap<String, BoundedWorkerPool>, PoolError> {
    cfg.validate()
        .map_err(|e| PoolError::InvalidArgument(format!("config invalid: {e}")))?;

    let default_prefix = WorkerPoolConfig::default().thread_name_prefix;
    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        // Unnamed pools get their threads named after the pool.
        let mut pool_cfg = pool_cfg.clone();
        if pool_cfg.thread_name_prefix == default_prefix {
            pool_cfg.thread_name_prefix.clone_from(name);
        }
        match BoundedWorkerPool::new(pool_cfg) {
            Ok(pool) => {
                pools.insert(name.clone(), pool);
            }
            Err(e) => {
                for pool in pools.values() {
                    pool.shutdown();
                }
                return Err(e);
            }
        }
    }

    info!(pools = pools.len(), "Worker pools built from configuration");
    Ok(pools)
}
