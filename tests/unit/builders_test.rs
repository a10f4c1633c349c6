//! Tests for builder modules

use std::collections::HashMap;
use std::time::Duration;

use workstage::builders::build_pools;
use workstage::config::{ToolkitConfig, WorkerPoolConfig};
use workstage::core::{Executor, PoolError, WorkerPool};

fn toolkit(pools: &[(&str, WorkerPoolConfig)]) -> ToolkitConfig {
    ToolkitConfig {
        pools: pools.iter().map(|(n, c)| ((*n).to_string(), c.clone())).collect(),
        debounce: None,
        timebound: None,
    }
}

#[test]
fn test_build_pools_from_config() {
    let config = toolkit(&[
        ("ingest", WorkerPoolConfig::new().with_worker_count(2)),
        ("render", WorkerPoolConfig::new().with_worker_count(1).with_thread_name_prefix("gpu")),
    ]);
    let pools = build_pools(&config).unwrap();
    assert_eq!(pools.len(), 2);
    assert_eq!(pools["ingest"].worker_count(), 2);
    assert_eq!(pools["render"].worker_count(), 1);

    let (tx, rx) = crossbeam_channel::bounded(1);
    pools["ingest"]
        .submit(move || {
            tx.send(std::thread::current().name().map(str::to_string))?;
            Ok(())
        })
        .unwrap();
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert!(name.starts_with("ingest-"), "unexpected thread name {name}");

    for pool in pools.values() {
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }
}

#[test]
fn test_build_pools_rejects_invalid_config() {
    let empty = ToolkitConfig {
        pools: HashMap::new(),
        debounce: None,
        timebound: None,
    };
    assert!(matches!(build_pools(&empty), Err(PoolError::InvalidArgument(_))));

    let zero = toolkit(&[("broken", WorkerPoolConfig::new().with_worker_count(0))]);
    assert!(matches!(build_pools(&zero), Err(PoolError::InvalidArgument(_))));
}
