//! Tests for error types

use workstage::core::PoolError;

#[test]
fn test_rejected_error() {
    let err = PoolError::Rejected("worker pool has been shut down".to_string());
    assert_eq!(format!("{}", err), "task rejected: worker pool has been shut down");
}

#[test]
fn test_queue_full_error() {
    assert_eq!(format!("{}", PoolError::QueueFull), "task queue is full");
}

#[test]
fn test_invalid_argument_error() {
    let err = PoolError::InvalidArgument("min_delay_ms must be >= 0, got -1".to_string());
    assert_eq!(format!("{}", err), "invalid argument: min_delay_ms must be >= 0, got -1");
}

#[test]
fn test_task_failed_error() {
    let err = PoolError::TaskFailed("checksum mismatch".to_string());
    assert_eq!(format!("{}", err), "task failed: checksum mismatch");
}

#[test]
fn test_pool_error_converts_into_anyhow() {
    fn handler() -> anyhow::Result<()> {
        Err(PoolError::QueueFull)?;
        Ok(())
    }
    let err = handler().unwrap_err();
    assert_eq!(err.downcast_ref::<PoolError>(), Some(&PoolError::QueueFull));
}
