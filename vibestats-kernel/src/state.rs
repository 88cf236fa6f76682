use parking_lot::RwLock;
use std::sync::Arc;

/// Read-mostly state shared between the host side and the coordinator.
pub type Shared<T> = Arc<RwLock<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}
