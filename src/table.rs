//! The transaction table shared by the send and receive tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::response::PacketResponse;

/// Maps a 32-bit transaction id to its observer. The mutex covers only the
/// map operation itself; callers dispatch events after the lock is
/// released.
#[derive(Debug, Default)]
pub struct TransactionTable {
    inner: Mutex<HashMap<u32, Arc<PacketResponse>>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for a transaction. Random xids can collide; the
    /// latest registration wins and the previous observer is orphaned.
    pub fn insert(&self, xid: u32, response: Arc<PacketResponse>) {
        let previous = self.inner.lock().unwrap().insert(xid, response);
        if previous.is_some() {
            warn!("transaction id collision on {:#010x}, replacing observer", xid);
        }
    }

    pub fn get(&self, xid: u32) -> Option<Arc<PacketResponse>> {
        self.inner.lock().unwrap().get(&xid).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn observer() -> Arc<PacketResponse> {
        Arc::new(PacketResponse::new(Duration::from_secs(5)))
    }

    #[test]
    fn test_insert_and_get() {
        let table = TransactionTable::new();
        let pr = observer();
        table.insert(7, Arc::clone(&pr));

        assert!(table.get(7).is_some());
        assert!(table.get(8).is_none());
        assert!(Arc::ptr_eq(&table.get(7).unwrap(), &pr));
    }

    #[test]
    fn test_collision_replaces() {
        let table = TransactionTable::new();
        let first = observer();
        let second = observer();
        table.insert(7, Arc::clone(&first));
        table.insert(7, Arc::clone(&second));

        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(&table.get(7).unwrap(), &second));
    }
}
