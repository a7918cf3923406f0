use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::path::{Path, Segment};

/// A subscriber callback, invoked with the path that changed.
pub type Listener = Arc<dyn Fn(&Path) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: usize,
    pub(crate) path: Path,
    pub(crate) listener: Listener,
}

type RootTable = Arc<Mutex<Vec<Entry>>>;
type BucketTable = Arc<Mutex<HashMap<Segment, Vec<Entry>>>>;

/// RAII guard returned by [`super::Bus::subscribe`]. Dropping it removes
/// the registration synchronously.
pub struct Unsubscribe {
    id: usize,
    path: Path,
    root: RootTable,
    buckets: BucketTable,
}

impl Unsubscribe {
    pub(crate) fn new(id: usize, path: Path, root: RootTable, buckets: BucketTable) -> Self {
        Self {
            id,
            path,
            root,
            buckets,
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        match self.path.first() {
            None => {
                self.root.lock().retain(|e| e.id != self.id);
            }
            Some(seg) => {
                let mut guard = self.buckets.lock();
                if let Some(bucket) = guard.get_mut(seg) {
                    bucket.retain(|e| e.id != self.id);
                    if bucket.is_empty() {
                        guard.remove(seg);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
