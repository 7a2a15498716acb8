//! The in-memory mirror of pipeline-run objects.
//!
//! A single mutex over a map is adequate: readers take a cheap [`Store::snapshot`]
//! clone and never hold the lock across an `.await`, and writers (the Watcher's
//! `upsert`/`remove` and the Manager's post-admit projection) are serialized by
//! the same lock. This is the same split between a write handle and a
//! cloneable read-only store used by `kube_runtime::reflector::store`,
//! adapted here from a lock-free `DashMap` to an explicit `Mutex`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::model::{ObjectKey, PipelineRun};

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<ObjectKey, PipelineRun>,
}

/// Thread-safe in-memory mirror of pipeline-run objects keyed by `<namespace>/<name>`.
///
/// Cloning an `ObjectStore` yields a new handle to the same backing map.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    inner: Arc<Mutex<Inner>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `obj.key`.
    pub fn upsert(&self, obj: PipelineRun) {
        let key = obj.key.clone();
        let mut inner = self.inner.lock().expect("object store mutex poisoned");
        tracing::trace!(%key, "store upsert");
        inner.objects.insert(key, obj);
    }

    /// Remove the entry for `key`, if present.
    pub fn remove(&self, key: &ObjectKey) {
        let mut inner = self.inner.lock().expect("object store mutex poisoned");
        if inner.objects.remove(key).is_some() {
            tracing::trace!(%key, "store remove");
        }
    }

    /// Atomically replace the entire contents of the store.
    ///
    /// Used by the Watcher on entering `synced`: list results fully replace
    /// whatever was mirrored before, rather than being merged in.
    pub fn replace_all(&self, objs: impl IntoIterator<Item = PipelineRun>) {
        let mut inner = self.inner.lock().expect("object store mutex poisoned");
        inner.objects.clear();
        inner.objects.extend(objs.into_iter().map(|o| (o.key.clone(), o)));
        tracing::trace!(count = inner.objects.len(), "store replaced (resync)");
    }

    /// A shallow copy of all mirrored values. Readers should always snapshot
    /// rather than hold the lock during classification or iteration.
    pub fn snapshot(&self) -> Vec<PipelineRun> {
        let inner = self.inner.lock().expect("object store mutex poisoned");
        inner.objects.values().cloned().collect()
    }

    /// Apply `mutator` to the stored value for `key`, under the lock, if present.
    ///
    /// This is the Manager's optimistic post-admit projection: it must be
    /// visible to the very next tick and to the Watcher's Enforcement Gate
    /// before the confirming `MODIFIED` event arrives.
    pub fn patch_projection(&self, key: &ObjectKey, mutator: impl FnOnce(&mut PipelineRun)) -> bool {
        let mut inner = self.inner.lock().expect("object store mutex poisoned");
        match inner.objects.get_mut(key) {
            Some(obj) => {
                mutator(obj);
                tracing::trace!(%key, "store projection applied");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("object store mutex poisoned").objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
