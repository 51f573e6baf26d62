//! Tracks which recording identifiers have a session in flight.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::RecordingId;

/// Set of identifiers currently being recorded.
///
/// A second session for an identifier that is already active is refused, so
/// two writers can never race on the same destination file.
#[derive(Debug, Clone, Default)]
pub struct ActiveRecordings {
    inner: Arc<Mutex<HashSet<RecordingId>>>,
}

impl ActiveRecordings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for the caller. Returns `None` if another session holds it.
    pub fn claim(&self, id: &RecordingId) -> Option<RecordingClaim> {
        let inserted = self.inner.lock().insert(id.clone());
        inserted.then(|| RecordingClaim {
            id: id.clone(),
            registry: Arc::clone(&self.inner),
        })
    }

    pub fn is_active(&self, id: &RecordingId) -> bool {
        self.inner.lock().contains(id)
    }

    /// Number of sessions in flight.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Exclusive hold on a recording identifier, released on drop.
#[derive(Debug)]
pub struct RecordingClaim {
    id: RecordingId,
    registry: Arc<Mutex<HashSet<RecordingId>>>,
}

impl RecordingClaim {
    pub fn id(&self) -> &RecordingId {
        &self.id
    }
}

impl Drop for RecordingClaim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused_until_release() {
        let registry = ActiveRecordings::new();
        let id = RecordingId::parse("A").unwrap();

        let claim = registry.claim(&id).unwrap();
        assert!(registry.claim(&id).is_none());
        assert!(registry.is_active(&id));

        drop(claim);
        assert!(!registry.is_active(&id));
        assert!(registry.claim(&id).is_some());
    }

    #[test]
    fn test_distinct_identifiers_are_independent() {
        let registry = ActiveRecordings::new();
        let a = registry.claim(&RecordingId::parse("A").unwrap()).unwrap();
        let b = registry.claim(&RecordingId::parse("B").unwrap()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(a.id().as_str(), "A");
        assert_eq!(b.id().as_str(), "B");
    }
}
