use crate::types::{DisruptionKey, TargetRef};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Which disruption currently owns each target.
///
/// A target is claimed from selection until its record settles, so two live
/// disruptions never inject into the same target.
#[derive(Debug, Default)]
pub struct TargetClaims {
    owners: Mutex<HashMap<TargetRef, DisruptionKey>>,
}

impl TargetClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target` for `key`. Returns false if another disruption owns it.
    pub fn claim(&self, target: &TargetRef, key: &DisruptionKey) -> bool {
        let mut owners = self.owners.lock();
        match owners.get(target) {
            Some(owner) if owner != key => false,
            _ => {
                owners.insert(target.clone(), key.clone());
                true
            }
        }
    }

    /// Release `target` if `key` owns it.
    pub fn release(&self, target: &TargetRef, key: &DisruptionKey) {
        let mut owners = self.owners.lock();
        if owners.get(target) == Some(key) {
            owners.remove(target);
        }
    }

    pub fn release_all(&self, key: &DisruptionKey) {
        self.owners.lock().retain(|_, owner| owner != key);
    }

    pub fn owner(&self, target: &TargetRef) -> Option<DisruptionKey> {
        self.owners.lock().get(target).cloned()
    }

    pub fn len(&self) -> usize {
        self.owners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_are_exclusive() {
        let claims = TargetClaims::new();
        let a = DisruptionKey::new("default", "a");
        let b = DisruptionKey::new("default", "b");
        let target = TargetRef::pod("default", "web-0");

        assert!(claims.claim(&target, &a));
        assert!(claims.claim(&target, &a));
        assert!(!claims.claim(&target, &b));
        assert_eq!(claims.owner(&target), Some(a.clone()));

        claims.release(&target, &b);
        assert_eq!(claims.owner(&target), Some(a.clone()));

        claims.release(&target, &a);
        assert!(claims.claim(&target, &b));
    }

    #[test]
    fn test_release_all() {
        let claims = TargetClaims::new();
        let a = DisruptionKey::new("default", "a");
        let b = DisruptionKey::new("default", "b");
        claims.claim(&TargetRef::node("n1"), &a);
        claims.claim(&TargetRef::node("n2"), &a);
        claims.claim(&TargetRef::node("n3"), &b);

        claims.release_all(&a);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims.owner(&TargetRef::node("n3")), Some(b));
    }
}
