use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identifier of an accessor ("element").
///
/// - usable as a map key
/// - allocated once per accessor, never reused
/// - `ElementId::NONE` is the "no specific change" sentinel
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ElementId(u64);

impl ElementId {
    pub const NONE: ElementId = ElementId(0);

    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// False for the sentinel.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ElementId({})", self.0)
        } else {
            write!(f, "ElementId(NONE)")
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic stamp attached to every write.
///
/// Version numbers are globally ordered: a version created later always compares
/// greater. `VersionNumber::UNINITIALIZED` marks a variable that has never
/// received a value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VersionNumber(u64);

impl VersionNumber {
    pub const UNINITIALIZED: VersionNumber = VersionNumber(0);

    /// Create a new version, newer than every version created before.
    pub fn new() -> Self {
        Self(NEXT_VERSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_initialized(self) -> bool {
        self != Self::UNINITIALIZED
    }
}

impl fmt::Debug for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initialized() {
            write!(f, "v{}", self.0)
        } else {
            write!(f, "v(uninitialized)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_are_unique() {
        let a = ElementId::next();
        let b = ElementId::next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(!ElementId::NONE.is_valid());
        assert_eq!(ElementId::default(), ElementId::NONE);
    }

    #[test]
    fn versions_are_monotonic() {
        let v1 = VersionNumber::new();
        let v2 = VersionNumber::new();
        assert!(v2 > v1);
        assert!(v1 > VersionNumber::UNINITIALIZED);
        assert!(!VersionNumber::default().is_initialized());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    proptest! {
        #[test]
        fn allocated_ids_never_repeat(n in 1usize..64) {
            let ids: Vec<ElementId> = (0..n).map(|_| ElementId::next()).collect();
            let unique: BTreeSet<_> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), n);
            prop_assert!(ids.iter().all(|id| id.is_valid()));
        }

        #[test]
        fn versions_follow_creation_order(n in 2usize..64) {
            let versions: Vec<VersionNumber> = (0..n).map(|_| VersionNumber::new()).collect();
            prop_assert!(versions.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(versions.iter().all(|v| v.is_initialized()));
        }
    }
}
