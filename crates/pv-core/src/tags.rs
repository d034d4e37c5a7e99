//! Reserved tags used by the framework itself.
//!
//! User tags are free-form strings. System tags are rendered with a `_pv_`
//! prefix so that they never collide with tags chosen by applications.

use core::fmt;

/// Tags the framework attaches to variables for discovery purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemTag {
    /// Marks a status output which can be aggregated.
    StatusOutput,
    /// Marks the output of a status aggregator.
    AggregatedStatus,
    /// Marks a status output which has a paired `<name>_message` variable.
    StatusHasMessage,
    /// Marks variables created internally, hidden from the control system.
    Internal,
    /// Marks inputs guarded by a user input validator.
    Validated,
}

impl SystemTag {
    pub const ALL: [SystemTag; 5] = [
        SystemTag::StatusOutput,
        SystemTag::AggregatedStatus,
        SystemTag::StatusHasMessage,
        SystemTag::Internal,
        SystemTag::Validated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SystemTag::StatusOutput => "_pv_status_output",
            SystemTag::AggregatedStatus => "_pv_aggregated_status",
            SystemTag::StatusHasMessage => "_pv_status_has_message",
            SystemTag::Internal => "_pv_internal",
            SystemTag::Validated => "_pv_validated",
        }
    }

    /// Look up the system tag a string stands for, if any.
    pub fn parse(tag: &str) -> Option<SystemTag> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// True if `tag` is reserved by the framework.
    pub fn is_reserved(tag: &str) -> bool {
        tag.starts_with("_pv_")
    }
}

impl fmt::Display for SystemTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SystemTag> for String {
    fn from(tag: SystemTag) -> Self {
        tag.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn system_tags_are_distinct_and_reserved() {
        let rendered: HashSet<_> = SystemTag::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(rendered.len(), SystemTag::ALL.len());
        for tag in SystemTag::ALL {
            assert!(SystemTag::is_reserved(tag.as_str()));
            assert_eq!(SystemTag::parse(tag.as_str()), Some(tag));
        }
        assert!(!SystemTag::is_reserved("temperature"));
        assert_eq!(SystemTag::parse("temperature"), None);
    }
}
