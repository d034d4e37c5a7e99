//! Health states and the priority orderings used to combine them.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Health state of a part of the application.
///
/// The integer codes are part of the public interface (they are what a status
/// variable actually carries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Fault,
    Off,
    Warning,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Ok, Status::Fault, Status::Off, Status::Warning];

    /// Integer code carried by status variables.
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Fault => 1,
            Status::Off => 2,
            Status::Warning => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Status> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Fault => "FAULT",
            Status::Off => "OFF",
            Status::Warning => "WARNING",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

/// Ordering used by an aggregator to pick the winning status.
///
/// Names list the states from highest to lowest priority (f = fault,
/// w = warning, o = off, k = ok).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMode {
    #[default]
    Fwok,
    Fwko,
    /// OK and OFF share the lowest rank; a mix of both reports WARNING.
    FwWarnMixed,
    Ofwk,
}

impl PriorityMode {
    pub const ALL: [PriorityMode; 4] = [
        PriorityMode::Fwok,
        PriorityMode::Fwko,
        PriorityMode::FwWarnMixed,
        PriorityMode::Ofwk,
    ];

    /// Priority of `status` in this mode, higher wins. `-1` marks the shared
    /// rank of OK and OFF in [`PriorityMode::FwWarnMixed`].
    pub fn priority(self, status: Status) -> i32 {
        match (self, status) {
            (PriorityMode::Fwok, Status::Ok) => 0,
            (PriorityMode::Fwok, Status::Off) => 1,
            (PriorityMode::Fwko, Status::Off) => 0,
            (PriorityMode::Fwko, Status::Ok) => 1,
            (PriorityMode::FwWarnMixed, Status::Ok | Status::Off) => -1,
            (PriorityMode::Ofwk, Status::Ok) => 0,
            (PriorityMode::Ofwk, Status::Warning) => 1,
            (PriorityMode::Ofwk, Status::Fault) => 2,
            (PriorityMode::Ofwk, Status::Off) => 3,
            (_, Status::Warning) => 2,
            (_, Status::Fault) => 3,
        }
    }
}

/// Result of combining a set of statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduced {
    pub status: Status,
    /// Position of the input the status was taken from, `None` if OK and OFF
    /// were mixed in [`PriorityMode::FwWarnMixed`].
    pub origin: Option<usize>,
}

/// Combine `statuses` according to `mode`. Returns `None` for an empty input.
///
/// On equal priority the earliest input wins, except that two different
/// statuses at the shared rank `-1` escalate to WARNING. A WARNING input still
/// replaces such an escalation, so its origin is reported.
pub fn reduce<I>(mode: PriorityMode, statuses: I) -> Option<Reduced>
where
    I: IntoIterator<Item = Status>,
{
    let mut current: Option<Reduced> = None;
    for (index, status) in statuses.into_iter().enumerate() {
        let priority = mode.priority(status);
        match current.as_mut() {
            None => {
                current = Some(Reduced {
                    status,
                    origin: Some(index),
                })
            }
            Some(held) => {
                let held_priority = mode.priority(held.status);
                // a real input outranks the escalation at equal priority
                if priority > held_priority || (priority == held_priority && held.origin.is_none())
                {
                    *held = Reduced {
                        status,
                        origin: Some(index),
                    };
                } else if priority == -1 && held_priority == -1 && status != held.status {
                    *held = Reduced {
                        status: Status::Warning,
                        origin: None,
                    };
                }
            }
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Status::Ok.code(), 0);
        assert_eq!(Status::Fault.code(), 1);
        assert_eq!(Status::Off.code(), 2);
        assert_eq!(Status::Warning.code(), 3);
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(7), None);
    }

    #[test]
    fn fwko_scenario() {
        let r = reduce(PriorityMode::Fwko, [Status::Off, Status::Off]).unwrap();
        assert_eq!(r.status, Status::Off);
        let r = reduce(PriorityMode::Fwko, [Status::Off, Status::Fault]).unwrap();
        assert_eq!(r, Reduced { status: Status::Fault, origin: Some(1) });
        let r = reduce(PriorityMode::Fwko, [Status::Off, Status::Ok]).unwrap();
        assert_eq!(r.status, Status::Ok);
    }

    #[test]
    fn ofwk_puts_off_first() {
        let r = reduce(PriorityMode::Ofwk, [Status::Fault, Status::Off]).unwrap();
        assert_eq!(r.status, Status::Off);
    }

    #[test]
    fn mixed_ok_off_escalates() {
        let mode = PriorityMode::FwWarnMixed;
        assert_eq!(
            reduce(mode, [Status::Ok, Status::Off]),
            Some(Reduced { status: Status::Warning, origin: None })
        );
        assert_eq!(reduce(mode, [Status::Ok, Status::Ok]).unwrap().status, Status::Ok);
        assert_eq!(reduce(mode, [Status::Off, Status::Off]).unwrap().status, Status::Off);
        // a real fault still wins over the escalation
        assert_eq!(
            reduce(mode, [Status::Ok, Status::Off, Status::Fault]).unwrap().status,
            Status::Fault
        );
    }

    #[test]
    fn real_warning_beats_mixed_escalation() {
        let mode = PriorityMode::FwWarnMixed;
        let after = reduce(mode, [Status::Ok, Status::Off, Status::Warning]).unwrap();
        let before = reduce(mode, [Status::Warning, Status::Ok, Status::Off]).unwrap();
        assert_eq!(after, Reduced { status: Status::Warning, origin: Some(2) });
        assert_eq!(before, Reduced { status: Status::Warning, origin: Some(0) });
    }

    #[test]
    fn equal_priority_keeps_earliest() {
        let r = reduce(PriorityMode::Fwok, [Status::Warning, Status::Warning]).unwrap();
        assert_eq!(r.origin, Some(0));
    }

    #[test]
    fn empty_input() {
        assert_eq!(reduce(PriorityMode::Fwok, []), None);
    }

    #[test]
    fn mode_names_in_yaml() {
        let mode: PriorityMode = serde_yaml::from_str("fw_warn_mixed").unwrap();
        assert_eq!(mode, PriorityMode::FwWarnMixed);
    }
}
