/// Validity flag carried with every value update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataValidity {
    #[default]
    Ok,
    Faulty,
}

impl DataValidity {
    pub fn is_ok(self) -> bool {
        self == DataValidity::Ok
    }
}
