use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// How the solver interprets the genes of a permutation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProtectionType {
    /// Genes are individual primary cells.
    Individual,
    /// Genes are groups of cells.
    Group,
}

/// The LP formulation bounding a primary cell from above (`yplus`) or below (`yminus`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Model {
    YPlus,
    YMinus,
}

impl Model {
    pub const COUNT: usize = 2;

    /// Dense index, used for per-model counters.
    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            Model::YPlus => 0,
            Model::YMinus => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_wire_names() {
        assert_eq!(Model::YPlus.to_string(), "yplus");
        assert_eq!(Model::YMinus.to_string(), "yminus");
        assert_eq!(ProtectionType::Individual.to_string(), "individual");
        assert_eq!(<ProtectionType as FromStr>::from_str("group").unwrap(), ProtectionType::Group);
    }

    #[test]
    fn test_model_indices_are_dense() {
        let mut seen: Vec<usize> = Model::iter().map(Model::index).collect();
        seen.sort();
        assert_eq!(seen, (0..Model::COUNT).collect::<Vec<_>>());
    }
}
