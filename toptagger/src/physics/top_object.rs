use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::physics::lorentz::LorentzVector;

/// Handle of a constituent inside the event's constituent arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstituentId(pub usize);

/// Handle of a top candidate inside the results container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopId(pub usize);

impl Display for TopId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents the category of a top candidate.
///
/// # Description
///
/// Resolved categories are built from one, two or three AK4 jets, merged categories from a
/// single large-radius jet and `ResolvedTopCandidate` from a triplet that was assembled outside
/// the tagger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopType {
    ResolvedMonojet,
    ResolvedDijet,
    ResolvedTrijet,
    MergedTop,
    MergedW,
    ResolvedTopCandidate,
}

impl TopType {
    /// Returns the `TopType` corresponding to the given integer code.
    ///
    /// # Arguments
    ///
    /// * `type_code` - An integer value as produced by [`TopType::type_numeric`].
    ///
    pub fn new(type_code: i32) -> Option<TopType> {
        match type_code {
            1 => Some(TopType::ResolvedMonojet),
            2 => Some(TopType::ResolvedDijet),
            3 => Some(TopType::ResolvedTrijet),
            4 => Some(TopType::MergedTop),
            6 => Some(TopType::MergedW),
            8 => Some(TopType::ResolvedTopCandidate),
            _ => None,
        }
    }

    /// Returns the integer code of the `TopType`.
    pub fn type_numeric(&self) -> i32 {
        match self {
            TopType::ResolvedMonojet => 1,
            TopType::ResolvedDijet => 2,
            TopType::ResolvedTrijet => 3,
            TopType::MergedTop => 4,
            TopType::MergedW => 6,
            TopType::ResolvedTopCandidate => 8,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, TopType::MergedTop | TopType::MergedW)
    }
}

impl Display for TopType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TopType::ResolvedMonojet => write!(f, "ResolvedMonojet"),
            TopType::ResolvedDijet => write!(f, "ResolvedDijet"),
            TopType::ResolvedTrijet => write!(f, "ResolvedTrijet"),
            TopType::MergedTop => write!(f, "MergedTop"),
            TopType::MergedW => write!(f, "MergedW"),
            TopType::ResolvedTopCandidate => write!(f, "ResolvedTopCandidate"),
        }
    }
}

impl FromStr for TopType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ResolvedMonojet" | "MONOJET" => Ok(TopType::ResolvedMonojet),
            "ResolvedDijet" | "DIJET" => Ok(TopType::ResolvedDijet),
            "ResolvedTrijet" | "TRIJET" => Ok(TopType::ResolvedTrijet),
            "MergedTop" | "MERGED_TOP" => Ok(TopType::MergedTop),
            "MergedW" | "MERGED_W" => Ok(TopType::MergedW),
            "ResolvedTopCandidate" | "RESOLVED_TOP" => Ok(TopType::ResolvedTopCandidate),
            _ => Err(format!("unknown top type \"{}\"", s)),
        }
    }
}

/// A grouping of one to three constituents.
///
/// Constituents are referenced by [`ConstituentId`] into the arena owned by
/// [`TopTaggerResults`](crate::tagger::results::TopTaggerResults); the candidate never owns them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopObject {
    constituents: Vec<ConstituentId>,
    p: LorentzVector,
    kind: TopType,
    discriminator: Option<f64>,
}

impl TopObject {
    pub fn new(constituents: Vec<ConstituentId>, p: LorentzVector, kind: TopType) -> Self {
        TopObject {
            constituents,
            p,
            kind,
            discriminator: None,
        }
    }

    pub fn constituents(&self) -> &[ConstituentId] {
        &self.constituents
    }

    pub fn n_constituents(&self) -> usize {
        self.constituents.len()
    }

    pub fn p(&self) -> &LorentzVector {
        &self.p
    }

    pub fn kind(&self) -> TopType {
        self.kind
    }

    pub fn discriminator(&self) -> Option<f64> {
        self.discriminator
    }

    /// Stores the discriminator; returns `false` if one was already present.
    pub(crate) fn set_discriminator(&mut self, value: f64) -> bool {
        if self.discriminator.is_some() {
            return false;
        }
        self.discriminator = Some(value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for kind in [
            TopType::ResolvedMonojet,
            TopType::ResolvedDijet,
            TopType::ResolvedTrijet,
            TopType::MergedTop,
            TopType::MergedW,
            TopType::ResolvedTopCandidate,
        ] {
            assert_eq!(TopType::new(kind.type_numeric()), Some(kind));
            assert_eq!(kind.to_string().parse::<TopType>(), Ok(kind));
        }
        assert_eq!(TopType::new(0), None);
    }

    #[test]
    fn test_discriminator_set_once() {
        let mut top = TopObject::new(vec![ConstituentId(0)], LorentzVector::default(), TopType::ResolvedMonojet);
        assert_eq!(top.discriminator(), None);
        assert!(top.set_discriminator(0.7));
        assert!(!top.set_discriminator(0.1));
        assert_eq!(top.discriminator(), Some(0.7));
    }
}
