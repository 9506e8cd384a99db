//! Geometric association between reconstructed objects and generator-level top decays.

use serde::{Deserialize, Serialize};

use crate::error::{check_length, TaggerResult};
use crate::physics::constituent::GenMatch;
use crate::physics::lorentz::LorentzVector;

/// Reconstructed objects closer than this to a top daughter are considered matched (exclusive).
pub const GEN_MATCH_DR: f64 = 0.4;

const PDG_TOP: i32 = 6;
const PDG_BOTTOM: i32 = 5;
const PDG_W: i32 = 24;

/// Strict angular match, `ΔR(a, b) < cone`, shared by truth association and jet cleaning.
pub fn delta_r_match(a: &LorentzVector, b: &LorentzVector, cone: f64) -> bool {
    a.delta_r(b) < cone
}

/// Generator-level hadronic tops together with their direct decay daughters.
#[derive(Clone, Copy, Debug)]
pub struct GenInputs<'a> {
    tops: &'a [LorentzVector],
    daughters: &'a [Vec<LorentzVector>],
}

impl<'a> GenInputs<'a> {
    pub fn new(tops: &'a [LorentzVector], daughters: &'a [Vec<LorentzVector>]) -> Self {
        GenInputs { tops, daughters }
    }

    pub fn validate(&self) -> TaggerResult<()> {
        check_length("generator top daughters", self.tops.len(), self.daughters.len())
    }

    /// All (top, daughter) pairs with `ΔR(reco, daughter) < 0.4`.
    pub fn matches_for(&self, reco: &LorentzVector) -> Vec<GenMatch> {
        let mut matches = Vec::new();
        for (top_index, (top, daughters)) in self.tops.iter().zip(self.daughters.iter()).enumerate() {
            for (daughter_index, daughter) in daughters.iter().enumerate() {
                if delta_r_match(reco, daughter, GEN_MATCH_DR) {
                    matches.push(GenMatch {
                        top: *top,
                        daughter: *daughter,
                        top_index,
                        daughter_index,
                    });
                }
            }
        }
        matches
    }
}

/// Owned hadronic top decays, as extracted from a generator particle record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenTopDecays {
    pub tops: Vec<LorentzVector>,
    pub daughters: Vec<Vec<LorentzVector>>,
}

impl GenTopDecays {
    pub fn as_inputs(&self) -> GenInputs<'_> {
        GenInputs::new(&self.tops, &self.daughters)
    }
}

/// Returns true if the particle at `start` has `target` somewhere in its mother chain.
///
/// Negative mother indices terminate the chain.
pub fn descends_from(start: i32, target: usize, mothers: &[i32]) -> bool {
    let mut current = start;
    // a well formed record has no cycles, but never walk longer than the record itself
    for _ in 0..=mothers.len() {
        if current < 0 {
            return false;
        }
        let idx = current as usize;
        if idx >= mothers.len() {
            return false;
        }
        let mother = mothers[idx];
        if mother >= 0 && mother as usize == target {
            return true;
        }
        current = mother;
    }
    false
}

fn children(parent: usize, mothers: &[i32]) -> impl Iterator<Item = usize> + '_ {
    mothers
        .iter()
        .enumerate()
        .filter(move |(_, &m)| m >= 0 && m as usize == parent)
        .map(|(i, _)| i)
}

/// Follows radiative copies of a particle down to the last one.
fn last_copy(start: usize, pdg_id: &[i32], mothers: &[i32]) -> usize {
    let mut current = start;
    for _ in 0..mothers.len() {
        match children(current, mothers).find(|&c| pdg_id[c] == pdg_id[start]) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// Extracts hadronically decaying tops and their b quark and W-decay quarks.
///
/// # Arguments
///
/// * `p4` - Four-momenta of all generator particles.
/// * `pdg_id` - PDG identifiers of the particles.
/// * `mother_idx` - Index of each particle's mother, negative if none.
///
/// Tops whose W decays leptonically, or whose decay record is incomplete, are skipped.
pub fn hadronic_top_decays(p4: &[LorentzVector], pdg_id: &[i32], mother_idx: &[i32]) -> TaggerResult<GenTopDecays> {
    check_length("generator pdg ids", p4.len(), pdg_id.len())?;
    check_length("generator mother indices", p4.len(), mother_idx.len())?;

    let mut decays = GenTopDecays::default();

    for (i, &pdg) in pdg_id.iter().enumerate() {
        if pdg.abs() != PDG_TOP {
            continue;
        }
        // only consider the last copy of every top
        if children(i, mother_idx).any(|c| pdg_id[c] == pdg) {
            continue;
        }

        let bottom = children(i, mother_idx).find(|&c| pdg_id[c].abs() == PDG_BOTTOM);
        let w = (0..pdg_id.len()).find(|&j| {
            pdg_id[j].abs() == PDG_W
                && descends_from(j as i32, i, mother_idx)
                && !(mother_idx[j] >= 0 && pdg_id[mother_idx[j] as usize].abs() == PDG_W)
        });

        let (Some(bottom), Some(w)) = (bottom, w) else {
            continue;
        };

        let w_last = last_copy(w, pdg_id, mother_idx);
        let w_products: Vec<usize> = children(w_last, mother_idx).collect();
        let hadronic = !w_products.is_empty() && w_products.iter().all(|&q| (1..=PDG_BOTTOM).contains(&pdg_id[q].abs()));
        if !hadronic {
            continue;
        }

        let mut daughters = vec![p4[bottom]];
        daughters.extend(w_products.iter().map(|&q| p4[q]));

        decays.tops.push(p4[i]);
        decays.daughters.push(daughters);
    }

    Ok(decays)
}
