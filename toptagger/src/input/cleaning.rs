//! Removal of AK4 jets that are really isolated leptons.

use crate::error::{check_length, TaggerError, TaggerResult};
use crate::physics::lorentz::LorentzVector;
use crate::physics::truth::delta_r_match;

/// Jets below this pt are always dropped; slightly under 20 GeV to absorb rounding of stored values.
pub const MIN_JET_PT: f64 = 19.9;
pub const MIN_LEPTON_PT: f64 = 10.0;
pub const LEPTON_MATCH_DR: f64 = 0.2;
pub const ELECTRON_MAX_MINI_ISO: f64 = 0.10;
pub const MUON_MAX_REL_ISO: f64 = 0.2;

const ELECTRON_N_CUTS: usize = 10;
const ELECTRON_BIT_STRIDE: usize = 3;
const ELECTRON_BIT_MASK: i32 = 0o7;
// the three relative-isolation bits, forced to pass so mini-isolation can be used instead
const ELECTRON_ISO_BIT_MASK: i32 = 0o70000000;

/// Cut-based electron ID level (0 to 7) from the compressed 10 cut x 3 bit map, ignoring isolation.
pub fn electron_id_without_isolation(cut_bits: i32) -> i32 {
    let mut bits = cut_bits | ELECTRON_ISO_BIT_MASK;
    let mut id = ELECTRON_BIT_MASK;
    for _ in 0..ELECTRON_N_CUTS {
        id = id.min(bits & ELECTRON_BIT_MASK);
        bits >>= ELECTRON_BIT_STRIDE;
    }
    id
}

#[derive(Clone, Copy, Debug)]
pub struct ElectronInputs<'a> {
    pub p4: &'a [LorentzVector],
    pub cut_based_bits: &'a [i32],
    pub mini_rel_iso: &'a [f64],
}

#[derive(Clone, Copy, Debug)]
pub struct MuonInputs<'a> {
    pub p4: &'a [LorentzVector],
    /// Loose ID flag; `None` when only ID-passing muons were stored.
    pub id: Option<&'a [bool]>,
    pub pf_rel_iso: &'a [f64],
}

/// Per-jet references to the closest electron and muon, negative if none.
#[derive(Clone, Copy, Debug)]
pub struct LeptonCleaning<'a> {
    pub jet_electron_idx: &'a [i32],
    pub jet_muon_idx: &'a [i32],
    pub electrons: ElectronInputs<'a>,
    pub muons: MuonInputs<'a>,
}

fn lepton_ref(what: &str, idx: i32, len: usize) -> TaggerResult<Option<usize>> {
    if idx < 0 {
        return Ok(None);
    }
    let index = idx as usize;
    if index >= len {
        return Err(TaggerError::IndexOutOfRange { what: what.to_string(), index, len });
    }
    Ok(Some(index))
}

impl<'a> LeptonCleaning<'a> {
    fn validate(&self, n_jets: usize) -> TaggerResult<()> {
        check_length("jet electron references", n_jets, self.jet_electron_idx.len())?;
        check_length("jet muon references", n_jets, self.jet_muon_idx.len())?;
        let n_elec = self.electrons.p4.len();
        check_length("electron cut-based ID bits", n_elec, self.electrons.cut_based_bits.len())?;
        check_length("electron mini-isolation", n_elec, self.electrons.mini_rel_iso.len())?;
        let n_muon = self.muons.p4.len();
        if let Some(id) = self.muons.id {
            check_length("muon ID", n_muon, id.len())?;
        }
        check_length("muon relative isolation", n_muon, self.muons.pf_rel_iso.len())
    }

    fn is_isolated_electron(&self, jet: &LorentzVector, idx: i32) -> TaggerResult<bool> {
        let Some(e) = lepton_ref("electrons", idx, self.electrons.p4.len())? else {
            return Ok(false);
        };
        let electron = &self.electrons.p4[e];
        Ok(electron.pt() > MIN_LEPTON_PT
            && electron_id_without_isolation(self.electrons.cut_based_bits[e]) >= 1
            && self.electrons.mini_rel_iso[e] < ELECTRON_MAX_MINI_ISO
            && delta_r_match(jet, electron, LEPTON_MATCH_DR))
    }

    fn is_isolated_muon(&self, jet: &LorentzVector, idx: i32) -> TaggerResult<bool> {
        let Some(m) = lepton_ref("muons", idx, self.muons.p4.len())? else {
            return Ok(false);
        };
        let muon = &self.muons.p4[m];
        let passes_id = self.muons.id.map_or(true, |id| id[m]);
        Ok(muon.pt() > MIN_LEPTON_PT
            && passes_id
            && self.muons.pf_rel_iso[m] < MUON_MAX_REL_ISO
            && delta_r_match(jet, muon, LEPTON_MATCH_DR))
    }
}

/// Builds an AK4 filter that drops soft jets and jets overlapping an isolated lepton.
///
/// Without lepton inputs only the pt requirement is applied.
pub fn lepton_cleaning_filter(jets: &[LorentzVector], leptons: Option<&LeptonCleaning>) -> TaggerResult<Vec<bool>> {
    let Some(leptons) = leptons else {
        return Ok(jets.iter().map(|jet| jet.pt() >= MIN_JET_PT).collect());
    };
    leptons.validate(jets.len())?;

    jets.iter()
        .enumerate()
        .map(|(i, jet)| {
            let is_lepton = leptons.is_isolated_electron(jet, leptons.jet_electron_idx[i])?
                || leptons.is_isolated_muon(jet, leptons.jet_muon_idx[i])?;
            Ok(!is_lepton && jet.pt() >= MIN_JET_PT)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lv(pt: f64, eta: f64, phi: f64) -> LorentzVector {
        LorentzVector::from_pt_eta_phi_m(pt, eta, phi, 0.0)
    }

    #[test]
    fn test_electron_id_ignores_isolation_bits() {
        // all ten cuts at level 3
        let all_tight = (0..10).fold(0, |acc, i| acc | (3 << (3 * i)));
        assert_eq!(electron_id_without_isolation(all_tight), 3);
        // failing only the isolation cut still passes
        let iso_failed = all_tight & !ELECTRON_ISO_BIT_MASK;
        assert_eq!(electron_id_without_isolation(iso_failed), 3);
        // failing any other cut does not
        assert_eq!(electron_id_without_isolation(all_tight & !0o7), 0);
    }

    #[test]
    fn test_cleaning_filter() {
        let jets = vec![lv(50.0, 0.0, 0.0), lv(40.0, 1.0, 1.0), lv(19.0, -1.0, 2.0), lv(30.0, 2.0, -2.0)];
        let elec = vec![lv(45.0, 0.05, 0.0)];
        let bits = vec![(0..10).fold(0, |acc, i| acc | (2 << (3 * i)))];
        let mini_iso = vec![0.05];
        let muons = vec![lv(35.0, 1.0, 1.1), lv(25.0, 2.0, -2.0)];
        let rel_iso = vec![0.1, 0.5];
        let cleaning = LeptonCleaning {
            jet_electron_idx: &[0, -1, -1, -1],
            jet_muon_idx: &[-1, 0, -1, 1],
            electrons: ElectronInputs { p4: &elec, cut_based_bits: &bits, mini_rel_iso: &mini_iso },
            muons: MuonInputs { p4: &muons, id: None, pf_rel_iso: &rel_iso },
        };
        let filter = lepton_cleaning_filter(&jets, Some(&cleaning)).unwrap();
        // electron match, muon match, too soft, non-isolated muon
        assert_eq!(filter, vec![false, false, false, true]);
    }

    #[test]
    fn test_pt_only_without_leptons() {
        let jets = vec![lv(19.95, 0.0, 0.0), lv(19.85, 0.0, 0.0)];
        assert_eq!(lepton_cleaning_filter(&jets, None).unwrap(), vec![true, false]);
    }

    #[test]
    fn test_out_of_range_reference() {
        let jets = vec![lv(50.0, 0.0, 0.0)];
        let cleaning = LeptonCleaning {
            jet_electron_idx: &[3],
            jet_muon_idx: &[-1],
            electrons: ElectronInputs { p4: &[], cut_based_bits: &[], mini_rel_iso: &[] },
            muons: MuonInputs { p4: &[], id: None, pf_rel_iso: &[] },
        };
        assert!(matches!(
            lepton_cleaning_filter(&jets, Some(&cleaning)),
            Err(TaggerError::IndexOutOfRange { index: 3, len: 0, .. })
        ));
    }
}
