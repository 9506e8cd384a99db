//! Mass-ratio requirements of the HEP top tagger combined with a b-jet multiplicity veto.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TaggerResult;
use crate::physics::constituent::Constituent;
use crate::tagger::config::COMMON_CONTEXT;
use crate::tagger::modules::{ModuleSetup, TopTaggerModule};
use crate::tagger::results::TopTaggerResults;

/// Cut values with the ratio window already scaled by `m_w / m_t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HepRequirementsConfig {
    pub m_w: f64,
    pub m_t: f64,
    pub r_min: f64,
    pub r_max: f64,
    pub csv_threshold: f64,
    pub b_eta_cut: f64,
    pub max_nb_in_top: i32,
}

impl HepRequirementsConfig {
    /// # Arguments
    ///
    /// * `r_min_cfg`, `r_max_cfg` - the unscaled window; multiplied by `m_w / m_t` here.
    pub fn new(m_w: f64, m_t: f64, r_min_cfg: f64, r_max_cfg: f64, csv_threshold: f64, b_eta_cut: f64, max_nb_in_top: i32) -> Self {
        HepRequirementsConfig {
            m_w,
            m_t,
            r_min: r_min_cfg * m_w / m_t,
            r_max: r_max_cfg * m_w / m_t,
            csv_threshold,
            b_eta_cut,
            max_nb_in_top,
        }
    }
}

/// Trijet mass-ratio test; true if any of the three W-pairing hypotheses holds.
///
/// # Arguments
///
/// * `m12`, `m13`, `m23` - pairwise masses in constituent order
/// * `m123` - candidate mass
/// * `r_min`, `r_max` - scaled ratio window
pub fn trijet_mass_ratio(m12: f64, m13: f64, m23: f64, m123: f64, r_min: f64, r_max: f64) -> bool {
    let r23 = m23 / m123;
    let r13_12 = m13 / m12;
    let r12_13 = m12 / m13;

    let criterion_a = 0.2 < r13_12.atan() && r13_12.atan() < 1.3 && r_min < r23 && r23 < r_max;

    let criterion_b = r_min.powi(2) * (1.0 + r13_12.powi(2)) < 1.0 - r23.powi(2)
        && 1.0 - r23.powi(2) < r_max.powi(2) * (1.0 + r13_12.powi(2));

    let criterion_c = r_min.powi(2) * (1.0 + r12_13.powi(2)) < 1.0 - r23.powi(2)
        && 1.0 - r23.powi(2) < r_max.powi(2) * (1.0 + r12_13.powi(2));

    criterion_a || criterion_b || criterion_c
}

/// Dijet variant: the first jet's mass relative to the candidate mass.
pub fn dijet_mass_ratio(m1: f64, m12: f64, r_min: f64, r_max: f64) -> bool {
    let r = m1 / m12;
    r_min < r && r < r_max
}

#[derive(Clone, Debug)]
pub struct HepRequirements {
    context: String,
    config: HepRequirementsConfig,
}

impl HepRequirements {
    pub fn new(context: &str, config: HepRequirementsConfig) -> Self {
        HepRequirements { context: context.to_string(), config }
    }

    /// Masses and b-tag cuts come from `Common`, the ratio window from `context`; all are required.
    pub fn configure(setup: &ModuleSetup, context: &str) -> TaggerResult<Self> {
        let cfg = setup.cfg;
        let config = HepRequirementsConfig::new(
            cfg.require("mW", COMMON_CONTEXT)?,
            cfg.require("mt", COMMON_CONTEXT)?,
            cfg.require("Rmin", context)?,
            cfg.require("Rmax", context)?,
            cfg.require("csvThreshold", COMMON_CONTEXT)?,
            cfg.require("bEtaCut", COMMON_CONTEXT)?,
            cfg.require("maxNbInTop", COMMON_CONTEXT)?,
        );
        debug!(context, r_min = config.r_min, r_max = config.r_max, max_nb = config.max_nb_in_top, "configured HEP requirements");
        Ok(HepRequirements::new(context, config))
    }

    pub fn config(&self) -> &HepRequirementsConfig {
        &self.config
    }

    fn passes_mass_ratio(&self, jets: &[&Constituent], m123: f64) -> bool {
        let c = &self.config;
        match jets {
            [j1, j2, j3] => {
                let m12 = (*j1.p() + *j2.p()).m();
                let m23 = (*j2.p() + *j3.p()).m();
                let m13 = (*j1.p() + *j3.p()).m();
                trijet_mass_ratio(m12, m13, m23, m123, c.r_min, c.r_max)
            }
            [j1, _] => dijet_mass_ratio(j1.p().m(), m123, c.r_min, c.r_max),
            _ => true,
        }
    }

    fn n_b_jets(&self, jets: &[&Constituent]) -> i32 {
        jets.iter()
            .filter(|j| j.btag_disc() > self.config.csv_threshold && j.p().eta().abs() < self.config.b_eta_cut)
            .count() as i32
    }

    /// Both the mass-ratio test and the b-jet veto (`n_b <= max_nb_in_top`).
    pub fn passes(&self, jets: &[&Constituent], m123: f64) -> bool {
        self.passes_mass_ratio(jets, m123) && self.n_b_jets(jets) <= self.config.max_nb_in_top
    }
}

impl TopTaggerModule for HepRequirements {
    fn name(&self) -> &str {
        &self.context
    }

    fn run(&self, results: &mut TopTaggerResults) -> TaggerResult<()> {
        let passing: Vec<_> = results
            .candidate_ids()
            .filter(|&id| !results.is_promoted(id))
            .filter(|&id| self.passes(&results.constituents_of(id), results.candidate(id).p().m()))
            .collect();
        let promoted = passing.into_iter().filter(|&id| results.promote(id)).count();
        debug!(module = %self.context, promoted, "HEP requirements");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaggerError;
    use crate::physics::lorentz::LorentzVector;
    use crate::tagger::assembler::CandidateAssembler;
    use crate::tagger::config::CfgDocument;
    use crate::tagger::discriminant::ModelStore;

    #[test]
    fn test_symmetric_trijet_passes() {
        let m123 = 171.0;
        let m = m123 / 3.0;
        assert!(trijet_mass_ratio(m, m, m, m123, 0.0, 1.0));
    }

    #[test]
    fn test_inverted_window_never_passes() {
        let m123 = 171.0;
        for (m12, m13, m23) in [(57.0, 57.0, 57.0), (80.0, 60.0, 90.0), (10.0, 150.0, 40.0), (120.0, 20.0, 80.0)] {
            assert!(!trijet_mass_ratio(m12, m13, m23, m123, 1.0, 0.5));
        }
        assert!(!dijet_mass_ratio(80.0, 170.0, 1.0, 0.5));
    }

    #[test]
    fn test_dijet_ratio_window() {
        assert!(dijet_mass_ratio(80.0, 170.0, 0.4, 0.6));
        assert!(!dijet_mass_ratio(30.0, 170.0, 0.4, 0.6));
    }

    #[test]
    fn test_window_is_scaled() {
        let config = HepRequirementsConfig::new(80.0, 160.0, 0.8, 1.2, 0.8, 2.4, 1);
        assert!((config.r_min - 0.4).abs() < 1e-12);
        assert!((config.r_max - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_missing_parameter_fails_at_setup() {
        let cfg = CfgDocument::from_json_str(r#"{ "Common": { "mW": 80.4, "mt": 173.0 }, "HEP": { "Rmin": 0.85 } }"#).unwrap();
        let models = ModelStore::new();
        let err = HepRequirements::configure(&ModuleSetup::new(&cfg, &models), "HEP").unwrap_err();
        assert!(matches!(err, TaggerError::MissingParameter { ref key, .. } if key == "Rmax"));
    }

    #[test]
    fn test_b_jet_veto_is_inclusive() {
        let jets = vec![
            Constituent::ak4_jet(LorentzVector::from_pt_eta_phi_m(50.0, 0.0, 0.0, 5.0), 0.9, 0.0),
            Constituent::ak4_jet(LorentzVector::from_pt_eta_phi_m(40.0, 3.0, 1.0, 5.0), 0.9, 0.0),
            Constituent::ak4_jet(LorentzVector::from_pt_eta_phi_m(40.0, 0.5, 2.0, 5.0), 0.95, 0.0),
        ];
        let module = |max_nb| HepRequirements::new("HEP", HepRequirementsConfig::new(1.0, 1.0, -1e9, 1e9, 0.8, 2.4, max_nb));
        // the dijet window is wide open, so only the veto decides
        let central_and_forward = [&jets[0], &jets[1]];
        let both_central = [&jets[0], &jets[2]];
        assert!(module(1).passes(&central_and_forward, 1.0));
        assert!(!module(1).passes(&both_central, 1.0));
        assert!(module(2).passes(&both_central, 1.0));
        assert_eq!(module(0).n_b_jets(&[&jets[1]]), 0);
    }

    #[test]
    fn test_monojets_promoted_once() {
        let jets: Vec<Constituent> = (0..3)
            .map(|i| Constituent::ak4_jet(LorentzVector::from_pt_eta_phi_m(50.0, 0.3 * i as f64, i as f64, 5.0), 0.1, 0.0).with_index(i))
            .collect();
        let mut results = CandidateAssembler::new(1).unwrap().assemble(jets);
        let module = HepRequirements::new("HEP", HepRequirementsConfig::new(80.0, 173.0, 0.85, 1.25, 0.8, 2.4, 1));
        module.run(&mut results).unwrap();
        module.run(&mut results).unwrap();
        assert_eq!(results.tops().len(), 3);
    }
}
