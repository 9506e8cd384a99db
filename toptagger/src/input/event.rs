//! Owned, serializable event records and the per-event summary written by the binary.

use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::TaggerResult;
use crate::input::ak4::{Ak4Inputs, QgShapeInputs};
use crate::input::ak8::{Ak8Inputs, NSubjettinessInputs, NestedQgShapeInputs, PerJetSubjets, SubjetPool, SubjetSource};
use crate::input::calibration::PuppiSoftDropCorrection;
use crate::input::cleaning::{lepton_cleaning_filter, ElectronInputs, LeptonCleaning, MuonInputs};
use crate::input::packager::ConstituentPackager;
use crate::input::resolved::ResolvedCandInputs;
use crate::physics::lorentz::LorentzVector;
use crate::physics::truth::{hadronic_top_decays, GenTopDecays};
use crate::tagger::results::TopSummary;
use crate::tagger::top_tagger::TopTagger;

/// Four-momentum as stored in event files.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PtEtaPhiM {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub m: f64,
}

impl From<PtEtaPhiM> for LorentzVector {
    fn from(v: PtEtaPhiM) -> Self {
        LorentzVector::from_pt_eta_phi_m(v.pt, v.eta, v.phi, v.m)
    }
}

fn to_lorentz(values: &[PtEtaPhiM]) -> Vec<LorentzVector> {
    values.iter().map(|&v| v.into()).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QgShapeBlock {
    pub mult: Vec<f64>,
    pub ptd: Vec<f64>,
    pub axis1: Vec<f64>,
    pub axis2: Vec<f64>,
}

impl QgShapeBlock {
    fn as_inputs(&self) -> QgShapeInputs<'_> {
        QgShapeInputs { mult: &self.mult, ptd: &self.ptd, axis1: &self.axis1, axis2: &self.axis2 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NestedQgShapeBlock {
    pub mult: Vec<Vec<f64>>,
    pub ptd: Vec<Vec<f64>>,
    pub axis1: Vec<Vec<f64>>,
    pub axis2: Vec<Vec<f64>>,
}

impl NestedQgShapeBlock {
    fn as_inputs(&self) -> NestedQgShapeInputs<'_> {
        NestedQgShapeInputs { mult: &self.mult, ptd: &self.ptd, axis1: &self.axis1, axis2: &self.axis2 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ak4Block {
    pub p4: Vec<PtEtaPhiM>,
    pub btag: Vec<f64>,
    #[serde(default)]
    pub qgl: Option<Vec<f64>>,
    #[serde(default)]
    pub qg_shapes: Option<QgShapeBlock>,
    #[serde(default)]
    pub filter: Option<Vec<bool>>,
    /// Named per-jet variables, exposed to discriminators as extra variables.
    #[serde(default)]
    pub supplemental: BTreeMap<String, Vec<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TauBlock {
    pub tau1: Vec<f64>,
    pub tau2: Vec<f64>,
    pub tau3: Vec<f64>,
}

/// Either one shared subjet collection or subjets already listed per fat jet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjetBlock {
    Pool {
        p4: Vec<PtEtaPhiM>,
        #[serde(default)]
        btag: Option<Vec<f64>>,
        #[serde(default)]
        qg_shapes: Option<QgShapeBlock>,
    },
    PerJet {
        p4: Vec<Vec<PtEtaPhiM>>,
        #[serde(default)]
        btag: Option<Vec<Vec<f64>>>,
        #[serde(default)]
        qg_shapes: Option<NestedQgShapeBlock>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ak8Block {
    pub p4: Vec<PtEtaPhiM>,
    pub soft_drop_mass: Vec<f64>,
    pub subjets: SubjetBlock,
    #[serde(default)]
    pub n_subjettiness: Option<TauBlock>,
    #[serde(default)]
    pub top_disc: Option<Vec<f64>>,
    #[serde(default)]
    pub w_disc: Option<Vec<f64>>,
    #[serde(default)]
    pub filter: Option<Vec<bool>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBlock {
    pub p4: Vec<PtEtaPhiM>,
    pub disc: Vec<f64>,
    pub j1: Vec<i32>,
    pub j2: Vec<i32>,
    pub j3: Vec<i32>,
    #[serde(default)]
    pub filter: Option<Vec<bool>>,
}

/// Generator particle record; hadronic tops are extracted from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenBlock {
    pub p4: Vec<PtEtaPhiM>,
    pub pdg_id: Vec<i32>,
    pub mother_idx: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElectronBlock {
    pub p4: Vec<PtEtaPhiM>,
    pub cut_based_bits: Vec<i32>,
    pub mini_rel_iso: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MuonBlock {
    pub p4: Vec<PtEtaPhiM>,
    #[serde(default)]
    pub id: Option<Vec<bool>>,
    pub pf_rel_iso: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeptonBlock {
    pub jet_electron_idx: Vec<i32>,
    pub jet_muon_idx: Vec<i32>,
    pub electrons: ElectronBlock,
    pub muons: MuonBlock,
}

/// One event as read from an event file. Every collection is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub ak4: Option<Ak4Block>,
    #[serde(default)]
    pub ak8: Option<Ak8Block>,
    #[serde(default)]
    pub resolved: Option<ResolvedBlock>,
    #[serde(default)]
    pub gen: Option<GenBlock>,
    /// When present, AK4 jets overlapping isolated leptons are removed before packaging.
    #[serde(default)]
    pub leptons: Option<LeptonBlock>,
    /// Missing transverse momentum (x, y); enables the MT2 output.
    #[serde(default)]
    pub met: Option<[f64; 2]>,
}

/// What the binary reports per event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EventSummary {
    pub n_constituents: usize,
    pub n_candidates: usize,
    pub tops: Vec<TopSummary>,
    /// Final tops after overlap removal, as positions in `tops`.
    pub resolved_tops: Vec<usize>,
    pub mt2: Option<f64>,
}

impl EventRecord {
    /// Packages AK4 jets, resolved candidates and AK8 jets in that order, then tags the event.
    pub fn tag(&self, tagger: &TopTagger, correction: Option<&PuppiSoftDropCorrection>) -> TaggerResult<EventSummary> {
        let gen: Option<GenTopDecays> = match &self.gen {
            Some(g) => Some(hadronic_top_decays(&to_lorentz(&g.p4), &g.pdg_id, &g.mother_idx)?),
            None => None,
        };

        let ak4_p4 = self.ak4.as_ref().map(|b| to_lorentz(&b.p4)).unwrap_or_default();
        let ak4_filter = self.ak4_filter(&ak4_p4)?;
        let resolved_p4 = self.resolved.as_ref().map(|b| to_lorentz(&b.p4)).unwrap_or_default();
        let ak8_p4 = self.ak8.as_ref().map(|b| to_lorentz(&b.p4)).unwrap_or_default();
        let (pool_p4, per_jet_p4): (Vec<LorentzVector>, Vec<Vec<LorentzVector>>) = match self.ak8.as_ref().map(|b| &b.subjets) {
            Some(SubjetBlock::Pool { p4, .. }) => (to_lorentz(p4), Vec::new()),
            Some(SubjetBlock::PerJet { p4, .. }) => (Vec::new(), p4.iter().map(|sj| to_lorentz(sj)).collect()),
            None => (Vec::new(), Vec::new()),
        };

        let ak4 = self.ak4.as_ref().map(|block| {
            let mut ak4 = Ak4Inputs::new(&ak4_p4, &block.btag);
            if let Some(qgl) = &block.qgl {
                ak4 = ak4.with_qg_likelihood(qgl);
            }
            if let Some(shapes) = &block.qg_shapes {
                ak4 = ak4.with_qg_shapes(shapes.as_inputs());
            }
            if let Some(filter) = &ak4_filter {
                ak4 = ak4.with_filter(filter);
            }
            for (name, values) in &block.supplemental {
                ak4 = ak4.with_supplemental(name, values);
            }
            if let Some(gen) = &gen {
                ak4 = ak4.with_gen(gen.as_inputs());
            }
            ak4
        });

        let resolved = self.resolved.as_ref().map(|block| {
            let resolved = ResolvedCandInputs::new(&resolved_p4, &block.disc, &block.j1, &block.j2, &block.j3);
            match &block.filter {
                Some(filter) => resolved.with_filter(filter),
                None => resolved,
            }
        });

        let ak8 = self.ak8.as_ref().map(|block| {
            let subjets: SubjetSource = match &block.subjets {
                SubjetBlock::Pool { btag, qg_shapes, .. } => {
                    let mut pool = SubjetPool::new(&pool_p4);
                    if let Some(btag) = btag {
                        pool = pool.with_btag(btag);
                    }
                    if let Some(shapes) = qg_shapes {
                        pool = pool.with_qg_shapes(shapes.as_inputs());
                    }
                    pool.into()
                }
                SubjetBlock::PerJet { btag, qg_shapes, .. } => {
                    let mut per_jet = PerJetSubjets::new(&per_jet_p4);
                    if let Some(btag) = btag {
                        per_jet = per_jet.with_btag(btag);
                    }
                    if let Some(shapes) = qg_shapes {
                        per_jet = per_jet.with_qg_shapes(shapes.as_inputs());
                    }
                    per_jet.into()
                }
            };
            let mut ak8 = Ak8Inputs::new(&ak8_p4, &block.soft_drop_mass, subjets)
                .with_discriminators(block.top_disc.as_deref(), block.w_disc.as_deref());
            if let Some(taus) = &block.n_subjettiness {
                ak8 = ak8.with_n_subjettiness(NSubjettinessInputs { tau1: &taus.tau1, tau2: &taus.tau2, tau3: &taus.tau3 });
            }
            if let Some(filter) = &block.filter {
                ak8 = ak8.with_filter(filter);
            }
            if let Some(gen) = &gen {
                ak8 = ak8.with_gen(gen.as_inputs());
            }
            if let Some(correction) = correction {
                ak8 = ak8.with_puppi_correction(correction);
            }
            ak8
        });

        let mut packagers: Vec<&dyn ConstituentPackager> = Vec::new();
        if let Some(ak4) = &ak4 {
            packagers.push(ak4);
        }
        if let Some(resolved) = &resolved {
            packagers.push(resolved);
        }
        if let Some(ak8) = &ak8 {
            packagers.push(ak8);
        }
        let results = tagger.tag(&packagers)?;

        let tops = results.top_summaries();
        let resolved_tops = results
            .resolve_overlaps(tagger.reference_top_mass())
            .into_iter()
            .filter_map(|id| results.tops().iter().position(|&t| t == id))
            .collect();
        Ok(EventSummary {
            n_constituents: results.constituents().len(),
            n_candidates: results.candidates().len(),
            tops,
            resolved_tops,
            mt2: self.met.map(|[x, y]| results.calculate_mt2(x, y)),
        })
    }

    /// Explicit AK4 filter combined with lepton cleaning, if either is present.
    fn ak4_filter(&self, jets: &[LorentzVector]) -> TaggerResult<Option<Vec<bool>>> {
        let explicit = self.ak4.as_ref().and_then(|b| b.filter.as_ref());
        let Some(leptons) = &self.leptons else {
            return Ok(explicit.cloned());
        };

        let electrons = to_lorentz(&leptons.electrons.p4);
        let muons = to_lorentz(&leptons.muons.p4);
        let cleaning = LeptonCleaning {
            jet_electron_idx: &leptons.jet_electron_idx,
            jet_muon_idx: &leptons.jet_muon_idx,
            electrons: ElectronInputs {
                p4: &electrons,
                cut_based_bits: &leptons.electrons.cut_based_bits,
                mini_rel_iso: &leptons.electrons.mini_rel_iso,
            },
            muons: MuonInputs {
                p4: &muons,
                id: leptons.muons.id.as_deref(),
                pf_rel_iso: &leptons.muons.pf_rel_iso,
            },
        };
        let filter = lepton_cleaning_filter(jets, Some(&cleaning))?;
        Ok(Some(match explicit {
            // the AK4 packager reports the length mismatch
            Some(explicit) if explicit.len() != filter.len() => explicit.clone(),
            Some(explicit) => filter.iter().zip(explicit).map(|(&clean, &keep)| clean && keep).collect(),
            None => filter,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::config::CfgDocument;
    use crate::tagger::discriminant::ModelStore;

    fn tagger() -> TopTagger {
        let cfg = CfgDocument::from_json_str(
            r#"{ "TopTagger": { "maxConstituents": 3, "module": ["MergedObjectFilter"] } }"#,
        )
        .unwrap();
        TopTagger::from_cfg(&cfg, &ModelStore::new()).unwrap()
    }

    const EVENT: &str = r#"{
        "ak4": {
            "p4": [
                { "pt": 50.0, "eta": 0.0, "phi": 0.0, "m": 5.0 },
                { "pt": 40.0, "eta": 0.1, "phi": 0.1, "m": 5.0 },
                { "pt": 30.0, "eta": -1.0, "phi": 2.0, "m": 5.0 }
            ],
            "btag": [0.9, 0.1, 0.2],
            "supplemental": { "charge": [1.0, -1.0, 0.0] }
        },
        "ak8": {
            "p4": [{ "pt": 420.0, "eta": 1.0, "phi": -2.0, "m": 170.0 }],
            "soft_drop_mass": [168.0],
            "top_disc": [0.9],
            "subjets": { "pool": { "p4": [
                { "pt": 250.0, "eta": 1.05, "phi": -2.05, "m": 10.0 },
                { "pt": 170.0, "eta": 0.9, "phi": -1.9, "m": 8.0 }
            ] } }
        },
        "met": [30.0, -10.0]
    }"#;

    #[test]
    fn test_tag_event_record() {
        let event: EventRecord = serde_json::from_str(EVENT).unwrap();
        let summary = event.tag(&tagger(), None).unwrap();
        assert_eq!(summary.n_constituents, 4);
        // 3 monojets, 1 merged top, 3 dijets, 1 trijet
        assert_eq!(summary.n_candidates, 8);
        assert_eq!(summary.tops.len(), 1);
        assert_eq!(summary.tops[0].type_code, 4);
        assert_eq!(summary.resolved_tops, vec![0]);
        // a single top gives no MT2
        assert_eq!(summary.mt2, Some(0.0));
    }

    #[test]
    fn test_lepton_cleaning_removes_jet() {
        let mut event: EventRecord = serde_json::from_str(EVENT).unwrap();
        event.ak8 = None;
        event.leptons = Some(LeptonBlock {
            jet_electron_idx: vec![-1, -1, -1],
            jet_muon_idx: vec![-1, 0, -1],
            electrons: ElectronBlock { p4: vec![], cut_based_bits: vec![], mini_rel_iso: vec![] },
            muons: MuonBlock {
                p4: vec![PtEtaPhiM { pt: 38.0, eta: 0.1, phi: 0.12, m: 0.1 }],
                id: Some(vec![true]),
                pf_rel_iso: vec![0.05],
            },
        });
        let summary = event.tag(&tagger(), None).unwrap();
        assert_eq!(summary.n_constituents, 2);
        assert_eq!(summary.n_candidates, 3);
    }

    #[test]
    fn test_length_mismatch_fails_event() {
        let mut event: EventRecord = serde_json::from_str(EVENT).unwrap();
        if let Some(ak4) = event.ak4.as_mut() {
            ak4.btag.pop();
        }
        assert!(event.tag(&tagger(), None).is_err());
    }

    #[test]
    fn test_empty_event() {
        let summary = EventRecord::default().tag(&tagger(), None).unwrap();
        assert_eq!(summary.n_candidates, 0);
        assert!(summary.tops.is_empty());
        assert_eq!(summary.mt2, None);
    }

    #[test]
    fn test_summary_bincode_round_trip() {
        let event: EventRecord = serde_json::from_str(EVENT).unwrap();
        let summary = event.tag(&tagger(), None).unwrap();
        let bytes = bincode::encode_to_vec(&summary, bincode::config::standard()).unwrap();
        let (decoded, _): (EventSummary, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, summary);
    }
}
