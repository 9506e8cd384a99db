//! Input features for learned discriminators, one calculator per candidate category.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{TaggerError, TaggerResult};
use crate::physics::constituent::{Constituent, ConstituentType, QgShapes};
use crate::physics::lorentz::LorentzVector;
use crate::physics::top_object::{TopObject, TopType};
use crate::tagger::discriminant::FeatureMap;

const TRIJET_FEATURES: &[&str] = &[
    "cand_pt",
    "cand_p",
    "cand_eta",
    "cand_phi",
    "cand_m",
    "cand_dRMax",
    "cand_dThetaMin",
    "cand_dThetaMax",
    "dTheta12",
    "dTheta13",
    "dTheta23",
    "j12_m",
    "j13_m",
    "j23_m",
    "j12_m_lab",
    "j13_m_lab",
    "j23_m_lab",
    "dR12_lab",
    "dR13_lab",
    "dR23_lab",
    "dR12_3_lab",
    "dRPtTop",
    "dRPtW",
    "sd_n2",
];

/// Per-jet trijet variables, expanded to `j1_<name>` .. `j3_<name>`.
const TRIJET_JET_FEATURES: &[&str] = &[
    "p",
    "p_top",
    "theta_top",
    "phi_top",
    "m",
    "CSV",
    "QGL",
    "qgMult",
    "qgPtD",
    "qgAxis1",
    "qgAxis2",
    "pt_lab",
    "eta_lab",
    "phi_lab",
    "m_lab",
    "CSV_lab",
    "QGL_lab",
    "qgMult_lab",
    "qgPtD_lab",
    "qgAxis1_lab",
    "qgAxis2_lab",
];

const MONOJET_FEATURES: &[&str] = &[
    "ak8_sdmass",
    "ak8_tau21",
    "ak8_tau32",
    "ak8_ptDR",
    "ak8_rel_ptdiff",
    "ak8_csv1_mass",
    "ak8_csv1_csv",
    "ak8_csv1_ptD",
    "ak8_csv1_axis1",
    "ak8_csv1_mult",
    "ak8_csv2_mass",
    "ak8_csv2_ptD",
    "ak8_csv2_axis1",
    "ak8_csv2_mult",
];

const DIJET_FEATURES: &[&str] = &[
    "var_fj_sdmass",
    "var_fj_tau21",
    "var_fj_ptDR",
    "var_fj_rel_ptdiff",
    "var_sj1_ptD",
    "var_sj1_axis1",
    "var_sj1_mult",
    "var_sj2_ptD",
    "var_sj2_axis1",
    "var_sj2_mult",
    "var_sjmax_csv",
    "var_sd_n2",
];

/// Feature sets understood by the learned-discriminant module.
///
/// # Description
///
/// * `Trijet` - three resolved AK4 jets; candidate kinematics, top rest-frame and lab-frame jet
///   variables. Jets are ordered by rest-frame momentum for plain names and by pt for `_lab` names.
///   Any other `jN_<name>` reads the jet's extra variable `<name>`.
/// * `Monojet` - merged top with two subjets; subjets ordered by b-tag discriminator.
/// * `Dijet` - merged W with two subjets; subjets ordered by pt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureCalculator {
    Trijet,
    Monojet,
    Dijet,
}

impl Display for FeatureCalculator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FeatureCalculator::Trijet => write!(f, "Trijet"),
            FeatureCalculator::Monojet => write!(f, "Monojet"),
            FeatureCalculator::Dijet => write!(f, "Dijet"),
        }
    }
}

impl FromStr for FeatureCalculator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Trijet" | "TRIJET" => Ok(FeatureCalculator::Trijet),
            "Monojet" | "MONOJET" => Ok(FeatureCalculator::Monojet),
            "Dijet" | "DIJET" => Ok(FeatureCalculator::Dijet),
            _ => Err(format!("unknown feature set \"{}\"", s)),
        }
    }
}

/// Splits `jN_<rest>` into the zero-based jet slot and `<rest>`.
fn split_jet_feature(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix('j')?;
    let mut chars = rest.chars();
    let slot = chars.next()?.to_digit(10)? as usize;
    let var = chars.as_str().strip_prefix('_')?;
    if (1..=3).contains(&slot) && !var.is_empty() {
        Some((slot - 1, var))
    } else {
        None
    }
}

fn by_desc(a: f64, b: f64) -> Ordering {
    OrderedFloat(b).cmp(&OrderedFloat(a))
}

fn shapes(c: &Constituent) -> QgShapes {
    c.qg_shapes().copied().unwrap_or_default()
}

/// `z / dR^-2` with `z` the softer object's pt fraction.
fn soft_drop_n2(a: &LorentzVector, b: &LorentzVector) -> f64 {
    let z = a.pt().min(b.pt()) / (a.pt() + b.pt());
    z / a.delta_r(b).powi(-2)
}

impl FeatureCalculator {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureCalculator::Trijet => "Trijet",
            FeatureCalculator::Monojet => "Monojet",
            FeatureCalculator::Dijet => "Dijet",
        }
    }

    /// Candidate category this feature set is defined for.
    pub fn top_type(&self) -> TopType {
        match self {
            FeatureCalculator::Trijet => TopType::ResolvedTrijet,
            FeatureCalculator::Monojet => TopType::MergedTop,
            FeatureCalculator::Dijet => TopType::MergedW,
        }
    }

    /// All fixed feature names; for `Trijet` this includes the expanded per-jet names.
    pub fn feature_names(&self) -> Vec<String> {
        match self {
            FeatureCalculator::Trijet => TRIJET_FEATURES
                .iter()
                .map(|s| s.to_string())
                .chain((1..=3).cartesian_product(TRIJET_JET_FEATURES.iter()).map(|(n, v)| format!("j{}_{}", n, v)))
                .collect(),
            FeatureCalculator::Monojet => MONOJET_FEATURES.iter().map(|s| s.to_string()).collect(),
            FeatureCalculator::Dijet => DIJET_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn provides(&self, feature: &str) -> bool {
        match self {
            FeatureCalculator::Trijet => TRIJET_FEATURES.contains(&feature) || split_jet_feature(feature).is_some(),
            FeatureCalculator::Monojet => MONOJET_FEATURES.contains(&feature),
            FeatureCalculator::Dijet => DIJET_FEATURES.contains(&feature),
        }
    }

    /// Fails with [`TaggerError::UnknownFeature`] on the first name this set cannot compute.
    pub fn validate(&self, features: &[String]) -> TaggerResult<()> {
        match features.iter().find(|f| !self.provides(f)) {
            Some(feature) => Err(TaggerError::UnknownFeature {
                feature: feature.clone(),
                calculator: self.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// True if the features of this set are defined for the candidate.
    pub fn check_candidate(&self, top: &TopObject, constituents: &[&Constituent]) -> bool {
        if top.kind() != self.top_type() {
            return false;
        }
        match self {
            FeatureCalculator::Trijet => {
                constituents.len() == 3 && constituents.iter().all(|c| c.kind() == ConstituentType::Ak4Jet)
            }
            FeatureCalculator::Monojet | FeatureCalculator::Dijet => {
                constituents.len() == 1 && constituents[0].subjets().len() == 2
            }
        }
    }

    /// Computes the requested features for a candidate that passed [`Self::check_candidate`].
    pub fn compute(&self, top: &TopObject, constituents: &[&Constituent], requested: &[String]) -> FeatureMap {
        let mut all = FeatureMap::new();
        match self {
            FeatureCalculator::Trijet => trijet_features(top, constituents, &mut all),
            FeatureCalculator::Monojet => monojet_features(constituents[0], &mut all),
            FeatureCalculator::Dijet => dijet_features(constituents[0], &mut all),
        }

        let (rest_order, lab_order) = match self {
            FeatureCalculator::Trijet => trijet_orders(top, constituents),
            _ => (Vec::new(), Vec::new()),
        };

        requested
            .iter()
            .map(|name| {
                let value = match all.get(name) {
                    Some(v) => *v,
                    None => extra_feature(name, constituents, &rest_order, &lab_order),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// Jet orderings: by momentum in the top rest frame, and by lab pt.
fn trijet_orders(top: &TopObject, jets: &[&Constituent]) -> (Vec<usize>, Vec<usize>) {
    let rest: Vec<f64> = jets.iter().map(|j| j.p().in_rest_frame_of(top.p()).p()).collect();
    let rest_order = (0..jets.len()).sorted_by(|&a, &b| by_desc(rest[a], rest[b])).collect();
    let lab_order = (0..jets.len()).sorted_by(|&a, &b| by_desc(jets[a].p().pt(), jets[b].p().pt())).collect();
    (rest_order, lab_order)
}

fn extra_feature(name: &str, jets: &[&Constituent], rest_order: &[usize], lab_order: &[usize]) -> f64 {
    let Some((slot, var)) = split_jet_feature(name) else {
        return f64::NAN;
    };
    let (order, var) = match var.strip_suffix("_lab") {
        Some(base) => (lab_order, base),
        None => (rest_order, var),
    };
    order
        .get(slot)
        .and_then(|&i| jets[i].extra_var(var))
        .unwrap_or(f64::NAN)
}

fn trijet_features(top: &TopObject, jets: &[&Constituent], out: &mut FeatureMap) {
    let cand = top.p();
    let (rest_order, lab_order) = trijet_orders(top, jets);
    let rest: Vec<&Constituent> = rest_order.iter().map(|&i| jets[i]).collect();
    let lab: Vec<&Constituent> = lab_order.iter().map(|&i| jets[i]).collect();
    let boosted: Vec<LorentzVector> = rest.iter().map(|j| j.p().in_rest_frame_of(cand)).collect();

    out.insert("cand_pt".into(), cand.pt());
    out.insert("cand_p".into(), cand.p());
    out.insert("cand_eta".into(), cand.eta());
    out.insert("cand_phi".into(), cand.phi());
    out.insert("cand_m".into(), cand.m());

    let pairs = [(0, 1), (0, 2), (1, 2)];
    let d_r: Vec<f64> = pairs.iter().map(|&(a, b)| lab[a].p().delta_r(lab[b].p())).collect();
    let d_theta: Vec<f64> = pairs.iter().map(|&(a, b)| boosted[a].angle(&boosted[b])).collect();
    out.insert("cand_dRMax".into(), d_r.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    out.insert("cand_dThetaMin".into(), d_theta.iter().copied().fold(f64::INFINITY, f64::min));
    out.insert("cand_dThetaMax".into(), d_theta.iter().copied().fold(f64::NEG_INFINITY, f64::max));

    for (k, &(a, b)) in pairs.iter().enumerate() {
        let tag = format!("{}{}", a + 1, b + 1);
        out.insert(format!("dTheta{}", tag), d_theta[k]);
        out.insert(format!("j{}_m", tag), (*rest[a].p() + *rest[b].p()).m());
        out.insert(format!("j{}_m_lab", tag), (*lab[a].p() + *lab[b].p()).m());
        out.insert(format!("dR{}_lab", tag), d_r[k]);
    }

    let (l1, l2, l3) = (lab[0].p(), lab[1].p(), lab[2].p());
    let w = *l2 + *l3;
    out.insert("dR12_3_lab".into(), (*l1 + *l2).delta_r(l3));
    out.insert("dRPtTop".into(), l1.delta_r(&w) * cand.pt());
    out.insert("dRPtW".into(), l2.delta_r(l3) * w.pt());
    out.insert("sd_n2".into(), soft_drop_n2(l2, l3));

    for (n, (jet, b)) in rest.iter().zip(boosted.iter()).enumerate() {
        let s = shapes(jet);
        let slot = n + 1;
        out.insert(format!("j{}_p", slot), b.p());
        out.insert(format!("j{}_p_top", slot), b.p());
        out.insert(format!("j{}_theta_top", slot), b.angle(cand));
        out.insert(format!("j{}_phi_top", slot), b.phi());
        out.insert(format!("j{}_m", slot), jet.p().m());
        out.insert(format!("j{}_CSV", slot), jet.btag_disc());
        out.insert(format!("j{}_QGL", slot), jet.qg_likelihood());
        out.insert(format!("j{}_qgMult", slot), s.mult);
        out.insert(format!("j{}_qgPtD", slot), s.ptd);
        out.insert(format!("j{}_qgAxis1", slot), s.axis1);
        out.insert(format!("j{}_qgAxis2", slot), s.axis2);
    }

    for (n, jet) in lab.iter().enumerate() {
        let s = shapes(jet);
        let slot = n + 1;
        out.insert(format!("j{}_pt_lab", slot), jet.p().pt());
        out.insert(format!("j{}_eta_lab", slot), jet.p().eta());
        out.insert(format!("j{}_phi_lab", slot), jet.p().phi());
        out.insert(format!("j{}_m_lab", slot), jet.p().m());
        out.insert(format!("j{}_CSV_lab", slot), jet.btag_disc());
        out.insert(format!("j{}_QGL_lab", slot), jet.qg_likelihood());
        out.insert(format!("j{}_qgMult_lab", slot), s.mult);
        out.insert(format!("j{}_qgPtD_lab", slot), s.ptd);
        out.insert(format!("j{}_qgAxis1_lab", slot), s.axis1);
        out.insert(format!("j{}_qgAxis2_lab", slot), s.axis2);
    }
}

/// Shared fat-jet quantities: (soft-drop mass, dR * pt, relative pt difference).
fn fat_jet_basics(fat: &Constituent, sj1: &Constituent, sj2: &Constituent) -> (f64, f64, f64) {
    let (a, b) = (sj1.p(), sj2.p());
    let pt_dr = a.delta_r(b) * (*a + *b).pt();
    let rel_ptdiff = (a.pt() - b.pt()).abs() / fat.p().pt();
    (fat.soft_drop_mass(), pt_dr, rel_ptdiff)
}

fn monojet_features(fat: &Constituent, out: &mut FeatureMap) {
    let subjets = fat.subjets();
    let (csv1, csv2) = if subjets[1].btag_disc() > subjets[0].btag_disc() {
        (&subjets[1], &subjets[0])
    } else {
        (&subjets[0], &subjets[1])
    };
    let (sd_mass, pt_dr, rel_ptdiff) = fat_jet_basics(fat, csv1, csv2);
    let taus = fat.n_subjettiness();
    let (s1, s2) = (shapes(csv1), shapes(csv2));

    out.insert("ak8_sdmass".into(), sd_mass);
    out.insert("ak8_tau21".into(), taus.map_or(f64::NAN, |t| t.tau21()));
    out.insert("ak8_tau32".into(), taus.map_or(f64::NAN, |t| t.tau32()));
    out.insert("ak8_ptDR".into(), pt_dr);
    out.insert("ak8_rel_ptdiff".into(), rel_ptdiff);
    out.insert("ak8_csv1_mass".into(), csv1.p().m());
    out.insert("ak8_csv1_csv".into(), csv1.btag_disc());
    out.insert("ak8_csv1_ptD".into(), s1.ptd);
    out.insert("ak8_csv1_axis1".into(), s1.axis1);
    out.insert("ak8_csv1_mult".into(), s1.mult);
    out.insert("ak8_csv2_mass".into(), csv2.p().m());
    out.insert("ak8_csv2_ptD".into(), s2.ptd);
    out.insert("ak8_csv2_axis1".into(), s2.axis1);
    out.insert("ak8_csv2_mult".into(), s2.mult);
}

fn dijet_features(fat: &Constituent, out: &mut FeatureMap) {
    let subjets = fat.subjets();
    let (sj1, sj2) = if subjets[1].p().pt() > subjets[0].p().pt() {
        (&subjets[1], &subjets[0])
    } else {
        (&subjets[0], &subjets[1])
    };
    let (sd_mass, pt_dr, rel_ptdiff) = fat_jet_basics(fat, sj1, sj2);
    let (s1, s2) = (shapes(sj1), shapes(sj2));

    out.insert("var_fj_sdmass".into(), sd_mass);
    out.insert("var_fj_tau21".into(), fat.n_subjettiness().map_or(f64::NAN, |t| t.tau21()));
    out.insert("var_fj_ptDR".into(), pt_dr);
    out.insert("var_fj_rel_ptdiff".into(), rel_ptdiff);
    out.insert("var_sj1_ptD".into(), s1.ptd);
    out.insert("var_sj1_axis1".into(), s1.axis1);
    out.insert("var_sj1_mult".into(), s1.mult);
    out.insert("var_sj2_ptD".into(), s2.ptd);
    out.insert("var_sj2_axis1".into(), s2.axis1);
    out.insert("var_sj2_mult".into(), s2.mult);
    out.insert("var_sjmax_csv".into(), sj1.btag_disc().max(sj2.btag_disc()));
    out.insert("var_sd_n2".into(), soft_drop_n2(sj1.p(), sj2.p()));
}
