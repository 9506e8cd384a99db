use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{TaggerError, TaggerResult};
use crate::physics::lorentz::LorentzVector;
use crate::physics::top_object::TopType;

/// Maximum number of subjets a merged jet may carry.
pub const MAX_SUBJETS: usize = 2;

/// Number of jets referenced by an externally resolved top candidate.
pub const N_RESOLVED_JET_REFS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstituentType {
    Ak4Jet,
    Ak8Subjet,
    MergedJet,
    ResolvedTopCandidate,
}

impl Display for ConstituentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConstituentType::Ak4Jet => write!(f, "AK4Jet"),
            ConstituentType::Ak8Subjet => write!(f, "AK8Subjet"),
            ConstituentType::MergedJet => write!(f, "MergedJet"),
            ConstituentType::ResolvedTopCandidate => write!(f, "ResolvedTopCandidate"),
        }
    }
}

/// Jet shape inputs of the quark-gluon likelihood.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QgShapes {
    pub mult: f64,
    pub ptd: f64,
    pub axis1: f64,
    pub axis2: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NSubjettiness {
    pub tau1: f64,
    pub tau2: f64,
    pub tau3: f64,
}

impl NSubjettiness {
    pub fn tau21(&self) -> f64 {
        self.tau2 / self.tau1
    }

    pub fn tau32(&self) -> f64 {
        self.tau3 / self.tau2
    }
}

/// Association of a reconstructed object with a generator-level top decay product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenMatch {
    pub top: LorentzVector,
    pub daughter: LorentzVector,
    pub top_index: usize,
    pub daughter_index: usize,
}

/// A single physics object entering top reconstruction.
///
/// Constituents are immutable once packaged: the public constructors and `with_*` builders are
/// the only way to populate them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
    p: LorentzVector,
    kind: ConstituentType,
    index: usize,
    btag_disc: f64,
    qg_likelihood: f64,
    qg_shapes: Option<QgShapes>,
    top_disc: Option<f64>,
    w_disc: Option<f64>,
    soft_drop_mass: f64,
    sd_mass_correction: f64,
    n_subjettiness: Option<NSubjettiness>,
    extra_vars: HashMap<String, f64>,
    subjets: Vec<Constituent>,
    jet_refs: Vec<i32>,
    gen_matches: Vec<GenMatch>,
}

impl Constituent {
    fn bare(p: LorentzVector, kind: ConstituentType) -> Self {
        Constituent {
            p,
            kind,
            index: 0,
            btag_disc: 0.0,
            qg_likelihood: 0.0,
            qg_shapes: None,
            top_disc: None,
            w_disc: None,
            soft_drop_mass: 0.0,
            sd_mass_correction: 1.0,
            n_subjettiness: None,
            extra_vars: HashMap::new(),
            subjets: Vec::new(),
            jet_refs: Vec::new(),
            gen_matches: Vec::new(),
        }
    }

    /// Creates a small-radius jet constituent.
    ///
    /// # Arguments
    ///
    /// * `p` - Four-momentum of the jet.
    /// * `btag_disc` - b-tag discriminator.
    /// * `qg_likelihood` - Quark-gluon likelihood (0 when unavailable).
    ///
    pub fn ak4_jet(p: LorentzVector, btag_disc: f64, qg_likelihood: f64) -> Self {
        let mut constituent = Constituent::bare(p, ConstituentType::Ak4Jet);
        constituent.btag_disc = btag_disc;
        constituent.qg_likelihood = qg_likelihood;
        constituent
    }

    pub fn subjet(p: LorentzVector) -> Self {
        Constituent::bare(p, ConstituentType::Ak8Subjet)
    }

    /// Creates a large-radius jet owning up to two subjets.
    ///
    /// # Errors
    ///
    /// [`TaggerError::TooManySubjets`] when more than [`MAX_SUBJETS`] subjets are supplied.
    pub fn merged_jet(p: LorentzVector, index: usize, soft_drop_mass: f64, subjets: Vec<Constituent>) -> TaggerResult<Self> {
        if subjets.len() > MAX_SUBJETS {
            return Err(TaggerError::TooManySubjets { jet: index, count: subjets.len() });
        }
        let mut constituent = Constituent::bare(p, ConstituentType::MergedJet);
        constituent.index = index;
        constituent.soft_drop_mass = soft_drop_mass;
        constituent.subjets = subjets;
        Ok(constituent)
    }

    /// Creates a pre-built resolved top candidate referencing three AK4 jets by raw index.
    pub fn resolved_candidate(p: LorentzVector, discriminator: f64, jet_refs: [i32; N_RESOLVED_JET_REFS]) -> Self {
        let mut constituent = Constituent::bare(p, ConstituentType::ResolvedTopCandidate);
        constituent.top_disc = Some(discriminator);
        constituent.jet_refs = jet_refs.to_vec();
        constituent
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_btag(mut self, btag_disc: f64) -> Self {
        self.btag_disc = btag_disc;
        self
    }

    pub fn with_qg_shapes(mut self, shapes: QgShapes) -> Self {
        self.qg_shapes = Some(shapes);
        self
    }

    pub fn with_top_disc(mut self, disc: f64) -> Self {
        self.top_disc = Some(disc);
        self
    }

    pub fn with_w_disc(mut self, disc: f64) -> Self {
        self.w_disc = Some(disc);
        self
    }

    pub fn with_n_subjettiness(mut self, taus: NSubjettiness) -> Self {
        self.n_subjettiness = Some(taus);
        self
    }

    pub fn with_sd_mass_correction(mut self, correction: f64) -> Self {
        self.sd_mass_correction = correction;
        self
    }

    pub fn with_extra_var(mut self, name: &str, value: f64) -> Self {
        self.extra_vars.insert(name.to_string(), value);
        self
    }

    pub(crate) fn add_gen_matches(&mut self, matches: Vec<GenMatch>) {
        self.gen_matches.extend(matches);
    }

    pub fn p(&self) -> &LorentzVector {
        &self.p
    }

    pub fn kind(&self) -> ConstituentType {
        self.kind
    }

    /// Position of the object in the (unfiltered) input arrays it was packaged from.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn btag_disc(&self) -> f64 {
        self.btag_disc
    }

    pub fn qg_likelihood(&self) -> f64 {
        self.qg_likelihood
    }

    pub fn qg_shapes(&self) -> Option<&QgShapes> {
        self.qg_shapes.as_ref()
    }

    pub fn top_disc(&self) -> Option<f64> {
        self.top_disc
    }

    pub fn w_disc(&self) -> Option<f64> {
        self.w_disc
    }

    /// Soft-drop mass including the PUPPI correction factor.
    pub fn soft_drop_mass(&self) -> f64 {
        self.soft_drop_mass * self.sd_mass_correction
    }

    pub fn raw_soft_drop_mass(&self) -> f64 {
        self.soft_drop_mass
    }

    pub fn sd_mass_correction(&self) -> f64 {
        self.sd_mass_correction
    }

    pub fn n_subjettiness(&self) -> Option<&NSubjettiness> {
        self.n_subjettiness.as_ref()
    }

    pub fn extra_var(&self, name: &str) -> Option<f64> {
        self.extra_vars.get(name).copied()
    }

    pub fn extra_vars(&self) -> &HashMap<String, f64> {
        &self.extra_vars
    }

    pub fn subjets(&self) -> &[Constituent] {
        &self.subjets
    }

    pub fn jet_refs(&self) -> &[i32] {
        &self.jet_refs
    }

    pub fn gen_matches(&self) -> &[GenMatch] {
        &self.gen_matches
    }

    pub fn is_gen_matched(&self) -> bool {
        !self.gen_matches.is_empty()
    }

    /// Declared category of a merged jet, decided by which learned scores are populated.
    ///
    /// When both top and W scores exist the larger one wins (ties go to the top hypothesis);
    /// jets without any score are treated as top-like. Returns `None` for non-merged constituents.
    pub fn merged_type(&self) -> Option<TopType> {
        if self.kind != ConstituentType::MergedJet {
            return None;
        }
        let kind = match (self.top_disc, self.w_disc) {
            (Some(top), Some(w)) if w > top => TopType::MergedW,
            (None, Some(_)) => TopType::MergedW,
            _ => TopType::MergedTop,
        };
        Some(kind)
    }
}
