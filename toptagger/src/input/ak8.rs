use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::error::{check_length, TaggerResult};
use crate::input::ak4::QgShapeInputs;
use crate::input::calibration::{puppi_weight, PuppiSoftDropCorrection};
use crate::input::packager::{check_filter, check_optional, is_kept, ConstituentPackager};
use crate::physics::constituent::{Constituent, GenMatch, NSubjettiness, QgShapes};
use crate::physics::lorentz::LorentzVector;
use crate::physics::truth::{delta_r_match, GenInputs};

/// Subjets closer than this to a fat jet axis are associated with it (exclusive).
pub const SUBJET_MATCH_DR: f64 = 0.8;

/// Finds the pair of subjets whose removal leaves the fat jet with the smallest `|M|`.
///
/// Returns indices `(j, k)` with `j < k`; among equal residuals the first pair in
/// lexicographic order wins. `None` for fewer than two subjets.
///
/// # Example
///
/// ```rust
/// # use toptagger::input::ak8::best_subjet_pair;
/// # use toptagger::physics::lorentz::LorentzVector;
/// let a = LorentzVector::from_pt_eta_phi_m(200.0, 0.0, 0.0, 10.0);
/// let b = LorentzVector::from_pt_eta_phi_m(150.0, 0.3, 0.2, 10.0);
/// let c = LorentzVector::from_pt_eta_phi_m(5.0, -0.5, 0.4, 1.0);
/// let fat = a + b;
/// assert_eq!(best_subjet_pair(&fat, &[a, c, b]), Some((0, 2)));
/// ```
pub fn best_subjet_pair(fat_jet: &LorentzVector, subjets: &[LorentzVector]) -> Option<(usize, usize)> {
    (0..subjets.len())
        .tuple_combinations()
        .min_by_key(|&(j, k)| OrderedFloat((*fat_jet - subjets[j] - subjets[k]).m().abs()))
}

/// Tau1, tau2 and tau3 per fat jet.
#[derive(Clone, Copy, Debug)]
pub struct NSubjettinessInputs<'a> {
    pub tau1: &'a [f64],
    pub tau2: &'a [f64],
    pub tau3: &'a [f64],
}

/// Quark-gluon shapes for subjets listed per fat jet.
#[derive(Clone, Copy, Debug)]
pub struct NestedQgShapeInputs<'a> {
    pub mult: &'a [Vec<f64>],
    pub ptd: &'a [Vec<f64>],
    pub axis1: &'a [Vec<f64>],
    pub axis2: &'a [Vec<f64>],
}

/// One shared subjet collection; subjets are associated to fat jets geometrically.
#[derive(Clone, Copy, Debug)]
pub struct SubjetPool<'a> {
    p4: &'a [LorentzVector],
    btag: Option<&'a [f64]>,
    qg_shapes: Option<QgShapeInputs<'a>>,
}

impl<'a> SubjetPool<'a> {
    pub fn new(p4: &'a [LorentzVector]) -> Self {
        SubjetPool { p4, btag: None, qg_shapes: None }
    }

    pub fn with_btag(mut self, btag: &'a [f64]) -> Self {
        self.btag = Some(btag);
        self
    }

    pub fn with_qg_shapes(mut self, shapes: QgShapeInputs<'a>) -> Self {
        self.qg_shapes = Some(shapes);
        self
    }

    fn validate(&self) -> TaggerResult<()> {
        let n = self.p4.len();
        check_optional("AK8 subjet b-tag discriminator", self.btag, n)?;
        if let Some(shapes) = &self.qg_shapes {
            shapes.check("AK8 subjet quark-gluon", n)?;
        }
        Ok(())
    }

    fn subjet(&self, i: usize) -> Constituent {
        let mut subjet = Constituent::subjet(self.p4[i]).with_index(i);
        if let Some(btag) = self.btag {
            subjet = subjet.with_btag(btag[i]);
        }
        if let Some(shapes) = &self.qg_shapes {
            subjet = subjet.with_qg_shapes(shapes.at(i));
        }
        subjet
    }

    fn associate(&self, fat_jet: &LorentzVector) -> Vec<Constituent> {
        let matched: Vec<usize> = (0..self.p4.len())
            .filter(|&i| delta_r_match(fat_jet, &self.p4[i], SUBJET_MATCH_DR))
            .collect();
        if matched.len() <= 2 {
            return matched.into_iter().map(|i| self.subjet(i)).collect();
        }
        let momenta: Vec<LorentzVector> = matched.iter().map(|&i| self.p4[i]).collect();
        match best_subjet_pair(fat_jet, &momenta) {
            Some((j, k)) => vec![self.subjet(matched[j]), self.subjet(matched[k])],
            None => Vec::new(),
        }
    }
}

/// Subjets already associated with their fat jet, 0 to 2 per jet.
#[derive(Clone, Copy, Debug)]
pub struct PerJetSubjets<'a> {
    p4: &'a [Vec<LorentzVector>],
    btag: Option<&'a [Vec<f64>]>,
    qg_shapes: Option<NestedQgShapeInputs<'a>>,
}

impl<'a> PerJetSubjets<'a> {
    pub fn new(p4: &'a [Vec<LorentzVector>]) -> Self {
        PerJetSubjets { p4, btag: None, qg_shapes: None }
    }

    pub fn with_btag(mut self, btag: &'a [Vec<f64>]) -> Self {
        self.btag = Some(btag);
        self
    }

    pub fn with_qg_shapes(mut self, shapes: NestedQgShapeInputs<'a>) -> Self {
        self.qg_shapes = Some(shapes);
        self
    }

    fn validate(&self, n_jets: usize) -> TaggerResult<()> {
        check_length("AK8 subjet lists", n_jets, self.p4.len())?;
        check_optional("AK8 subjet b-tag lists", self.btag, n_jets)?;
        if let Some(shapes) = &self.qg_shapes {
            check_length("AK8 subjet multiplicity lists", n_jets, shapes.mult.len())?;
            check_length("AK8 subjet ptD lists", n_jets, shapes.ptd.len())?;
            check_length("AK8 subjet axis1 lists", n_jets, shapes.axis1.len())?;
            check_length("AK8 subjet axis2 lists", n_jets, shapes.axis2.len())?;
        }
        Ok(())
    }

    fn subjets_of(&self, jet: usize) -> TaggerResult<Vec<Constituent>> {
        let p4 = &self.p4[jet];
        let n = p4.len();
        if let Some(btag) = self.btag {
            check_length(&format!("AK8 subjet b-tag of jet {}", jet), n, btag[jet].len())?;
        }
        if let Some(shapes) = &self.qg_shapes {
            for (name, values) in [("multiplicity", shapes.mult), ("ptD", shapes.ptd), ("axis1", shapes.axis1), ("axis2", shapes.axis2)] {
                check_length(&format!("AK8 subjet {} of jet {}", name, jet), n, values[jet].len())?;
            }
        }

        let subjets = (0..n)
            .map(|i| {
                let mut subjet = Constituent::subjet(p4[i]).with_index(i);
                if let Some(btag) = self.btag {
                    subjet = subjet.with_btag(btag[jet][i]);
                }
                if let Some(shapes) = &self.qg_shapes {
                    subjet = subjet.with_qg_shapes(QgShapes {
                        mult: shapes.mult[jet][i],
                        ptd: shapes.ptd[jet][i],
                        axis1: shapes.axis1[jet][i],
                        axis2: shapes.axis2[jet][i],
                    });
                }
                subjet
            })
            .collect();
        Ok(subjets)
    }
}

/// How subjets are attached to fat jets. Exactly one policy is active per packager.
#[derive(Clone, Copy, Debug)]
pub enum SubjetSource<'a> {
    PerJet(PerJetSubjets<'a>),
    Pool(SubjetPool<'a>),
}

impl<'a> From<PerJetSubjets<'a>> for SubjetSource<'a> {
    fn from(subjets: PerJetSubjets<'a>) -> Self {
        SubjetSource::PerJet(subjets)
    }
}

impl<'a> From<SubjetPool<'a>> for SubjetSource<'a> {
    fn from(pool: SubjetPool<'a>) -> Self {
        SubjetSource::Pool(pool)
    }
}

/// Large-radius jet inputs.
///
/// # Description
///
/// Fat jet momenta, soft-drop masses and a subjet source are mandatory. N-subjettiness, learned
/// top/W scores, a filter, generator truth and the PUPPI soft-drop correction are optional.
#[derive(Clone)]
pub struct Ak8Inputs<'a> {
    jets: &'a [LorentzVector],
    soft_drop_mass: &'a [f64],
    subjets: SubjetSource<'a>,
    n_subjettiness: Option<NSubjettinessInputs<'a>>,
    top_disc: Option<&'a [f64]>,
    w_disc: Option<&'a [f64]>,
    filter: Option<&'a [bool]>,
    gen: Option<GenInputs<'a>>,
    puppi: Option<&'a PuppiSoftDropCorrection>,
}

impl<'a> Ak8Inputs<'a> {
    pub fn new<S: Into<SubjetSource<'a>>>(jets: &'a [LorentzVector], soft_drop_mass: &'a [f64], subjets: S) -> Self {
        Ak8Inputs {
            jets,
            soft_drop_mass,
            subjets: subjets.into(),
            n_subjettiness: None,
            top_disc: None,
            w_disc: None,
            filter: None,
            gen: None,
            puppi: None,
        }
    }

    pub fn with_n_subjettiness(mut self, taus: NSubjettinessInputs<'a>) -> Self {
        self.n_subjettiness = Some(taus);
        self
    }

    /// Learned top and W scores; which of them is present decides the declared top type.
    pub fn with_discriminators(mut self, top_disc: Option<&'a [f64]>, w_disc: Option<&'a [f64]>) -> Self {
        self.top_disc = top_disc;
        self.w_disc = w_disc;
        self
    }

    pub fn with_filter(mut self, filter: &'a [bool]) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_gen(mut self, gen: GenInputs<'a>) -> Self {
        self.gen = Some(gen);
        self
    }

    pub fn with_puppi_correction(mut self, correction: &'a PuppiSoftDropCorrection) -> Self {
        self.puppi = Some(correction);
        self
    }

    /// Fat jets above `pt_cut`, regardless of filtering; used as efficiency denominators.
    pub fn denominator(&self, pt_cut: f64) -> Vec<LorentzVector> {
        self.jets.iter().filter(|jet| jet.pt() > pt_cut).copied().collect()
    }

    fn validate(&self) -> TaggerResult<()> {
        let n = self.jets.len();
        check_length("AK8 soft-drop mass", n, self.soft_drop_mass.len())?;
        if let Some(taus) = &self.n_subjettiness {
            check_length("AK8 tau1", n, taus.tau1.len())?;
            check_length("AK8 tau2", n, taus.tau2.len())?;
            check_length("AK8 tau3", n, taus.tau3.len())?;
        }
        check_optional("AK8 top discriminator", self.top_disc, n)?;
        check_optional("AK8 W discriminator", self.w_disc, n)?;
        check_filter(self.filter, n)?;
        match &self.subjets {
            SubjetSource::PerJet(per_jet) => per_jet.validate(n)?,
            SubjetSource::Pool(pool) => pool.validate()?,
        }
        if let Some(gen) = &self.gen {
            gen.validate()?;
        }
        Ok(())
    }

    fn build(&self, i: usize) -> TaggerResult<Constituent> {
        let p = self.jets[i];
        let subjets = match &self.subjets {
            SubjetSource::PerJet(per_jet) => per_jet.subjets_of(i)?,
            SubjetSource::Pool(pool) => pool.associate(&p),
        };

        // truth is matched through the subjets and recorded on the fat jet
        let gen_matches: Vec<GenMatch> = match &self.gen {
            Some(gen) => subjets.iter().flat_map(|sj| gen.matches_for(sj.p())).collect(),
            None => Vec::new(),
        };

        let mut jet = Constituent::merged_jet(p, i, self.soft_drop_mass[i], subjets)?
            .with_sd_mass_correction(puppi_weight(self.puppi, p.pt(), p.eta()));
        if let Some(taus) = &self.n_subjettiness {
            jet = jet.with_n_subjettiness(NSubjettiness {
                tau1: taus.tau1[i],
                tau2: taus.tau2[i],
                tau3: taus.tau3[i],
            });
        }
        if let Some(top_disc) = self.top_disc {
            jet = jet.with_top_disc(top_disc[i]);
        }
        if let Some(w_disc) = self.w_disc {
            jet = jet.with_w_disc(w_disc[i]);
        }
        jet.add_gen_matches(gen_matches);
        Ok(jet)
    }
}

impl<'a> ConstituentPackager for Ak8Inputs<'a> {
    fn package_into(&self, constituents: &mut Vec<Constituent>) -> TaggerResult<()> {
        self.validate()?;
        let packaged = (0..self.jets.len())
            .filter(|&i| is_kept(self.filter, i))
            .map(|i| self.build(i))
            .collect::<TaggerResult<Vec<_>>>()?;
        constituents.extend(packaged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaggerError;
    use crate::input::calibration::{CurveStore, PUPPI_GEN_CURVE, PUPPI_RECO_CENTRAL_CURVE, PUPPI_RECO_FORWARD_CURVE};
    use crate::physics::top_object::TopType;

    fn lv(pt: f64, eta: f64, phi: f64, m: f64) -> LorentzVector {
        LorentzVector::from_pt_eta_phi_m(pt, eta, phi, m)
    }

    #[test]
    fn test_pool_association_picks_best_pair() {
        let a = lv(250.0, 0.0, 0.0, 20.0);
        let b = lv(150.0, 0.2, 0.3, 15.0);
        let soft = lv(10.0, -0.3, -0.2, 2.0);
        let far = lv(100.0, 2.0, 2.5, 10.0);
        let fat = a + b;
        let pool = vec![soft, a, far, b];
        let jets = vec![fat];
        let sd = vec![150.0];
        let mut out = Vec::new();
        Ak8Inputs::new(&jets, &sd, SubjetPool::new(&pool))
            .package_into(&mut out)
            .unwrap();
        let subjets = out[0].subjets();
        assert_eq!(subjets.len(), 2);
        assert_eq!(subjets[0].index(), 1);
        assert_eq!(subjets[1].index(), 3);
    }

    #[test]
    fn test_pool_keeps_up_to_two_matches_without_search() {
        let fat = lv(400.0, 0.0, 0.0, 90.0);
        let pool = vec![lv(200.0, 0.1, 0.0, 10.0), lv(50.0, 3.0, 0.0, 5.0)];
        let jets = vec![fat];
        let sd = vec![85.0];
        let mut out = Vec::new();
        Ak8Inputs::new(&jets, &sd, SubjetPool::new(&pool)).package_into(&mut out).unwrap();
        assert_eq!(out[0].subjets().len(), 1);
        assert_eq!(out[0].merged_type(), Some(TopType::MergedTop));
    }

    #[test]
    fn test_per_jet_subjets_and_scores() {
        let jets = vec![lv(500.0, 0.5, 1.0, 170.0), lv(300.0, -1.0, -2.0, 80.0)];
        let sd = vec![172.0, 82.0];
        let subjets = vec![vec![lv(300.0, 0.5, 1.0, 60.0), lv(200.0, 0.6, 1.1, 20.0)], vec![]];
        let btag = vec![vec![0.8, 0.1], vec![]];
        let top = vec![0.9, 0.1];
        let w = vec![0.2, 0.7];
        let mut out = Vec::new();
        Ak8Inputs::new(&jets, &sd, PerJetSubjets::new(&subjets).with_btag(&btag))
            .with_discriminators(Some(&top), Some(&w))
            .package_into(&mut out)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].subjets()[0].btag_disc(), 0.8);
        assert_eq!(out[0].merged_type(), Some(TopType::MergedTop));
        assert_eq!(out[1].merged_type(), Some(TopType::MergedW));
        assert_eq!(out[1].index(), 1);
    }

    #[test]
    fn test_per_jet_rejects_three_subjets() {
        let jets = vec![lv(500.0, 0.0, 0.0, 170.0)];
        let sd = vec![172.0];
        let subjets = vec![vec![lv(100.0, 0.0, 0.0, 5.0); 3]];
        let mut out = Vec::new();
        let err = Ak8Inputs::new(&jets, &sd, PerJetSubjets::new(&subjets))
            .package_into(&mut out)
            .unwrap_err();
        assert!(matches!(err, TaggerError::TooManySubjets { jet: 0, count: 3 }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_soft_drop_length_mismatch() {
        let jets = vec![lv(500.0, 0.0, 0.0, 170.0)];
        let sd: Vec<f64> = vec![];
        let pool: Vec<LorentzVector> = vec![];
        let mut out = Vec::new();
        assert!(Ak8Inputs::new(&jets, &sd, SubjetPool::new(&pool)).package_into(&mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_puppi_correction_applied_above_threshold() {
        let mut store = CurveStore::new();
        store.insert(PUPPI_GEN_CURVE, |_pt: f64| 1.1);
        store.insert(PUPPI_RECO_CENTRAL_CURVE, |_pt: f64| 1.0);
        store.insert(PUPPI_RECO_FORWARD_CURVE, |_pt: f64| 0.5);
        let correction = PuppiSoftDropCorrection::from_store(&store).unwrap();

        let jets = vec![lv(450.0, 0.0, 0.0, 100.0), lv(150.0, 0.0, 2.0, 100.0)];
        let sd = vec![100.0, 100.0];
        let pool: Vec<LorentzVector> = vec![];
        let mut out = Vec::new();
        Ak8Inputs::new(&jets, &sd, SubjetPool::new(&pool))
            .with_puppi_correction(&correction)
            .package_into(&mut out)
            .unwrap();
        assert!((out[0].soft_drop_mass() - 110.0).abs() < 1e-9);
        assert_eq!(out[1].soft_drop_mass(), 100.0);
    }

    #[test]
    fn test_gen_matches_through_subjets() {
        let sj = lv(200.0, 0.1, 0.1, 10.0);
        let jets = vec![lv(400.0, 0.0, 0.0, 170.0)];
        let sd = vec![170.0];
        let pool = vec![sj];
        let tops = vec![lv(400.0, 0.0, 0.0, 173.0)];
        let daughters = vec![vec![lv(100.0, 0.15, 0.1, 0.0), lv(100.0, 1.5, 0.0, 0.0)]];
        let mut out = Vec::new();
        Ak8Inputs::new(&jets, &sd, SubjetPool::new(&pool))
            .with_gen(GenInputs::new(&tops, &daughters))
            .package_into(&mut out)
            .unwrap();
        assert_eq!(out[0].gen_matches().len(), 1);
        assert_eq!(out[0].gen_matches()[0].daughter_index, 0);
    }

    #[test]
    fn test_denominator() {
        let jets = vec![lv(450.0, 0.0, 0.0, 100.0), lv(150.0, 0.0, 2.0, 100.0)];
        let sd = vec![100.0, 100.0];
        let pool: Vec<LorentzVector> = vec![];
        let inputs = Ak8Inputs::new(&jets, &sd, SubjetPool::new(&pool));
        assert_eq!(inputs.denominator(200.0).len(), 1);
        assert_eq!(inputs.denominator(100.0).len(), 2);
    }
}
