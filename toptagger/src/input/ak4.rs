use crate::error::{check_length, TaggerError, TaggerResult};
use crate::input::packager::{check_filter, check_optional, is_kept, ConstituentPackager};
use crate::physics::constituent::{Constituent, QgShapes};
use crate::physics::lorentz::LorentzVector;
use crate::physics::truth::GenInputs;

/// Per-jet quark-gluon shape arrays; all four must be supplied together.
#[derive(Clone, Copy, Debug)]
pub struct QgShapeInputs<'a> {
    pub mult: &'a [f64],
    pub ptd: &'a [f64],
    pub axis1: &'a [f64],
    pub axis2: &'a [f64],
}

impl<'a> QgShapeInputs<'a> {
    pub(crate) fn check(&self, what: &str, n: usize) -> TaggerResult<()> {
        check_length(&format!("{} multiplicity", what), n, self.mult.len())?;
        check_length(&format!("{} ptD", what), n, self.ptd.len())?;
        check_length(&format!("{} axis1", what), n, self.axis1.len())?;
        check_length(&format!("{} axis2", what), n, self.axis2.len())
    }

    pub(crate) fn at(&self, i: usize) -> QgShapes {
        QgShapes {
            mult: self.mult[i],
            ptd: self.ptd[i],
            axis1: self.axis1[i],
            axis2: self.axis2[i],
        }
    }
}

/// Small-radius jet inputs.
///
/// # Description
///
/// Jet momenta and b-tag discriminators are mandatory. Everything else is optional and switched on
/// with the `with_*` builders.
///
/// # Example
///
/// ```rust
/// # use toptagger::input::ak4::Ak4Inputs;
/// # use toptagger::input::packager::ConstituentPackager;
/// # use toptagger::physics::lorentz::LorentzVector;
/// let jets = vec![
///     LorentzVector::from_pt_eta_phi_e(50.0, 0.0, 0.0, 50.0),
///     LorentzVector::from_pt_eta_phi_e(40.0, 0.1, 0.1, 40.0),
/// ];
/// let btag = vec![0.9, 0.1];
/// let keep = vec![true, false];
/// let mut constituents = Vec::new();
/// Ak4Inputs::new(&jets, &btag).with_filter(&keep).package_into(&mut constituents).unwrap();
/// assert_eq!(constituents.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct Ak4Inputs<'a> {
    jets: &'a [LorentzVector],
    btag: &'a [f64],
    qg_likelihood: Option<&'a [f64]>,
    qg_shapes: Option<QgShapeInputs<'a>>,
    filter: Option<&'a [bool]>,
    extra_vars: Vec<(String, &'a [f64])>,
    gen: Option<GenInputs<'a>>,
}

impl<'a> Ak4Inputs<'a> {
    pub fn new(jets: &'a [LorentzVector], btag: &'a [f64]) -> Self {
        Ak4Inputs {
            jets,
            btag,
            qg_likelihood: None,
            qg_shapes: None,
            filter: None,
            extra_vars: Vec::new(),
            gen: None,
        }
    }

    pub fn with_qg_likelihood(mut self, qg_likelihood: &'a [f64]) -> Self {
        self.qg_likelihood = Some(qg_likelihood);
        self
    }

    pub fn with_qg_shapes(mut self, shapes: QgShapeInputs<'a>) -> Self {
        self.qg_shapes = Some(shapes);
        self
    }

    pub fn with_filter(mut self, filter: &'a [bool]) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds a named per-jet variable, stored in each constituent's extra variables.
    pub fn with_supplemental(mut self, name: &str, values: &'a [f64]) -> Self {
        match self.extra_vars.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = values,
            None => self.extra_vars.push((name.to_string(), values)),
        }
        self
    }

    pub fn with_gen(mut self, gen: GenInputs<'a>) -> Self {
        self.gen = Some(gen);
        self
    }

    pub fn len(&self) -> usize {
        self.jets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jets.is_empty()
    }

    fn validate(&self) -> TaggerResult<()> {
        let n = self.jets.len();
        check_length("AK4 b-tag discriminator", n, self.btag.len())?;
        check_optional("AK4 quark-gluon likelihood", self.qg_likelihood, n)?;
        if let Some(shapes) = &self.qg_shapes {
            shapes.check("AK4 quark-gluon", n)?;
        }
        check_filter(self.filter, n)?;
        if let Some(gen) = &self.gen {
            gen.validate()?;
        }
        Ok(())
    }

    fn build(&self, i: usize) -> TaggerResult<Constituent> {
        let qgl = self.qg_likelihood.map_or(0.0, |q| q[i]);
        let mut jet = Constituent::ak4_jet(self.jets[i], self.btag[i], qgl).with_index(i);

        if let Some(shapes) = &self.qg_shapes {
            jet = jet.with_qg_shapes(shapes.at(i));
        }

        for (name, values) in &self.extra_vars {
            let value = values.get(i).ok_or_else(|| TaggerError::MissingExtraVariable {
                name: name.clone(),
                index: i,
            })?;
            jet = jet.with_extra_var(name, *value);
        }

        if let Some(gen) = &self.gen {
            let matches = gen.matches_for(&self.jets[i]);
            jet.add_gen_matches(matches);
        }
        Ok(jet)
    }
}

impl<'a> ConstituentPackager for Ak4Inputs<'a> {
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
    use crate::physics::constituent::ConstituentType;

    fn jets() -> Vec<LorentzVector> {
        vec![
            LorentzVector::from_pt_eta_phi_e(50.0, 0.0, 0.0, 50.0),
            LorentzVector::from_pt_eta_phi_e(40.0, 0.1, 0.1, 40.0),
            LorentzVector::from_pt_eta_phi_e(30.0, -0.1, 0.2, 30.0),
        ]
    }

    #[test]
    fn test_package_sets_index_and_btag() {
        let jets = jets();
        let btag = vec![0.9, 0.1, 0.5];
        let mut out = Vec::new();
        Ak4Inputs::new(&jets, &btag).package_into(&mut out).unwrap();
        assert_eq!(out.len(), 3);
        for (i, c) in out.iter().enumerate() {
            assert_eq!(c.kind(), ConstituentType::Ak4Jet);
            assert_eq!(c.index(), i);
            assert_eq!(c.btag_disc(), btag[i]);
            assert_eq!(c.qg_likelihood(), 0.0);
            assert!(c.qg_shapes().is_none());
        }
    }

    #[test]
    fn test_length_mismatch_appends_nothing() {
        let jets = jets();
        let btag = vec![0.9, 0.1];
        let mut out = Vec::new();
        let err = Ak4Inputs::new(&jets, &btag).package_into(&mut out).unwrap_err();
        assert!(matches!(err, TaggerError::LengthMismatch { expected: 3, found: 2, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_filtered_jet_skips_short_extra_variable() {
        let jets = jets();
        let btag = vec![0.9, 0.1, 0.5];
        let keep = vec![true, true, false];
        let extra = vec![1.0, 2.0];
        let mut out = Vec::new();
        Ak4Inputs::new(&jets, &btag)
            .with_filter(&keep)
            .with_supplemental("charge", &extra)
            .package_into(&mut out)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].extra_var("charge"), Some(2.0));
    }

    #[test]
    fn test_short_extra_variable_fails_without_output() {
        let jets = jets();
        let btag = vec![0.9, 0.1, 0.5];
        let extra = vec![1.0, 2.0];
        let mut out = Vec::new();
        let err = Ak4Inputs::new(&jets, &btag)
            .with_supplemental("charge", &extra)
            .package_into(&mut out)
            .unwrap_err();
        match err {
            TaggerError::MissingExtraVariable { name, index } => {
                assert_eq!(name, "charge");
                assert_eq!(index, 2);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_qg_shapes_and_gen_matches() {
        let jets = jets();
        let btag = vec![0.9, 0.1, 0.5];
        let mult = vec![10.0, 20.0, 30.0];
        let ptd = vec![0.1, 0.2, 0.3];
        let axis1 = vec![0.01, 0.02, 0.03];
        let axis2 = vec![0.001, 0.002, 0.003];
        let tops = vec![LorentzVector::from_pt_eta_phi_m(300.0, 0.0, 0.0, 173.0)];
        let daughters = vec![vec![LorentzVector::from_pt_eta_phi_m(60.0, 0.0, 0.05, 4.8)]];
        let mut out = Vec::new();
        Ak4Inputs::new(&jets, &btag)
            .with_qg_shapes(QgShapeInputs { mult: &mult, ptd: &ptd, axis1: &axis1, axis2: &axis2 })
            .with_gen(GenInputs::new(&tops, &daughters))
            .package_into(&mut out)
            .unwrap();
        assert_eq!(out[2].qg_shapes().map(|s| s.mult), Some(30.0));
        assert!(out[0].is_gen_matched());
        assert!(out[1].is_gen_matched());
        assert!(out[2].is_gen_matched());
        assert_eq!(out[0].gen_matches()[0].top_index, 0);
    }
}
