use crate::error::{check_length, TaggerResult};
use crate::input::packager::{check_filter, is_kept, ConstituentPackager};
use crate::physics::constituent::Constituent;
use crate::physics::lorentz::LorentzVector;

/// Top candidates assembled outside the tagger, each referencing three AK4 jets by raw index.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedCandInputs<'a> {
    candidates: &'a [LorentzVector],
    discriminator: &'a [f64],
    j1: &'a [i32],
    j2: &'a [i32],
    j3: &'a [i32],
    filter: Option<&'a [bool]>,
}

impl<'a> ResolvedCandInputs<'a> {
    pub fn new(
        candidates: &'a [LorentzVector],
        discriminator: &'a [f64],
        j1: &'a [i32],
        j2: &'a [i32],
        j3: &'a [i32],
    ) -> Self {
        ResolvedCandInputs {
            candidates,
            discriminator,
            j1,
            j2,
            j3,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: &'a [bool]) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl<'a> ConstituentPackager for ResolvedCandInputs<'a> {
    fn package_into(&self, constituents: &mut Vec<Constituent>) -> TaggerResult<()> {
        let n = self.candidates.len();
        check_length("resolved candidate discriminator", n, self.discriminator.len())?;
        check_length("resolved candidate jet 1 index", n, self.j1.len())?;
        check_length("resolved candidate jet 2 index", n, self.j2.len())?;
        check_length("resolved candidate jet 3 index", n, self.j3.len())?;
        check_filter(self.filter, n)?;

        constituents.extend((0..n).filter(|&i| is_kept(self.filter, i)).map(|i| {
            Constituent::resolved_candidate(self.candidates[i], self.discriminator[i], [self.j1[i], self.j2[i], self.j3[i]])
                .with_index(i)
        }));
        Ok(())
    }
}
