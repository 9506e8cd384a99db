use std::collections::HashSet;

use itertools::Itertools;
use tracing::debug;

use crate::error::{TaggerError, TaggerResult};
use crate::physics::constituent::{Constituent, ConstituentType};
use crate::physics::lorentz::LorentzVector;
use crate::physics::top_object::{ConstituentId, TopObject, TopType};
use crate::tagger::results::TopTaggerResults;

pub const MAX_CONSTITUENTS_LIMIT: usize = 3;

/// Enumerates top candidates from a packaged constituent sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateAssembler {
    max_constituents: usize,
}

impl CandidateAssembler {
    /// # Errors
    ///
    /// [`TaggerError::InvalidParameter`] unless `1 <= max_constituents <= 3`.
    pub fn new(max_constituents: usize) -> TaggerResult<Self> {
        if max_constituents == 0 || max_constituents > MAX_CONSTITUENTS_LIMIT {
            return Err(TaggerError::InvalidParameter {
                key: "maxConstituents".to_string(),
                context: "TopTagger".to_string(),
                reason: format!("must be between 1 and {}, got {}", MAX_CONSTITUENTS_LIMIT, max_constituents),
            });
        }
        Ok(CandidateAssembler { max_constituents })
    }

    pub fn max_constituents(&self) -> usize {
        self.max_constituents
    }

    /// Builds the candidate list and hands both arenas to a fresh results container.
    ///
    /// Single-constituent candidates come first in constituent order: AK4 monojets (unless the
    /// jet is referenced by a resolved candidate), merged jets with their declared type and
    /// resolved candidates. AK4 pairs follow, then AK4 triples, both in lexicographic order.
    pub fn assemble(&self, constituents: Vec<Constituent>) -> TopTaggerResults {
        let absorbed: HashSet<usize> = constituents
            .iter()
            .filter(|c| c.kind() == ConstituentType::ResolvedTopCandidate)
            .flat_map(|c| c.jet_refs().iter().filter(|&&r| r >= 0).map(|&r| r as usize))
            .collect();

        let mut candidates = Vec::new();
        for (i, c) in constituents.iter().enumerate() {
            let kind = match c.kind() {
                ConstituentType::Ak4Jet if absorbed.contains(&c.index()) => continue,
                ConstituentType::Ak4Jet => TopType::ResolvedMonojet,
                ConstituentType::MergedJet => c.merged_type().unwrap_or(TopType::MergedTop),
                ConstituentType::ResolvedTopCandidate => TopType::ResolvedTopCandidate,
                ConstituentType::Ak8Subjet => continue,
            };
            candidates.push(TopObject::new(vec![ConstituentId(i)], *c.p(), kind));
        }

        let ak4: Vec<usize> = constituents
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind() == ConstituentType::Ak4Jet)
            .map(|(i, _)| i)
            .collect();

        let group = |ids: Vec<usize>, kind: TopType| {
            let p: LorentzVector = ids.iter().map(|&i| constituents[i].p()).sum();
            TopObject::new(ids.into_iter().map(ConstituentId).collect(), p, kind)
        };

        if self.max_constituents >= 2 {
            candidates.extend(ak4.iter().copied().combinations(2).map(|ids| group(ids, TopType::ResolvedDijet)));
        }
        if self.max_constituents >= 3 {
            candidates.extend(ak4.iter().copied().combinations(3).map(|ids| group(ids, TopType::ResolvedTrijet)));
        }

        debug!(
            constituents = constituents.len(),
            candidates = candidates.len(),
            absorbed = absorbed.len(),
            "assembled top candidates"
        );
        TopTaggerResults::new(constituents, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ak4(i: usize, pt: f64, eta: f64, phi: f64) -> Constituent {
        Constituent::ak4_jet(LorentzVector::from_pt_eta_phi_e(pt, eta, phi, pt), 0.1, 0.0).with_index(i)
    }

    #[test]
    fn test_invalid_max_constituents() {
        assert!(CandidateAssembler::new(0).is_err());
        assert!(CandidateAssembler::new(4).is_err());
        assert_eq!(CandidateAssembler::new(3).unwrap().max_constituents(), 3);
    }

    #[test]
    fn test_candidate_counts_by_max() {
        let jets = || (0..5).map(|i| ak4(i, 50.0 - i as f64, 0.1 * i as f64, 0.0)).collect::<Vec<_>>();
        assert_eq!(CandidateAssembler::new(1).unwrap().assemble(jets()).candidates().len(), 5);
        assert_eq!(CandidateAssembler::new(2).unwrap().assemble(jets()).candidates().len(), 15);
        assert_eq!(CandidateAssembler::new(3).unwrap().assemble(jets()).candidates().len(), 25);
    }

    #[test]
    fn test_candidate_order_and_momentum() {
        let jets: Vec<Constituent> = (0..3).map(|i| ak4(i, 30.0 + i as f64, 0.0, i as f64)).collect();
        let sum: LorentzVector = jets.iter().map(|j| j.p()).sum();
        let results = CandidateAssembler::new(3).unwrap().assemble(jets);
        let kinds: Vec<TopType> = results.candidates().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                TopType::ResolvedMonojet,
                TopType::ResolvedMonojet,
                TopType::ResolvedMonojet,
                TopType::ResolvedDijet,
                TopType::ResolvedDijet,
                TopType::ResolvedDijet,
                TopType::ResolvedTrijet,
            ]
        );
        assert_eq!(results.candidates()[4].constituents(), &[ConstituentId(0), ConstituentId(2)]);
        let trijet = results.candidates()[6].p();
        assert!((trijet.e() - sum.e()).abs() < 1e-9);
        assert!((trijet.px - sum.px).abs() < 1e-9);
    }

    #[test]
    fn test_resolved_candidate_absorbs_monojets() {
        let mut constituents: Vec<Constituent> = (0..4).map(|i| ak4(i, 40.0, 0.2 * i as f64, 0.0)).collect();
        let cand_p = LorentzVector::from_pt_eta_phi_m(150.0, 0.2, 0.0, 170.0);
        constituents.push(Constituent::resolved_candidate(cand_p, 0.9, [0, 1, 2]));
        let fat = Constituent::merged_jet(LorentzVector::from_pt_eta_phi_m(450.0, 1.0, 2.0, 85.0), 0, 82.0, vec![])
            .unwrap()
            .with_w_disc(0.8);
        constituents.push(fat);

        let results = CandidateAssembler::new(1).unwrap().assemble(constituents);
        let kinds: Vec<TopType> = results.candidates().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec![TopType::ResolvedMonojet, TopType::ResolvedTopCandidate, TopType::MergedW]);
        assert_eq!(results.candidates()[0].constituents(), &[ConstituentId(3)]);
    }
}
