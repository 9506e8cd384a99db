use std::cmp::Ordering;
use std::collections::BTreeSet;

use bincode::{Decode, Encode};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{TaggerError, TaggerResult};
use crate::physics::constituent::{Constituent, ConstituentType};
use crate::physics::mt2::mt2;
use crate::physics::top_object::{ConstituentId, TopId, TopObject, TopType};

/// AK4 jets within this distance of a subjet count as part of a merged top.
pub const SUBJET_OVERLAP_DR: f64 = 0.4;
/// Two merged jets closer than this overlap; also used for merged jets without subjets.
pub const MERGED_OVERLAP_DR: f64 = 0.8;

/// Flat per-top record for downstream consumers.
///
/// `constituent_indices` holds the raw input index of each constituent, padded with `-1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TopSummary {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub m: f64,
    pub discriminator: Option<f64>,
    pub type_code: i32,
    pub constituent_indices: [i32; 3],
}

/// Event-scoped tagger state.
///
/// # Description
///
/// Owns the event's constituents and candidates. Candidates reference constituents by
/// [`ConstituentId`], the final top list references candidates by [`TopId`]; both arenas are
/// fixed once the container is built, so handles stay valid while modules run.
#[derive(Clone, Debug)]
pub struct TopTaggerResults {
    constituents: Vec<Constituent>,
    candidates: Vec<TopObject>,
    tops: Vec<TopId>,
    promoted: Vec<bool>,
}

impl TopTaggerResults {
    pub fn new(constituents: Vec<Constituent>, candidates: Vec<TopObject>) -> Self {
        let promoted = vec![false; candidates.len()];
        TopTaggerResults {
            constituents,
            candidates,
            tops: Vec::new(),
            promoted,
        }
    }

    pub fn constituents(&self) -> &[Constituent] {
        &self.constituents
    }

    pub fn constituent(&self, id: ConstituentId) -> &Constituent {
        &self.constituents[id.0]
    }

    pub fn candidates(&self) -> &[TopObject] {
        &self.candidates
    }

    pub fn candidate(&self, id: TopId) -> &TopObject {
        &self.candidates[id.0]
    }

    pub fn candidate_ids(&self) -> impl Iterator<Item = TopId> {
        (0..self.candidates.len()).map(TopId)
    }

    /// Constituents of a candidate, in the candidate's order.
    pub fn constituents_of(&self, id: TopId) -> Vec<&Constituent> {
        self.candidate(id).constituents().iter().map(|&c| self.constituent(c)).collect()
    }

    /// Final tops in promotion order.
    pub fn tops(&self) -> &[TopId] {
        &self.tops
    }

    pub fn top_objects(&self) -> impl Iterator<Item = &TopObject> {
        self.tops.iter().map(|&id| self.candidate(id))
    }

    pub fn is_promoted(&self, id: TopId) -> bool {
        self.promoted[id.0]
    }

    /// Appends the candidate to the final list; returns `false` if it was already there.
    pub fn promote(&mut self, id: TopId) -> bool {
        if self.promoted[id.0] {
            return false;
        }
        self.promoted[id.0] = true;
        self.tops.push(id);
        true
    }

    pub fn set_discriminator(&mut self, id: TopId, value: f64) -> TaggerResult<()> {
        if self.candidates[id.0].set_discriminator(value) {
            Ok(())
        } else {
            Err(TaggerError::DiscriminatorAlreadySet(id))
        }
    }

    fn summarize(&self, id: TopId) -> TopSummary {
        let top = self.candidate(id);
        let mut constituent_indices = [-1; 3];
        for (slot, c) in constituent_indices.iter_mut().zip(top.constituents()) {
            *slot = self.constituent(*c).index() as i32;
        }
        TopSummary {
            pt: top.p().pt(),
            eta: top.p().eta(),
            phi: top.p().phi(),
            m: top.p().m(),
            discriminator: top.discriminator(),
            type_code: top.kind().type_numeric(),
            constituent_indices,
        }
    }

    pub fn top_summaries(&self) -> Vec<TopSummary> {
        self.tops.iter().map(|&id| self.summarize(id)).collect()
    }

    pub fn candidate_summaries(&self) -> Vec<TopSummary> {
        self.candidate_ids().map(|id| self.summarize(id)).collect()
    }

    /// Raw AK4 indices claimed by a candidate.
    fn ak4_footprint(&self, id: TopId) -> BTreeSet<usize> {
        let mut footprint = BTreeSet::new();
        for c in self.constituents_of(id) {
            match c.kind() {
                ConstituentType::Ak4Jet => {
                    footprint.insert(c.index());
                }
                ConstituentType::ResolvedTopCandidate => {
                    footprint.extend(c.jet_refs().iter().filter(|&&r| r >= 0).map(|&r| r as usize));
                }
                ConstituentType::MergedJet => {
                    let ak4 = self.constituents.iter().filter(|j| j.kind() == ConstituentType::Ak4Jet);
                    for jet in ak4 {
                        let covered = if c.subjets().is_empty() {
                            jet.p().delta_r(c.p()) < MERGED_OVERLAP_DR
                        } else {
                            c.subjets().iter().any(|sj| jet.p().delta_r(sj.p()) < SUBJET_OVERLAP_DR)
                        };
                        if covered {
                            footprint.insert(jet.index());
                        }
                    }
                }
                ConstituentType::Ak8Subjet => {}
            }
        }
        footprint
    }

    fn overlaps(&self, a: TopId, fa: &BTreeSet<usize>, b: TopId, fb: &BTreeSet<usize>) -> bool {
        if !fa.is_disjoint(fb) {
            return true;
        }
        let (ta, tb) = (self.candidate(a), self.candidate(b));
        ta.kind().is_merged() && tb.kind().is_merged() && ta.p().delta_r(tb.p()) < MERGED_OVERLAP_DR
    }

    /// Non-overlapping subset of the final tops.
    ///
    /// Tops are visited by descending discriminator (unscored last), then by closeness of their
    /// mass to `mt`; a top is kept unless it shares an AK4 jet with, or is a merged jet close to,
    /// one already kept. The final list itself is not modified.
    pub fn resolve_overlaps(&self, mt: f64) -> Vec<TopId> {
        let mut order = self.tops.clone();
        order.sort_by(|&a, &b| {
            let (ta, tb) = (self.candidate(a), self.candidate(b));
            let by_disc = match (ta.discriminator(), tb.discriminator()) {
                (Some(da), Some(db)) => OrderedFloat(db).cmp(&OrderedFloat(da)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_disc
                .then_with(|| OrderedFloat((ta.p().m() - mt).abs()).cmp(&OrderedFloat((tb.p().m() - mt).abs())))
                .then_with(|| a.cmp(&b))
        });

        let mut kept: Vec<(TopId, BTreeSet<usize>)> = Vec::new();
        for id in order {
            let footprint = self.ak4_footprint(id);
            if kept.iter().all(|(k, fk)| !self.overlaps(id, &footprint, *k, fk)) {
                kept.push((id, footprint));
            }
        }
        kept.into_iter().map(|(id, _)| id).collect()
    }

    /// MT2 of the two highest-pt final tops with massless invisible particles; 0 with fewer tops.
    pub fn calculate_mt2(&self, met_x: f64, met_y: f64) -> f64 {
        let mut tops: Vec<&TopObject> = self.top_objects().collect();
        if tops.len() < 2 {
            return 0.0;
        }
        tops.sort_by_key(|t| std::cmp::Reverse(OrderedFloat(t.p().pt())));
        mt2(tops[0].p(), tops[1].p(), met_x, met_y, 0.0)
    }

    pub fn n_tops_of_type(&self, kind: TopType) -> usize {
        self.top_objects().filter(|t| t.kind() == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::lorentz::LorentzVector;

    fn lv(pt: f64, eta: f64, phi: f64, m: f64) -> LorentzVector {
        LorentzVector::from_pt_eta_phi_m(pt, eta, phi, m)
    }

    /// Three AK4 jets, one merged jet near jet 0 and the candidates built from them.
    fn results() -> TopTaggerResults {
        let j0 = lv(100.0, 0.0, 0.0, 10.0);
        let j1 = lv(80.0, 0.5, 1.0, 10.0);
        let j2 = lv(60.0, -0.5, 2.0, 10.0);
        let sj = Constituent::subjet(lv(90.0, 0.05, 0.05, 8.0));
        let fat = Constituent::merged_jet(lv(400.0, 0.0, 0.2, 175.0), 0, 172.0, vec![sj]).unwrap();
        let constituents = vec![
            Constituent::ak4_jet(j0, 0.9, 0.0).with_index(0),
            Constituent::ak4_jet(j1, 0.1, 0.0).with_index(1),
            Constituent::ak4_jet(j2, 0.1, 0.0).with_index(2),
            fat,
        ];
        let candidates = vec![
            TopObject::new(vec![ConstituentId(0), ConstituentId(1), ConstituentId(2)], j0 + j1 + j2, TopType::ResolvedTrijet),
            TopObject::new(vec![ConstituentId(3)], *constituents[3].p(), TopType::MergedTop),
            TopObject::new(vec![ConstituentId(1)], j1, TopType::ResolvedMonojet),
        ];
        TopTaggerResults::new(constituents, candidates)
    }

    #[test]
    fn test_promotion_is_idempotent() {
        let mut r = results();
        assert!(r.promote(TopId(1)));
        assert!(!r.promote(TopId(1)));
        assert_eq!(r.tops(), &[TopId(1)]);
        assert!(r.is_promoted(TopId(1)));
        assert!(!r.is_promoted(TopId(0)));
    }

    #[test]
    fn test_discriminator_set_once() {
        let mut r = results();
        r.set_discriminator(TopId(0), 0.8).unwrap();
        assert!(matches!(r.set_discriminator(TopId(0), 0.9), Err(TaggerError::DiscriminatorAlreadySet(TopId(0)))));
        assert_eq!(r.candidate(TopId(0)).discriminator(), Some(0.8));
    }

    #[test]
    fn test_summaries_pad_indices() {
        let mut r = results();
        r.promote(TopId(0));
        r.promote(TopId(1));
        let summaries = r.top_summaries();
        assert_eq!(summaries[0].constituent_indices, [0, 1, 2]);
        assert_eq!(summaries[0].type_code, 3);
        assert_eq!(summaries[1].constituent_indices, [0, -1, -1]);
        assert_eq!(summaries[1].type_code, 4);
        assert_eq!(r.candidate_summaries().len(), 3);
    }

    #[test]
    fn test_summary_bincode_encoding() {
        let mut r = results();
        r.promote(TopId(2));
        let summary = r.top_summaries().remove(0);
        let bytes = bincode::encode_to_vec(&summary, bincode::config::standard()).unwrap();
        let (decoded, _): (TopSummary, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, summary);
    }

    #[test]
    fn test_resolve_overlaps_prefers_scored_top() {
        let mut r = results();
        r.set_discriminator(TopId(0), 0.95).unwrap();
        r.promote(TopId(1));
        r.promote(TopId(0));
        r.promote(TopId(2));
        // the merged jet's subjet covers jet 0, the monojet reuses jet 1
        assert_eq!(r.resolve_overlaps(173.5), vec![TopId(0)]);
        assert_eq!(r.tops().len(), 3);
    }

    #[test]
    fn test_resolve_overlaps_keeps_disjoint_tops() {
        let mut r = results();
        r.promote(TopId(1));
        r.promote(TopId(2));
        let kept = r.resolve_overlaps(173.5);
        // merged top is closer to mt and shares nothing with jet 1
        assert_eq!(kept, vec![TopId(1), TopId(2)]);
    }

    #[test]
    fn test_mt2_needs_two_tops() {
        let mut r = results();
        assert_eq!(r.calculate_mt2(50.0, 10.0), 0.0);
        r.promote(TopId(1));
        assert_eq!(r.calculate_mt2(50.0, 10.0), 0.0);
        r.promote(TopId(2));
        assert!(r.calculate_mt2(50.0, 10.0) > 0.0);
    }
}
