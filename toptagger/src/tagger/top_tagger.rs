use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::error::{TaggerError, TaggerResult};
use crate::input::calibration::PuppiSoftDropCorrection;
use crate::input::event::{EventRecord, EventSummary};
use crate::input::packager::{package_constituents, ConstituentPackager};
use crate::physics::constituent::Constituent;
use crate::tagger::assembler::{CandidateAssembler, MAX_CONSTITUENTS_LIMIT};
use crate::tagger::config::{CfgDocument, COMMON_CONTEXT};
use crate::tagger::discriminant::ModelStore;
use crate::tagger::modules::{build_module, parse_module_entry, ModuleSetup, TopTaggerModule};
use crate::tagger::results::TopTaggerResults;

pub const TOP_TAGGER_CONTEXT: &str = "TopTagger";
/// Top mass used for overlap ordering when `Common` does not set `mt`.
pub const DEFAULT_TOP_MASS: f64 = 173.5;

/// Candidate assembly followed by a configured chain of resolution modules.
///
/// # Description
///
/// The tagger is immutable after setup. Every call to [`TopTagger::tag`] builds a fresh
/// [`TopTaggerResults`], so one tagger can process many events, also from several threads.
///
/// # Example
///
/// ```rust
/// use toptagger::input::ak4::Ak4Inputs;
/// use toptagger::input::packager::ConstituentPackager;
/// use toptagger::physics::lorentz::LorentzVector;
/// use toptagger::tagger::config::CfgDocument;
/// use toptagger::tagger::discriminant::ModelStore;
/// use toptagger::tagger::top_tagger::TopTagger;
///
/// let cfg = CfgDocument::from_json_str(r#"{
///     "TopTagger": { "maxConstituents": 1, "module": ["MergedObjectFilter"] }
/// }"#).unwrap();
/// let tagger = TopTagger::from_cfg(&cfg, &ModelStore::new()).unwrap();
///
/// let jets = vec![LorentzVector::from_pt_eta_phi_e(50.0, 0.0, 0.0, 50.0)];
/// let btag = vec![0.5];
/// let ak4 = Ak4Inputs::new(&jets, &btag);
/// let results = tagger.tag(&[&ak4 as &dyn ConstituentPackager]).unwrap();
/// assert_eq!(results.candidates().len(), 1);
/// assert!(results.tops().is_empty());
/// ```
pub struct TopTagger {
    assembler: CandidateAssembler,
    modules: Vec<Box<dyn TopTaggerModule>>,
    reference_top_mass: f64,
}

impl TopTagger {
    pub fn new(assembler: CandidateAssembler, modules: Vec<Box<dyn TopTaggerModule>>) -> Self {
        TopTagger { assembler, modules, reference_top_mass: DEFAULT_TOP_MASS }
    }

    pub fn with_reference_top_mass(mut self, mt: f64) -> Self {
        self.reference_top_mass = mt;
        self
    }

    /// Reads `maxConstituents` and the ordered `module` list from the `TopTagger` context and
    /// configures every module.
    ///
    /// # Errors
    ///
    /// Any configuration problem, including an empty module list.
    pub fn from_cfg(cfg: &CfgDocument, models: &ModelStore) -> TaggerResult<Self> {
        let max_constituents: usize = cfg.get_or("maxConstituents", TOP_TAGGER_CONTEXT, MAX_CONSTITUENTS_LIMIT)?;
        let mt: f64 = cfg.get_or("mt", COMMON_CONTEXT, DEFAULT_TOP_MASS)?;
        let assembler = CandidateAssembler::new(max_constituents)?;

        let entries: Vec<String> = cfg.get_list("module", TOP_TAGGER_CONTEXT)?;
        if entries.is_empty() {
            return Err(TaggerError::MissingParameter {
                key: "module".to_string(),
                context: TOP_TAGGER_CONTEXT.to_string(),
            });
        }

        let setup = ModuleSetup::new(cfg, models);
        let modules = entries
            .iter()
            .map(|entry| {
                let (kind, context) = parse_module_entry(entry)?;
                build_module(kind, &setup, &context)
            })
            .collect::<TaggerResult<Vec<_>>>()?;

        info!(
            max_constituents,
            modules = %modules.iter().map(|m| m.name()).collect::<Vec<_>>().join(", "),
            "configured top tagger"
        );
        Ok(TopTagger::new(assembler, modules).with_reference_top_mass(mt))
    }

    /// Top mass against which candidate masses are compared when resolving overlaps.
    pub fn reference_top_mass(&self) -> f64 {
        self.reference_top_mass
    }

    pub fn max_constituents(&self) -> usize {
        self.assembler.max_constituents()
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Packages all sources in order, then assembles and resolves the event.
    pub fn tag(&self, packagers: &[&dyn ConstituentPackager]) -> TaggerResult<TopTaggerResults> {
        self.tag_constituents(package_constituents(packagers)?)
    }

    pub fn tag_constituents(&self, constituents: Vec<Constituent>) -> TaggerResult<TopTaggerResults> {
        let mut results = self.assembler.assemble(constituents);
        for module in &self.modules {
            let before = results.tops().len();
            module.run(&mut results)?;
            debug!(module = module.name(), promoted = results.tops().len() - before, "module finished");
        }
        debug!(candidates = results.candidates().len(), tops = results.tops().len(), "event tagged");
        Ok(results)
    }

    /// Tags independent events on a dedicated pool of `num_threads` threads.
    ///
    /// Per-event failures are reported in place; only a failure to build the pool is fatal.
    pub fn tag_batch(
        &self,
        events: &[EventRecord],
        correction: Option<&PuppiSoftDropCorrection>,
        num_threads: usize,
    ) -> TaggerResult<Vec<TaggerResult<EventSummary>>> {
        let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        let summaries = pool.install(|| {
            events
                .par_iter()
                .map(|event| event.tag(self, correction))
                .collect::<Vec<_>>()
        });
        info!(
            events = events.len(),
            failed = summaries.iter().filter(|s| s.is_err()).count(),
            "tagged batch"
        );
        Ok(summaries)
    }
}
