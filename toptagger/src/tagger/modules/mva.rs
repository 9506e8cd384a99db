use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TaggerError, TaggerResult};
use crate::tagger::discriminant::{Discriminator, LinearDiscriminator};
use crate::tagger::features::FeatureCalculator;
use crate::tagger::modules::{ModuleSetup, TopTaggerModule};
use crate::tagger::results::TopTaggerResults;

/// Settings of a learned-discriminant stage.
///
/// # Description
///
/// * `disc_cut` - candidates scoring strictly above this are promoted
/// * `model_name` - key of the discriminator in the model store
/// * `model_file` - optional JSON linear model, loaded when the store has no model of that name
/// * `n_constituents` - only candidates with this many constituents are scored
/// * `features` - feature names handed to the discriminator
/// * `feature_set` - calculator that provides the features
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MvaConfig {
    pub disc_cut: f64,
    pub model_name: String,
    pub model_file: Option<String>,
    pub n_constituents: usize,
    pub features: Vec<String>,
    pub feature_set: FeatureCalculator,
}

pub struct MvaModule {
    context: String,
    config: MvaConfig,
    model: Arc<dyn Discriminator>,
}

impl MvaModule {
    /// Checks every configured feature against the calculator and the model before accepting.
    pub fn new(context: &str, config: MvaConfig, model: Arc<dyn Discriminator>) -> TaggerResult<Self> {
        if config.features.is_empty() {
            return Err(TaggerError::MissingParameter {
                key: "mvaVar".to_string(),
                context: context.to_string(),
            });
        }
        config.feature_set.validate(&config.features)?;
        if let Some(required) = model.required_features() {
            if let Some(missing) = required.iter().find(|f| !config.features.contains(f)) {
                return Err(TaggerError::InvalidParameter {
                    key: "mvaVar".to_string(),
                    context: context.to_string(),
                    reason: format!("model \"{}\" reads feature \"{}\" which is not configured", config.model_name, missing),
                });
            }
        }
        Ok(MvaModule { context: context.to_string(), config, model })
    }

    pub fn configure(setup: &ModuleSetup, context: &str) -> TaggerResult<Self> {
        let cfg = setup.cfg;
        let feature_set = match cfg.get_or::<Option<String>>("featureSet", context, None)? {
            Some(name) => name.parse::<FeatureCalculator>().map_err(|reason| TaggerError::InvalidParameter {
                key: "featureSet".to_string(),
                context: context.to_string(),
                reason,
            })?,
            None => FeatureCalculator::Trijet,
        };
        let config = MvaConfig {
            disc_cut: cfg.require("discCut", context)?,
            model_name: cfg.require("modelName", context)?,
            model_file: cfg.get_or("modelFile", context, None)?,
            n_constituents: cfg.get_or("NConstituents", context, 3)?,
            features: cfg.get_list("mvaVar", context)?,
            feature_set,
        };

        let model = match (&config.model_file, setup.models.contains(&config.model_name)) {
            (Some(path), false) => Arc::new(LinearDiscriminator::from_file(path)?) as Arc<dyn Discriminator>,
            _ => setup.models.get(&config.model_name)?,
        };

        info!(
            context,
            model = %config.model_name,
            feature_set = %config.feature_set,
            features = config.features.len(),
            disc_cut = config.disc_cut,
            "configured MVA module"
        );
        MvaModule::new(context, config, model)
    }

    pub fn config(&self) -> &MvaConfig {
        &self.config
    }
}

impl TopTaggerModule for MvaModule {
    fn name(&self) -> &str {
        &self.context
    }

    fn run(&self, results: &mut TopTaggerResults) -> TaggerResult<()> {
        let calculator = self.config.feature_set;
        let scores: Vec<_> = results
            .candidate_ids()
            .filter(|&id| {
                let top = results.candidate(id);
                top.n_constituents() == self.config.n_constituents
                    && top.discriminator().is_none()
                    && !results.is_promoted(id)
            })
            .filter_map(|id| {
                let top = results.candidate(id);
                let constituents = results.constituents_of(id);
                if !calculator.check_candidate(top, &constituents) {
                    return None;
                }
                let features = calculator.compute(top, &constituents, &self.config.features);
                Some((id, self.model.score(&features)))
            })
            .collect();

        let scored = scores.len();
        let mut promoted = 0;
        for (id, score) in scores {
            results.set_discriminator(id, score)?;
            if score > self.config.disc_cut && results.promote(id) {
                promoted += 1;
            }
        }
        debug!(module = %self.context, scored, promoted, "MVA");
        Ok(())
    }
}
