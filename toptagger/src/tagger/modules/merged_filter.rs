use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{TaggerError, TaggerResult};
use crate::physics::top_object::TopType;
use crate::tagger::modules::{ModuleSetup, TopTaggerModule};
use crate::tagger::results::TopTaggerResults;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergedObjectFilterConfig {
    pub target: TopType,
}

impl Default for MergedObjectFilterConfig {
    fn default() -> Self {
        MergedObjectFilterConfig { target: TopType::MergedTop }
    }
}

/// Promotes every candidate of one declared type.
#[derive(Clone, Debug)]
pub struct MergedObjectFilter {
    context: String,
    config: MergedObjectFilterConfig,
}

impl MergedObjectFilter {
    pub fn new(context: &str, config: MergedObjectFilterConfig) -> Self {
        MergedObjectFilter { context: context.to_string(), config }
    }

    /// Reads `type` from `context`, given either as a type name or as its numeric code.
    pub fn configure(setup: &ModuleSetup, context: &str) -> TaggerResult<Self> {
        let invalid = |reason: String| TaggerError::InvalidParameter {
            key: "type".to_string(),
            context: context.to_string(),
            reason,
        };
        let target = match setup.cfg.get_value("type", context) {
            None => MergedObjectFilterConfig::default().target,
            Some(Value::String(name)) => name.parse::<TopType>().map_err(invalid)?,
            Some(Value::Number(code)) => code
                .as_i64()
                .and_then(|c| TopType::new(c as i32))
                .ok_or_else(|| invalid(format!("unknown top type code {}", code)))?,
            Some(other) => return Err(invalid(format!("expected a type name or code, got {}", other))),
        };
        debug!(context, target = %target, "configured merged object filter");
        Ok(MergedObjectFilter::new(context, MergedObjectFilterConfig { target }))
    }

    pub fn config(&self) -> &MergedObjectFilterConfig {
        &self.config
    }
}

impl TopTaggerModule for MergedObjectFilter {
    fn name(&self) -> &str {
        &self.context
    }

    fn run(&self, results: &mut TopTaggerResults) -> TaggerResult<()> {
        let matching: Vec<_> = results
            .candidate_ids()
            .filter(|&id| results.candidate(id).kind() == self.config.target)
            .collect();
        let promoted = matching.into_iter().filter(|&id| results.promote(id)).count();
        debug!(module = %self.context, promoted, "merged object filter");
        Ok(())
    }
}
