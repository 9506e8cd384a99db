use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TaggerError, TaggerResult};
use crate::tagger::config::expand_env_vars;

/// Named input features handed to a discriminator.
pub type FeatureMap = HashMap<String, f64>;

/// An opaque scoring backend: named features in, one score out.
pub trait Discriminator: Send + Sync {
    fn score(&self, features: &FeatureMap) -> f64;

    /// Features the backend reads, if it can tell; used to validate configurations at setup.
    fn required_features(&self) -> Option<Vec<String>> {
        None
    }
}

impl<F> Discriminator for F
where
    F: Fn(&FeatureMap) -> f64 + Send + Sync,
{
    fn score(&self, features: &FeatureMap) -> f64 {
        self(features)
    }
}

/// Weighted sum of features plus bias, optionally squashed with a logistic function.
///
/// # Example
///
/// ```rust
/// # use toptagger::tagger::discriminant::{Discriminator, FeatureMap, LinearDiscriminator};
/// let model: LinearDiscriminator = serde_json::from_str(
///     r#"{ "weights": { "cand_m": 0.01 }, "bias": -1.0 }"#,
/// ).unwrap();
/// let features = FeatureMap::from([("cand_m".to_string(), 175.0)]);
/// assert!((model.score(&features) - 0.75).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearDiscriminator {
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub logistic: bool,
}

impl LinearDiscriminator {
    pub fn from_file<P: AsRef<Path>>(path: P) -> TaggerResult<Self> {
        let path = expand_env_vars(&path.as_ref().to_string_lossy())?;
        let text = fs::read_to_string(&path)?;
        let model: LinearDiscriminator = serde_json::from_str(&text)?;
        debug!(path = %path, weights = model.weights.len(), "loaded linear discriminator");
        Ok(model)
    }
}

impl Discriminator for LinearDiscriminator {
    fn score(&self, features: &FeatureMap) -> f64 {
        // absent features make the score NaN rather than silently zero
        let sum: f64 = self
            .weights
            .iter()
            .map(|(name, w)| w * features.get(name).copied().unwrap_or(f64::NAN))
            .sum::<f64>()
            + self.bias;
        if self.logistic {
            1.0 / (1.0 + (-sum).exp())
        } else {
            sum
        }
    }

    fn required_features(&self) -> Option<Vec<String>> {
        let mut names: Vec<String> = self.weights.keys().cloned().collect();
        names.sort();
        Some(names)
    }
}

/// Discriminators by model name, shared read-only between modules and threads.
#[derive(Clone, Default)]
pub struct ModelStore {
    models: HashMap<String, Arc<dyn Discriminator>>,
}

impl ModelStore {
    pub fn new() -> Self {
        ModelStore::default()
    }

    pub fn insert<D: Discriminator + 'static>(&mut self, name: &str, model: D) {
        self.models.insert(name.to_string(), Arc::new(model));
    }

    pub fn insert_shared(&mut self, name: &str, model: Arc<dyn Discriminator>) {
        self.models.insert(name.to_string(), model);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn get(&self, name: &str) -> TaggerResult<Arc<dyn Discriminator>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| TaggerError::ModelNotFound(name.to_string()))
    }

    /// Loads a [`LinearDiscriminator`] from a JSON file under the given name.
    pub fn load_linear<P: AsRef<Path>>(&mut self, name: &str, path: P) -> TaggerResult<()> {
        let model = LinearDiscriminator::from_file(path)?;
        self.insert(name, model);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
