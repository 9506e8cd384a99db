use std::fs;
use std::path::Path;

use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{TaggerError, TaggerResult};

/// Context holding constants shared by all modules (masses, b-tag working point, ...).
pub const COMMON_CONTEXT: &str = "Common";

/// Expands `$VAR` and `${VAR}` references in a path; unset variables expand to nothing.
///
/// # Example
///
/// ```rust
/// # use toptagger::tagger::config::expand_env_vars;
/// std::env::set_var("TT_DOC_EXAMPLE_DIR", "/data");
/// assert_eq!(expand_env_vars("${TT_DOC_EXAMPLE_DIR}/cfg.json").unwrap(), "/data/cfg.json");
/// ```
pub fn expand_env_vars(path: &str) -> TaggerResult<String> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")?;
    let expanded = pattern.replace_all(path, |caps: &Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
        std::env::var(name).unwrap_or_default()
    });
    Ok(expanded.to_string())
}

/// A key/value configuration document partitioned into named contexts.
///
/// # Description
///
/// The document is a JSON object whose members are contexts, each an object of parameters.
/// Repeated entries are either JSON arrays (`"mvaVar": ["cand_m", "j12_m"]`) or indexed keys
/// (`"mvaVar[0]": "cand_m"`).
///
/// ```json
/// {
///   "Common": { "mW": 80.385, "mt": 173.5 },
///   "HEPRequirements": { "Rmin": 0.85, "Rmax": 1.25 }
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct CfgDocument {
    contexts: Map<String, Value>,
}

impl CfgDocument {
    pub fn from_value(value: Value) -> TaggerResult<Self> {
        let contexts = match value {
            Value::Object(map) => map,
            _ => return Err(TaggerError::InvalidDocument("top level must be an object of contexts".to_string())),
        };
        for (name, context) in &contexts {
            if !context.is_object() {
                return Err(TaggerError::InvalidDocument(format!("context \"{}\" is not an object", name)));
            }
        }
        Ok(CfgDocument { contexts })
    }

    pub fn from_json_str(json: &str) -> TaggerResult<Self> {
        CfgDocument::from_value(serde_json::from_str(json)?)
    }

    /// Reads a document from disk; environment variables in the path are expanded first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TaggerResult<Self> {
        let path = expand_env_vars(&path.as_ref().to_string_lossy())?;
        let text = fs::read_to_string(&path)?;
        CfgDocument::from_json_str(&text)
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.contexts.contains_key(context)
    }

    fn lookup(&self, key: &str, context: &str) -> Option<&Value> {
        self.contexts.get(context).and_then(|c| c.get(key))
    }

    fn convert<T: DeserializeOwned>(value: &Value, key: &str, context: &str) -> TaggerResult<T> {
        serde_json::from_value(value.clone()).map_err(|e| TaggerError::InvalidParameter {
            key: key.to_string(),
            context: context.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns the parameter, or `default` if it is absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, context: &str, default: T) -> TaggerResult<T> {
        match self.lookup(key, context) {
            Some(value) => CfgDocument::convert(value, key, context),
            None => Ok(default),
        }
    }

    /// Returns the parameter, failing with [`TaggerError::MissingParameter`] if it is absent.
    pub fn require<T: DeserializeOwned>(&self, key: &str, context: &str) -> TaggerResult<T> {
        match self.lookup(key, context) {
            Some(value) => CfgDocument::convert(value, key, context),
            None => Err(TaggerError::MissingParameter {
                key: key.to_string(),
                context: context.to_string(),
            }),
        }
    }

    /// Returns entry `index` of a repeated parameter, `None` past the last entry.
    pub fn get_indexed<T: DeserializeOwned>(&self, key: &str, index: usize, context: &str) -> TaggerResult<Option<T>> {
        if let Some(Value::Array(entries)) = self.lookup(key, context) {
            return entries.get(index).map(|v| CfgDocument::convert(v, key, context)).transpose();
        }
        let indexed_key = format!("{}[{}]", key, index);
        self.lookup(&indexed_key, context)
            .map(|v| CfgDocument::convert(v, &indexed_key, context))
            .transpose()
    }

    /// Collects a repeated parameter in order, stopping at the first missing index.
    pub fn get_list<T: DeserializeOwned>(&self, key: &str, context: &str) -> TaggerResult<Vec<T>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.get_indexed(key, entries.len(), context)? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Raw access for parameters that accept more than one representation.
    pub fn get_value(&self, key: &str, context: &str) -> Option<&Value> {
        self.lookup(key, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> CfgDocument {
        CfgDocument::from_json_str(
            r#"{
                "Common": { "mW": 80.385, "maxNbInTop": 1 },
                "MVA": { "mvaVar": ["cand_m", "j12_m"], "modelName": "trijet" },
                "Legacy": { "mvaVar[0]": "cand_pt", "mvaVar[1]": "cand_eta" }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_get_or_uses_default_when_absent() {
        let cfg = doc();
        assert_eq!(cfg.get_or("mt", COMMON_CONTEXT, 173.5).unwrap(), 173.5);
        assert_eq!(cfg.get_or("mW", COMMON_CONTEXT, 0.0).unwrap(), 80.385);
    }

    #[test]
    fn test_require_reports_missing_key() {
        let cfg = doc();
        match cfg.require::<f64>("mt", COMMON_CONTEXT) {
            Err(TaggerError::MissingParameter { key, context }) => {
                assert_eq!(key, "mt");
                assert_eq!(context, "Common");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_value_is_invalid() {
        let cfg = doc();
        assert!(matches!(
            cfg.require::<String>("mW", COMMON_CONTEXT),
            Err(TaggerError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_lists_from_arrays_and_indexed_keys() {
        let cfg = doc();
        let vars: Vec<String> = cfg.get_list("mvaVar", "MVA").unwrap();
        assert_eq!(vars, vec!["cand_m", "j12_m"]);
        let legacy: Vec<String> = cfg.get_list("mvaVar", "Legacy").unwrap();
        assert_eq!(legacy, vec!["cand_pt", "cand_eta"]);
        let missing: Vec<String> = cfg.get_list("mvaVar", "Nowhere").unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_non_object_context_rejected() {
        assert!(matches!(
            CfgDocument::from_json_str(r#"{"Common": 3}"#),
            Err(TaggerError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TT_TEST_EXPAND_ROOT", "/opt/tagger");
        assert_eq!(expand_env_vars("$TT_TEST_EXPAND_ROOT/models").unwrap(), "/opt/tagger/models");
        assert_eq!(expand_env_vars("${TT_TEST_EXPAND_ROOT}/a/${TT_TEST_UNSET_VARIABLE}b").unwrap(), "/opt/tagger/a/b");
    }
}
