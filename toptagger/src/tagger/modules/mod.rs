//! Resolution modules: configurable stages that promote candidates to final tops.

pub mod hep;
pub mod merged_filter;
pub mod mva;

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::{TaggerError, TaggerResult};
use crate::tagger::config::CfgDocument;
use crate::tagger::discriminant::ModelStore;
use crate::tagger::results::TopTaggerResults;

use self::hep::HepRequirements;
use self::merged_filter::MergedObjectFilter;
use self::mva::MvaModule;

/// Everything a module may read while it is configured.
#[derive(Clone, Copy)]
pub struct ModuleSetup<'a> {
    pub cfg: &'a CfgDocument,
    pub models: &'a ModelStore,
}

impl<'a> ModuleSetup<'a> {
    pub fn new(cfg: &'a CfgDocument, models: &'a ModelStore) -> Self {
        ModuleSetup { cfg, models }
    }
}

/// One stage of the resolution chain.
///
/// Modules are configured once and then only read, so a single chain can serve many events
/// concurrently. `run` must not remove tops promoted by earlier modules.
pub trait TopTaggerModule: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, results: &mut TopTaggerResults) -> TaggerResult<()>;
}

/// Module kinds that can appear in the `module` list of the tagger configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    MergedObjectFilter,
    HepRequirements,
    Mva,
}

impl Display for ModuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::MergedObjectFilter => write!(f, "MergedObjectFilter"),
            ModuleKind::HepRequirements => write!(f, "HEPRequirements"),
            ModuleKind::Mva => write!(f, "MVA"),
        }
    }
}

impl FromStr for ModuleKind {
    type Err = TaggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MergedObjectFilter" => Ok(ModuleKind::MergedObjectFilter),
            "HEPRequirements" => Ok(ModuleKind::HepRequirements),
            "MVA" => Ok(ModuleKind::Mva),
            _ => Err(TaggerError::UnknownModule(s.to_string())),
        }
    }
}

/// Parses a module list entry of the form `Kind` or `Kind:Context`.
///
/// Without an explicit context the module reads its parameters from the context named after
/// its kind.
///
/// # Example
///
/// ```rust
/// use toptagger::tagger::modules::{parse_module_entry, ModuleKind};
///
/// let (kind, context) = parse_module_entry("MVA:TrijetMVA").unwrap();
/// assert_eq!(kind, ModuleKind::Mva);
/// assert_eq!(context, "TrijetMVA");
///
/// let (kind, context) = parse_module_entry("HEPRequirements").unwrap();
/// assert_eq!(kind, ModuleKind::HepRequirements);
/// assert_eq!(context, "HEPRequirements");
/// ```
pub fn parse_module_entry(entry: &str) -> TaggerResult<(ModuleKind, String)> {
    let entry = entry.trim();
    let (kind, context) = match entry.split_once(':') {
        Some((kind, context)) => (kind.trim(), context.trim()),
        None => (entry, entry),
    };
    if kind.is_empty() || context.is_empty() {
        return Err(TaggerError::UnknownModule(entry.to_string()));
    }
    Ok((kind.parse()?, context.to_string()))
}

/// Configures a module of the given kind from `context`.
pub fn build_module(kind: ModuleKind, setup: &ModuleSetup, context: &str) -> TaggerResult<Box<dyn TopTaggerModule>> {
    let module: Box<dyn TopTaggerModule> = match kind {
        ModuleKind::MergedObjectFilter => Box::new(MergedObjectFilter::configure(setup, context)?),
        ModuleKind::HepRequirements => Box::new(HepRequirements::configure(setup, context)?),
        ModuleKind::Mva => Box::new(MvaModule::configure(setup, context)?),
    };
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_entry() {
        assert_eq!(
            parse_module_entry("MergedObjectFilter:MergedW").unwrap(),
            (ModuleKind::MergedObjectFilter, "MergedW".to_string())
        );
        assert_eq!(
            parse_module_entry(" MVA ").unwrap(),
            (ModuleKind::Mva, "MVA".to_string())
        );
        assert!(matches!(parse_module_entry("Clustering"), Err(TaggerError::UnknownModule(_))));
        assert!(matches!(parse_module_entry("MVA:"), Err(TaggerError::UnknownModule(_))));
        assert!(parse_module_entry("").is_err());
    }

    #[test]
    fn test_kind_display_round_trip() {
        for kind in [ModuleKind::MergedObjectFilter, ModuleKind::HepRequirements, ModuleKind::Mva] {
            assert_eq!(kind.to_string().parse::<ModuleKind>().unwrap(), kind);
        }
    }
}
