use tracing::debug;

use crate::error::{check_length, TaggerResult};
use crate::physics::constituent::Constituent;

/// Source of one kind of constituent.
///
/// Implementors validate their inputs and append the constituents they build; on error nothing
/// may be appended.
pub trait ConstituentPackager {
    fn package_into(&self, constituents: &mut Vec<Constituent>) -> TaggerResult<()>;
}

/// Packages all sources in the order given.
///
/// # Example
///
/// ```rust
/// # use toptagger::input::ak4::Ak4Inputs;
/// # use toptagger::input::packager::{package_constituents, ConstituentPackager};
/// # use toptagger::physics::lorentz::LorentzVector;
/// let jets = vec![LorentzVector::from_pt_eta_phi_e(50.0, 0.0, 0.0, 50.0)];
/// let btag = vec![0.9];
/// let ak4 = Ak4Inputs::new(&jets, &btag);
/// let constituents = package_constituents(&[&ak4 as &dyn ConstituentPackager]).unwrap();
/// assert_eq!(constituents.len(), 1);
/// ```
pub fn package_constituents(packagers: &[&dyn ConstituentPackager]) -> TaggerResult<Vec<Constituent>> {
    let mut constituents = Vec::new();
    for packager in packagers {
        packager.package_into(&mut constituents)?;
    }
    debug!(constituents = constituents.len(), "packaged constituents");
    Ok(constituents)
}

/// Validates an optional filter against the number of objects.
pub(crate) fn check_filter(filter: Option<&[bool]>, n: usize) -> TaggerResult<()> {
    match filter {
        Some(filter) => check_length("filter", n, filter.len()),
        None => Ok(()),
    }
}

pub(crate) fn check_optional<T>(what: &str, values: Option<&[T]>, n: usize) -> TaggerResult<()> {
    match values {
        Some(values) => check_length(what, n, values.len()),
        None => Ok(()),
    }
}

/// True when the object at `index` should be packaged.
pub(crate) fn is_kept(filter: Option<&[bool]>, index: usize) -> bool {
    filter.map_or(true, |f| f[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_checks() {
        let filter = [true, false, true];
        assert!(check_filter(Some(&filter), 3).is_ok());
        assert!(check_filter(Some(&filter), 4).is_err());
        assert!(check_filter(None, 4).is_ok());
        assert!(is_kept(Some(&filter), 0));
        assert!(!is_kept(Some(&filter), 1));
        assert!(is_kept(None, 1));
    }
}
