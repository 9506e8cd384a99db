use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TaggerError, TaggerResult};
use crate::tagger::config::expand_env_vars;

pub const PUPPI_GEN_CURVE: &str = "puppiJECcorr_gen";
pub const PUPPI_RECO_CENTRAL_CURVE: &str = "puppiJECcorr_reco_0eta1v3";
pub const PUPPI_RECO_FORWARD_CURVE: &str = "puppiJECcorr_reco_1v3eta2v5";

/// Below this transverse momentum the PUPPI curves are not defined and no correction is applied.
pub const PUPPI_MIN_PT: f64 = 200.0;
/// Boundary between the central and forward reconstruction curves.
pub const PUPPI_CENTRAL_ETA: f64 = 1.3;

/// A univariate calibration function.
pub trait CalibrationCurve: Send + Sync {
    fn eval(&self, x: f64) -> f64;
}

impl<F> CalibrationCurve for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn eval(&self, x: f64) -> f64 {
        self(x)
    }
}

/// `p0 + p1 * (x * p2)^(-p3)`, the functional form of the PUPPI soft-drop curves.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLawCurve {
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
}

impl CalibrationCurve for PowerLawCurve {
    fn eval(&self, x: f64) -> f64 {
        self.p0 + self.p1 * (x * self.p2).powf(-self.p3)
    }
}

/// Named calibration curves, looked up by name when building corrections.
#[derive(Clone, Default)]
pub struct CurveStore {
    curves: HashMap<String, Arc<dyn CalibrationCurve>>,
}

impl CurveStore {
    pub fn new() -> Self {
        CurveStore::default()
    }

    pub fn insert<C: CalibrationCurve + 'static>(&mut self, name: &str, curve: C) {
        self.curves.insert(name.to_string(), Arc::new(curve));
    }

    pub fn get(&self, name: &str) -> TaggerResult<Arc<dyn CalibrationCurve>> {
        self.curves
            .get(name)
            .cloned()
            .ok_or_else(|| TaggerError::CurveNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Reads a JSON object mapping curve names to [`PowerLawCurve`] parameters.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TaggerResult<Self> {
        let path = expand_env_vars(&path.as_ref().to_string_lossy())?;
        if !Path::new(&path).exists() {
            return Err(TaggerError::CalibrationFileNotFound(path));
        }
        let text = fs::read_to_string(&path)?;
        let parsed: HashMap<String, PowerLawCurve> = serde_json::from_str(&text)?;
        debug!(path = %path, curves = parsed.len(), "loaded calibration curves");

        let mut store = CurveStore::new();
        for (name, curve) in parsed {
            store.insert(&name, curve);
        }
        Ok(store)
    }
}

/// Multiplicative PUPPI soft-drop mass correction, `gen(pt) * reco(pt)` with the reconstruction
/// curve picked by `|eta| <= 1.3`.
#[derive(Clone)]
pub struct PuppiSoftDropCorrection {
    gen: Arc<dyn CalibrationCurve>,
    reco_central: Arc<dyn CalibrationCurve>,
    reco_forward: Arc<dyn CalibrationCurve>,
}

impl PuppiSoftDropCorrection {
    pub fn new(
        gen: Arc<dyn CalibrationCurve>,
        reco_central: Arc<dyn CalibrationCurve>,
        reco_forward: Arc<dyn CalibrationCurve>,
    ) -> Self {
        PuppiSoftDropCorrection { gen, reco_central, reco_forward }
    }

    /// Builds the correction from the three standard curve names.
    pub fn from_store(store: &CurveStore) -> TaggerResult<Self> {
        Ok(PuppiSoftDropCorrection::new(
            store.get(PUPPI_GEN_CURVE)?,
            store.get(PUPPI_RECO_CENTRAL_CURVE)?,
            store.get(PUPPI_RECO_FORWARD_CURVE)?,
        ))
    }

    pub fn weight(&self, pt: f64, eta: f64) -> f64 {
        if pt < PUPPI_MIN_PT {
            return 1.0;
        }
        let reco = if eta.abs() <= PUPPI_CENTRAL_ETA {
            self.reco_central.eval(pt)
        } else {
            self.reco_forward.eval(pt)
        };
        self.gen.eval(pt) * reco
    }
}

/// Correction factor for an optional set of curves; unity when none are configured.
pub fn puppi_weight(correction: Option<&PuppiSoftDropCorrection>, pt: f64, eta: f64) -> f64 {
    match correction {
        Some(correction) => correction.weight(pt, eta),
        None => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correction() -> PuppiSoftDropCorrection {
        let mut store = CurveStore::new();
        store.insert(PUPPI_GEN_CURVE, |_pt: f64| 2.0);
        store.insert(PUPPI_RECO_CENTRAL_CURVE, |_pt: f64| 3.0);
        store.insert(PUPPI_RECO_FORWARD_CURVE, |_pt: f64| 5.0);
        PuppiSoftDropCorrection::from_store(&store).unwrap()
    }

    #[test]
    fn test_unity_below_threshold() {
        let c = correction();
        assert_eq!(c.weight(199.9, 0.0), 1.0);
        assert_eq!(c.weight(10.0, 2.0), 1.0);
        assert_eq!(puppi_weight(None, 500.0, 0.0), 1.0);
    }

    #[test]
    fn test_central_and_forward_curves() {
        let c = correction();
        assert!((c.weight(400.0, 1.3) - 6.0).abs() < 1e-12);
        assert!((c.weight(400.0, -1.31) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_curve_is_reported() {
        let store = CurveStore::new();
        match PuppiSoftDropCorrection::from_store(&store) {
            Err(TaggerError::CurveNotFound(name)) => assert_eq!(name, PUPPI_GEN_CURVE),
            _ => panic!("expected a missing curve"),
        }
    }

    #[test]
    fn test_power_law_curve() {
        let curve = PowerLawCurve { p0: 1.0, p1: 2.0, p2: 0.5, p3: 1.0 };
        assert!((curve.eval(400.0) - 1.01).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CurveStore::from_file("/nonexistent/puppi_curves.json"),
            Err(TaggerError::CalibrationFileNotFound(_))
        ));
    }
}
