//! Stransverse mass for two visible systems sharing the missing transverse momentum.

use crate::physics::lorentz::LorentzVector;

const GRID_POINTS: usize = 21;
const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-7;

/// Squared transverse mass of a visible system and an invisible particle with momentum `(qx, qy)`.
fn mt_squared(vis: &LorentzVector, qx: f64, qy: f64, invisible_mass: f64) -> f64 {
    let m_vis2 = vis.m2().max(0.0);
    let m_inv2 = invisible_mass * invisible_mass;
    let et_vis = (m_vis2 + vis.pt() * vis.pt()).sqrt();
    let et_inv = (m_inv2 + qx * qx + qy * qy).sqrt();
    m_vis2 + m_inv2 + 2.0 * (et_vis * et_inv - vis.px * qx - vis.py * qy)
}

/// Computes MT2 by minimising `max(mT(a, q), mT(b, met - q))` over all splittings `q`.
///
/// The objective is convex in `q`, so a shrinking grid around the running minimum converges to
/// the global minimum.
///
/// # Arguments
///
/// * `vis_a`, `vis_b` - The two visible systems.
/// * `met_x`, `met_y` - Missing transverse momentum components.
/// * `invisible_mass` - Mass hypothesis of each invisible particle.
///
pub fn mt2(vis_a: &LorentzVector, vis_b: &LorentzVector, met_x: f64, met_y: f64, invisible_mass: f64) -> f64 {
    let objective = |qx: f64, qy: f64| {
        let a = mt_squared(vis_a, qx, qy, invisible_mass);
        let b = mt_squared(vis_b, met_x - qx, met_y - qy, invisible_mass);
        a.max(b)
    };

    let mut center = (0.5 * met_x, 0.5 * met_y);
    let mut best = objective(center.0, center.1);
    let mut half_width = met_x.hypot(met_y).max(vis_a.pt()).max(vis_b.pt()).max(1.0);

    for _ in 0..MAX_ITERATIONS {
        let step = 2.0 * half_width / (GRID_POINTS - 1) as f64;
        let mut next = center;
        for ix in 0..GRID_POINTS {
            for iy in 0..GRID_POINTS {
                let qx = center.0 - half_width + step * ix as f64;
                let qy = center.1 - half_width + step * iy as f64;
                let value = objective(qx, qy);
                if value < best {
                    best = value;
                    next = (qx, qy);
                }
            }
        }
        // keep the window on the minimum until it can no longer move
        if next == center {
            half_width *= 0.5;
        }
        center = next;
        if half_width < TOLERANCE {
            break;
        }
    }

    best.max(0.0).sqrt()
}
