use std::f64::consts::PI;
use std::fmt::{self, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A four-momentum `(px, py, pz, E)`.
///
/// Follows the collider conventions used throughout the tagger: the beam axis is `z`,
/// pseudorapidity and azimuth are derived from the spatial part and the invariant mass of a
/// space-like vector is reported as `-sqrt(-m²)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LorentzVector {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl LorentzVector {
    pub fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        LorentzVector { px, py, pz, e }
    }

    /// Constructs a four-momentum from transverse momentum, pseudorapidity, azimuth and energy.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use toptagger::physics::lorentz::LorentzVector;
    /// let jet = LorentzVector::from_pt_eta_phi_e(50.0, 0.0, 0.0, 50.0);
    /// assert!((jet.pt() - 50.0).abs() < 1e-9);
    /// assert!(jet.m().abs() < 1e-6);
    /// ```
    pub fn from_pt_eta_phi_e(pt: f64, eta: f64, phi: f64, e: f64) -> Self {
        let pt = pt.abs();
        LorentzVector {
            px: pt * phi.cos(),
            py: pt * phi.sin(),
            pz: pt * eta.sinh(),
            e,
        }
    }

    /// Constructs a four-momentum from transverse momentum, pseudorapidity, azimuth and mass.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pt = pt.abs();
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e = if m >= 0.0 {
            (p2 + m * m).sqrt()
        } else {
            (p2 - m * m).max(0.0).sqrt()
        };
        LorentzVector { px, py, pz, e }
    }

    pub fn spatial(&self) -> Vector3<f64> {
        Vector3::new(self.px, self.py, self.pz)
    }

    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    pub fn p(&self) -> f64 {
        self.spatial().norm()
    }

    pub fn e(&self) -> f64 {
        self.e
    }

    pub fn m2(&self) -> f64 {
        self.e * self.e - self.spatial().norm_squared()
    }

    pub fn m(&self) -> f64 {
        let m2 = self.m2();
        if m2 < 0.0 {
            -(-m2).sqrt()
        } else {
            m2.sqrt()
        }
    }

    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 {
            0.0
        } else {
            self.py.atan2(self.px)
        }
    }

    pub fn theta(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 && self.pz == 0.0 {
            0.0
        } else {
            self.pt().atan2(self.pz)
        }
    }

    /// Pseudorapidity; vectors along the beam axis get `±1e10`.
    pub fn eta(&self) -> f64 {
        let p = self.p();
        let cos_theta = if p == 0.0 { 1.0 } else { self.pz / p };
        if cos_theta * cos_theta < 1.0 {
            -0.5 * ((1.0 - cos_theta) / (1.0 + cos_theta)).ln()
        } else if self.pz == 0.0 {
            0.0
        } else if self.pz > 0.0 {
            1e10
        } else {
            -1e10
        }
    }

    /// Azimuthal separation folded into `[-π, π]`.
    pub fn delta_phi(&self, other: &LorentzVector) -> f64 {
        let mut dphi = self.phi() - other.phi();
        while dphi > PI {
            dphi -= 2.0 * PI;
        }
        while dphi < -PI {
            dphi += 2.0 * PI;
        }
        dphi
    }

    /// Angular separation in the pseudorapidity-azimuth plane.
    pub fn delta_r(&self, other: &LorentzVector) -> f64 {
        let deta = self.eta() - other.eta();
        let dphi = self.delta_phi(other);
        (deta * deta + dphi * dphi).sqrt()
    }

    /// Opening angle between the spatial parts of two vectors.
    pub fn angle(&self, other: &LorentzVector) -> f64 {
        let norm = self.p() * other.p();
        if norm <= 0.0 {
            return 0.0;
        }
        let cos = (self.spatial().dot(&other.spatial()) / norm).clamp(-1.0, 1.0);
        cos.acos()
    }

    /// Velocity of the rest frame, `p / E`.
    pub fn boost_vector(&self) -> Vector3<f64> {
        self.spatial() / self.e
    }

    /// Applies the Lorentz boost with velocity `b` to this vector.
    pub fn boosted(&self, b: &Vector3<f64>) -> LorentzVector {
        let b2 = b.norm_squared();
        let gamma = 1.0 / (1.0 - b2).sqrt();
        let bp = b.dot(&self.spatial());
        let gamma2 = if b2 > 0.0 { (gamma - 1.0) / b2 } else { 0.0 };

        let spatial = self.spatial() + b * (gamma2 * bp + gamma * self.e);
        LorentzVector {
            px: spatial.x,
            py: spatial.y,
            pz: spatial.z,
            e: gamma * (self.e + bp),
        }
    }

    /// This vector seen from the rest frame of `frame`.
    pub fn in_rest_frame_of(&self, frame: &LorentzVector) -> LorentzVector {
        self.boosted(&(-frame.boost_vector()))
    }
}

impl Add for LorentzVector {
    type Output = LorentzVector;
    fn add(self, other: LorentzVector) -> LorentzVector {
        LorentzVector {
            px: self.px + other.px,
            py: self.py + other.py,
            pz: self.pz + other.pz,
            e: self.e + other.e,
        }
    }
}

impl AddAssign for LorentzVector {
    fn add_assign(&mut self, other: LorentzVector) {
        *self = *self + other;
    }
}

impl Sub for LorentzVector {
    type Output = LorentzVector;
    fn sub(self, other: LorentzVector) -> LorentzVector {
        LorentzVector {
            px: self.px - other.px,
            py: self.py - other.py,
            pz: self.pz - other.pz,
            e: self.e - other.e,
        }
    }
}

impl Neg for LorentzVector {
    type Output = LorentzVector;
    fn neg(self) -> LorentzVector {
        LorentzVector::new(-self.px, -self.py, -self.pz, -self.e)
    }
}

impl Sum for LorentzVector {
    fn sum<I: Iterator<Item = LorentzVector>>(iter: I) -> LorentzVector {
        iter.fold(LorentzVector::default(), |acc, v| acc + v)
    }
}

impl<'a> Sum<&'a LorentzVector> for LorentzVector {
    fn sum<I: Iterator<Item = &'a LorentzVector>>(iter: I) -> LorentzVector {
        iter.fold(LorentzVector::default(), |acc, v| acc + *v)
    }
}

impl Display for LorentzVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(pt={:.3}, eta={:.3}, phi={:.3}, m={:.3})",
            self.pt(),
            self.eta(),
            self.phi(),
            self.m()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pt_eta_phi_m_round_trip() {
        let v = LorentzVector::from_pt_eta_phi_m(120.0, -1.2, 2.5, 80.4);
        assert!((v.pt() - 120.0).abs() < 1e-9);
        assert!((v.eta() + 1.2).abs() < 1e-9);
        assert!((v.phi() - 2.5).abs() < 1e-9);
        assert!((v.m() - 80.4).abs() < 1e-6);
    }

    #[test]
    fn test_space_like_mass_is_negative() {
        // E < |p|
        let v = LorentzVector::new(3.0, 0.0, 4.0, 3.0);
        assert!((v.m() + 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_delta_phi_wraps() {
        let a = LorentzVector::from_pt_eta_phi_m(10.0, 0.0, 3.0, 0.0);
        let b = LorentzVector::from_pt_eta_phi_m(10.0, 0.0, -3.0, 0.0);
        assert!((a.delta_phi(&b) - (6.0 - 2.0 * PI)).abs() < 1e-9);
        assert!((a.delta_r(&b) - (2.0 * PI - 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_rest_frame_has_zero_momentum() {
        let a = LorentzVector::from_pt_eta_phi_m(200.0, 0.5, 1.0, 10.0);
        let b = LorentzVector::from_pt_eta_phi_m(150.0, -0.3, 1.4, 5.0);
        let total = a + b;
        let a_rf = a.in_rest_frame_of(&total);
        let b_rf = b.in_rest_frame_of(&total);
        let sum_rf = a_rf + b_rf;
        assert!(sum_rf.p() < 1e-6);
        assert!((sum_rf.e() - total.m()).abs() < 1e-6);
        // mass is frame independent
        assert!((a_rf.m() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_sum_matches_pairwise_addition() {
        let jets = vec![
            LorentzVector::from_pt_eta_phi_e(50.0, 0.0, 0.0, 50.0),
            LorentzVector::from_pt_eta_phi_e(40.0, 0.1, 0.1, 40.0),
            LorentzVector::from_pt_eta_phi_e(30.0, -0.1, 0.2, 30.0),
        ];
        let total: LorentzVector = jets.iter().sum();
        let manual = jets[0] + jets[1] + jets[2];
        assert!((total.e() - manual.e()).abs() < 1e-12);
        assert!((total.px - manual.px).abs() < 1e-12);
    }
}
