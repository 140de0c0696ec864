//! Quaternion algebra.
//!
//! A [`Quaternion`] is a plain `(w, x, y, z)` value: `w` is the real part and
//! `(x, y, z)` the imaginary part. Arithmetic always returns a fresh value;
//! [`Quaternion::normalize`] is the only method that mutates in place.

use core::fmt;
use core::ops::{Add, Div, Index, Mul, Neg, Sub};

use nalgebra::{UnitQuaternion, Vector3, Vector4};

use crate::error::{FusionError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    coords: Vector4<f64>, // [w, x, y, z]
}

/// Right-hand side of the dynamically checked `try_*` arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Quaternion(Quaternion),
    Scalar(f64),
    Vector([f64; 3]),
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Self::Quaternion(_) => "quaternion",
            Self::Scalar(_) => "scalar",
            Self::Vector(_) => "3-vector",
        }
    }
}

impl From<Quaternion> for Operand {
    fn from(q: Quaternion) -> Self {
        Self::Quaternion(q)
    }
}

impl From<f64> for Operand {
    fn from(s: f64) -> Self {
        Self::Scalar(s)
    }
}

impl From<[f64; 3]> for Operand {
    fn from(v: [f64; 3]) -> Self {
        Self::Vector(v)
    }
}

impl From<Vector3<f64>> for Operand {
    fn from(v: Vector3<f64>) -> Self {
        Self::Vector(v.into())
    }
}

impl Quaternion {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            coords: Vector4::new(w, x, y, z),
        }
    }

    /// Builds a quaternion from exactly four values.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [w, x, y, z] => Ok(Self::new(*w, *x, *y, *z)),
            _ => Err(FusionError::InvalidDimension {
                expected: 4,
                found: values.len(),
            }),
        }
    }

    pub const fn from_array(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub const fn i() -> Self {
        Self::new(0.0, 1.0, 0.0, 0.0)
    }

    pub const fn j() -> Self {
        Self::new(0.0, 0.0, 1.0, 0.0)
    }

    pub const fn k() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Pure quaternion `(0, v)`.
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(0.0, v.x, v.y, v.z)
    }

    pub fn w(&self) -> f64 {
        self.coords[0]
    }

    pub fn x(&self) -> f64 {
        self.coords[1]
    }

    pub fn y(&self) -> f64 {
        self.coords[2]
    }

    pub fn z(&self) -> f64 {
        self.coords[3]
    }

    pub fn real(&self) -> f64 {
        self.w()
    }

    pub fn imag(&self) -> [f64; 3] {
        [self.x(), self.y(), self.z()]
    }

    fn imag_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x(), self.y(), self.z())
    }

    /// Snapshot of the four components. The returned array is a copy and is
    /// unaffected by later mutation of `self`.
    pub fn to_array(&self) -> [f64; 4] {
        self.coords.into()
    }

    pub fn conjugate(&self) -> Self {
        Self::new(self.w(), -self.x(), -self.y(), -self.z())
    }

    pub fn norm(&self) -> f64 {
        self.coords.norm()
    }

    /// Scales `self` to unit length in place.
    ///
    /// A zero (or non-finite) norm has no direction to preserve and is
    /// reported as [`FusionError::InvalidState`]; `self` is left untouched.
    pub fn normalize(&mut self) -> Result<()> {
        let norm = self.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(FusionError::InvalidState(
                "cannot normalize a quaternion with zero or non-finite norm",
            ));
        }
        self.coords /= norm;
        Ok(())
    }

    /// Unit-length copy of `self`.
    pub fn normalized(&self) -> Result<Self> {
        let mut q = *self;
        q.normalize()?;
        Ok(q)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.coords.dot(&other.coords)
    }

    /// Hamilton product.
    pub fn hamilton(&self, rhs: &Self) -> Self {
        let (w1, w2) = (self.w(), rhs.w());
        let (v1, v2) = (self.imag_vector(), rhs.imag_vector());
        let w = w1 * w2 - v1.dot(&v2);
        let v = v2 * w1 + v1 * w2 + v1.cross(&v2);
        Self::new(w, v.x, v.y, v.z)
    }

    pub fn try_add(&self, rhs: impl Into<Operand>) -> Result<Self> {
        match rhs.into() {
            Operand::Quaternion(q) => Ok(*self + q),
            Operand::Scalar(s) => Ok(*self + s),
            other => Err(unsupported("add", &other)),
        }
    }

    pub fn try_sub(&self, rhs: impl Into<Operand>) -> Result<Self> {
        match rhs.into() {
            Operand::Quaternion(q) => Ok(*self - q),
            Operand::Scalar(s) => Ok(*self - s),
            other => Err(unsupported("subtract", &other)),
        }
    }

    pub fn try_mul(&self, rhs: impl Into<Operand>) -> Result<Self> {
        match rhs.into() {
            Operand::Quaternion(q) => Ok(*self * q),
            Operand::Scalar(s) => Ok(*self * s),
            other => Err(unsupported("multiply", &other)),
        }
    }

    /// Division is only defined by a scalar; dividing by a quaternion is
    /// not implemented.
    pub fn try_div(&self, rhs: impl Into<Operand>) -> Result<Self> {
        match rhs.into() {
            Operand::Scalar(s) => Ok(*self / s),
            other => Err(unsupported("divide", &other)),
        }
    }

    /// Rotates `v` by this (unit) quaternion: `q · (0, v) · q*`.
    pub fn rotate_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let rotated = *self * Self::from_vector(v) * self.conjugate();
        rotated.imag_vector()
    }

    /// `(roll, pitch, yaw)` in radians.
    pub fn euler_angles(&self) -> (f64, f64, f64) {
        self.to_unit_quaternion().euler_angles()
    }

    pub fn to_unit_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            self.w(),
            self.x(),
            self.y(),
            self.z(),
        ))
    }
}

fn unsupported(op: &'static str, operand: &Operand) -> FusionError {
    FusionError::UnsupportedOperand {
        op,
        operand: operand.kind(),
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<&[f64]> for Quaternion {
    type Error = FusionError;

    fn try_from(values: &[f64]) -> Result<Self> {
        Self::from_slice(values)
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from(values: [f64; 4]) -> Self {
        Self::from_array(values)
    }
}

impl From<Quaternion> for [f64; 4] {
    fn from(q: Quaternion) -> Self {
        q.to_array()
    }
}

impl From<UnitQuaternion<f64>> for Quaternion {
    fn from(q: UnitQuaternion<f64>) -> Self {
        Self::new(q.w, q.i, q.j, q.k)
    }
}

impl Index<usize> for Quaternion {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.coords[index]
    }
}

impl IntoIterator for Quaternion {
    type Item = f64;
    type IntoIter = core::array::IntoIter<f64, 4>;

    fn into_iter(self) -> Self::IntoIter {
        self.to_array().into_iter()
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} + {}i + {}j + {}k",
            self.w(),
            self.x(),
            self.y(),
            self.z()
        )
    }
}

impl Add for Quaternion {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            coords: self.coords + rhs.coords,
        }
    }
}

impl Add<f64> for Quaternion {
    type Output = Self;

    fn add(self, rhs: f64) -> Self {
        Self {
            coords: self.coords.add_scalar(rhs),
        }
    }
}

impl Sub for Quaternion {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            coords: self.coords - rhs.coords,
        }
    }
}

impl Sub<f64> for Quaternion {
    type Output = Self;

    fn sub(self, rhs: f64) -> Self {
        Self {
            coords: self.coords.add_scalar(-rhs),
        }
    }
}

impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.hamilton(&rhs)
    }
}

impl Mul<f64> for Quaternion {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            coords: self.coords * rhs,
        }
    }
}

impl Mul<Quaternion> for f64 {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        rhs * self
    }
}

impl Div<f64> for Quaternion {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self {
            coords: self.coords / rhs,
        }
    }
}

impl Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            coords: -self.coords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_quaternion(rng: &mut StdRng) -> Quaternion {
        Quaternion::from_array(core::array::from_fn(|_| rng.gen::<f64>()))
    }

    fn units() -> [Quaternion; 3] {
        [Quaternion::i(), Quaternion::j(), Quaternion::k()]
    }

    /// Product written with the dot/cross decomposition of the imaginary parts.
    fn reference_multiply(q1: &Quaternion, q2: &Quaternion) -> [f64; 4] {
        let [x1, y1, z1] = q1.imag();
        let [x2, y2, z2] = q2.imag();
        let dot = x1 * x2 + y1 * y2 + z1 * z2;
        let cross = [y1 * z2 - z1 * y2, z1 * x2 - x1 * z2, x1 * y2 - y1 * x2];
        [
            q1.w() * q2.w() - dot,
            q1.w() * x2 + q2.w() * x1 + cross[0],
            q1.w() * y2 + q2.w() * y1 + cross[1],
            q1.w() * z2 + q2.w() * z1 + cross[2],
        ]
    }

    fn assert_components_eq(a: [f64; 4], b: [f64; 4]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert_eq!(
            Quaternion::from_slice(&[1.0, 2.0, 3.0]),
            Err(FusionError::InvalidDimension {
                expected: 4,
                found: 3
            })
        );
        assert!(Quaternion::try_from(&[0.0; 5][..]).is_err());
        let q = Quaternion::from_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(q.to_array(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(q.real(), 1.0);
        assert_eq!(q.imag(), [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_add_sub_units() {
        for a in units() {
            for b in units() {
                let (aa, ba) = (a.to_array(), b.to_array());
                let sum: [f64; 4] = core::array::from_fn(|i| aa[i] + ba[i]);
                let diff: [f64; 4] = core::array::from_fn(|i| aa[i] - ba[i]);
                assert_components_eq((a + b).to_array(), sum);
                assert_components_eq((a - b).to_array(), diff);
            }
        }
    }

    #[test]
    fn test_add_sub_random() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let a = random_quaternion(&mut rng);
            let b = random_quaternion(&mut rng);
            let (aa, ba) = (a.to_array(), b.to_array());
            assert_components_eq((a + b).to_array(), core::array::from_fn(|i| aa[i] + ba[i]));
            assert_components_eq((a - b).to_array(), core::array::from_fn(|i| aa[i] - ba[i]));
        }
    }

    #[test]
    fn test_scalar_broadcast() {
        let q = Quaternion::new(1.0, -2.0, 3.0, 0.5);
        assert_eq!((q + 1.0).to_array(), [2.0, -1.0, 4.0, 1.5]);
        assert_eq!((q - 1.0).to_array(), [0.0, -3.0, 2.0, -0.5]);
        assert_eq!((q * 2.0).to_array(), [2.0, -4.0, 6.0, 1.0]);
        assert_eq!((2.0 * q).to_array(), [2.0, -4.0, 6.0, 1.0]);
        assert_eq!((q / 2.0).to_array(), [0.5, -1.0, 1.5, 0.25]);
    }

    #[test]
    fn test_multiply_units_matches_reference() {
        for a in units() {
            for b in units() {
                assert_components_eq((a * b).to_array(), reference_multiply(&a, &b));
            }
        }
        let minus_one = [-1.0, 0.0, 0.0, 0.0];
        assert_eq!((Quaternion::i() * Quaternion::i()).to_array(), minus_one);
        assert_eq!((Quaternion::j() * Quaternion::j()).to_array(), minus_one);
        assert_eq!((Quaternion::k() * Quaternion::k()).to_array(), minus_one);
        assert_eq!(Quaternion::i() * Quaternion::j(), Quaternion::k());
        assert_eq!(Quaternion::j() * Quaternion::i(), -Quaternion::k());
        assert_eq!(Quaternion::j() * Quaternion::k(), Quaternion::i());
        assert_eq!(Quaternion::k() * Quaternion::i(), Quaternion::j());
    }

    #[test]
    fn test_multiply_random_matches_reference() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let a = random_quaternion(&mut rng);
            let b = random_quaternion(&mut rng);
            assert_components_eq((a * b).to_array(), reference_multiply(&a, &b));
        }
    }

    #[test]
    fn test_norm() {
        for q in units() {
            assert_eq!(q.norm(), 1.0);
        }
        let mut rng = StdRng::seed_from_u64(3);
        let q = random_quaternion(&mut rng);
        let expected = q.to_array().iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_relative_eq!(q.norm(), expected, epsilon = 1e-15);
    }

    #[test]
    fn test_normalize() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut q = random_quaternion(&mut rng);
        q.normalize().unwrap();
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_leaves_snapshot_untouched() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut q = random_quaternion(&mut rng);
        let before = q.to_array();
        let before_copy = before;
        q.normalize().unwrap();
        assert_eq!(before, before_copy);
        assert_ne!(q.to_array(), before);
    }

    #[test]
    fn test_normalize_zero_is_invalid_state() {
        let mut q = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert!(matches!(q.normalize(), Err(FusionError::InvalidState(_))));
        assert_eq!(q.to_array(), [0.0; 4]);
        assert!(q.normalized().is_err());
    }

    #[test]
    fn test_conjugate_of_normalized() {
        let mut rng = StdRng::seed_from_u64(13);
        let q = random_quaternion(&mut rng).normalized().unwrap();
        let c = q.conjugate();
        assert_eq!(c.to_array(), [q.w(), -q.x(), -q.y(), -q.z()]);
    }

    #[test]
    fn test_try_ops_reject_unsupported_operands() {
        let q = Quaternion::new(1.0, 2.0, 3.0, 4.0);
        assert!(matches!(
            q.try_div(Quaternion::i()),
            Err(FusionError::UnsupportedOperand { op: "divide", .. })
        ));
        assert!(q.try_add([1.0, 0.0, 0.0]).is_err());
        assert!(q.try_sub(Vector3::new(1.0, 0.0, 0.0)).is_err());
        assert!(q.try_mul([0.0, 1.0, 0.0]).is_err());
        assert_eq!(q.try_add(1.0).unwrap(), q + 1.0);
        assert_eq!(q.try_mul(Quaternion::j()).unwrap(), q * Quaternion::j());
        assert_eq!(q.try_div(4.0).unwrap(), q / 4.0);
    }

    #[test]
    fn test_rotate_vector_about_z() {
        let half = core::f64::consts::FRAC_PI_4;
        let q = Quaternion::new(half.cos(), 0.0, 0.0, half.sin());
        let v = q.rotate_vector(&Vector3::x());
        assert_relative_eq!(v, Vector3::y(), epsilon = 1e-12);
        let (roll, pitch, yaw) = q.euler_angles();
        assert_relative_eq!(roll, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-12);
        assert_relative_eq!(yaw, core::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_quaternion_round_trip_keeps_order() {
        let q = Quaternion::new(0.5, 0.5, -0.5, 0.5);
        let back = Quaternion::from(q.to_unit_quaternion());
        assert_components_eq(back.to_array(), q.to_array());
    }

    #[test]
    fn test_display_and_iteration() {
        let q = Quaternion::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(q.to_string(), "1 + 2i + 3j + 4k");
        assert_eq!(q.into_iter().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(q[2], 3.0);
    }
}
