//! Spiky smoothing kernel functions for 2D SPH.
//!
//! Two kernels are used: a squared falloff for density and a cubed falloff
//! for near-density (the short-range incompressibility term). Both are
//! maximal at zero distance and exactly zero at or beyond the smoothing
//! radius. The normalization constants depend only on the radius, so they
//! are computed once at construction and carried in [`KernelCoefficients`]
//! rather than recomputed per evaluation.

use std::f32::consts::PI;

/// Precomputed normalization factors for the spiky kernels and their
/// derivatives, for a fixed smoothing radius.
#[derive(Debug, Clone, Copy)]
pub struct KernelCoefficients {
    /// `6 / (pi * r^4)` -- density (pow2) kernel scale.
    pub spiky_pow2: f32,
    /// `10 / (pi * r^5)` -- near-density (pow3) kernel scale.
    pub spiky_pow3: f32,
    /// `12 / (pi * r^4)` -- density kernel derivative scale.
    pub spiky_pow2_deriv: f32,
    /// `30 / (pi * r^5)` -- near-density kernel derivative scale.
    pub spiky_pow3_deriv: f32,
}

impl KernelCoefficients {
    /// Compute all four scaling factors from the smoothing radius.
    pub fn from_radius(radius: f32) -> Self {
        let r4 = radius.powi(4);
        let r5 = radius.powi(5);
        Self {
            spiky_pow2: 6.0 / (PI * r4),
            spiky_pow3: 10.0 / (PI * r5),
            spiky_pow2_deriv: 12.0 / (PI * r4),
            spiky_pow3_deriv: 30.0 / (PI * r5),
        }
    }
}

/// Density kernel: `(r - d)^2` falloff, zero outside the radius.
#[inline]
pub fn density_kernel(dst: f32, radius: f32, coeffs: &KernelCoefficients) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    v * v * coeffs.spiky_pow2
}

/// Near-density kernel: `(r - d)^3` falloff, zero outside the radius.
#[inline]
pub fn near_density_kernel(dst: f32, radius: f32, coeffs: &KernelCoefficients) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    v * v * v * coeffs.spiky_pow3
}

/// Derivative of the density kernel with respect to distance.
///
/// Negative inside the support (the kernel decreases with distance).
#[inline]
pub fn density_kernel_derivative(dst: f32, radius: f32, coeffs: &KernelCoefficients) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    -v * coeffs.spiky_pow2_deriv
}

/// Derivative of the near-density kernel with respect to distance.
#[inline]
pub fn near_density_kernel_derivative(dst: f32, radius: f32, coeffs: &KernelCoefficients) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let v = radius - dst;
    -v * v * coeffs.spiky_pow3_deriv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_outside_radius() {
        let radius = 2.0;
        let coeffs = KernelCoefficients::from_radius(radius);
        assert_eq!(density_kernel(2.0, radius, &coeffs), 0.0);
        assert_eq!(density_kernel(3.5, radius, &coeffs), 0.0);
        assert_eq!(near_density_kernel(2.0, radius, &coeffs), 0.0);
        assert_eq!(density_kernel_derivative(2.0, radius, &coeffs), 0.0);
        assert_eq!(near_density_kernel_derivative(5.0, radius, &coeffs), 0.0);
    }

    #[test]
    fn maximal_at_zero_distance() {
        let radius = 2.0;
        let coeffs = KernelCoefficients::from_radius(radius);
        let w0 = density_kernel(0.0, radius, &coeffs);
        assert!(w0 > 0.0);
        // Strictly decreasing with distance inside the support.
        let mut prev = w0;
        for step in 1..10 {
            let w = density_kernel(radius * step as f32 / 10.0, radius, &coeffs);
            assert!(w < prev, "kernel not decreasing at step {step}");
            prev = w;
        }
    }

    #[test]
    fn derivative_negative_inside_support() {
        let radius = 1.5;
        let coeffs = KernelCoefficients::from_radius(radius);
        assert!(density_kernel_derivative(0.5, radius, &coeffs) < 0.0);
        assert!(near_density_kernel_derivative(0.5, radius, &coeffs) < 0.0);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let radius = 1.0;
        let coeffs = KernelCoefficients::from_radius(radius);
        let eps = 1.0e-4;
        for &d in &[0.1_f32, 0.3, 0.5, 0.8] {
            let numeric = (density_kernel(d + eps, radius, &coeffs)
                - density_kernel(d - eps, radius, &coeffs))
                / (2.0 * eps);
            let analytic = density_kernel_derivative(d, radius, &coeffs);
            assert!(
                (numeric - analytic).abs() < 1.0e-2 * analytic.abs().max(1.0),
                "derivative mismatch at d={d}: numeric={numeric}, analytic={analytic}"
            );
        }
    }
}
