//! Time transforms and value interpolation.

use std::fmt;
use std::rc::Rc;

/// Maps normalized time in `[0, 1]` to normalized progress.
#[derive(Clone)]
pub struct Easing(Rc<dyn Fn(f64) -> f64>);

impl Easing {
    pub fn linear() -> Self {
        Self(Rc::new(|t| t))
    }

    /// A caller-supplied curve.
    pub fn custom(f: impl Fn(f64) -> f64 + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn transform_time(&self, t: f64) -> f64 {
        (self.0)(t)
    }
}

impl Default for Easing {
    fn default() -> Self {
        Self::linear()
    }
}

impl fmt::Debug for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Easing")
    }
}

/// Blends two values by a progress factor.
pub trait Interpolation<T> {
    fn interpolate(&self, t: f64, from: &T, to: &T) -> T;
}

/// Straight-line interpolation of floating point values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleInterpolation;

impl Interpolation<f64> for DoubleInterpolation {
    fn interpolate(&self, t: f64, from: &f64, to: &f64) -> f64 {
        from + t * (to - from)
    }
}
