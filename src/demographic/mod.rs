use anyhow::bail;

use crate::Result;

/// An effective-population-size-over-time model supplying the rate integrals
/// for hazard calculations.
///
/// Times run backwards from the most recent sample at zero. The intensity is
/// the cumulative hazard scale ∫₀ᵗ 1/N(u) du; `integral` is the piece of it
/// spanning one coalescent interval.
pub trait DemographicFunction {
    /// The effective population size N(t).
    fn demographic(&self, t: f64) -> f64;
    /// ∫₀ᵗ 1/N(u) du.
    fn intensity(&self, t: f64) -> f64;
    /// The inverse of [`Self::intensity`], used to transform exponential
    /// waiting times when simulating genealogies.
    fn inverse_intensity(&self, x: f64) -> f64;

    fn log_demographic(&self, t: f64) -> f64 {
        self.demographic(t).ln()
    }

    fn integral(&self, start: f64, finish: f64) -> f64 {
        self.intensity(finish) - self.intensity(start)
    }
}

/// Constant population size.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPopulation {
    n0: f64,
}

impl ConstantPopulation {
    pub fn new(n0: f64) -> Result<Self> {
        if !n0.is_finite() || n0 <= 0.0 {
            bail!("Population size must be finite and positive, got {}.", n0);
        }
        Ok(Self { n0 })
    }
}

impl DemographicFunction for ConstantPopulation {
    fn demographic(&self, _t: f64) -> f64 {
        self.n0
    }

    fn intensity(&self, t: f64) -> f64 {
        t / self.n0
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        x * self.n0
    }
}

/// Exponentially growing (or shrinking) population,
/// N(t) = N₀·exp(−r·t) going backwards in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialGrowth {
    n0: f64,
    growth_rate: f64,
}

impl ExponentialGrowth {
    pub fn new(n0: f64, growth_rate: f64) -> Result<Self> {
        if !n0.is_finite() || n0 <= 0.0 {
            bail!("Population size must be finite and positive, got {}.", n0);
        }
        if !growth_rate.is_finite() {
            bail!("Growth rate must be finite, got {}.", growth_rate);
        }
        Ok(Self { n0, growth_rate })
    }
}

impl DemographicFunction for ExponentialGrowth {
    fn demographic(&self, t: f64) -> f64 {
        self.n0 * (-self.growth_rate * t).exp()
    }

    fn intensity(&self, t: f64) -> f64 {
        if self.growth_rate == 0.0 {
            t / self.n0
        } else {
            ((self.growth_rate * t).exp() - 1.0) / (self.n0 * self.growth_rate)
        }
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        if self.growth_rate == 0.0 {
            x * self.n0
        } else {
            (1.0 + self.n0 * self.growth_rate * x).ln() / self.growth_rate
        }
    }
}

/// Wraps another demographic function with a population scale factor, used
/// when several loci share one demographic model.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledDemographic<D: DemographicFunction> {
    function: D,
    factor: f64,
}

impl<D: DemographicFunction> ScaledDemographic<D> {
    pub fn new(function: D, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            bail!("Population factor must be finite and positive, got {}.", factor);
        }
        Ok(Self { function, factor })
    }
}

impl<D: DemographicFunction> DemographicFunction for ScaledDemographic<D> {
    fn demographic(&self, t: f64) -> f64 {
        self.function.demographic(t) * self.factor
    }

    fn intensity(&self, t: f64) -> f64 {
        self.function.intensity(t) / self.factor
    }

    fn inverse_intensity(&self, x: f64) -> f64 {
        self.function.inverse_intensity(x * self.factor)
    }
}
