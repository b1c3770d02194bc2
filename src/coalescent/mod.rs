use anyhow::bail;
use itertools::izip;
use log::debug;

use crate::demographic::DemographicFunction;
use crate::intervals::{collect_events, Interval, IntervalKind, Intervals};
use crate::tree::{Genealogy, GenealogyView, NodeIdx};
use crate::Result;

mod likelihood_builder;
pub use likelihood_builder::CoalescentLikelihoodBuilder;

/// C(k, 2), the number of lineage pairs among k lineages.
pub fn choose2(k: usize) -> f64 {
    (k * k.saturating_sub(1)) as f64 / 2.0
}

/// The log-likelihood contribution of one interval.
///
/// For k lineages and population size N the waiting time to the next
/// coalescence is exponential with rate C(k,2)/N(t), so every interval
/// contributes the survived hazard −C(k,2)·∫1/N and, when a recombination
/// rate ρ is modelled, the complementary survived hazard −(k/2)·∫ρ. The
/// terminating event adds the fired-hazard term of its own process:
/// −log N(t_end) for a coalescence, −log ρ(t_end) for a reassortment.
/// Sample additions are deterministic conditioning events and add nothing.
pub fn interval_contribution<D: DemographicFunction, R: DemographicFunction>(
    coalescent_fn: &D,
    recombination_fn: Option<&R>,
    width: f64,
    start: f64,
    lineage_count: usize,
    kind: IntervalKind,
) -> Result<f64> {
    let finish = start + width;
    let mut contribution = -choose2(lineage_count) * coalescent_fn.integral(start, finish);
    if let Some(recombination_fn) = recombination_fn {
        contribution -= lineage_count as f64 / 2.0 * recombination_fn.integral(start, finish);
    }
    match kind {
        IntervalKind::Coalescent => contribution -= coalescent_fn.log_demographic(finish),
        IntervalKind::Recombination => match recombination_fn {
            Some(recombination_fn) => contribution -= recombination_fn.log_demographic(finish),
            None => bail!(
                "Found a recombination interval but no recombination rate function is set."
            ),
        },
        IntervalKind::SampleAddition | IntervalKind::Nothing => {}
    }
    Ok(contribution)
}

/// Folds the interval sequence into a scalar log-likelihood under the given
/// demographic function. Pure, no caching here.
///
/// Intervals terminated by more than one coalescence (polytomies and exact
/// height ties) insert the matching zero-width coalescent contributions at
/// the terminating height. A non-finite result aborts the evaluation; it
/// would otherwise corrupt the MCMC acceptance ratio.
pub fn log_likelihood<D: DemographicFunction, R: DemographicFunction>(
    intervals: &Intervals,
    coalescent_fn: &D,
    recombination_fn: Option<&R>,
) -> Result<f64> {
    let mut logl = 0.0;
    let mut time = 0.0;
    for (i, (&width, &count)) in
        izip!(intervals.widths(), intervals.lineage_counts()).enumerate()
    {
        let kind = intervals.kind(i)?;
        logl += interval_contribution(coalescent_fn, recombination_fn, width, time, count, kind)?;
        let extra_merges = intervals.coalescent_events(i)? - 1;
        for k in 0..extra_merges.max(0) as usize {
            logl += interval_contribution(
                coalescent_fn,
                recombination_fn,
                0.0,
                time + width,
                count - k - 1,
                IntervalKind::Coalescent,
            )?;
        }
        time += width;
    }
    if !logl.is_finite() {
        bail!("Coalescent log-likelihood is not finite, got {}.", logl);
    }
    Ok(logl)
}

/// The flat-prior analytical fast path used when no demographic function is
/// supplied: with λ = ½·Σ width·lineages the population size integrates out
/// and the log-likelihood is −(n − 1)·ln λ for n samples.
pub fn analytical_log_likelihood(intervals: &Intervals) -> Result<f64> {
    if intervals.is_empty() {
        return Ok(0.0);
    }
    let lambda = izip!(intervals.widths(), intervals.lineage_counts())
        .map(|(&width, &count)| width * count as f64)
        .sum::<f64>()
        / 2.0;
    let logl = -((intervals.sample_count() - 1) as f64) * lambda.ln();
    if !logl.is_finite() {
        bail!("Analytical coalescent log-likelihood is not finite, got {}.", logl);
    }
    Ok(logl)
}

/// The coalescent likelihood of a genealogy with the caching discipline an
/// MCMC propose/accept/reject cycle needs.
///
/// Owns the genealogy, the live and stored interval sequences and the cached
/// scalar. Every getter is lazy: it compares the genealogy's generation
/// counter against the last-seen value, rebuilds the intervals at most once
/// per change and re-evaluates the scalar only when marked stale. `store`
/// checkpoints the full state before a proposal; `restore` rolls it back on
/// rejection and `accept` is a no-op.
#[derive(Debug)]
pub struct CoalescentLikelihood<D: DemographicFunction, R: DemographicFunction = D> {
    genealogy: Genealogy,
    demographic: Option<D>,
    recombination: Option<R>,
    excluded: Vec<NodeIdx>,

    intervals: Intervals,
    stored_intervals: Intervals,
    intervals_known: bool,
    stored_intervals_known: bool,

    logl: f64,
    stored_logl: f64,
    likelihood_known: bool,
    stored_likelihood_known: bool,

    seen_generation: u64,
    rebuild_count: usize,
}

impl<D: DemographicFunction, R: DemographicFunction> CoalescentLikelihood<D, R> {
    pub fn genealogy(&self) -> &Genealogy {
        &self.genealogy
    }

    /// Mutable access for proposal moves; any mutation bumps the genealogy's
    /// generation counter and thereby invalidates both caches lazily.
    pub fn genealogy_mut(&mut self) -> &mut Genealogy {
        &mut self.genealogy
    }

    pub fn demographic(&self) -> Option<&D> {
        self.demographic.as_ref()
    }

    /// Swaps the demographic function, e.g. after a rate-parameter proposal.
    /// The intervals stay valid, only the scalar is stale.
    pub fn set_demographic(&mut self, demographic: Option<D>) {
        self.demographic = demographic;
        self.likelihood_known = false;
    }

    pub fn set_recombination(&mut self, recombination: Option<R>) {
        self.recombination = recombination;
        self.likelihood_known = false;
    }

    /// The cached (or lazily recomputed) log-likelihood.
    pub fn log_likelihood(&mut self) -> Result<f64> {
        self.check_generation();
        if !self.likelihood_known {
            if !self.intervals_known {
                self.setup_intervals()?;
            }
            self.logl = match &self.demographic {
                Some(demographic) => {
                    log_likelihood(&self.intervals, demographic, self.recombination.as_ref())?
                }
                None => analytical_log_likelihood(&self.intervals)?,
            };
            self.likelihood_known = true;
        }
        Ok(self.logl)
    }

    /// The current interval sequence, rebuilt first if stale. The single
    /// recomputation entry point, also for external statistic readers.
    pub fn intervals(&mut self) -> Result<&Intervals> {
        self.check_generation();
        if !self.intervals_known {
            self.setup_intervals()?;
        }
        Ok(&self.intervals)
    }

    pub fn interval_count(&mut self) -> Result<usize> {
        Ok(self.intervals()?.interval_count())
    }

    pub fn interval(&mut self, i: usize) -> Result<Interval> {
        self.intervals()?.interval(i)
    }

    pub fn lineage_count(&mut self, i: usize) -> Result<usize> {
        self.intervals()?.lineage_count(i)
    }

    pub fn coalescent_events(&mut self, i: usize) -> Result<i64> {
        self.intervals()?.coalescent_events(i)
    }

    pub fn interval_kind(&mut self, i: usize) -> Result<IntervalKind> {
        self.intervals()?.kind(i)
    }

    /// Total height of the genealogy as represented by the intervals.
    pub fn total_height(&mut self) -> Result<f64> {
        Ok(self.intervals()?.total_duration())
    }

    pub fn is_binary_coalescent(&mut self) -> Result<bool> {
        Ok(self.intervals()?.is_binary_coalescent())
    }

    pub fn is_coalescent_only(&mut self) -> Result<bool> {
        Ok(self.intervals()?.is_coalescent_only())
    }

    /// How many interval rebuilds have run, for verifying that queries
    /// without intervening changes never recompute.
    pub fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    /// Checkpoints intervals, flags, scalar and the genealogy itself. Called
    /// once per MCMC step, before the proposal mutates state.
    pub fn store(&mut self) {
        self.genealogy.store_state();
        self.stored_intervals.clone_from(&self.intervals);
        self.stored_intervals_known = self.intervals_known;
        self.stored_likelihood_known = self.likelihood_known;
        self.stored_logl = self.logl;
    }

    /// Rolls back to the last checkpoint. A restored stale interval state
    /// propagates to the scalar so it can never report stale-but-known.
    pub fn restore(&mut self) {
        self.genealogy.restore_state();
        std::mem::swap(&mut self.intervals, &mut self.stored_intervals);
        self.intervals_known = self.stored_intervals_known;
        self.likelihood_known = self.stored_likelihood_known;
        self.logl = self.stored_logl;
        self.seen_generation = self.genealogy.generation();
        if !self.intervals_known {
            self.likelihood_known = false;
        }
    }

    /// Accepting a proposal needs no work; the side buffer is superseded by
    /// the next `store`.
    pub fn accept(&mut self) {}

    /// Forces full invalidation, e.g. after a parameter-class swap.
    pub fn make_dirty(&mut self) {
        self.intervals_known = false;
        self.likelihood_known = false;
    }

    fn check_generation(&mut self) {
        let generation = self.genealogy.generation();
        if generation != self.seen_generation {
            self.intervals_known = false;
            self.likelihood_known = false;
            self.seen_generation = generation;
        }
    }

    fn setup_intervals(&mut self) -> Result<()> {
        debug!("Rebuilding coalescent intervals.");
        let events = collect_events(&self.genealogy, self.genealogy.root(), &self.excluded);
        self.intervals = Intervals::build(events)?;
        self.intervals_known = true;
        self.rebuild_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod coalescent_tests;
