use anyhow::bail;
use log::info;

use crate::coalescent::CoalescentLikelihood;
use crate::demographic::DemographicFunction;
use crate::intervals::Intervals;
use crate::tree::{Genealogy, GenealogyView, NodeIdx};
use crate::Result;

/// Assembles a [`CoalescentLikelihood`] from a finished genealogy, an
/// optional demographic function (the analytical fast path is used without
/// one), an optional recombination rate function and optionally excluded
/// subtree roots.
pub struct CoalescentLikelihoodBuilder<D: DemographicFunction, R: DemographicFunction = D> {
    genealogy: Genealogy,
    demographic: Option<D>,
    recombination: Option<R>,
    exclude: Vec<NodeIdx>,
}

impl<D: DemographicFunction, R: DemographicFunction> CoalescentLikelihoodBuilder<D, R> {
    pub fn new(genealogy: Genealogy) -> Self {
        Self {
            genealogy,
            demographic: None,
            recombination: None,
            exclude: Vec::new(),
        }
    }

    pub fn demographic(mut self, demographic: D) -> Self {
        self.demographic = Some(demographic);
        self
    }

    pub fn recombination(mut self, recombination: R) -> Self {
        self.recombination = Some(recombination);
        self
    }

    /// Excludes the subtrees rooted at the given nodes from the coalescent
    /// density, e.g. calibrated clades.
    pub fn exclude(mut self, exclude: Vec<NodeIdx>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn build(self) -> Result<CoalescentLikelihood<D, R>> {
        if !self.genealogy.is_complete() {
            bail!("The genealogy must be finished before building a likelihood.");
        }
        for &excluded in &self.exclude {
            if usize::from(excluded) >= self.genealogy.node_count() {
                bail!("Excluded {} is not part of the genealogy.", excluded);
            }
            if excluded == self.genealogy.root() {
                bail!("Cannot exclude the root of the genealogy.");
            }
        }
        if self.demographic.is_none() {
            info!("No demographic function set, using the analytical flat-prior likelihood.");
        }
        let seen_generation = self.genealogy.generation();
        Ok(CoalescentLikelihood {
            genealogy: self.genealogy,
            demographic: self.demographic,
            recombination: self.recombination,
            excluded: self.exclude,
            intervals: Intervals::default(),
            stored_intervals: Intervals::default(),
            intervals_known: false,
            stored_intervals_known: false,
            logl: 0.0,
            stored_logl: 0.0,
            likelihood_known: false,
            stored_likelihood_known: false,
            seen_generation,
            rebuild_count: 0,
        })
    }
}
