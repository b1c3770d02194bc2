use anyhow::bail;
use log::info;
use rand::Rng;

use crate::coalescent::choose2;
use crate::demographic::DemographicFunction;
use crate::tree::{Genealogy, NodeIdx};
use crate::Result;

/// Simulates a binary coalescent genealogy for the given tips, all sampled
/// at time zero, under a demographic function.
///
/// With k extant lineages the waiting time to the next coalescence is
/// exponential with rate C(k,2)/N(t); on the intensity scale it is a plain
/// Exp(1) draw, mapped back through the inverse intensity. The coalescing
/// pair is chosen uniformly.
pub fn simulate_genealogy<D: DemographicFunction>(
    tip_ids: &[&str],
    demographic: &D,
    rng: &mut impl Rng,
) -> Result<Genealogy> {
    if tip_ids.len() < 2 {
        bail!("Need at least two tips to simulate a genealogy.");
    }
    let mut genealogy = Genealogy::new(tip_ids);
    let mut active: Vec<NodeIdx> = (0..tip_ids.len()).map(NodeIdx::Leaf).collect();
    let mut time = 0.0;
    while active.len() > 1 {
        let k = active.len();
        let unit_exponential = -(1.0 - rng.gen::<f64>()).ln();
        time = demographic
            .inverse_intensity(demographic.intensity(time) + unit_exponential / choose2(k));
        let first = active.swap_remove(rng.gen_range(0..active.len()));
        let second = active.swap_remove(rng.gen_range(0..active.len()));
        active.push(genealogy.add_internal(time, vec![first, second])?);
    }
    genealogy.finish()?;
    info!(
        "Simulated a coalescent genealogy with {} tips and root height {}.",
        tip_ids.len(),
        genealogy.root_height()
    );
    Ok(genealogy)
}
