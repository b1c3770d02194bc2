use approx::assert_relative_eq;
use rstest::rstest;

use crate::coalescent::{choose2, CoalescentLikelihood, CoalescentLikelihoodBuilder};
use crate::demographic::{ConstantPopulation, ExponentialGrowth};
use crate::genealogy;
use crate::intervals::IntervalKind;
use crate::tree::{
    Genealogy, GenealogyView,
    NodeIdx::{Internal as I, Leaf as L},
};

type ConstantLikelihood = CoalescentLikelihood<ConstantPopulation>;

fn setup_constant(newick: &str, n0: f64) -> ConstantLikelihood {
    CoalescentLikelihoodBuilder::new(genealogy!(newick))
        .demographic(ConstantPopulation::new(n0).unwrap())
        .build()
        .unwrap()
}

fn setup_reassortment_genealogy() -> Genealogy {
    let mut genealogy = Genealogy::new(&["A", "B"]);
    let reassortment = genealogy.add_reassortment(L(0), 0.5).unwrap();
    let join = genealogy.add_internal(1.0, vec![reassortment, L(1)]).unwrap();
    genealogy.add_internal(1.5, vec![join, reassortment]).unwrap();
    genealogy.finish().unwrap();
    genealogy
}

#[rstest]
#[case(0, 0.0)]
#[case(1, 0.0)]
#[case(2, 1.0)]
#[case(3, 3.0)]
#[case(5, 10.0)]
fn choose2_values(#[case] k: usize, #[case] expected: f64) {
    assert_relative_eq!(choose2(k), expected);
}

#[test]
fn caterpillar_constant_population() {
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 1.0);
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), -4.0);
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 2.0);
    assert_relative_eq!(
        likelihood.log_likelihood().unwrap(),
        -2.0 - 2.0 * 2.0f64.ln()
    );
}

#[test]
fn analytical_flat_prior_path() {
    let mut likelihood = CoalescentLikelihoodBuilder::<ConstantPopulation>::new(genealogy!(
        "((A:1,B:1):1,C:2);"
    ))
    .build()
    .unwrap();
    // lambda = (1 * 3 + 1 * 2) / 2 = 2.5
    assert_relative_eq!(
        likelihood.log_likelihood().unwrap(),
        -2.0 * 2.5f64.ln()
    );
}

#[test]
fn reassortment_with_rate_function() {
    let mut likelihood =
        CoalescentLikelihoodBuilder::new(setup_reassortment_genealogy())
            .demographic(ConstantPopulation::new(1.0).unwrap())
            .recombination(ConstantPopulation::new(2.0).unwrap())
            .build()
            .unwrap();
    assert_relative_eq!(
        likelihood.log_likelihood().unwrap(),
        -3.375 - 2.0f64.ln()
    );
    assert_eq!(likelihood.interval_kind(0).unwrap(), IntervalKind::Recombination);
}

#[test]
fn reassortment_without_rate_function_fails() {
    let mut likelihood: ConstantLikelihood =
        CoalescentLikelihoodBuilder::new(setup_reassortment_genealogy())
            .demographic(ConstantPopulation::new(1.0).unwrap())
            .build()
            .unwrap();
    assert!(likelihood.log_likelihood().is_err());
}

#[test]
fn polytomy_inserts_zero_width_coalescences() {
    let mut likelihood = setup_constant("(A:1,B:1,C:1);", 2.0);
    assert_relative_eq!(
        likelihood.log_likelihood().unwrap(),
        -1.5 - 2.0 * 2.0f64.ln()
    );
}

#[test]
fn queries_without_changes_rebuild_once() {
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 1.0);
    assert_eq!(likelihood.rebuild_count(), 0);
    let logl = likelihood.log_likelihood().unwrap();
    assert_eq!(likelihood.rebuild_count(), 1);
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), logl);
    assert_eq!(likelihood.interval_count().unwrap(), 2);
    assert_relative_eq!(likelihood.total_height().unwrap(), 2.0);
    assert_eq!(likelihood.lineage_count(0).unwrap(), 3);
    assert_eq!(likelihood.coalescent_events(1).unwrap(), 1);
    assert!(likelihood.is_binary_coalescent().unwrap());
    assert!(likelihood.is_coalescent_only().unwrap());
    assert_eq!(likelihood.rebuild_count(), 1);
}

#[test]
fn height_change_shifts_widths_not_counts() {
    let mut likelihood = setup_constant("((A:1,B:1):2,C:3);", 1.0);
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), -5.0);
    assert_eq!(likelihood.intervals().unwrap().lineage_counts(), &[3, 2]);
    likelihood.genealogy_mut().set_node_height(I(1), 1.5).unwrap();
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), -6.0);
    assert_eq!(likelihood.intervals().unwrap().widths(), &[1.5, 1.5]);
    assert_eq!(likelihood.intervals().unwrap().lineage_counts(), &[3, 2]);
}

#[test]
fn store_restore_round_trip() {
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 1.0);
    let logl = likelihood.log_likelihood().unwrap();
    likelihood.store();
    likelihood.genealogy_mut().set_node_height(I(1), 1.75).unwrap();
    assert_ne!(likelihood.log_likelihood().unwrap(), logl);
    assert_eq!(likelihood.rebuild_count(), 2);
    likelihood.restore();
    // the restored state is served from the checkpoint, no rebuild
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), logl);
    assert_eq!(likelihood.rebuild_count(), 2);
    assert_relative_eq!(likelihood.genealogy().root_height(), 2.0);
}

#[test]
fn accepted_proposal_keeps_new_state() {
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 1.0);
    likelihood.log_likelihood().unwrap();
    likelihood.store();
    likelihood.genealogy_mut().set_node_height(I(1), 0.5).unwrap();
    let proposed = likelihood.log_likelihood().unwrap();
    likelihood.accept();
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), proposed);
}

#[test]
fn make_dirty_forces_recomputation_of_same_value() {
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 1.0);
    let logl = likelihood.log_likelihood().unwrap();
    likelihood.make_dirty();
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), logl);
    assert_eq!(likelihood.rebuild_count(), 2);
}

#[test]
fn demographic_swap_keeps_intervals() {
    let mut likelihood = setup_constant("((A:1,B:1):1,C:2);", 1.0);
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), -4.0);
    likelihood.set_demographic(Some(ConstantPopulation::new(2.0).unwrap()));
    assert_relative_eq!(
        likelihood.log_likelihood().unwrap(),
        -2.0 - 2.0 * 2.0f64.ln()
    );
    assert_eq!(likelihood.rebuild_count(), 1);
}

#[test]
fn single_tip_likelihood_is_zero() {
    let mut likelihood = setup_constant("A:1.0;", 1.0);
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), 0.0);
    assert_eq!(likelihood.interval_count().unwrap(), 0);
}

#[test]
fn non_finite_likelihood_fails() {
    let mut likelihood =
        CoalescentLikelihoodBuilder::<ExponentialGrowth>::new(genealogy!("((A:1,B:1):1,C:2);"))
            .demographic(ExponentialGrowth::new(1.0, 2000.0).unwrap())
            .build()
            .unwrap();
    assert!(likelihood.log_likelihood().is_err());
}

#[test]
fn excluded_subtree_reduces_intervals() {
    let tree = genealogy!("((A:1,B:1)E:1,C:2)F;");
    let excluded = tree.get_idx_by_id("E").unwrap();
    let mut likelihood = CoalescentLikelihoodBuilder::<ConstantPopulation>::new(tree)
        .exclude(vec![excluded])
        .build()
        .unwrap();
    assert_eq!(likelihood.interval_count().unwrap(), 1);
    assert_eq!(likelihood.lineage_count(0).unwrap(), 1);
}

#[test]
fn excluded_merge_adds_no_fired_term() {
    let tree = genealogy!("((A:1,B:1)E:1,C:2)F;");
    let excluded = tree.get_idx_by_id("E").unwrap();
    let mut likelihood = CoalescentLikelihoodBuilder::<ConstantPopulation>::new(tree)
        .demographic(ConstantPopulation::new(2.0).unwrap())
        .exclude(vec![excluded])
        .build()
        .unwrap();
    // the surviving lineage merges with the excluded clade, which the
    // density conditions on rather than prices
    assert_eq!(likelihood.interval_kind(0).unwrap(), IntervalKind::Nothing);
    assert_eq!(likelihood.coalescent_events(0).unwrap(), 0);
    assert_relative_eq!(likelihood.log_likelihood().unwrap(), 0.0);
}

#[test]
fn disconnecting_exclusions_fail() {
    let tree = genealogy!("((A:1,B:1)E:1,(C:1,D:1)G:1)F;");
    let excluded = vec![
        tree.get_idx_by_id("E").unwrap(),
        tree.get_idx_by_id("G").unwrap(),
    ];
    let mut likelihood = CoalescentLikelihoodBuilder::<ConstantPopulation>::new(tree)
        .exclude(excluded)
        .build()
        .unwrap();
    assert!(likelihood.log_likelihood().is_err());
}

#[test]
fn builder_rejects_bad_input() {
    let mut unfinished = Genealogy::new(&["A", "B"]);
    unfinished.add_internal(1.0, vec![L(0), L(1)]).unwrap();
    assert!(CoalescentLikelihoodBuilder::<ConstantPopulation>::new(unfinished)
        .build()
        .is_err());

    let tree = genealogy!("(A:1,B:1);");
    assert!(CoalescentLikelihoodBuilder::<ConstantPopulation>::new(tree.clone())
        .exclude(vec![I(99)])
        .build()
        .is_err());
    assert!(CoalescentLikelihoodBuilder::<ConstantPopulation>::new(tree.clone())
        .exclude(vec![tree.root()])
        .build()
        .is_err());
}
