use anyhow::bail;
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use log::warn;

use crate::tree::{GenealogyView, NodeIdx};
use crate::{f64_h, Result};

/// Events closer in time than this are treated as simultaneous and handled
/// as one multifurcation group.
pub const MULTIFURCATION_LIMIT: f64 = 1e-9;

/// What terminates an interval, fixed and exhaustively handled by the
/// likelihood evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    /// The lineage count is smaller in the next interval: two or more
    /// lineages found a common ancestor.
    Coalescent,
    /// The lineage count is larger in the next interval because of a
    /// reassortment vertex splitting a lineage backwards in time.
    Recombination,
    /// The lineage count is larger in the next interval because a serially
    /// sampled tip joins above time zero.
    SampleAddition,
    /// The lineage count is unchanged in the next interval.
    Nothing,
}

/// A raw genealogy event: the node height and the number of tree edges
/// incident below the node. Ephemeral, produced and consumed within one
/// interval rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub height: f64,
    pub arity: usize,
    /// Traversal index, the deterministic tie-break for equal heights.
    pub order: usize,
}

/// Walks the genealogy from `top` and emits one event per reachable node.
///
/// A visited bitset guarantees a single event per node even when a node is
/// reachable through two parents (reassortment). Subtrees rooted at nodes in
/// `exclude` are skipped entirely, excluded roots included.
pub fn collect_events<G: GenealogyView>(view: &G, top: NodeIdx, exclude: &[NodeIdx]) -> Vec<Event> {
    let mut events = Vec::with_capacity(view.node_count());
    let mut visited = FixedBitSet::with_capacity(view.node_count());
    let mut stack = Vec::with_capacity(view.node_count());
    stack.push(top);
    while let Some(node) = stack.pop() {
        let slot = usize::from(node);
        if visited.contains(slot) {
            continue;
        }
        visited.insert(slot);
        events.push(Event {
            height: view.height(node),
            arity: view.child_count(node),
            order: events.len(),
        });
        for &child in view.children(node) {
            if !exclude.contains(&child) {
                stack.push(child);
            }
        }
    }
    events
}

/// A single extracted interval, read-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub width: f64,
    pub lineage_count: usize,
    pub kind: IntervalKind,
}

/// The ordered sequence of disjoint time intervals extracted from a
/// genealogy, stored as parallel arrays: per-interval width, extant lineage
/// count and the recorded terminating event. The classification served by
/// [`Self::kind`] is derived from the lineage-count change on read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Intervals {
    widths: Vec<f64>,
    lineage_counts: Vec<usize>,
    kinds: Vec<IntervalKind>,
    sample_count: usize,
}

impl Intervals {
    /// Builds the interval sequence from raw events.
    ///
    /// Events are sorted by height with the traversal order as the
    /// deterministic tie-break, then scanned in groups of simultaneous
    /// events. Within a group, sampled tips and reassortment vertices add
    /// lineages and a node of arity k ≥ 2 removes k − 1 (a polytomy counts
    /// as k − 1 simultaneous binary coalescences). Simultaneous events above
    /// time zero are a modeling degeneracy, reported with a single warning.
    ///
    /// Fails when a group merges away more lineages than are extant, which
    /// happens when an exclusion set cuts the genealogy apart.
    pub fn build(mut events: Vec<Event>) -> Result<Self> {
        events.sort_by_key(|event| (f64_h::from(event.height), event.order));

        let degenerate = events
            .iter()
            .tuple_windows()
            .filter(|(previous, next)| {
                next.height - previous.height < MULTIFURCATION_LIMIT
                    && previous.height > MULTIFURCATION_LIMIT
            })
            .count();
        if degenerate > 0 {
            warn!(
                "Found {} simultaneous event pairs above time zero; \
                 resolving ties by traversal order.",
                degenerate
            );
        }

        let mut intervals = Intervals {
            sample_count: events.iter().filter(|event| event.arity == 0).count(),
            ..Default::default()
        };
        if events.is_empty() {
            return Ok(intervals);
        }

        let mut start = events[0].height;
        let mut num_lines = 0usize;
        let mut i = 0;
        while i < events.len() {
            let finish = events[i].height;
            let mut added = 0usize;
            let mut removed = 0usize;
            let mut sampled = false;
            while i < events.len() && (events[i].height - finish).abs() < MULTIFURCATION_LIMIT {
                match events[i].arity {
                    0 => {
                        added += 1;
                        sampled = true;
                    }
                    1 => added += 1,
                    arity => removed += arity - 1,
                }
                i += 1;
            }
            if added > 0 {
                // the group of tips at time zero opens the first interval
                // instead of terminating one
                if !intervals.is_empty() || finish - start > MULTIFURCATION_LIMIT {
                    let kind = if sampled {
                        IntervalKind::SampleAddition
                    } else {
                        IntervalKind::Recombination
                    };
                    intervals.push(finish - start, num_lines, kind);
                    start = finish;
                }
                num_lines += added;
            }
            if removed > 0 {
                if removed > num_lines {
                    bail!(
                        "Event group at height {} merges away {} lineages but only {} are \
                         extant; the excluded subtrees disconnect the genealogy.",
                        finish,
                        removed,
                        num_lines
                    );
                }
                intervals.push(finish - start, num_lines, IntervalKind::Coalescent);
                start = finish;
                num_lines -= removed;
            }
        }
        Ok(intervals)
    }

    fn push(&mut self, width: f64, lineage_count: usize, kind: IntervalKind) {
        self.widths.push(width);
        self.lineage_counts.push(lineage_count);
        self.kinds.push(kind);
    }

    pub fn interval_count(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// The number of sampled tips the events were collected from.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn interval(&self, i: usize) -> Result<Interval> {
        self.check_index(i)?;
        Ok(Interval {
            width: self.widths[i],
            lineage_count: self.lineage_counts[i],
            kind: self.kind(i)?,
        })
    }

    pub fn width(&self, i: usize) -> Result<f64> {
        self.check_index(i)?;
        Ok(self.widths[i])
    }

    /// The number of lineages extant within interval `i`.
    pub fn lineage_count(&self, i: usize) -> Result<usize> {
        self.check_index(i)?;
        Ok(self.lineage_counts[i])
    }

    /// The classification of interval `i`, derived from the lineage-count
    /// change: a drop is a coalescence and no change conditions away, e.g. a
    /// node whose merge partner is an excluded subtree. An increase keeps
    /// the recorded distinction between sampled tips and reassortment.
    pub fn kind(&self, i: usize) -> Result<IntervalKind> {
        match self.coalescent_events(i)? {
            n if n > 0 => Ok(IntervalKind::Coalescent),
            0 => Ok(IntervalKind::Nothing),
            _ => Ok(match self.kinds[i] {
                IntervalKind::SampleAddition => IntervalKind::SampleAddition,
                _ => IntervalKind::Recombination,
            }),
        }
    }

    /// The number of coalescences terminating interval `i`: the drop in
    /// lineage count towards the next interval, negative when lineages are
    /// added instead.
    pub fn coalescent_events(&self, i: usize) -> Result<i64> {
        self.check_index(i)?;
        if i < self.interval_count() - 1 {
            Ok(self.lineage_counts[i] as i64 - self.lineage_counts[i + 1] as i64)
        } else {
            Ok(self.lineage_counts[i] as i64 - 1)
        }
    }

    pub fn total_duration(&self) -> f64 {
        self.widths.iter().sum()
    }

    /// Whether every interval is terminated by exactly one coalescence.
    pub fn is_binary_coalescent(&self) -> bool {
        (0..self.interval_count()).all(|i| matches!(self.coalescent_events(i), Ok(1)))
    }

    /// Whether every interval is terminated by at least one coalescence.
    pub fn is_coalescent_only(&self) -> bool {
        (0..self.interval_count()).all(|i| matches!(self.coalescent_events(i), Ok(n) if n >= 1))
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    pub fn lineage_counts(&self) -> &[usize] {
        &self.lineage_counts
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.interval_count() {
            bail!(
                "Interval index {} out of range, only {} intervals.",
                i,
                self.interval_count()
            );
        }
        Ok(())
    }
}
