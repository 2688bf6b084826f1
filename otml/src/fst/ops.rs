//! Optimal-paths reduction.
//!
//! Collapses a transducer's cost vectors into its structure: after
//! reduction every surviving arc lies on a lexicographically shortest path
//! from the initial state to the state it targets, and cost vectors are
//! gone (width 0). This is the mechanism by which OT's strict domination
//! ranking is realized over a weighted automaton — ties in the
//! lexicographically-least cost are all kept, which is what allows a
//! single underlying word to map to more than one optimal surface form.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::errors::Result;
use crate::fst::cost::CostVector;
use crate::fst::transducer::Transducer;

/// Reduces `transducer` to its lexicographically optimal paths.
///
/// Runs a Dijkstra-style relaxation from the initial state (valid because
/// every cost component is a non-negative integer and [`CostVector`]'s
/// lexicographic order is translation-invariant, see `fst::cost`'s unit
/// tests), then prunes every arc not lying on a shortest path to its
/// target, then drops the now-redundant cost vectors, then clears states
/// left dead by the pruning.
///
/// This reduction prunes per *state*, not per *input string* — it is only
/// exact for input-string optimality when every state already corresponds
/// to a unique amount of input consumed. A bare constraint-set composite's
/// states do not have that property (a `Phonotactic` constraint's states
/// track substring-match progress, not input position, and the
/// single-state constraints share one state across all inputs), so
/// reducing it directly is a structural approximation over states, used
/// only for `Grammar::get_transducer`'s memoized, human-inspectable
/// transducer. `Grammar::generate` relies on the exact case: it intersects
/// the word's input transducer in *before* calling this function (see
/// `EngineContext::generate`), so each product state does correspond to a
/// unique input prefix and the per-state relaxation coincides with the
/// per-input-string one.
pub fn optimal_paths(transducer: &Transducer) -> Result<Transducer> {
    let Some(initial) = transducer.initial() else {
        return Ok(transducer.clone());
    };

    let n = transducer.num_states();
    let mut dist: Vec<Option<CostVector>> = vec![None; n];
    dist[initial] = Some(CostVector::zero(transducer.width()));

    let mut heap = BinaryHeap::new();
    heap.push(Reverse(HeapEntry {
        cost: dist[initial].clone().unwrap(),
        state: initial,
    }));

    while let Some(Reverse(HeapEntry { cost, state })) = heap.pop() {
        match &dist[state] {
            Some(best) if *best < cost => continue,
            _ => {}
        }
        for arc in transducer.arcs_from(state) {
            let candidate = cost.add(&arc.cost)?;
            let better = match &dist[arc.target] {
                None => true,
                Some(existing) => candidate < *existing,
            };
            if better {
                dist[arc.target] = Some(candidate.clone());
                heap.push(Reverse(HeapEntry {
                    cost: candidate,
                    state: arc.target,
                }));
            }
        }
    }

    let mut reduced = transducer.clone();
    for state in transducer.states_iter() {
        let Some(source_dist) = dist[state].clone() else {
            // Unreachable source: every outgoing arc is dead and will be
            // swept away by `clear_dead_states` below.
            reduced.retain_arcs(state, |_| false);
            continue;
        };
        reduced.retain_arcs(state, |arc| {
            dist[arc.target]
                .as_ref()
                .is_some_and(|target_dist| {
                    source_dist
                        .add(&arc.cost)
                        .map(|reached| reached == *target_dist)
                        .unwrap_or(false)
                })
        });
    }

    reduced.set_all_costs(CostVector::empty());
    reduced.clear_dead_states();
    Ok(reduced)
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct HeapEntry {
    cost: CostVector,
    state: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cost.cmp(&other.cost).then_with(|| self.state.cmp(&other.state))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Segment;
    use crate::fst::transducer::Arc;

    fn seg(s: &str) -> Segment {
        Segment::concrete(s)
    }

    #[test]
    fn prunes_the_costlier_of_two_parallel_paths() {
        let mut t = Transducer::new(vec![], 1);
        let s0 = t.add_state();
        let s1 = t.add_state();
        let s2 = t.add_state();
        t.set_initial(s0);
        t.add_final(s2);
        t.add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(0), s1)).unwrap();
        t.add_arc(Arc::new(s1, seg("b"), seg("b"), CostVector::single(0), s2)).unwrap();
        t.add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(1), s2)).unwrap();

        let reduced = optimal_paths(&t).unwrap();
        assert_eq!(reduced.range(), std::collections::BTreeSet::from(["ab".to_string()]));
    }

    #[test]
    fn keeps_ties_for_equally_optimal_outputs() {
        let mut t = Transducer::new(vec![], 1);
        let s0 = t.add_state();
        let s1 = t.add_state();
        let s2 = t.add_state();
        t.set_initial(s0);
        t.add_final(s1);
        t.add_final(s2);
        t.add_arc(Arc::new(s0, seg("a"), seg("x"), CostVector::single(0), s1)).unwrap();
        t.add_arc(Arc::new(s0, seg("a"), seg("y"), CostVector::single(0), s2)).unwrap();

        let reduced = optimal_paths(&t).unwrap();
        assert_eq!(
            reduced.range(),
            std::collections::BTreeSet::from(["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn collapses_costs_to_width_zero() {
        let mut t = Transducer::new(vec![], 1);
        let s0 = t.set_as_single_state();
        t.add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(0), s0)).unwrap();
        let reduced = optimal_paths(&t).unwrap();
        assert_eq!(reduced.width(), 0);
    }
}
