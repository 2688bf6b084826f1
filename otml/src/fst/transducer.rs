//! The weighted finite-state transducer data type.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::errors::{OtmlError, Result};
use crate::features::Segment;
use crate::fst::cost::CostVector;

/// A state identifier, locally unique within its owning [`Transducer`].
/// Two states from different transducers sharing a `StateId` are distinct
/// entities.
pub type StateId = usize;

/// A transition: `source --i/o,cost--> target`.
#[derive(Debug, Clone)]
pub struct Arc {
    /// The arc's source state.
    pub source: StateId,
    /// The segment consumed on the input side (may be `NULL` or `JOKER`).
    pub input: Segment,
    /// The segment produced on the output side (may be `NULL` or `JOKER`).
    pub output: Segment,
    /// The arc's cost vector. Must match the owning transducer's width.
    pub cost: CostVector,
    /// The arc's target state.
    pub target: StateId,
}

impl Arc {
    /// Builds a new arc.
    pub fn new(source: StateId, input: Segment, output: Segment, cost: CostVector, target: StateId) -> Self {
        Self {
            source,
            input,
            output,
            cost,
            target,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StateData {
    out_arcs: Vec<Arc>,
    is_final: bool,
}

/// A directed graph of states and arcs with an initial state, a set of
/// final states, a segment alphabet, and a fixed cost-vector width `N`.
///
/// Invariant: every arc's cost vector has length `N`. Invariant: every
/// state reachable in the transducer is either the initial state or has at
/// least one incoming arc — maintained by [`Transducer::clear_dead_states`].
#[derive(Debug, Clone)]
pub struct Transducer {
    alphabet: Vec<Segment>,
    width: usize,
    states: Vec<StateData>,
    initial: Option<StateId>,
}

impl Transducer {
    /// Creates an empty transducer over `alphabet` with cost-vector width
    /// `width`.
    pub fn new(alphabet: Vec<Segment>, width: usize) -> Self {
        Self {
            alphabet,
            width,
            states: Vec::new(),
            initial: None,
        }
    }

    /// The transducer's declared segment alphabet (excludes `NULL`/`JOKER`).
    pub fn alphabet(&self) -> &[Segment] {
        &self.alphabet
    }

    /// The cost-vector width every arc must carry.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The number of states.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// The initial state, if one has been set.
    pub fn initial(&self) -> Option<StateId> {
        self.initial
    }

    /// Whether `state` is a final state.
    pub fn is_final(&self, state: StateId) -> bool {
        self.states.get(state).is_some_and(|s| s.is_final)
    }

    /// The outgoing arcs of `state`.
    pub fn arcs_from(&self, state: StateId) -> &[Arc] {
        self.states.get(state).map_or(&[], |s| s.out_arcs.as_slice())
    }

    /// Iterates every arc in the transducer.
    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.states.iter().flat_map(|s| s.out_arcs.iter())
    }

    /// Adds a fresh state and returns its id.
    pub fn add_state(&mut self) -> StateId {
        let id = self.states.len();
        self.states.push(StateData::default());
        id
    }

    /// Adds `arc`, validating that its cost vector matches this
    /// transducer's width and that both endpoints exist.
    pub fn add_arc(&mut self, arc: Arc) -> Result<()> {
        if arc.cost.len() != self.width {
            return Err(OtmlError::transducer(format!(
                "arc cost width {} does not match transducer width {}",
                arc.cost.len(),
                self.width
            )));
        }
        if arc.source >= self.states.len() || arc.target >= self.states.len() {
            return Err(OtmlError::transducer("arc references a nonexistent state"));
        }
        self.states[arc.source].out_arcs.push(arc);
        Ok(())
    }

    /// Marks `state` as the initial state.
    pub fn set_initial(&mut self, state: StateId) {
        self.initial = Some(state);
    }

    /// Marks `state` as a final state.
    pub fn add_final(&mut self, state: StateId) {
        if let Some(s) = self.states.get_mut(state) {
            s.is_final = true;
        }
    }

    /// Creates a single state that is both initial and the sole final
    /// state, and returns its id. Used by faithfulness-style constraints
    /// whose compiled transducer is a one-state self-loop machine.
    pub fn set_as_single_state(&mut self) -> StateId {
        let state = self.add_state();
        self.set_initial(state);
        self.add_final(state);
        state
    }

    /// Removes every state not reachable from the initial state, and every
    /// state from which no final state is reachable. Arcs incident to
    /// removed states are dropped. The initial state is always preserved,
    /// even if otherwise isolated.
    pub fn clear_dead_states(&mut self) {
        let Some(initial) = self.initial else {
            self.states.clear();
            return;
        };

        let forward = self.reachable_from(initial);
        let backward = self.can_reach_final();

        let mut keep: Vec<bool> = (0..self.states.len())
            .map(|s| s == initial || (forward.contains(&s) && backward.contains(&s)))
            .collect();
        // The initial state stays even if it cannot reach a final state,
        // per the stated invariant; everything else needs both directions.
        keep[initial] = true;

        let mut remap = vec![None; self.states.len()];
        let mut next_id = 0;
        for (old, k) in keep.iter().enumerate() {
            if *k {
                remap[old] = Some(next_id);
                next_id += 1;
            }
        }

        let mut new_states: Vec<StateData> = Vec::with_capacity(next_id);
        for (old, k) in keep.iter().enumerate() {
            if !*k {
                continue;
            }
            let mut data = self.states[old].clone();
            data.out_arcs.retain(|a| keep[a.target]);
            for arc in &mut data.out_arcs {
                arc.source = remap[arc.source].unwrap();
                arc.target = remap[arc.target].unwrap();
            }
            new_states.push(data);
        }

        self.initial = remap[initial];
        self.states = new_states;
    }

    /// Product construction (Riggle 2004 unification, spec.md §4.1).
    ///
    /// For every pair of arcs `a: sA --i_a/o_a,c_a--> tA` in `self` and
    /// `b: sB --i_b/o_b,c_b--> tB` in `other` such that `o_a` unifies with
    /// `i_b`, emits a product arc `(sA,sB) --i_a/o_b,c_a⧺c_b--> (tA,tB)`.
    /// Two asymmetric loop rules are added so that one side's `NULL`-arcs
    /// do not deadlock the product: an arc in `self` that emits `NULL` may
    /// fire alone (the other side's state is unchanged), and an arc in
    /// `other` that consumes `NULL` may fire alone likewise. The result's
    /// cost-vector width is `self.width + other.width` and its alphabet is
    /// the union of both inputs' alphabets.
    pub fn intersect(&self, other: &Transducer) -> Result<Transducer> {
        let (Some(init_a), Some(init_b)) = (self.initial, other.initial) else {
            return Ok(Transducer::new(Vec::new(), self.width + other.width));
        };

        let mut alphabet: BTreeSet<Segment> = self.alphabet.iter().cloned().collect();
        alphabet.extend(other.alphabet.iter().cloned());

        let mut product = Transducer::new(alphabet.into_iter().collect(), self.width + other.width);
        let mut ids: std::collections::HashMap<(StateId, StateId), StateId> = std::collections::HashMap::new();
        let mut queue = std::collections::VecDeque::new();

        let initial_id = product.add_state();
        ids.insert((init_a, init_b), initial_id);
        product.set_initial(initial_id);
        queue.push_back((init_a, init_b));

        while let Some((sa, sb)) = queue.pop_front() {
            let pid = ids[&(sa, sb)];
            if self.is_final(sa) && other.is_final(sb) {
                product.add_final(pid);
            }

            let emit = |product: &mut Transducer,
                             ids: &mut std::collections::HashMap<(StateId, StateId), StateId>,
                             queue: &mut std::collections::VecDeque<(StateId, StateId)>,
                             target: (StateId, StateId),
                             input: Segment,
                             output: Segment,
                             cost: CostVector|
             -> Result<()> {
                let tid = *ids.entry(target).or_insert_with(|| {
                    let id = product.add_state();
                    queue.push_back(target);
                    id
                });
                product.add_arc(Arc::new(pid, input, output, cost, tid))
            };

            for a in self.arcs_from(sa) {
                for b in other.arcs_from(sb) {
                    if a.output.unify(&b.input).is_some() {
                        emit(
                            &mut product,
                            &mut ids,
                            &mut queue,
                            (a.target, b.target),
                            a.input.clone(),
                            b.output.clone(),
                            a.cost.concat(&b.cost),
                        )?;
                    }
                }
            }
            for a in self.arcs_from(sa) {
                if a.output.is_null() {
                    emit(
                        &mut product,
                        &mut ids,
                        &mut queue,
                        (a.target, sb),
                        a.input.clone(),
                        Segment::null(),
                        a.cost.concat(&CostVector::zero(other.width)),
                    )?;
                }
            }
            for b in other.arcs_from(sb) {
                if b.input.is_null() {
                    emit(
                        &mut product,
                        &mut ids,
                        &mut queue,
                        (sa, b.target),
                        Segment::null(),
                        b.output.clone(),
                        CostVector::zero(self.width).concat(&b.cost),
                    )?;
                }
            }
        }

        product.clear_dead_states();
        Ok(product)
    }

    fn reachable_from(&self, start: StateId) -> BTreeSet<StateId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        seen.insert(start);
        while let Some(s) = stack.pop() {
            for arc in &self.states[s].out_arcs {
                if seen.insert(arc.target) {
                    stack.push(arc.target);
                }
            }
        }
        seen
    }

    fn can_reach_final(&self) -> BTreeSet<StateId> {
        let mut reverse: Vec<Vec<StateId>> = vec![Vec::new(); self.states.len()];
        for (s, data) in self.states.iter().enumerate() {
            for arc in &data.out_arcs {
                reverse[arc.target].push(s);
            }
        }
        let mut seen = BTreeSet::new();
        let mut stack = Vec::new();
        for (s, data) in self.states.iter().enumerate() {
            if data.is_final && seen.insert(s) {
                stack.push(s);
            }
        }
        while let Some(s) = stack.pop() {
            for &pred in &reverse[s] {
                if seen.insert(pred) {
                    stack.push(pred);
                }
            }
        }
        seen
    }

    /// Enumerates the non-`NULL` output strings accepted on some path from
    /// the initial state to a final state. Finite when the transducer is
    /// acyclic after [`Transducer::clear_dead_states`]; for cyclic
    /// transducers the walk is bounded by `num_states() + 1` output
    /// segments per path to guarantee termination, per spec.md §4.1.
    pub fn range(&self) -> BTreeSet<String> {
        let Some(initial) = self.initial else {
            return BTreeSet::new();
        };
        let bound = self.states.len() + 1;
        let mut outputs = BTreeSet::new();
        let mut stack = vec![(initial, String::new(), 0usize)];
        while let Some((state, acc, depth)) = stack.pop() {
            if depth > bound {
                continue;
            }
            if self.is_final(state) {
                outputs.insert(acc.clone());
            }
            for arc in &self.states[state].out_arcs {
                let mut next = acc.clone();
                if !arc.output.is_null() && !arc.output.is_joker() {
                    next.push_str(arc.output.symbol());
                }
                stack.push((arc.target, next, depth + 1));
            }
        }
        outputs
    }

    /// A deterministic string key over the transducer's structure: states
    /// in a stable (canonical, BFS-from-initial) order, arcs sorted by
    /// `(source, input, output, target, cost)`. Used as a memoization key.
    pub fn canonical_string(&self) -> String {
        let Some(initial) = self.initial else {
            return "empty".to_string();
        };

        // Canonical state order: BFS from the initial state visiting arcs
        // in a stable (input, output, target) order, so two structurally
        // identical transducers built through different construction paths
        // produce the same key.
        let mut order = vec![None; self.states.len()];
        let mut next = 0usize;
        order[initial] = Some(0);
        next += 1;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(initial);
        while let Some(s) = queue.pop_front() {
            let mut arcs: Vec<&Arc> = self.states[s].out_arcs.iter().collect();
            arcs.sort_by(|a, b| {
                (a.input.symbol(), a.output.symbol(), a.target).cmp(&(
                    b.input.symbol(),
                    b.output.symbol(),
                    b.target,
                ))
            });
            for arc in arcs {
                if order[arc.target].is_none() {
                    order[arc.target] = Some(next);
                    next += 1;
                    queue.push_back(arc.target);
                }
            }
        }

        let mut out = String::new();
        let _ = writeln!(out, "N={}", self.width);
        let mut finals: Vec<usize> = (0..self.states.len())
            .filter(|&s| self.is_final(s))
            .filter_map(|s| order[s])
            .collect();
        finals.sort_unstable();
        let _ = writeln!(out, "final={finals:?}");

        let mut arc_lines: Vec<String> = Vec::new();
        for (s, data) in self.states.iter().enumerate() {
            let Some(src) = order[s] else { continue };
            for arc in &data.out_arcs {
                let Some(tgt) = order[arc.target] else { continue };
                arc_lines.push(format!(
                    "{src},{},{},{tgt},{}",
                    arc.input.symbol(),
                    arc.output.symbol(),
                    arc.cost
                ));
            }
        }
        arc_lines.sort();
        for line in arc_lines {
            let _ = writeln!(out, "{line}");
        }
        out
    }

    /// Renders the transducer as a Graphviz DOT graph, for debugging dumps.
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph {name} {{");
        let _ = writeln!(out, "  rankdir=LR;");
        for (s, data) in self.states.iter().enumerate() {
            let shape = if data.is_final { "doublecircle" } else { "circle" };
            let _ = writeln!(out, "  q{s} [shape={shape}];");
        }
        if let Some(initial) = self.initial {
            let _ = writeln!(out, "  __start__ [shape=point];");
            let _ = writeln!(out, "  __start__ -> q{initial};");
        }
        for (s, data) in self.states.iter().enumerate() {
            for arc in &data.out_arcs {
                let _ = writeln!(
                    out,
                    "  q{s} -> q{} [label=\"{}:{}/{}\"];",
                    arc.target,
                    arc.input,
                    arc.output,
                    arc.cost
                );
            }
        }
        let _ = writeln!(out, "}}");
        out
    }

    /// Removes arcs from `state`'s outgoing list for which `keep` returns
    /// `false`.
    pub(crate) fn retain_arcs(&mut self, state: StateId, mut keep: impl FnMut(&Arc) -> bool) {
        if let Some(data) = self.states.get_mut(state) {
            data.out_arcs.retain(|a| keep(a));
        }
    }

    /// Overwrites every arc's cost vector in place (used to collapse
    /// surviving arcs to width 0 once optimality has been absorbed into
    /// structure).
    pub(crate) fn set_all_costs(&mut self, cost: CostVector) {
        for data in &mut self.states {
            for arc in &mut data.out_arcs {
                arc.cost = cost.clone();
            }
        }
        self.width = cost.len();
    }

    pub(crate) fn states_iter(&self) -> impl Iterator<Item = StateId> {
        0..self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Segment;

    fn seg(s: &str) -> Segment {
        Segment::concrete(s)
    }

    #[test]
    fn clear_dead_states_keeps_initial_even_if_isolated() {
        let mut t = Transducer::new(vec![], 1);
        let s0 = t.add_state();
        t.set_initial(s0);
        t.clear_dead_states();
        assert_eq!(t.num_states(), 1);
        assert_eq!(t.initial(), Some(0));
    }

    #[test]
    fn clear_dead_states_drops_unreachable_and_dead_ends() {
        let mut t = Transducer::new(vec![], 1);
        let s0 = t.add_state();
        let s1 = t.add_state();
        let dead_end = t.add_state();
        let unreachable = t.add_state();
        t.set_initial(s0);
        t.add_final(s1);
        t.add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(0), s1))
            .unwrap();
        t.add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(0), dead_end))
            .unwrap();
        let _ = unreachable;
        t.clear_dead_states();
        assert_eq!(t.num_states(), 2);
    }

    #[test]
    fn clear_dead_states_is_idempotent() {
        let mut t = Transducer::new(vec![], 1);
        let s0 = t.add_state();
        let s1 = t.add_state();
        t.set_initial(s0);
        t.add_final(s1);
        t.add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(0), s1))
            .unwrap();
        t.clear_dead_states();
        let once = t.canonical_string();
        t.clear_dead_states();
        assert_eq!(once, t.canonical_string());
    }

    #[test]
    fn canonical_string_is_deterministic_across_equivalent_builds() {
        let build = || {
            let mut t = Transducer::new(vec![], 1);
            let s0 = t.add_state();
            let s1 = t.add_state();
            t.set_initial(s0);
            t.add_final(s1);
            t.add_arc(Arc::new(s0, seg("a"), seg("b"), CostVector::single(1), s1))
                .unwrap();
            t
        };
        assert_eq!(build().canonical_string(), build().canonical_string());
    }

    fn input_transducer_for(word: &str) -> Transducer {
        let mut t = Transducer::new(vec![], 0);
        let mut prev = t.add_state();
        t.set_initial(prev);
        for ch in word.chars() {
            let next = t.add_state();
            t.add_arc(Arc::new(prev, seg(&ch.to_string()), Segment::joker(), CostVector::empty(), next))
                .unwrap();
            prev = next;
        }
        t.add_final(prev);
        t
    }

    #[test]
    fn intersect_passes_matching_segment_through() {
        let word = input_transducer_for("a");
        // A one-state Faith-like machine with one real self-loop per
        // alphabet segment, as constraint compilation actually produces.
        let mut faith = Transducer::new(vec![seg("a")], 1);
        let s0 = faith.set_as_single_state();
        faith
            .add_arc(Arc::new(s0, seg("a"), seg("a"), CostVector::single(0), s0))
            .unwrap();

        let product = word.intersect(&faith).unwrap();
        assert_eq!(product.range(), std::collections::BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn intersect_null_output_advances_a_alone() {
        // A deletes its single segment (emits NULL). B has no arc at all
        // from its lone state, so only the asymmetric "A alone" rule lets
        // the product proceed without deadlocking.
        let mut a = Transducer::new(vec![], 1);
        let s0 = a.add_state();
        let s1 = a.add_state();
        a.set_initial(s0);
        a.add_final(s1);
        a.add_arc(Arc::new(s0, seg("x"), Segment::null(), CostVector::single(1), s1))
            .unwrap();

        let mut b = Transducer::new(vec![], 1);
        b.set_as_single_state();

        let product = a.intersect(&b).unwrap();
        assert_eq!(product.range(), std::collections::BTreeSet::from(["".to_string()]));
    }
}
