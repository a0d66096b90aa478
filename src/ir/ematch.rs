//! The e-matching rewrite engine: hash-consed pattern clauses matched
//! against an [`EGraph`], driving equality saturation to a fixed point.
//!
//! The split between [`SubClause`] (a single hash-consed pattern node) and
//! [`Clause`] (a pattern root plus the rewrite it triggers) follows the
//! reference implementation's `EGraphMatching.cpp`: patterns that share a
//! sub-shape share a `SubClause`, so the matcher only ever tests a given
//! opcode/arity combination once per e-class even when many rewrite rules
//! start with it.

use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, trace};
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::BuildHasherDefault;

use super::egraph::{EClassId, EGraph};
use super::opcode::Opcode;
use crate::ty::Type;

type FxMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Index of a pattern variable within a [`Clause`]'s bindings. Two
/// [`SubClause::Wildcard`] nodes with the same `VarId` must bind the same
/// e-class for a match to succeed.
pub type VarId = usize;

/// Identifier for a hash-consed [`SubClause`].
type SubClauseId = u32;

/// One node of a pattern tree: either a wildcard that binds (or re-checks)
/// a variable, or a fixed opcode whose children must themselves match the
/// referenced sub-patterns.
#[derive(Clone, PartialEq, Eq, Hash)]
enum SubClauseShape {
    Wildcard(VarId),
    Opcode(Opcode, SmallVec<[SubClauseId; 3]>),
}

/// A single hash-consed pattern node, as built by [`EMatcherBuilder`].
#[derive(Clone)]
struct SubClause {
    shape: SubClauseShape,
}

impl SubClause {
    /// Whether the node itself (ignoring children, which are checked via
    /// their own sub-clauses) could possibly match `enode`.
    fn is_potential_match(&self, opcode: Opcode, arity: usize) -> bool {
        match &self.shape {
            SubClauseShape::Wildcard(_) => true,
            SubClauseShape::Opcode(op, children) => *op == opcode && children.len() == arity,
        }
    }
}

/// Bindings accumulated while matching a single [`Clause`] against one
/// candidate e-node, plus the helpers `EGraphMatching.cpp` calls
/// `contains_match`/`matches`: checking whether a variable is already
/// bound, and whether a proposed binding is consistent with it.
#[derive(Debug, Default, Clone)]
pub struct MatchData {
    bindings: Vec<Option<EClassId>>,
}

impl MatchData {
    fn with_capacity(vars: usize) -> Self {
        MatchData {
            bindings: vec![None; vars],
        }
    }

    fn contains_match(&self, var: VarId) -> bool {
        self.bindings.get(var).copied().flatten().is_some()
    }

    /// Record or verify a binding. Returns `false` if `var` was already
    /// bound to a different class.
    fn matches(&mut self, var: VarId, class: EClassId) -> bool {
        match self.bindings[var] {
            Some(existing) => existing == class,
            None => {
                self.bindings[var] = Some(class);
                true
            }
        }
    }

    /// The e-class bound to `var`. Panics if the clause never binds it —
    /// a bug in the rewrite rule, not a runtime condition.
    pub fn class_of(&self, var: VarId) -> EClassId {
        self.bindings[var].expect("unbound pattern variable read by updater")
    }
}

/// A boxed rewrite action: given the e-graph, the class the pattern matched
/// against, that class's matched node's result type, and the bindings
/// produced by the match, perform whatever additional e-graph insertion the
/// rule needs and return the pair of classes to union, or `None` to decline
/// (e.g. a rule that only fires under a side condition checked here rather
/// than encoded as a [`SubClause`] filter).
pub type Updater =
    Arc<dyn Fn(&mut EGraph, EClassId, Type, &MatchData) -> Option<(EClassId, EClassId)> + Send + Sync>;

/// A pattern root plus the rewrite it triggers on a successful match.
#[derive(Clone)]
pub struct Clause {
    root: SubClauseId,
    num_vars: usize,
    updater: Updater,
    name: &'static str,
}

/// Builds an [`EMatcher`] by hash-consing pattern nodes the way
/// `EMatcherBuilder::add_clause` does in the reference implementation:
/// structurally identical sub-patterns collapse to one [`SubClause`], so
/// rules that share a shape (e.g. both arms of commutativity) share the
/// matching work for that shape.
#[derive(Default)]
pub struct EMatcherBuilder {
    subclauses: Vec<SubClause>,
    subclause_index: FxMap<SubClauseShape, SubClauseId>,
    clauses: Vec<Clause>,
    next_var: usize,
}

impl EMatcherBuilder {
    pub fn new() -> Self {
        EMatcherBuilder::default()
    }

    /// Allocate a fresh pattern variable, to be used with [`Self::wildcard`].
    pub fn fresh_var(&mut self) -> VarId {
        let id = self.next_var;
        self.next_var += 1;
        id
    }

    /// A pattern node that matches any e-class and binds `var`.
    pub fn wildcard(&mut self, var: VarId) -> SubClauseId {
        self.intern(SubClauseShape::Wildcard(var))
    }

    /// A pattern node that matches `opcode` applied to the given child
    /// sub-patterns, in order.
    pub fn op(&mut self, opcode: Opcode, children: &[SubClauseId]) -> SubClauseId {
        self.intern(SubClauseShape::Opcode(opcode, children.iter().copied().collect()))
    }

    fn intern(&mut self, shape: SubClauseShape) -> SubClauseId {
        if let Some(&id) = self.subclause_index.get(&shape) {
            return id;
        }
        let id = self.subclauses.len() as SubClauseId;
        self.subclauses.push(SubClause {
            shape: shape.clone(),
        });
        self.subclause_index.insert(shape, id);
        id
    }

    /// Register a rewrite: when `root` matches, call `updater` with the
    /// bindings and union the classes it returns.
    pub fn add_clause(&mut self, name: &'static str, root: SubClauseId, updater: Updater) {
        self.clauses.push(Clause {
            root,
            num_vars: self.next_var,
            updater,
            name,
        });
    }

    /// Finalize the builder into an [`EMatcher`], bucketing clauses by the
    /// opcode their root pattern requires (wildcard-rooted clauses, which
    /// match everything, go in every bucket).
    pub fn build(self) -> EMatcher {
        let mut by_opcode: FxMap<Opcode, Vec<usize>> = FxMap::default();
        for (idx, clause) in self.clauses.iter().enumerate() {
            match &self.subclauses[clause.root as usize].shape {
                SubClauseShape::Opcode(op, _) => {
                    by_opcode.entry(*op).or_default().push(idx);
                }
                SubClauseShape::Wildcard(_) => {
                    // A root wildcard can't usefully drive a rewrite (it
                    // would fire on every e-class); reference implementation
                    // treats this as a builder error.
                    panic!("clause '{}' has a wildcard root pattern", clause.name);
                }
            }
        }
        EMatcher {
            subclauses: self.subclauses,
            clauses: self.clauses,
            by_opcode,
        }
    }
}

/// A built set of rewrite clauses, indexed by the opcode each one's root
/// pattern requires, plus the fixed-point driver that applies them until
/// the e-graph stops changing.
pub struct EMatcher {
    subclauses: Vec<SubClause>,
    clauses: Vec<Clause>,
    by_opcode: FxMap<Opcode, Vec<usize>>,
}

impl EMatcher {
    pub fn builder() -> EMatcherBuilder {
        EMatcherBuilder::new()
    }

    /// Try `subclause_id` against class `class_id`, recursing into
    /// children's classes. Returns the updated bindings on success.
    fn try_match(
        &self,
        egraph: &EGraph,
        subclause_id: SubClauseId,
        class_id: EClassId,
        bindings: &mut MatchData,
    ) -> bool {
        let subclause = &self.subclauses[subclause_id as usize];
        match &subclause.shape {
            SubClauseShape::Wildcard(var) => bindings.matches(*var, class_id),
            SubClauseShape::Opcode(opcode, child_patterns) => {
                for node in egraph.nodes_in(class_id) {
                    if !subclause.is_potential_match(node.opcode(), node.children().len()) {
                        continue;
                    }
                    if node.opcode() != *opcode {
                        continue;
                    }
                    let mut attempt = bindings.clone();
                    let mut ok = true;
                    for (pat, &child_class) in child_patterns.iter().zip(node.children()) {
                        if !self.try_match(egraph, *pat, child_class, &mut attempt) {
                            ok = false;
                            break;
                        }
                    }
                    if ok {
                        *bindings = attempt;
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Match a clause's root pattern directly against `class_id`'s nodes,
    /// additionally recovering the matched node's result type so updaters
    /// can synthesize correctly-typed replacement nodes.
    fn try_match_root(
        &self,
        egraph: &EGraph,
        clause: &Clause,
        class_id: EClassId,
    ) -> Option<(MatchData, Type)> {
        let subclause = &self.subclauses[clause.root as usize];
        let SubClauseShape::Opcode(opcode, child_patterns) = &subclause.shape else {
            unreachable!("EMatcherBuilder::build rejects wildcard-rooted clauses");
        };
        for node in egraph.nodes_in(class_id) {
            if node.opcode() != *opcode || node.children().len() != child_patterns.len() {
                continue;
            }
            let mut bindings = MatchData::with_capacity(clause.num_vars);
            let mut ok = true;
            for (pat, &child_class) in child_patterns.iter().zip(node.children()) {
                if !self.try_match(egraph, *pat, child_class, &mut bindings) {
                    ok = false;
                    break;
                }
            }
            if ok {
                return Some((bindings, node.ty()));
            }
        }
        None
    }

    /// One fixed-point pass of equality saturation: try every clause
    /// against every live e-class, applying whatever unions the matches
    /// produce, then rebuild. Returns the number of unions performed.
    fn step(&self, egraph: &mut EGraph) -> usize {
        let mut unions = 0;
        for class_id in egraph.class_ids() {
            let class_id = egraph.find(class_id);
            // A class can hold several e-nodes with different opcodes
            // (that's the point of equality saturation); check every
            // opcode actually present, not just one of them.
            let opcodes: SmallVec<[Opcode; 4]> =
                egraph.nodes_in(class_id).iter().map(|n| n.opcode()).collect();

            for opcode in opcodes {
                let Some(clause_indices) = self.by_opcode.get(&opcode) else {
                    continue;
                };
                for &idx in clause_indices {
                    let clause = &self.clauses[idx];
                    if let Some((bindings, ty)) = self.try_match_root(egraph, clause, class_id) {
                        trace!("ematch: clause '{}' matched class {class_id}", clause.name);
                        if let Some((a, b)) = (clause.updater)(egraph, class_id, ty, &bindings) {
                            egraph.union(a, b);
                            unions += 1;
                        }
                    }
                }
            }
        }
        egraph.rebuild();
        unions
    }

    /// Run equality saturation to a fixed point (no pass produces a new
    /// union) or until `max_iterations` passes have run, whichever comes
    /// first. Returns the total number of unions performed.
    pub fn simplify(&self, egraph: &mut EGraph, max_iterations: usize) -> usize {
        debug!(
            "simplify: starting with {} classes, {} clauses",
            egraph.num_classes(),
            self.clauses.len()
        );
        let mut total = 0;
        for pass in 0..max_iterations {
            let unions = self.step(egraph);
            total += unions;
            debug!("simplify: pass {pass} produced {unions} unions");
            if unions == 0 {
                break;
            }
        }
        debug!("simplify: finished with {total} total unions");
        total
    }
}

/// Build the commutativity rewrite family for the given binary opcode:
/// `op(a, b) == op(b, a)`. Grounded in the reference implementation's
/// built-in rewrite set, which applies this to every commutative integer
/// and float arithmetic opcode plus `icmp`/`fcmp` equality predicates.
pub fn commutativity(builder: &mut EMatcherBuilder, opcode: Opcode) {
    let a = builder.fresh_var();
    let b = builder.fresh_var();
    let pa = builder.wildcard(a);
    let pb = builder.wildcard(b);
    let root = builder.op(opcode, &[pa, pb]);
    builder.add_clause(
        opcode.name(),
        root,
        Arc::new(move |egraph, class_id, ty, bindings| {
            let a_class = bindings.class_of(a);
            let b_class = bindings.class_of(b);
            if a_class == b_class {
                return None;
            }
            let swapped = egraph.add_opcode(opcode, ty, &[b_class, a_class]);
            if egraph.equivalent(class_id, swapped) {
                None
            } else {
                Some((class_id, swapped))
            }
        }),
    );
}

/// Build the associativity rewrite family for the given binary opcode:
/// `op(op(a, b), c) == op(a, op(b, c))`, inserting the missing side so the
/// two shapes land in the same e-class.
pub fn associativity(builder: &mut EMatcherBuilder, opcode: Opcode) {
    let a = builder.fresh_var();
    let b = builder.fresh_var();
    let c = builder.fresh_var();
    let pa = builder.wildcard(a);
    let pb = builder.wildcard(b);
    let pc = builder.wildcard(c);
    let inner = builder.op(opcode, &[pa, pb]);
    let root = builder.op(opcode, &[inner, pc]);
    builder.add_clause(
        opcode.name(),
        root,
        Arc::new(move |egraph, class_id, ty, bindings| {
            let a_class = bindings.class_of(a);
            let b_class = bindings.class_of(b);
            let c_class = bindings.class_of(c);
            let bc = egraph.add_opcode(opcode, ty, &[b_class, c_class]);
            let rotated = egraph.add_opcode(opcode, ty, &[a_class, bc]);
            if egraph.equivalent(class_id, rotated) {
                None
            } else {
                Some((class_id, rotated))
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operation::Operation;
    use crate::ty::Type;

    fn i32() -> Type {
        Type::int(32)
    }

    #[test]
    fn commutative_add_unifies_swapped_operands() {
        let mut egraph = EGraph::new();
        let x = Operation::constant_named(i32(), "x");
        let y = Operation::constant_named(i32(), "y");
        let forward = Operation::create_add(x.clone(), y.clone());
        let backward = Operation::create_add(y.clone(), x.clone());

        let c1 = egraph.add(&forward);
        let c2 = egraph.add(&backward);
        assert_ne!(egraph.find(c1), egraph.find(c2));

        let mut builder = EMatcher::builder();
        commutativity(&mut builder, Opcode::Add);
        let matcher = builder.build();
        matcher.simplify(&mut egraph, 4);

        assert_eq!(egraph.find(c1), egraph.find(c2));
    }

    #[test]
    fn simplify_terminates_when_no_rules_apply() {
        let mut egraph = EGraph::new();
        let x = Operation::constant_named(i32(), "x");
        egraph.add(&x);

        let mut builder = EMatcher::builder();
        commutativity(&mut builder, Opcode::Mul);
        let matcher = builder.build();
        let unions = matcher.simplify(&mut egraph, 10);
        assert_eq!(unions, 0);
    }
}
