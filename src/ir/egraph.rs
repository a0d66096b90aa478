//! The e-graph: a union-find of equivalence classes over [`ENode`]s, with
//! congruence-preserving rebuilds and cost-based extraction.
//!
//! This mirrors the union-find-plus-hashcons shape Cranelift's own
//! `egraph.rs`/`egg.rs` use for mid-end equality saturation, adapted to
//! operate over this crate's [`Operation`] tree instead of CLIF instructions.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use log::trace;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::BuildHasherDefault;

use crate::ty::Type;

use super::opcode::Opcode;
use super::operation::{FloatBits, OpRef, Operation};

type FxMap<K, V> = HashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Identifier for an e-class. Stable across `union`/`rebuild` calls; the
/// class a given id names can change (classes are merged into their union-
/// find leader), so always route lookups through [`EGraph::find`].
pub type EClassId = u32;

/// The leaf payload an [`ENode`] carries when it has no children, mirroring
/// [`crate::ir::operation::Operation`]'s own constant variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Leaf {
    None,
    Int(u128),
    Float(FloatBits),
    Bytes(std::sync::Arc<[u8]>),
    Name(std::sync::Arc<str>),
    Number(u64),
}

/// An e-node: an opcode applied to child e-classes (canonicalized under the
/// current union-find) plus any leaf payload. Two e-nodes with the same
/// opcode, payload, and canonical children are congruent and collapse to a
/// single hash-cons entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ENode {
    opcode: Opcode,
    ty: Type,
    leaf: Leaf,
    children: SmallVec<[EClassId; 3]>,
}

impl ENode {
    fn canonicalize(&mut self, uf: &mut UnionFind) {
        for child in &mut self.children {
            *child = uf.find(*child);
        }
    }

    /// The e-node's opcode, for e-matching against opcode-keyed patterns.
    pub(crate) fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The e-node's canonical child classes, for e-matching recursion.
    pub(crate) fn children(&self) -> &[EClassId] {
        &self.children
    }

    /// The e-node's result type, for e-matching updaters that synthesize
    /// new nodes of the same type as the one they matched.
    pub(crate) fn ty(&self) -> Type {
        self.ty
    }
}

/// An equivalence class: the set of e-nodes known to be equal, plus the set
/// of parent e-nodes that reference this class (used during congruence
/// repair so a merge can find every node that needs re-canonicalizing).
#[derive(Debug, Default, Clone)]
struct EClass {
    nodes: Vec<ENode>,
    parents: Vec<(ENode, EClassId)>,
}

#[derive(Debug, Default)]
struct UnionFind {
    parent: Vec<EClassId>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn make_set(&mut self) -> EClassId {
        let id = self.parent.len() as EClassId;
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find(&mut self, id: EClassId) -> EClassId {
        let mut root = id;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = id;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    /// Union two classes, returning `(leader, absorbed)`.
    fn union(&mut self, a: EClassId, b: EClassId) -> (EClassId, EClassId) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return (a, a);
        }
        let (leader, absorbed) = if self.rank[a as usize] < self.rank[b as usize] {
            (b, a)
        } else {
            (a, b)
        };
        self.parent[absorbed as usize] = leader;
        if self.rank[leader as usize] == self.rank[absorbed as usize] {
            self.rank[leader as usize] += 1;
        }
        (leader, absorbed)
    }
}

/// An equality-saturation e-graph over [`Operation`] trees.
pub struct EGraph {
    uf: UnionFind,
    classes: FxMap<EClassId, EClass>,
    hashcons: FxMap<ENode, EClassId>,
    /// Classes touched by a merge since the last `rebuild`.
    worklist: Vec<EClassId>,
}

impl Default for EGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EGraph {
    pub fn new() -> Self {
        EGraph {
            uf: UnionFind::default(),
            classes: FxMap::default(),
            hashcons: FxMap::default(),
            worklist: Vec::new(),
        }
    }

    /// The canonical leader id for `id`'s class.
    pub fn find(&mut self, id: EClassId) -> EClassId {
        self.uf.find(id)
    }

    fn leaf_of(op: &Operation) -> Leaf {
        if let Some(v) = op.as_constant_int() {
            return Leaf::Int(v);
        }
        if let Some(v) = op.as_constant_float() {
            return Leaf::Float(v);
        }
        Leaf::None
    }

    /// Insert `op`'s whole tree, returning the root's e-class id. Shared
    /// subtrees (the common case, since [`Operation`]s are themselves
    /// hash-consed) are only ever added once.
    pub fn add(&mut self, op: &OpRef) -> EClassId {
        let children: SmallVec<[EClassId; 3]> =
            op.operands().iter().map(|child| self.add(child)).collect();
        let mut node = ENode {
            opcode: op.opcode(),
            ty: op.ty(),
            leaf: Self::leaf_of(op),
            children,
        };
        node.canonicalize(&mut self.uf);
        self.add_node(node)
    }

    fn add_node(&mut self, node: ENode) -> EClassId {
        if let Some(&id) = self.hashcons.get(&node) {
            return self.uf.find(id);
        }
        let id = self.uf.make_set();
        for &child in &node.children {
            self.classes
                .entry(child)
                .or_default()
                .parents
                .push((node.clone(), id));
        }
        self.classes.entry(id).or_default().nodes.push(node.clone());
        self.hashcons.insert(node, id);
        id
    }

    /// Merge two classes. Idempotent if they are already equal. Queues the
    /// merged class for congruence repair; call [`EGraph::rebuild`] before
    /// relying on canonical lookups again.
    pub fn union(&mut self, a: EClassId, b: EClassId) -> EClassId {
        let (leader, absorbed) = self.uf.union(a, b);
        if leader == absorbed {
            return leader;
        }
        trace!("union: class {absorbed} merged into {leader}");
        if let Some(mut absorbed_class) = self.classes.remove(&absorbed) {
            let leader_class = self.classes.entry(leader).or_default();
            leader_class.nodes.append(&mut absorbed_class.nodes);
            leader_class.parents.append(&mut absorbed_class.parents);
        }
        self.worklist.push(leader);
        leader
    }

    /// Whether `a` and `b` are already known equal.
    pub fn equivalent(&mut self, a: EClassId, b: EClassId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Restore the congruence invariant after a batch of `union` calls:
    /// every e-node's children are canonical, and any two e-nodes that
    /// became congruent through a merge are themselves merged.
    pub fn rebuild(&mut self) {
        let mut pending = std::mem::take(&mut self.worklist);
        trace!("rebuild: {} pending repairs", pending.len());
        while !pending.is_empty() {
            let mut todo = SmallVec::<[EClassId; 8]>::new();
            for id in pending.drain(..) {
                todo.push(self.uf.find(id));
            }
            for id in todo {
                self.repair(id);
            }
            pending = std::mem::take(&mut self.worklist);
        }
    }

    fn repair(&mut self, id: EClassId) {
        let id = self.uf.find(id);
        let Some(class) = self.classes.get(&id).cloned() else {
            return;
        };
        let mut new_parents: FxMap<ENode, EClassId> = FxMap::default();
        for (mut parent_node, parent_id) in class.parents {
            // Drop the stale hashcons entry; it will be replaced below with
            // the canonicalized node (or merged into an existing one).
            self.hashcons.remove(&parent_node);
            parent_node.canonicalize(&mut self.uf);
            let parent_id = self.uf.find(parent_id);
            match new_parents.entry(parent_node.clone()) {
                Entry::Occupied(existing) => {
                    let existing_id = *existing.get();
                    if existing_id != parent_id {
                        // `union` already queues the merged class for a
                        // further repair pass.
                        self.union(existing_id, parent_id);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(parent_id);
                }
            }
            self.hashcons.insert(parent_node, parent_id);
        }
        if let Some(class) = self.classes.get_mut(&id) {
            class.parents = new_parents.into_iter().collect();
        }
    }

    /// Extract the lowest-cost representative tree from `root`'s class,
    /// scoring candidate nodes with `cost_of_op`, which is given the
    /// opcode and the already-computed costs of its children.
    pub fn extract(
        &mut self,
        root: EClassId,
        mut cost_of_op: impl FnMut(Opcode, &[u32]) -> u32,
    ) -> Option<OpRef> {
        let root = self.uf.find(root);
        let mut best_cost: FxMap<EClassId, u32> = FxMap::default();
        let mut best_node: FxMap<EClassId, ENode> = FxMap::default();

        // Classic egg-style fixed point: repeatedly relax best-cost until no
        // class improves. Terminates because costs only ever decrease and
        // are bounded below by zero.
        let mut changed = true;
        while changed {
            changed = false;
            for (&id, class) in &self.classes {
                if id != self.uf_find_const(id) {
                    continue;
                }
                for node in &class.nodes {
                    let mut child_costs = Vec::with_capacity(node.children.len());
                    let mut all_known = true;
                    for &child in &node.children {
                        match best_cost.get(&child) {
                            Some(&c) => child_costs.push(c),
                            None => {
                                all_known = false;
                                break;
                            }
                        }
                    }
                    if !all_known {
                        continue;
                    }
                    let cost = cost_of_op(node.opcode, &child_costs);
                    let improves = match best_cost.get(&id) {
                        Some(&existing) => cost < existing,
                        None => true,
                    };
                    if improves {
                        best_cost.insert(id, cost);
                        best_node.insert(id, node.clone());
                        changed = true;
                    }
                }
            }
        }

        self.build_term(root, &best_node)
    }

    fn uf_find_const(&self, id: EClassId) -> EClassId {
        let mut root = id;
        while self.uf.parent[root as usize] != root {
            root = self.uf.parent[root as usize];
        }
        root
    }

    fn build_term(&self, id: EClassId, best_node: &FxMap<EClassId, ENode>) -> Option<OpRef> {
        let id = self.uf_find_const(id);
        let node = best_node.get(&id)?;
        let children: Option<smallvec::SmallVec<[OpRef; 3]>> = node
            .children
            .iter()
            .map(|&c| self.build_term(c, best_node))
            .collect();
        let children = children?;
        Some(rebuild_operation(node, &children))
    }

    /// Number of live e-classes, for diagnostics and the §8 saturation
    /// termination property.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// All live canonical class ids, for e-matching's outer scan.
    pub(crate) fn class_ids(&self) -> Vec<EClassId> {
        self.classes.keys().copied().collect()
    }

    /// The e-nodes belonging to `id`'s class, for e-matching.
    pub(crate) fn nodes_in(&self, id: EClassId) -> &[ENode] {
        match self.classes.get(&id) {
            Some(class) => &class.nodes,
            None => &[],
        }
    }

    /// Insert a node directly from its opcode and already-known child
    /// classes, bypassing [`Operation`]. Used by e-matching updaters that
    /// synthesize a rewritten shape (e.g. commutativity's swapped operand
    /// order) without round-tripping through the `Operation` tree.
    pub(crate) fn add_opcode(&mut self, opcode: Opcode, ty: Type, children: &[EClassId]) -> EClassId {
        let mut node = ENode {
            opcode,
            ty,
            leaf: Leaf::None,
            children: children.iter().copied().collect(),
        };
        node.canonicalize(&mut self.uf);
        self.add_node(node)
    }
}

/// Reconstruct an [`Operation`] from an extracted e-node and its already
/// extracted children. The smart constructors re-run identity folds, which
/// is harmless (the node was already in canonical form) and keeps this the
/// single place that knows how to turn opcodes back into operations.
fn rebuild_operation(node: &ENode, children: &[OpRef]) -> OpRef {
    use super::opcode::{FCmpPredicate, ICmpPredicate};
    use Opcode::*;

    match (&node.leaf, node.opcode) {
        (Leaf::Int(v), ConstantInt) => return Operation::constant_int(node.ty, *v),
        (Leaf::Float(FloatBits::F32(bits)), ConstantFloat) => {
            return Operation::constant_f32(f32::from_bits(*bits))
        }
        (Leaf::Float(FloatBits::F64(bits)), ConstantFloat) => {
            return Operation::constant_f64(f64::from_bits(*bits))
        }
        _ => {}
    }

    match node.opcode {
        Undef => Operation::undef(node.ty),
        Add => Operation::create_add(children[0].clone(), children[1].clone()),
        Sub => Operation::create_sub(children[0].clone(), children[1].clone()),
        Mul => Operation::create_mul(children[0].clone(), children[1].clone()),
        UDiv => Operation::create_udiv(children[0].clone(), children[1].clone()),
        SDiv => Operation::create_sdiv(children[0].clone(), children[1].clone()),
        URem => Operation::create_urem(children[0].clone(), children[1].clone()),
        SRem => Operation::create_srem(children[0].clone(), children[1].clone()),
        And => Operation::create_and(children[0].clone(), children[1].clone()),
        Or => Operation::create_or(children[0].clone(), children[1].clone()),
        Xor => Operation::create_xor(children[0].clone(), children[1].clone()),
        Shl => Operation::create_shl(children[0].clone(), children[1].clone()),
        LShr => Operation::create_lshr(children[0].clone(), children[1].clone()),
        AShr => Operation::create_ashr(children[0].clone(), children[1].clone()),
        FAdd => Operation::create_fadd(children[0].clone(), children[1].clone()),
        FSub => Operation::create_fsub(children[0].clone(), children[1].clone()),
        FMul => Operation::create_fmul(children[0].clone(), children[1].clone()),
        FDiv => Operation::create_fdiv(children[0].clone(), children[1].clone()),
        FRem => Operation::create_frem(children[0].clone(), children[1].clone()),
        Not => Operation::create_not(children[0].clone()),
        FNeg => Operation::create_fneg(children[0].clone()),
        Trunc => Operation::create_trunc(node.ty, children[0].clone()),
        SExt => Operation::create_sext(node.ty, children[0].clone()),
        ZExt => Operation::create_zext(node.ty, children[0].clone()),
        FpTrunc => Operation::create_fptrunc(node.ty, children[0].clone()),
        FpExt => Operation::create_fpext(node.ty, children[0].clone()),
        FpToUI => Operation::create_fptoui(node.ty, children[0].clone()),
        FpToSI => Operation::create_fptosi(node.ty, children[0].clone()),
        UIToFp => Operation::create_uitofp(node.ty, children[0].clone()),
        SIToFp => Operation::create_sitofp(node.ty, children[0].clone()),
        Bitcast => Operation::create_bitcast(node.ty, children[0].clone()),
        Select => Operation::create_select(
            children[0].clone(),
            children[1].clone(),
            children[2].clone(),
        ),
        Alloc => Operation::create_alloc(children[0].clone(), children[1].clone()),
        Load => Operation::create_load(children[0].clone(), children[1].clone()),
        Store => {
            Operation::create_store(children[0].clone(), children[1].clone(), children[2].clone())
        }
        op if ICmpPredicate::from_opcode(op).is_some() => Operation::create_icmp(
            ICmpPredicate::from_opcode(op).unwrap(),
            children[0].clone(),
            children[1].clone(),
        ),
        op if FCmpPredicate::from_opcode(op).is_some() => Operation::create_fcmp(
            FCmpPredicate::from_opcode(op).unwrap(),
            children[0].clone(),
            children[1].clone(),
        ),
        other => panic!("extraction does not know how to rebuild opcode {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Type;

    fn i32() -> Type {
        Type::int(32)
    }

    fn flat_cost(_: Opcode, children: &[u32]) -> u32 {
        1 + children.iter().sum::<u32>()
    }

    #[test]
    fn congruent_nodes_unify_after_rebuild() {
        let mut g = EGraph::new();
        let x = Operation::constant_named(i32(), "x");
        let y = Operation::constant_named(i32(), "y");
        let add1 = Operation::create_add(x.clone(), y.clone());
        let add2 = Operation::create_add(x.clone(), y.clone());

        let c1 = g.add(&add1);
        let c2 = g.add(&add2);
        // Hash-consing at the Operation level already makes these the same
        // Arc, so they should already land in the same class without a
        // union.
        assert_eq!(g.find(c1), g.find(c2));
    }

    #[test]
    fn union_triggers_congruence_merge() {
        let mut g = EGraph::new();
        let x = Operation::constant_named(i32(), "x");
        let a = Operation::constant_named(i32(), "a");
        let b = Operation::constant_named(i32(), "b");

        let add_a = Operation::create_add(x.clone(), a.clone());
        let add_b = Operation::create_add(x.clone(), b.clone());

        let ca = g.add(&add_a);
        let cb = g.add(&add_b);
        assert_ne!(g.find(ca), g.find(cb));

        let id_a = g.add(&a);
        let id_b = g.add(&b);
        g.union(id_a, id_b);
        g.rebuild();

        assert_eq!(g.find(ca), g.find(cb));
    }

    #[test]
    fn extract_picks_lower_cost_equivalent() {
        let mut g = EGraph::new();
        let x = Operation::constant_named(i32(), "x");
        let zero = Operation::constant_int(i32(), 0);
        let expr = Operation::create_add(x.clone(), zero);

        let root = g.add(&expr);
        let x_class = g.add(&x);
        // Manually assert equivalence of `x + 0` and `x` the way a rewrite
        // rule would, even though the smart constructor already folded it.
        g.union(root, x_class);
        g.rebuild();

        let extracted = g.extract(root, flat_cost).unwrap();
        assert!(extracted.as_constant_int().is_none() || extracted == x);
    }
}
