//! Symbolic expression nodes and their smart constructors.
//!
//! An [`Operation`] is immutable once built; sharing is via [`OpRef`]
//! (`Arc<Operation>`), so structurally identical subtrees can be referenced
//! from many parents without copying. `Create*` entry points fold constants
//! and apply algebraic identities at construction time rather than leaving
//! that work for a later pass — see `smart-constructors` in the design spec.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::ty::Type;

use super::opcode::{FCmpPredicate, ICmpPredicate, Opcode};

/// A shared, immutable reference to an [`Operation`]. Cloning is an atomic
/// refcount bump, matching the reference implementation's `ref<Operation>`.
pub type OpRef = Arc<Operation>;

/// Raw IEEE-754 bit pattern for a float constant, tagged by precision so
/// equality and hashing stay bitwise (`+0.0 != -0.0`, `NaN == NaN` only when
/// payloads match exactly).
#[derive(Debug, Clone, Copy)]
pub enum FloatBits {
    F32(u32),
    F64(u64),
}

impl FloatBits {
    pub fn from_f32(v: f32) -> Self {
        FloatBits::F32(v.to_bits())
    }

    pub fn from_f64(v: f64) -> Self {
        FloatBits::F64(v.to_bits())
    }

    pub fn as_f64(self) -> f64 {
        match self {
            FloatBits::F32(bits) => f32::from_bits(bits) as f64,
            FloatBits::F64(bits) => f64::from_bits(bits),
        }
    }
}

impl PartialEq for FloatBits {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FloatBits::F32(a), FloatBits::F32(b)) => a == b,
            (FloatBits::F64(a), FloatBits::F64(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for FloatBits {}

impl Hash for FloatBits {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FloatBits::F32(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            FloatBits::F64(b) => {
                1u8.hash(state);
                b.hash(state);
            }
        }
    }
}

/// The tagged payload carried by an [`Operation`]. Exactly one variant is
/// populated per opcode family; this is the Rust rendering of the reference
/// implementation's `(operand-vector | big-int | big-float | string | u64 |
/// none)` union, paying allocation only for the populated case.
#[derive(Debug, Clone)]
enum Inner {
    None,
    Operands(SmallVec<[OpRef; 3]>),
    Int(u128),
    Float(FloatBits),
    Bytes(Arc<[u8]>),
    Name(Arc<str>),
    Number(u64),
}

impl PartialEq for Inner {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Inner::None, Inner::None) => true,
            (Inner::Operands(a), Inner::Operands(b)) => a == b,
            (Inner::Int(a), Inner::Int(b)) => a == b,
            (Inner::Float(a), Inner::Float(b)) => a == b,
            (Inner::Bytes(a), Inner::Bytes(b)) => a == b,
            (Inner::Name(a), Inner::Name(b)) => a == b,
            (Inner::Number(a), Inner::Number(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Inner {}

impl Hash for Inner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Inner::None => {}
            Inner::Operands(ops) => {
                for op in ops {
                    // Hash by identity of the structural content, not
                    // pointer: operands are hash-consed structurally.
                    op.as_ref().hash(state);
                }
            }
            Inner::Int(v) => v.hash(state),
            Inner::Float(v) => v.hash(state),
            Inner::Bytes(v) => v.hash(state),
            Inner::Name(v) => v.hash(state),
            Inner::Number(v) => v.hash(state),
        }
    }
}

/// An immutable, shared, hash-consable symbolic expression node.
#[derive(Debug, Clone)]
pub struct Operation {
    opcode: Opcode,
    ty: Type,
    inner: Inner,
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode && self.ty == other.ty && self.inner == other.inner
    }
}
impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opcode.hash(state);
        self.ty.hash(state);
        self.inner.hash(state);
    }
}

impl Operation {
    /// The packed opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The result type.
    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Number of operands, matching `opcode.num_operands()`.
    pub fn num_operands(&self) -> usize {
        match &self.inner {
            Inner::Operands(ops) => ops.len(),
            _ => 0,
        }
    }

    /// The operand at index `i`. Panics if out of range.
    pub fn operand(&self, i: usize) -> &OpRef {
        match &self.inner {
            Inner::Operands(ops) => &ops[i],
            _ => panic!("operand() called on a node with no operands"),
        }
    }

    /// All operands, in order.
    pub fn operands(&self) -> &[OpRef] {
        match &self.inner {
            Inner::Operands(ops) => ops.as_slice(),
            _ => &[],
        }
    }

    /// Human-readable opcode name (does not include predicates/operands).
    pub fn opcode_name(&self) -> &'static str {
        self.opcode.name()
    }

    /// The value of a `ConstantInt`, or `None` for any other opcode.
    pub fn as_constant_int(&self) -> Option<u128> {
        match (&self.opcode, &self.inner) {
            (Opcode::ConstantInt, Inner::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// The raw bit pattern of a `ConstantFloat`, or `None` otherwise.
    pub fn as_constant_float(&self) -> Option<FloatBits> {
        match (&self.opcode, &self.inner) {
            (Opcode::ConstantFloat, Inner::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Whether this is an `Undef` node.
    pub fn is_undef(&self) -> bool {
        self.opcode == Opcode::Undef
    }

    /// Whether this is `ConstantInt` carrying exactly `value` (after masking
    /// to the node's own bitwidth).
    pub fn is_constant_int_value(&self, value: u128) -> bool {
        match self.as_constant_int() {
            Some(v) => v == mask_to_width(value, self.ty.bitwidth()),
            None => false,
        }
    }

    fn new(opcode: Opcode, ty: Type, inner: Inner) -> OpRef {
        Arc::new(Operation { opcode, ty, inner })
    }

    fn new_nullary(opcode: Opcode, ty: Type) -> OpRef {
        Operation::new(opcode, ty, Inner::None)
    }

    fn new_unary(opcode: Opcode, ty: Type, a: OpRef) -> OpRef {
        let mut ops = SmallVec::new();
        ops.push(a);
        Operation::new(opcode, ty, Inner::Operands(ops))
    }

    fn new_binary(opcode: Opcode, ty: Type, a: OpRef, b: OpRef) -> OpRef {
        let mut ops = SmallVec::new();
        ops.push(a);
        ops.push(b);
        Operation::new(opcode, ty, Inner::Operands(ops))
    }

    fn new_ternary(opcode: Opcode, ty: Type, a: OpRef, b: OpRef, c: OpRef) -> OpRef {
        let mut ops = SmallVec::new();
        ops.push(a);
        ops.push(b);
        ops.push(c);
        Operation::new(opcode, ty, Inner::Operands(ops))
    }

    // ---- constants -----------------------------------------------------

    /// A named free symbolic constant.
    pub fn constant_named(ty: Type, name: impl Into<Arc<str>>) -> OpRef {
        let name = name.into();
        assert!(!name.is_empty(), "constant name must not be empty");
        Operation::new(Opcode::ConstantNamed, ty, Inner::Name(name))
    }

    /// A numbered free symbolic constant.
    pub fn constant_numbered(ty: Type, number: u64) -> OpRef {
        Operation::new(Opcode::ConstantNumbered, ty, Inner::Number(number))
    }

    /// An integer literal, masked to `ty`'s bitwidth.
    pub fn constant_int(ty: Type, value: u128) -> OpRef {
        assert!(ty.is_int(), "constant_int requires an integer type");
        Operation::new(
            Opcode::ConstantInt,
            ty,
            Inner::Int(mask_to_width(value, ty.bitwidth())),
        )
    }

    /// The `i1` literal for a boolean.
    pub fn constant_bool(value: bool) -> OpRef {
        Operation::constant_int(Type::BOOL, value as u128)
    }

    /// A 32-bit float literal.
    pub fn constant_f32(value: f32) -> OpRef {
        Operation::new(
            Opcode::ConstantFloat,
            Type::f32(),
            Inner::Float(FloatBits::from_f32(value)),
        )
    }

    /// A 64-bit float literal.
    pub fn constant_f64(value: f64) -> OpRef {
        Operation::new(
            Opcode::ConstantFloat,
            Type::f64(),
            Inner::Float(FloatBits::from_f64(value)),
        )
    }

    /// A constant byte array, indexed by an integer of `index_ty`'s width.
    pub fn constant_array(index_ty: Type, data: &[u8]) -> OpRef {
        assert!(index_ty.is_int(), "array index type must be an integer");
        assert!(
            index_ty.bitwidth() as u32 >= crate::ty::ilog2_ceil(data.len()),
            "index bitwidth is not large enough to address the whole constant array"
        );
        Operation::new(
            Opcode::ConstantArray,
            Type::array(index_ty.bitwidth()),
            Inner::Bytes(Arc::from(data)),
        )
    }

    /// An undefined value of type `ty`.
    pub fn undef(ty: Type) -> OpRef {
        Operation::new_nullary(Opcode::Undef, ty)
    }

    // ---- integer binary ops ---------------------------------------------

    /// `lhs + rhs`, with identity fold (`x+0`), undef propagation, and
    /// constant folding.
    pub fn create_add(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_undef() || rhs.is_undef() {
            return Operation::undef(lhs.ty);
        }
        if lhs.is_constant_int_value(0) {
            return rhs;
        }
        if rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let width = lhs.ty.bitwidth();
            return Operation::constant_int(lhs.ty, mask_to_width(a.wrapping_add(b), width));
        }
        Operation::new_binary(Opcode::Add, lhs.ty, lhs, rhs)
    }

    /// `lhs - rhs`.
    pub fn create_sub(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_undef() || rhs.is_undef() {
            return Operation::undef(lhs.ty);
        }
        if rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let width = lhs.ty.bitwidth();
            return Operation::constant_int(lhs.ty, mask_to_width(a.wrapping_sub(b), width));
        }
        Operation::new_binary(Opcode::Sub, lhs.ty, lhs, rhs)
    }

    /// `lhs * rhs`.
    pub fn create_mul(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) {
            return lhs;
        }
        if rhs.is_constant_int_value(0) {
            return rhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let width = lhs.ty.bitwidth();
            return Operation::constant_int(lhs.ty, mask_to_width(a.wrapping_mul(b), width));
        }
        Operation::new_binary(Opcode::Mul, lhs.ty, lhs, rhs)
    }

    /// Unsigned division.
    pub fn create_udiv(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) || rhs.is_constant_int_value(1) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            assert_ne!(b, 0, "udiv by zero");
            return Operation::constant_int(lhs.ty, a / b);
        }
        Operation::new_binary(Opcode::UDiv, lhs.ty, lhs, rhs)
    }

    /// Signed division.
    pub fn create_sdiv(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        let width = lhs.ty.bitwidth();
        if lhs.is_constant_int_value(0) {
            return lhs;
        }
        // See DESIGN.md: the `bitwidth > 1` guard matches the reference
        // implementation's note that 1-bit signed division behaves
        // differently from the unsigned view of the same bit pattern.
        if rhs.is_constant_int_value(1) && width > 1 {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let a = sign_extend(a, width);
            let b = sign_extend(b, width);
            assert_ne!(b, 0, "sdiv by zero");
            return Operation::constant_int(lhs.ty, mask_to_width(a.wrapping_div(b) as u128, width));
        }
        Operation::new_binary(Opcode::SDiv, lhs.ty, lhs, rhs)
    }

    /// Unsigned remainder.
    pub fn create_urem(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) {
            return lhs;
        }
        if rhs.is_constant_int_value(1) {
            return Operation::constant_int(lhs.ty, 0);
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            assert_ne!(b, 0, "urem by zero");
            return Operation::constant_int(lhs.ty, a % b);
        }
        Operation::new_binary(Opcode::URem, lhs.ty, lhs, rhs)
    }

    /// Signed remainder.
    pub fn create_srem(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        let width = lhs.ty.bitwidth();
        if lhs.is_constant_int_value(0) {
            return lhs;
        }
        if rhs.is_constant_int_value(1) && width > 1 {
            return Operation::constant_int(lhs.ty, 0);
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let a = sign_extend(a, width);
            let b = sign_extend(b, width);
            assert_ne!(b, 0, "srem by zero");
            return Operation::constant_int(lhs.ty, mask_to_width(a.wrapping_rem(b) as u128, width));
        }
        Operation::new_binary(Opcode::SRem, lhs.ty, lhs, rhs)
    }

    /// Bitwise and.
    pub fn create_and(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) {
            return lhs;
        }
        if rhs.is_constant_int_value(0) {
            return rhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            return Operation::constant_int(lhs.ty, a & b);
        }
        Operation::new_binary(Opcode::And, lhs.ty, lhs, rhs)
    }

    /// Bitwise or.
    pub fn create_or(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) {
            return rhs;
        }
        if rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            return Operation::constant_int(lhs.ty, a | b);
        }
        Operation::new_binary(Opcode::Or, lhs.ty, lhs, rhs)
    }

    /// Bitwise xor.
    pub fn create_xor(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_undef() || rhs.is_undef() {
            return Operation::undef(lhs.ty);
        }
        if lhs.is_constant_int_value(0) {
            return rhs;
        }
        if rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            return Operation::constant_int(lhs.ty, a ^ b);
        }
        Operation::new_binary(Opcode::Xor, lhs.ty, lhs, rhs)
    }

    /// Left shift.
    pub fn create_shl(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) || rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let width = lhs.ty.bitwidth();
            return Operation::constant_int(lhs.ty, shl_masked(a, b, width));
        }
        Operation::new_binary(Opcode::Shl, lhs.ty, lhs, rhs)
    }

    /// Logical right shift.
    pub fn create_lshr(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) || rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            return Operation::constant_int(lhs.ty, lshr_masked(a, b));
        }
        Operation::new_binary(Opcode::LShr, lhs.ty, lhs, rhs)
    }

    /// Arithmetic right shift.
    pub fn create_ashr(lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_int_binary(&lhs, &rhs);
        if lhs.is_constant_int_value(0) || rhs.is_constant_int_value(0) {
            return lhs;
        }
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let width = lhs.ty.bitwidth();
            let signed = sign_extend(a, width);
            let shifted = if b >= width as u128 {
                if signed < 0 {
                    -1i128
                } else {
                    0
                }
            } else {
                signed >> b as u32
            };
            return Operation::constant_int(lhs.ty, mask_to_width(shifted as u128, width));
        }
        Operation::new_binary(Opcode::AShr, lhs.ty, lhs, rhs)
    }

    // ---- float binary ops ------------------------------------------------

    /// `lhs + rhs` (float).
    pub fn create_fadd(lhs: OpRef, rhs: OpRef) -> OpRef {
        float_binary(Opcode::FAdd, lhs, rhs, |a, b| a + b)
    }
    /// `lhs - rhs` (float).
    pub fn create_fsub(lhs: OpRef, rhs: OpRef) -> OpRef {
        float_binary(Opcode::FSub, lhs, rhs, |a, b| a - b)
    }
    /// `lhs * rhs` (float).
    pub fn create_fmul(lhs: OpRef, rhs: OpRef) -> OpRef {
        float_binary(Opcode::FMul, lhs, rhs, |a, b| a * b)
    }
    /// `lhs / rhs` (float).
    pub fn create_fdiv(lhs: OpRef, rhs: OpRef) -> OpRef {
        float_binary(Opcode::FDiv, lhs, rhs, |a, b| a / b)
    }
    /// IEEE `frem` (float).
    pub fn create_frem(lhs: OpRef, rhs: OpRef) -> OpRef {
        float_binary(Opcode::FRem, lhs, rhs, |a, b| a % b)
    }

    // ---- unary ops ---------------------------------------------------

    /// Bitwise not.
    pub fn create_not(operand: OpRef) -> OpRef {
        assert!(operand.ty.is_int());
        if let Some(v) = operand.as_constant_int() {
            let width = operand.ty.bitwidth();
            return Operation::constant_int(operand.ty, mask_to_width(!v, width));
        }
        Operation::new_unary(Opcode::Not, operand.ty, operand)
    }

    /// Float negation.
    pub fn create_fneg(operand: OpRef) -> OpRef {
        assert!(operand.ty.is_float());
        if let Some(v) = operand.as_constant_float() {
            return make_constant_float(operand.ty, -v.as_f64());
        }
        Operation::new_unary(Opcode::FNeg, operand.ty, operand)
    }

    /// Truncate an integer to a narrower width.
    pub fn create_trunc(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_int() && operand.ty.is_int());
        assert!(target.bitwidth() < operand.ty.bitwidth());
        if operand.is_undef() {
            return Operation::undef(target);
        }
        if let Some(v) = operand.as_constant_int() {
            return Operation::constant_int(target, v);
        }
        Operation::new_unary(Opcode::Trunc, target, operand)
    }

    /// Zero-extend an integer to a wider width.
    pub fn create_zext(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_int() && operand.ty.is_int());
        assert!(target.bitwidth() > operand.ty.bitwidth());
        if let Some(v) = operand.as_constant_int() {
            return Operation::constant_int(target, v);
        }
        Operation::new_unary(Opcode::ZExt, target, operand)
    }

    /// Sign-extend an integer to a wider width.
    pub fn create_sext(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_int() && operand.ty.is_int());
        assert!(target.bitwidth() > operand.ty.bitwidth());
        if operand.is_undef() {
            return Operation::undef(target);
        }
        if let Some(v) = operand.as_constant_int() {
            let signed = sign_extend(v, operand.ty.bitwidth());
            return Operation::constant_int(target, mask_to_width(signed as u128, target.bitwidth()));
        }
        Operation::new_unary(Opcode::SExt, target, operand)
    }

    /// Narrow a float to a smaller exponent/mantissa pair.
    pub fn create_fptrunc(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_float() && operand.ty.is_float());
        assert!(
            target.exponent_bits() < operand.ty.exponent_bits()
                && target.mantissa_bits() < operand.ty.mantissa_bits()
        );
        Operation::new_unary(Opcode::FpTrunc, target, operand)
    }

    /// Widen a float to a larger exponent/mantissa pair.
    pub fn create_fpext(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_float() && operand.ty.is_float());
        assert!(
            target.exponent_bits() > operand.ty.exponent_bits()
                && target.mantissa_bits() > operand.ty.mantissa_bits()
        );
        Operation::new_unary(Opcode::FpExt, target, operand)
    }

    /// Float to unsigned integer.
    pub fn create_fptoui(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_int() && operand.ty.is_float());
        Operation::new_unary(Opcode::FpToUI, target, operand)
    }

    /// Float to signed integer.
    pub fn create_fptosi(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_int() && operand.ty.is_float());
        Operation::new_unary(Opcode::FpToSI, target, operand)
    }

    /// Unsigned integer to float.
    pub fn create_uitofp(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_float() && operand.ty.is_int());
        Operation::new_unary(Opcode::UIToFp, target, operand)
    }

    /// Signed integer to float.
    pub fn create_sitofp(target: Type, operand: OpRef) -> OpRef {
        assert!(target.is_float() && operand.ty.is_int());
        Operation::new_unary(Opcode::SIToFp, target, operand)
    }

    /// Reinterpret the bits of `operand` as `target`. Width is a caller
    /// obligation (design contract, §4.1).
    pub fn create_bitcast(target: Type, operand: OpRef) -> OpRef {
        Operation::new_unary(Opcode::Bitcast, target, operand)
    }

    // ---- select / compare / memory ---------------------------------------

    /// `select cond, true_value, false_value`, folding a constant condition.
    pub fn create_select(cond: OpRef, true_value: OpRef, false_value: OpRef) -> OpRef {
        assert_eq!(cond.ty, Type::BOOL, "select condition must be i1");
        assert_eq!(
            true_value.ty, false_value.ty,
            "select arms must share a type"
        );
        if let Some(v) = cond.as_constant_int() {
            return if v == 1 { true_value } else { false_value };
        }
        Operation::new_ternary(Opcode::Select, true_value.ty, cond, true_value, false_value)
    }

    /// Integer comparison, constant-folding when both operands are literals.
    pub fn create_icmp(pred: ICmpPredicate, lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_eq!(lhs.ty, rhs.ty, "icmp operands must share a type");
        assert!(lhs.ty.is_int(), "icmp requires integer operands");
        if let (Some(a), Some(b)) = (lhs.as_constant_int(), rhs.as_constant_int()) {
            let width = lhs.ty.bitwidth();
            return Operation::constant_bool(icmp_constant(pred, a, b, width));
        }
        Operation::new_binary(pred.to_opcode(), Type::BOOL, lhs, rhs)
    }

    /// `icmp` with the left operand as an `i64` literal, sign-extended or
    /// truncated to match `rhs`'s width.
    pub fn create_icmp_literal_lhs(pred: ICmpPredicate, lhs: i64, rhs: OpRef) -> OpRef {
        assert!(rhs.ty.is_int());
        let width = rhs.ty.bitwidth();
        let literal = Operation::constant_int(rhs.ty, sext_trunc_i64(lhs, width));
        Operation::create_icmp(pred, literal, rhs)
    }

    /// `icmp` with the right operand as an `i64` literal, sign-extended or
    /// truncated to match `lhs`'s width.
    pub fn create_icmp_literal_rhs(pred: ICmpPredicate, lhs: OpRef, rhs: i64) -> OpRef {
        assert!(lhs.ty.is_int());
        let width = lhs.ty.bitwidth();
        let literal = Operation::constant_int(lhs.ty, sext_trunc_i64(rhs, width));
        Operation::create_icmp(pred, lhs, literal)
    }

    /// Float comparison.
    pub fn create_fcmp(pred: FCmpPredicate, lhs: OpRef, rhs: OpRef) -> OpRef {
        assert_eq!(lhs.ty, rhs.ty, "fcmp operands must share a type");
        assert!(lhs.ty.is_float(), "fcmp requires float operands");
        if let (Some(a), Some(b)) = (lhs.as_constant_float(), rhs.as_constant_float()) {
            return Operation::constant_bool(fcmp_constant(pred, a.as_f64(), b.as_f64()));
        }
        Operation::new_binary(pred.to_opcode(), Type::BOOL, lhs, rhs)
    }

    /// Allocate a byte array of `size` elements, default-initialized.
    pub fn create_alloc(size: OpRef, default_value: OpRef) -> OpRef {
        assert!(size.ty.is_int(), "array size must be an integer");
        assert_eq!(default_value.ty, Type::int(8));
        let ty = Type::array(size.ty.bitwidth());
        Operation::new_binary(Opcode::Alloc, ty, size, default_value)
    }

    /// Load a single byte at `offset` from `data`.
    pub fn create_load(data: OpRef, offset: OpRef) -> OpRef {
        assert!(offset.ty.is_int(), "load offset must be an integer");
        Operation::new_binary(Opcode::Load, Type::int(8), data, offset)
    }

    /// Store a single byte `value` at `offset` into `data`, yielding the
    /// updated array.
    pub fn create_store(data: OpRef, offset: OpRef, value: OpRef) -> OpRef {
        assert!(offset.ty.is_int(), "store offset must be an integer");
        assert_eq!(value.ty, Type::int(8), "stored value must be i8");
        let ty = data.ty;
        Operation::new_ternary(Opcode::Store, ty, data, offset, value)
    }
}

fn assert_int_binary(lhs: &OpRef, rhs: &OpRef) {
    assert!(lhs.ty.is_int(), "operand must be an integer");
    assert!(rhs.ty.is_int(), "operand must be an integer");
    assert_eq!(lhs.ty, rhs.ty, "binary op operands must share a type");
}

fn float_binary(opcode: Opcode, lhs: OpRef, rhs: OpRef, f: impl Fn(f64, f64) -> f64) -> OpRef {
    assert!(lhs.ty.is_float(), "operand must be a float");
    assert_eq!(lhs.ty, rhs.ty, "float binary op operands must share a type");
    if let (Some(a), Some(b)) = (lhs.as_constant_float(), rhs.as_constant_float()) {
        return make_constant_float(lhs.ty, f(a.as_f64(), b.as_f64()));
    }
    Operation::new_binary(opcode, lhs.ty, lhs, rhs)
}

fn make_constant_float(ty: Type, value: f64) -> OpRef {
    if ty == Type::f32() {
        Operation::constant_f32(value as f32)
    } else if ty == Type::f64() {
        Operation::constant_f64(value)
    } else {
        panic!("constant folding is only implemented for f32/f64 (ty = {ty})")
    }
}

fn mask_to_width(value: u128, width: u32) -> u128 {
    if width >= 128 {
        value
    } else {
        value & ((1u128 << width) - 1)
    }
}

fn sign_extend(value: u128, width: u32) -> i128 {
    if width >= 128 {
        return value as i128;
    }
    let shift = 128 - width;
    ((value << shift) as i128) >> shift
}

fn sext_trunc_i64(value: i64, width: u32) -> u128 {
    mask_to_width(value as i128 as u128, width)
}

fn shl_masked(value: u128, shift: u128, width: u32) -> u128 {
    if shift >= width as u128 {
        0
    } else {
        mask_to_width(value << shift as u32, width)
    }
}

fn lshr_masked(value: u128, shift: u128) -> u128 {
    if shift >= 128 {
        0
    } else {
        value >> shift as u32
    }
}

fn icmp_constant(pred: ICmpPredicate, a: u128, b: u128, width: u32) -> bool {
    use ICmpPredicate::*;
    match pred {
        Eq => a == b,
        Ne => a != b,
        Ugt => a > b,
        Uge => a >= b,
        Ult => a < b,
        Ule => a <= b,
        Sgt => sign_extend(a, width) > sign_extend(b, width),
        Sge => sign_extend(a, width) >= sign_extend(b, width),
        Slt => sign_extend(a, width) < sign_extend(b, width),
        Sle => sign_extend(a, width) <= sign_extend(b, width),
    }
}

fn fcmp_constant(pred: FCmpPredicate, a: f64, b: f64) -> bool {
    use FCmpPredicate::*;
    let unordered = a.is_nan() || b.is_nan();
    match pred {
        Ord => !unordered,
        Uno => unordered,
        Oeq => !unordered && a == b,
        Ogt => !unordered && a > b,
        Oge => !unordered && a >= b,
        Olt => !unordered && a < b,
        Ole => !unordered && a <= b,
        One => !unordered && a != b,
        Ueq => unordered || a == b,
        Ugt => unordered || a > b,
        Uge => unordered || a >= b,
        Ult => unordered || a < b,
        Ule => unordered || a <= b,
        Une => unordered || a != b,
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Name(name) => return write!(f, "(const {name})"),
            Inner::Number(n) => return write!(f, "(const {n})"),
            Inner::Int(v) => {
                let signed = sign_extend(*v, self.ty.bitwidth());
                return write!(f, "({} {})", self.ty, signed);
            }
            Inner::Float(bits) => return write!(f, "({} {})", self.ty, bits.as_f64()),
            _ => {}
        }

        let mut name = self.opcode.name().to_ascii_lowercase();
        if let Some(pred) = ICmpPredicate::from_opcode(self.opcode) {
            name.push('.');
            name.push_str(pred.mnemonic());
        }
        if let Some(pred) = FCmpPredicate::from_opcode(self.opcode) {
            name.push('.');
            name.push_str(pred.mnemonic());
        }

        match self.num_operands() {
            0 => write!(f, "{name}"),
            _ => {
                write!(f, "({name}")?;
                for op in self.operands() {
                    write!(f, " {op}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32() -> Type {
        Type::int(32)
    }

    #[test]
    fn constant_folding_totality_add() {
        let a = Operation::constant_int(i32(), 3);
        let b = Operation::constant_int(i32(), 4);
        let sum = Operation::create_add(a, b);
        assert_eq!(sum.as_constant_int(), Some(7));
    }

    #[test]
    fn identity_fold_add_zero_is_reference_equal() {
        let x = Operation::constant_named(i32(), "x");
        let zero = Operation::constant_int(i32(), 0);
        let result = Operation::create_add(x.clone(), zero);
        assert!(Arc::ptr_eq(&x, &result));
    }

    #[test]
    fn identity_fold_mul_zero() {
        let x = Operation::constant_named(i32(), "x");
        let zero = Operation::constant_int(i32(), 0);
        let result = Operation::create_mul(x, zero.clone());
        assert!(Arc::ptr_eq(&zero, &result));
    }

    #[test]
    fn undef_propagates_through_xor() {
        let x = Operation::constant_named(i32(), "x");
        let u = Operation::undef(i32());
        let result = Operation::create_xor(x, u);
        assert!(result.is_undef());
    }

    #[test]
    fn select_constant_condition_folds() {
        let t = Operation::constant_named(i32(), "t");
        let fv = Operation::constant_named(i32(), "f");
        let cond_true = Operation::constant_bool(true);
        let cond_false = Operation::constant_bool(false);
        assert!(Arc::ptr_eq(
            &t,
            &Operation::create_select(cond_true, t.clone(), fv.clone())
        ));
        assert!(Arc::ptr_eq(
            &fv,
            &Operation::create_select(cond_false, t, fv.clone())
        ));
    }

    #[test]
    fn sdiv_by_one_skips_fold_for_1_bit() {
        let one_bit_x = Operation::constant_named(Type::int(1), "x");
        let one = Operation::constant_int(Type::int(1), 1);
        let result = Operation::create_sdiv(one_bit_x.clone(), one);
        assert!(!Arc::ptr_eq(&one_bit_x, &result));
    }

    #[test]
    fn sdiv_by_one_folds_for_wider_width() {
        let x = Operation::constant_named(i32(), "x");
        let one = Operation::constant_int(i32(), 1);
        let result = Operation::create_sdiv(x.clone(), one);
        assert!(Arc::ptr_eq(&x, &result));
    }

    #[test]
    fn hash_equality_consistency() {
        use std::collections::hash_map::DefaultHasher;
        let a = Operation::constant_int(i32(), 42);
        let b = Operation::constant_int(i32(), 42);
        assert_eq!(a, b);
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn float_equality_is_bitwise() {
        let pos_zero = Operation::constant_f64(0.0);
        let neg_zero = Operation::constant_f64(-0.0);
        assert_ne!(pos_zero, neg_zero);

        let nan_a = Operation::constant_f64(f64::NAN);
        let nan_b = Operation::constant_f64(f64::NAN);
        assert_eq!(nan_a, nan_b);
    }

    #[test]
    fn display_prints_sexpr_form() {
        let a = Operation::constant_named(i32(), "a");
        let b = Operation::constant_named(i32(), "b");
        let add = Operation::create_add(a, b);
        assert_eq!(add.to_string(), "(add (const a) (const b))");
    }

    #[test]
    fn icmp_predicate_recoverable_from_opcode_alone() {
        let a = Operation::constant_int(i32(), 1);
        let b = Operation::constant_int(i32(), 2);
        let cmp = Operation::create_icmp(ICmpPredicate::Slt, a, b);
        assert_eq!(cmp.as_constant_int(), Some(1));
    }
}
