//! The term-construction context: the opaque SMT backend collaborator
//! described in §6. Everything the evaluator needs from "the SMT
//! backend" is built through this type.

use std::cell::Cell;
use std::rc::Rc;
use std::str::FromStr;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;

use crate::error::TermError;
use crate::term::{BinOp, Sort, Term, TermNode};

/// Normalizes a value into the range `[0, 2^width)`.
fn mask_to_width(value: &BigUint, width: u32) -> BigUint {
    let modulus = BigUint::from(1u8) << width;
    value % modulus
}

pub struct TermContext {
    counter: Cell<u64>,
}

impl Default for TermContext {
    fn default() -> Self {
        TermContext { counter: Cell::new(0) }
    }
}

impl TermContext {
    pub fn new() -> Self {
        TermContext::default()
    }

    // -- constants ---------------------------------------------------

    pub fn bool_val(&self, value: bool) -> Term {
        Rc::new(TermNode::BoolConst(value))
    }

    pub fn bv_val(&self, width: u32, value: impl Into<BigUint>) -> Term {
        let value = mask_to_width(&value.into(), width);
        Rc::new(TermNode::BvConst { width, value })
    }

    /// Arbitrary-precision integer literal, given as a decimal string, to
    /// a bitvector literal of the given width (§6 SMT backend contract).
    pub fn bv_val_from_decimal(&self, width: u32, decimal: &str) -> Result<Term, TermError> {
        let value = BigInt::from_str(decimal)
            .map_err(|_| TermError::InvalidDecimalLiteral { text: decimal.to_string() })?;
        let unsigned = if value.sign() == num_bigint::Sign::Minus {
            let modulus = BigInt::from(1u8) << width;
            (value + modulus).to_biguint().unwrap_or_else(BigUint::zero)
        } else {
            value.to_biguint().unwrap_or_else(BigUint::zero)
        };
        Ok(self.bv_val(width, unsigned))
    }

    pub fn int_val(&self, value: impl Into<BigInt>) -> Term {
        Rc::new(TermNode::IntConst(value.into()))
    }

    pub fn int_val_from_decimal(&self, decimal: &str) -> Result<Term, TermError> {
        let value = BigInt::from_str(decimal)
            .map_err(|_| TermError::InvalidDecimalLiteral { text: decimal.to_string() })?;
        Ok(self.int_val(value))
    }

    /// A fresh symbolic constant: `hint` is combined with an internal
    /// counter so repeated calls never collide, even if called with the
    /// same hint (e.g. repeated reads of an invalid header field).
    pub fn fresh(&self, hint: &str, sort: Sort) -> Term {
        let n = self.counter.get();
        self.counter.set(n + 1);
        Rc::new(TermNode::Symbol { name: format!("{hint}__{n}"), sort })
    }

    /// A deterministically-named symbolic constant. Used where the same
    /// logical constant must be reproduced across calls, e.g. a header's
    /// `"<id>_valid"` flag shared by every nested field read.
    pub fn named(&self, name: impl Into<String>, sort: Sort) -> Term {
        Rc::new(TermNode::Symbol { name: name.into(), sort })
    }

    // -- structural ----------------------------------------------------

    pub fn not(&self, t: Term) -> Result<Term, TermError> {
        self.expect_sort("not", &t, Sort::Bool)?;
        Ok(Rc::new(TermNode::Not(t)))
    }

    pub fn bvnot(&self, t: Term) -> Term {
        Rc::new(TermNode::BvNot(t))
    }

    pub fn neg(&self, t: Term) -> Term {
        Rc::new(TermNode::Neg(t))
    }

    pub fn int_neg(&self, t: Term) -> Term {
        Rc::new(TermNode::IntNeg(t))
    }

    pub fn bin(&self, op: BinOp, lhs: Term, rhs: Term) -> Term {
        Rc::new(TermNode::Bin { op, lhs, rhs })
    }

    pub fn ite(&self, cond: Term, then_branch: Term, else_branch: Term) -> Result<Term, TermError> {
        self.expect_sort("ite", &cond, Sort::Bool)?;
        Ok(Rc::new(TermNode::Ite { cond, then_branch, else_branch }))
    }

    pub fn zero_extend(&self, term: Term, extra: u32) -> Term {
        if extra == 0 {
            term
        } else {
            Rc::new(TermNode::ZeroExtend { term, extra })
        }
    }

    pub fn sign_extend(&self, term: Term, extra: u32) -> Term {
        if extra == 0 {
            term
        } else {
            Rc::new(TermNode::SignExtend { term, extra })
        }
    }

    pub fn extract(&self, term: Term, hi: u32, lo: u32) -> Result<Term, TermError> {
        let width = match term.sort() {
            Sort::Bv(w) => w,
            other => return Err(TermError::SortMismatch { op: "extract", expected: Sort::Bv(0), found: other }),
        };
        if lo > hi || hi >= width {
            return Err(TermError::InvalidExtract { hi, lo, width });
        }
        Ok(Rc::new(TermNode::Extract { term, hi, lo }))
    }

    pub fn concat(&self, lhs: Term, rhs: Term) -> Term {
        Rc::new(TermNode::Concat { lhs, rhs })
    }

    pub fn int_to_bv(&self, term: Term, width: u32) -> Term {
        Rc::new(TermNode::IntToBv { term, width })
    }

    pub fn bv_to_int(&self, term: Term) -> Term {
        Rc::new(TermNode::BvToInt { term })
    }

    fn expect_sort(&self, op: &'static str, term: &Term, expected: Sort) -> Result<(), TermError> {
        let found = term.sort();
        if std::mem::discriminant(&found) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(TermError::SortMismatch { op, expected, found })
        }
    }

    // -- simplify --------------------------------------------------------

    /// Best-effort constant folding. Never fails; an un-simplifiable term
    /// is returned unchanged. This is the entire "simplify" primitive the
    /// evaluator is allowed to rely on (§1 Non-goals).
    pub fn simplify(&self, term: &Term) -> Term {
        match term.as_ref() {
            TermNode::BoolConst(_) | TermNode::BvConst { .. } | TermNode::IntConst(_) | TermNode::Symbol { .. } => {
                term.clone()
            }
            TermNode::Not(t) => {
                let t = self.simplify(t);
                match t.as_ref() {
                    TermNode::BoolConst(b) => self.bool_val(!b),
                    _ => Rc::new(TermNode::Not(t)),
                }
            }
            TermNode::BvNot(t) => {
                let t = self.simplify(t);
                match t.as_ref() {
                    TermNode::BvConst { width, value } => {
                        let mask = (BigUint::from(1u8) << *width) - BigUint::from(1u8);
                        self.bv_val(*width, mask - value)
                    }
                    _ => Rc::new(TermNode::BvNot(t)),
                }
            }
            TermNode::Neg(t) => {
                let t = self.simplify(t);
                match t.as_ref() {
                    TermNode::BvConst { width, value } => {
                        let modulus = BigUint::from(1u8) << *width;
                        let v = if value.is_zero() { BigUint::zero() } else { &modulus - value };
                        self.bv_val(*width, v)
                    }
                    _ => Rc::new(TermNode::Neg(t)),
                }
            }
            TermNode::IntNeg(t) => {
                let t = self.simplify(t);
                match t.as_ref() {
                    TermNode::IntConst(v) => self.int_val(-v.clone()),
                    _ => Rc::new(TermNode::IntNeg(t)),
                }
            }
            TermNode::Bin { op, lhs, rhs } => self.simplify_bin(*op, lhs, rhs),
            TermNode::Ite { cond, then_branch, else_branch } => {
                let cond = self.simplify(cond);
                match cond.as_ref() {
                    TermNode::BoolConst(true) => self.simplify(then_branch),
                    TermNode::BoolConst(false) => self.simplify(else_branch),
                    _ => {
                        let then_branch = self.simplify(then_branch);
                        let else_branch = self.simplify(else_branch);
                        if then_branch == else_branch {
                            then_branch
                        } else {
                            Rc::new(TermNode::Ite { cond, then_branch, else_branch })
                        }
                    }
                }
            }
            TermNode::ZeroExtend { term, extra } => {
                let term = self.simplify(term);
                match term.as_ref() {
                    TermNode::BvConst { width, value } => self.bv_val(width + extra, value.clone()),
                    _ => Rc::new(TermNode::ZeroExtend { term, extra: *extra }),
                }
            }
            TermNode::SignExtend { term, extra } => {
                let term = self.simplify(term);
                match term.as_ref() {
                    TermNode::BvConst { width, value } => {
                        let signed = to_signed(value, *width);
                        self.bv_val_signed(width + extra, signed)
                    }
                    _ => Rc::new(TermNode::SignExtend { term, extra: *extra }),
                }
            }
            TermNode::Extract { term, hi, lo } => {
                let term = self.simplify(term);
                match term.as_ref() {
                    TermNode::BvConst { value, .. } => {
                        let shifted = value >> *lo;
                        let width = hi - lo + 1;
                        self.bv_val(width, shifted)
                    }
                    _ => Rc::new(TermNode::Extract { term, hi: *hi, lo: *lo }),
                }
            }
            TermNode::Concat { lhs, rhs } => {
                let lhs = self.simplify(lhs);
                let rhs = self.simplify(rhs);
                match (lhs.as_ref(), rhs.as_ref()) {
                    (TermNode::BvConst { width: lw, value: lv }, TermNode::BvConst { width: rw, value: rv }) => {
                        let combined = (lv << *rw) | rv;
                        self.bv_val(lw + rw, combined)
                    }
                    _ => Rc::new(TermNode::Concat { lhs, rhs }),
                }
            }
            TermNode::IntToBv { term, width } => {
                let term = self.simplify(term);
                match term.as_ref() {
                    TermNode::IntConst(v) => self.bv_val_signed(*width, v.clone()),
                    _ => Rc::new(TermNode::IntToBv { term, width: *width }),
                }
            }
            TermNode::BvToInt { term } => {
                let term = self.simplify(term);
                match term.as_ref() {
                    TermNode::BvConst { value, .. } => self.int_val(BigInt::from(value.clone())),
                    _ => Rc::new(TermNode::BvToInt { term }),
                }
            }
        }
    }

    fn simplify_bin(&self, op: BinOp, lhs: &Term, rhs: &Term) -> Term {
        let lhs = self.simplify(lhs);
        let rhs = self.simplify(rhs);
        use TermNode::*;
        match (op, lhs.as_ref(), rhs.as_ref()) {
            (BinOp::And, BoolConst(a), BoolConst(b)) => self.bool_val(*a && *b),
            (BinOp::Or, BoolConst(a), BoolConst(b)) => self.bool_val(*a || *b),
            (BinOp::And, BoolConst(false), _) | (BinOp::And, _, BoolConst(false)) => self.bool_val(false),
            (BinOp::Or, BoolConst(true), _) | (BinOp::Or, _, BoolConst(true)) => self.bool_val(true),
            (BinOp::Eq, BvConst { value: a, .. }, BvConst { value: b, .. }) => self.bool_val(a == b),
            (BinOp::Ne, BvConst { value: a, .. }, BvConst { value: b, .. }) => self.bool_val(a != b),
            (BinOp::Eq, BoolConst(a), BoolConst(b)) => self.bool_val(a == b),
            (BinOp::Ne, BoolConst(a), BoolConst(b)) => self.bool_val(a != b),
            (BinOp::Eq, IntConst(a), IntConst(b)) => self.bool_val(a == b),
            (BinOp::Ne, IntConst(a), IntConst(b)) => self.bool_val(a != b),
            (BinOp::IntAdd, IntConst(a), IntConst(b)) => self.int_val(a + b),
            (BinOp::IntSub, IntConst(a), IntConst(b)) => self.int_val(a - b),
            (BinOp::IntMul, IntConst(a), IntConst(b)) => self.int_val(a * b),
            (BinOp::Ult, BvConst { value: a, .. }, BvConst { value: b, .. }) => self.bool_val(a < b),
            (BinOp::Ule, BvConst { value: a, .. }, BvConst { value: b, .. }) => self.bool_val(a <= b),
            (BinOp::Ugt, BvConst { value: a, .. }, BvConst { value: b, .. }) => self.bool_val(a > b),
            (BinOp::Uge, BvConst { value: a, .. }, BvConst { value: b, .. }) => self.bool_val(a >= b),
            (
                BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::BvAnd | BinOp::BvOr | BinOp::BvXor
                | BinOp::Shl | BinOp::LShr,
                BvConst { width, value: a },
                BvConst { value: b, .. },
            ) => {
                let width = *width;
                let result = match op {
                    BinOp::Add => mask_to_width(&(a + b), width),
                    BinOp::Sub => {
                        let modulus = BigUint::from(1u8) << width;
                        mask_to_width(&(a + &modulus - b), width)
                    }
                    BinOp::Mul => mask_to_width(&(a * b), width),
                    BinOp::BvAnd => a & b,
                    BinOp::BvOr => a | b,
                    BinOp::BvXor => a ^ b,
                    BinOp::Shl => mask_to_width(&(a << shift_amount(b)), width),
                    BinOp::LShr => a >> shift_amount(b),
                    _ => unreachable!(),
                };
                self.bv_val(width, result)
            }
            (BinOp::UDiv, BvConst { width, value: a }, BvConst { value: b, .. }) if !b.is_zero() => {
                self.bv_val(*width, a / b)
            }
            (BinOp::URem, BvConst { width, value: a }, BvConst { value: b, .. }) if !b.is_zero() => {
                self.bv_val(*width, a % b)
            }
            _ => Rc::new(TermNode::Bin { op, lhs, rhs }),
        }
    }

    /// Builds a bitvector constant from a (possibly negative) signed
    /// value, two's-complementing it into `[0, 2^width)`.
    pub fn bv_val_signed(&self, width: u32, value: BigInt) -> Term {
        let modulus = BigInt::from(1u8) << width;
        let normalized = ((value % &modulus) + &modulus) % &modulus;
        self.bv_val(width, normalized.to_biguint().unwrap_or_else(BigUint::zero))
    }
}

fn shift_amount(value: &BigUint) -> u32 {
    value.iter_u32_digits().next().unwrap_or(0)
}

/// Reinterprets an unsigned bitvector value as a signed `BigInt` of the
/// given width (two's complement).
fn to_signed(value: &BigUint, width: u32) -> BigInt {
    let modulus = BigUint::from(1u8) << width;
    let half = BigUint::from(1u8) << (width - 1);
    if *value >= half {
        BigInt::from(value.clone()) - BigInt::from(modulus)
    } else {
        BigInt::from(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_folds_bv_add() {
        let ctx = TermContext::new();
        let a = ctx.bv_val(8u32, 250u32);
        let b = ctx.bv_val(8u32, 10u32);
        let sum = ctx.bin(BinOp::Add, a, b);
        let simplified = ctx.simplify(&sum);
        assert_eq!(simplified, ctx.bv_val(8u32, 4u32));
    }

    #[test]
    fn ite_with_constant_condition_picks_branch() {
        let ctx = TermContext::new();
        let cond = ctx.bool_val(true);
        let then_branch = ctx.bv_val(8u32, 1u32);
        let else_branch = ctx.bv_val(8u32, 2u32);
        let ite = ctx.ite(cond, then_branch.clone(), else_branch).unwrap();
        assert_eq!(ctx.simplify(&ite), then_branch);
    }

    #[test]
    fn fresh_names_never_collide() {
        let ctx = TermContext::new();
        let a = ctx.fresh("x_valid", Sort::Bool);
        let b = ctx.fresh("x_valid", Sort::Bool);
        assert_ne!(a, b);
    }

    #[test]
    fn bv_val_from_decimal_roundtrips_small_values() {
        let ctx = TermContext::new();
        let t = ctx.bv_val_from_decimal(8, "15").unwrap();
        assert_eq!(t, ctx.bv_val(8u32, 15u32));
    }

    proptest::proptest! {
        #[test]
        fn bv_add_constant_folds_modularly(a in 0u32..256, b in 0u32..256) {
            let ctx = TermContext::new();
            let sum = ctx.bin(BinOp::Add, ctx.bv_val(8u32, a), ctx.bv_val(8u32, b));
            let expected = (a + b) % 256;
            proptest::prop_assert_eq!(ctx.simplify(&sum), ctx.bv_val(8u32, expected));
        }
    }
}
