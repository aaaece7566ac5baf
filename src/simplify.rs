//! Pure expression simplification.
//!
//! Substituting an assignment source into the jump-table format produces
//! trees like `cast16(cast16(x))` or `(x + 0x2) - 0x2`. The rewriter below
//! folds those away. Identifiers and memory reads are opaque: no symbolic
//! value is ever invented, only what substitution already produced is
//! rearranged.

use crate::expr::{BinOp, Constant, Expr, UnOp};
use crate::range::MAX_BIT;

/// Rewrite `expr` to a structurally smaller expression of equal value.
pub fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { op, left, right } => {
            simplify_binary(op, simplify(*left), simplify(*right))
        }
        Expr::Unary { op, expr } => simplify_unary(op, simplify(*expr)),
        Expr::Cast { bits, expr } => simplify_cast(bits, simplify(*expr)),
        Expr::Slice { expr, offset, bits } => simplify_slice(simplify(*expr), offset, bits),
        Expr::Deposit {
            host,
            inserted,
            pos,
        } => simplify_deposit(simplify(*host), simplify(*inserted), pos),
        Expr::Mem { ea, bits } => Expr::mem(simplify(*ea), bits),
        Expr::SegMem { seg, ea, bits } => Expr::seg_mem(simplify(*seg), simplify(*ea), bits),
        Expr::Seq { head, tail, bits } => Expr::Seq {
            head: Box::new(simplify(*head)),
            tail: Box::new(simplify(*tail)),
            bits,
        },
        Expr::CondOf(inner) => Expr::cond_of(simplify(*inner)),
        Expr::TestCond { cc, expr } => Expr::test(cc, simplify(*expr)),
        Expr::Apply { func, args, bits } => Expr::Apply {
            func: Box::new(simplify(*func)),
            args: args.into_iter().map(simplify).collect(),
            bits,
        },
        other => other,
    }
}

fn mask(bits: u16) -> i64 {
    if bits >= MAX_BIT {
        -1
    } else {
        (1i64 << bits) - 1
    }
}

fn is_zero(e: &Expr) -> bool {
    matches!(e, Expr::Const(c) if c.value() == 0)
}

fn is_one(e: &Expr) -> bool {
    matches!(e, Expr::Const(c) if c.value() == 1)
}

fn zero_like(e: &Expr) -> Expr {
    Expr::constant(0, e.bit_size())
}

fn simplify_binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    if let (Expr::Const(a), Expr::Const(b)) = (&left, &right) {
        if let Some(folded) = fold(op, a, b) {
            return Expr::Const(folded);
        }
    }

    match op {
        BinOp::Add if is_zero(&right) => left,
        BinOp::Add if is_zero(&left) => right,
        BinOp::Sub if is_zero(&right) => left,
        BinOp::Sub if left == right => zero_like(&left),
        BinOp::Mul if is_one(&right) => left,
        BinOp::Mul if is_one(&left) => right,
        BinOp::Mul if is_zero(&left) || is_zero(&right) => zero_like(&left),
        BinOp::And if is_zero(&right) => zero_like(&left),
        BinOp::And if is_zero(&left) => zero_like(&right),
        BinOp::And
            if matches!(&right, Expr::Const(c) if c.value() == mask(left.bit_size())) =>
        {
            left
        }
        BinOp::Or | BinOp::Xor if is_zero(&right) => left,
        BinOp::Or | BinOp::Xor if is_zero(&left) => right,
        BinOp::Xor if left == right => zero_like(&left),
        BinOp::Shl | BinOp::Shr if is_zero(&right) => left,
        _ => Expr::binary(op, left, right),
    }
}

fn fold(op: BinOp, a: &Constant, b: &Constant) -> Option<Constant> {
    let bits = a.bits().max(b.bits());
    let m = mask(bits);
    let (a, b) = (a.value(), b.value());
    let value = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => {
            if !(0..64).contains(&b) {
                return None;
            }
            a.wrapping_shl(b as u32)
        }
        BinOp::Shr => {
            if !(0..64).contains(&b) {
                return None;
            }
            ((a & m) as u64).wrapping_shr(b as u32) as i64
        }
    };

    Some(Constant::new(value & m, bits))
}

fn simplify_unary(op: UnOp, expr: Expr) -> Expr {
    if let Expr::Const(c) = &expr {
        let m = mask(c.bits());
        let value = match op {
            UnOp::Neg => c.value().wrapping_neg(),
            UnOp::Not => !c.value(),
        };

        return Expr::constant(value & m, c.bits());
    }

    Expr::unary(op, expr)
}

fn simplify_cast(bits: u16, expr: Expr) -> Expr {
    if expr.bit_size() == bits {
        return expr;
    }

    match expr {
        Expr::Const(c) => Expr::constant(c.value() & mask(bits), bits),
        // Truncating an earlier conversion never widens, so the outer cast
        // can read through the inner one.
        Expr::Cast {
            bits: inner_bits,
            expr: inner,
        } if bits <= inner_bits => simplify_cast(bits, *inner),
        other => Expr::cast(bits, other),
    }
}

fn simplify_slice(expr: Expr, offset: u16, bits: u16) -> Expr {
    if offset == 0 && bits == expr.bit_size() {
        return expr;
    }

    if let Expr::Const(c) = &expr {
        let value = (c.value() >> offset) & mask(bits);

        return Expr::constant(value, bits);
    }

    Expr::slice(expr, offset, bits)
}

fn simplify_deposit(host: Expr, inserted: Expr, pos: u16) -> Expr {
    let host_bits = host.bit_size();
    if pos == 0 && inserted.bit_size() == host_bits {
        return inserted;
    }

    // Depositing into a zero host at bit 0 is a zero extension.
    if pos == 0 && is_zero(&host) {
        return Expr::cast(host_bits, inserted);
    }

    Expr::deposit(host, inserted, pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Domain, Identifier, Storage};

    fn ax() -> Expr {
        Expr::Id(Identifier::new("ax", Storage::new(Domain(0), 0, 16)))
    }

    #[test]
    fn folds_constants_to_width() {
        let e = Expr::add(Expr::constant(0xfffe, 16), Expr::constant(4, 16));

        assert_eq!(simplify(e), Expr::constant(2, 16));
    }

    #[test]
    fn additive_identities() {
        assert_eq!(simplify(Expr::add(ax(), Expr::constant(0, 16))), ax());
        assert_eq!(simplify(Expr::sub(ax(), Expr::constant(0, 16))), ax());
        assert_eq!(simplify(Expr::xor(ax(), ax())), Expr::constant(0, 16));
    }

    #[test]
    fn full_mask_vanishes() {
        let e = Expr::and(ax(), Expr::constant(0xffff, 16));

        assert_eq!(simplify(e), ax());
    }

    #[test]
    fn width_preserving_cast_vanishes() {
        assert_eq!(simplify(Expr::cast(16, ax())), ax());
    }

    #[test]
    fn truncation_reads_through_extension() {
        // cast8(cast32(ax)) keeps only bits the inner cast passed through.
        let e = Expr::cast(8, Expr::cast(32, ax()));

        assert_eq!(simplify(e), Expr::cast(8, ax()));
    }

    #[test]
    fn narrowing_then_widening_is_kept() {
        // cast16(cast8(ax)) zero-extends the low byte; nothing to fold.
        let e = Expr::cast(16, Expr::cast(8, ax()));

        assert_eq!(simplify(e.clone()), e);
    }

    #[test]
    fn full_width_slice_vanishes() {
        assert_eq!(simplify(Expr::slice(ax(), 0, 16)), ax());
        assert_eq!(
            simplify(Expr::slice(Expr::constant(0xabcd, 16), 8, 8)),
            Expr::constant(0xab, 8)
        );
    }

    #[test]
    fn identifiers_stay_opaque() {
        let e = Expr::mem16(Expr::add(ax(), Expr::constant(2, 16)));

        assert_eq!(simplify(e.clone()), e);
    }

    #[test]
    fn deposit_into_zero_host_is_zero_extension() {
        let al = Expr::Id(Identifier::new("al", Storage::new(Domain(0), 0, 8)));
        let e = Expr::deposit(Expr::constant(0, 16), al.clone(), 0);

        assert_eq!(simplify(e), Expr::cast(16, al));
    }
}
