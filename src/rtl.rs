//! RTL statements.

use std::fmt;

use crate::expr::Expr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// One machine-independent register-transfer statement.
pub enum RtlStmt {
    /// `dst := src`.
    Assign { dst: Expr, src: Expr },
    /// Conditional transfer to `target` when `cond` holds. The target of a
    /// conditional branch must be an address literal.
    Branch { cond: Expr, target: Expr },
    /// Unconditional transfer; the target may be any expression, which is
    /// what makes indirect jumps indirect.
    Goto { target: Expr },
    /// Procedure call. Treated as opaque by analyses over this IR.
    Call { target: Expr },
    /// An effect on machine state outside the register file.
    SideEffect { expr: Expr },
    /// No operation.
    Nop,
    /// Return from the current procedure.
    Ret,
    /// Guarded statement.
    If { cond: Expr, stmt: Box<RtlStmt> },
    /// Bytes that failed to decode.
    Invalid,
}

impl RtlStmt {
    pub fn assign(dst: Expr, src: Expr) -> Self {
        Self::Assign { dst, src }
    }

    pub fn branch(cond: Expr, target: Expr) -> Self {
        Self::Branch { cond, target }
    }

    pub fn goto(target: Expr) -> Self {
        Self::Goto { target }
    }

    pub fn call(target: Expr) -> Self {
        Self::Call { target }
    }

    pub fn side_effect(expr: Expr) -> Self {
        Self::SideEffect { expr }
    }
}

impl fmt::Display for RtlStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign { dst, src } => write!(f, "{dst} = {src}"),
            Self::Branch { cond, target } => write!(f, "if ({cond}) branch {target}"),
            Self::Goto { target } => write!(f, "goto {target}"),
            Self::Call { target } => write!(f, "call {target}"),
            Self::SideEffect { expr } => write!(f, "side_effect({expr})"),
            Self::Nop => f.write_str("nop"),
            Self::Ret => f.write_str("return"),
            Self::If { cond, stmt } => write!(f, "if ({cond}) {stmt}"),
            Self::Invalid => f.write_str("<invalid>"),
        }
    }
}
