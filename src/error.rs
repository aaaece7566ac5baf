//! Slicer error implementation.

use thiserror::Error;

use crate::expr::{CondCode, Expr};
use crate::rtl::RtlStmt;

/// Errors that abort the current slice path.
///
/// None of these are recoverable by the slicer itself: the driver surfaces
/// them to the embedder and does not retry. Results already recorded before
/// the failure remain readable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlicerError {
    /// The slice reached an expression variant the analysis cannot walk
    /// through (dereference, array access, phi).
    #[error("unsupported expression in slice: {0}")]
    UnsupportedExpr(Expr),
    /// The slice reached a statement kind that cannot appear on a path
    /// leading to an indirect transfer.
    #[error("unsupported statement in slice: {0}")]
    UnsupportedStmt(RtlStmt),
    /// A bounding comparison used a condition code the interval domain
    /// cannot express.
    #[error("cannot bound a jump-table index with condition code {0}")]
    UnsupportedCondition(CondCode),
    /// A bounding comparison was found but no condition code is pending.
    #[error("bounding comparison found with no pending condition code")]
    MissingCondition,
    /// An operand did not have the shape the IR guarantees, such as a
    /// conditional branch whose target is not an address literal.
    #[error("malformed operand: {0}")]
    MalformedOperand(Expr),
}

impl SlicerError {
    /// Return `true` if the error names an IR construct outside the set the
    /// slicer supports, as opposed to a malformed input.
    pub const fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedExpr(_)
                | Self::UnsupportedStmt(_)
                | Self::UnsupportedCondition(_)
                | Self::MissingCondition
        )
    }
}
