//! Backward slicer for resolving indirect control-transfer targets.
//!
//! When scanning machine code, an indirect jump like `jmp [table + bx*2]`
//! cannot be followed until the table's extent is known. The slicer walks
//! backwards from the jump through a partially-constructed control flow
//! graph over RTL, tracking which storage locations feed the computed
//! target, until it finds both the jump-table format expression and a
//! strided interval bounding the index, derived from a guarding comparison
//! or bitmask.
//!
//! The host disassembler supplies the graph through the
//! [`SlicerHost`](crate::host::SlicerHost) capability trait; the slicer
//! holds no global state and can be dropped at any point to cancel the
//! analysis.

pub mod context;
pub mod error;
pub mod expr;
pub mod host;
pub mod interval;
pub mod range;
pub mod rtl;
pub mod simplify;
pub mod slicer;
pub mod state;

pub mod prelude {
    //! Single import for embedders.

    pub use crate::context::{LiveMap, SliceCtx, UseKind};
    pub use crate::error::SlicerError;
    pub use crate::expr::{
        Addr, BinOp, CondCode, Constant, Domain, Expr, Identifier, Storage, UnOp,
    };
    pub use crate::host::{BlockId, MemoryCfg, SlicerHost};
    pub use crate::interval::StridedInterval;
    pub use crate::range::BitRange;
    pub use crate::rtl::RtlStmt;
    pub use crate::simplify::simplify;
    pub use crate::slicer::BackwardSlicer;
    pub use crate::state::{SliceOutcome, SliceState};
}
