//! Per-path slice state and the backward transfer functions.

use std::fmt;

use tracing::{debug, trace};

use crate::context::{LiveMap, SliceCtx};
use crate::error::SlicerError;
use crate::expr::{Addr, CondCode, Expr};
use crate::host::SlicerHost;
use crate::interval::StridedInterval;
use crate::range::BitRange;
use crate::rtl::RtlStmt;
use crate::simplify::simplify;

mod visit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Resulting state of stepping a slice over one statement.
pub enum SliceOutcome {
    /// Keep walking backwards through the block.
    Proceed,
    /// A bounding comparison or mask was found; the state is terminal and
    /// carries the slice results.
    Stopped,
    /// Every live expression was accounted for without finding a bound;
    /// the path is exhausted.
    DeadEnd,
}

impl SliceOutcome {
    /// Return `true` if the state may be stepped again.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

#[derive(Debug, Clone, Default)]
/// Contribution of one visited statement or expression: the expressions it
/// makes live, the reconstructed source to substitute into the jump-table
/// format, and whether the walk is finished.
pub(crate) struct SliceEffect {
    pub(crate) live: LiveMap,
    pub(crate) src: Option<Expr>,
    pub(crate) stop: bool,
}

impl SliceEffect {
    pub(crate) fn of(live: LiveMap, src: Expr) -> Self {
        Self {
            live,
            src: Some(src),
            stop: false,
        }
    }
}

#[derive(Debug, Clone)]
/// One backward path through the CFG.
///
/// A state is created by [`crate::slicer::BackwardSlicer::start`] or by
/// predecessor fan-out, after which it evolves independently of its
/// siblings: the live map is cloned, never shared.
pub struct SliceState<B> {
    block: B,
    /// Index of the next statement to visit; -1 once the walk has consumed
    /// the whole block.
    cursor: isize,
    live: LiveMap,
    /// Address of the block this path descended from, used to decide
    /// whether a conditional branch was taken or fell through.
    addr_succ: Option<Addr>,
    cc_next: Option<CondCode>,
    invert_condition: bool,
    assign_lhs: Option<Expr>,
    jump_table_format: Option<Expr>,
    jump_table_index: Option<Expr>,
    jump_table_index_to_use: Option<Expr>,
    jump_table_index_interval: StridedInterval,
}

impl<B> SliceState<B> {
    pub(crate) fn new(block: B, cursor: isize) -> Self {
        Self {
            block,
            cursor,
            live: LiveMap::new(),
            addr_succ: None,
            cc_next: None,
            invert_condition: false,
            assign_lhs: None,
            jump_table_format: None,
            jump_table_index: None,
            jump_table_index_to_use: None,
            jump_table_index_interval: StridedInterval::EMPTY,
        }
    }

    /// Clone this path into `block`, recording the address of the block we
    /// came from. Analysis state carries over; the cursor is placed on the
    /// predecessor's last statement.
    pub(crate) fn create_new(&self, block: B, cursor: isize, addr_succ: Addr) -> Self
    where
        B: Clone,
    {
        Self {
            block,
            cursor,
            live: self.live.clone(),
            addr_succ: Some(addr_succ),
            cc_next: self.cc_next,
            invert_condition: self.invert_condition,
            assign_lhs: None,
            jump_table_format: self.jump_table_format.clone(),
            jump_table_index: self.jump_table_index.clone(),
            jump_table_index_to_use: self.jump_table_index_to_use.clone(),
            jump_table_index_interval: self.jump_table_index_interval,
        }
    }

    /// Block this path is currently walking.
    pub const fn block(&self) -> &B {
        &self.block
    }

    /// Index of the next statement to visit, or -1 at the top of the block.
    pub const fn cursor(&self) -> isize {
        self.cursor
    }

    /// Return `true` once the whole block has been consumed.
    pub const fn is_at_block_start(&self) -> bool {
        self.cursor < 0
    }

    /// Expressions whose values feed the indirect target.
    pub const fn live(&self) -> &LiveMap {
        &self.live
    }

    /// The symbolic jump-table expression recovered so far.
    pub fn jump_table_format(&self) -> Option<&Expr> {
        self.jump_table_format.as_ref()
    }

    /// The expression the guarding comparison bounds.
    pub fn jump_table_index(&self) -> Option<&Expr> {
        self.jump_table_index.as_ref()
    }

    /// The index expression to evaluate when expanding the table.
    pub fn jump_table_index_to_use(&self) -> Option<&Expr> {
        self.jump_table_index_to_use.as_ref()
    }

    /// Bound on the index derived from a comparison or mask.
    pub const fn jump_table_index_interval(&self) -> StridedInterval {
        self.jump_table_index_interval
    }

    /// Return `true` if the path fell through the most recent conditional
    /// branch instead of taking it.
    pub const fn invert_condition(&self) -> bool {
        self.invert_condition
    }

    /// Seed the walk from the indirect jump's target expression. Returns
    /// `false` when nothing in the expression is traceable.
    pub(crate) fn start(&mut self, indirect: &Expr) -> Result<bool, SlicerError> {
        let effect = self.visit_expr(indirect, SliceCtx::jumptable(indirect.bit_range()))?;
        self.jump_table_format = Some(effect.src.unwrap_or_else(|| indirect.clone()));
        self.live = effect.live;

        Ok(!self.live.is_empty())
    }

    /// Visit the statement under the cursor and move the cursor one
    /// statement up.
    pub(crate) fn step<H>(&mut self, host: &H) -> Result<SliceOutcome, SlicerError>
    where
        H: SlicerHost<Block = B>,
        B: fmt::Debug,
    {
        let stmt = &host.instructions(&self.block)[self.cursor as usize];
        trace!(block = ?self.block, cursor = self.cursor, stmt = %stmt, "slicing");

        let effect = self.visit_stmt(stmt)?;
        self.cursor -= 1;

        let Some(effect) = effect else {
            return Ok(SliceOutcome::Proceed);
        };

        self.live.merge(effect.live);
        trace!(live = %self.live, "live expressions");

        if effect.stop {
            debug!(block = ?self.block, "slice found its bound");
            return Ok(SliceOutcome::Stopped);
        }
        if self.live.is_empty() {
            debug!(block = ?self.block, "no live expressions remain");
            return Ok(SliceOutcome::DeadEnd);
        }

        Ok(SliceOutcome::Proceed)
    }

    fn visit_stmt(&mut self, stmt: &RtlStmt) -> Result<Option<SliceEffect>, SlicerError> {
        match stmt {
            RtlStmt::Assign { dst, src } => self.visit_assign(dst, src),
            RtlStmt::Branch { cond, target } => self.visit_branch(cond, target).map(Some),
            RtlStmt::Goto { target } => self.visit_goto(target).map(Some),
            // Calls are opaque; callee-saved conventions are assumed.
            RtlStmt::Call { .. } | RtlStmt::SideEffect { .. } => Ok(None),
            RtlStmt::Nop | RtlStmt::Ret | RtlStmt::If { .. } | RtlStmt::Invalid => {
                Err(SlicerError::UnsupportedStmt(stmt.clone()))
            }
        }
    }

    fn visit_assign(&mut self, dst: &Expr, src: &Expr) -> Result<Option<SliceEffect>, SlicerError> {
        let Expr::Id(id) = dst else {
            // Nothing in the live map is killed by a memory write.
            return Ok(None);
        };

        let dead: Vec<(Expr, SliceCtx)> = self
            .live
            .iter()
            .filter(|(e, _)| matches!(e, Expr::Id(i) if i.storage().aliases(id.storage())))
            .map(|(e, c)| (e.clone(), *c))
            .collect();
        let Some((lhs, ctx)) = dead.first().cloned() else {
            return Ok(None);
        };
        for (killed, _) in &dead {
            self.live.remove(killed);
        }

        self.assign_lhs = Some(lhs.clone());
        let effect = self.visit_expr(src, ctx)?;

        if let Some(src_expr) = effect.src.as_ref() {
            if let Some(format) = self.jump_table_format.take() {
                let format = simplify(format.replace(&lhs, src_expr));
                trace!(format = %format, "rewrote jump-table format");
                self.jump_table_format = Some(format);
            }
        }
        self.assign_lhs = None;

        Ok(Some(effect))
    }

    fn visit_branch(&mut self, cond: &Expr, target: &Expr) -> Result<SliceEffect, SlicerError> {
        let Expr::Addr(target) = target else {
            return Err(SlicerError::MalformedOperand(target.clone()));
        };

        let effect = self.visit_expr(cond, SliceCtx::condition(BitRange::EMPTY))?;
        match self.addr_succ {
            Some(succ) if succ != *target => {
                // The path being reconstructed fell through this branch, so
                // its condition held in inverted form.
                self.invert_condition = true;
                trace!(branch = %target, succ = %succ, "branch not taken on this path");
            }
            _ => {}
        }

        Ok(effect)
    }

    fn visit_goto(&mut self, target: &Expr) -> Result<SliceEffect, SlicerError> {
        let effect = self.visit_expr(target, SliceCtx::condition(target.bit_range()))?;
        if self.jump_table_format.is_none() {
            self.jump_table_format = Some(target.clone());
        }

        Ok(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Domain, Identifier, Storage};

    const DOM_B: Domain = Domain(1);

    fn bx() -> Expr {
        Expr::Id(Identifier::new("bx", Storage::new(DOM_B, 0, 16)))
    }

    fn bh() -> Expr {
        Expr::Id(Identifier::new("bh", Storage::new(DOM_B, 8, 8)))
    }

    fn al() -> Expr {
        Expr::Id(Identifier::new("al", Storage::new(Domain(0), 0, 8)))
    }

    fn seeded() -> SliceState<u32> {
        let mut st = SliceState::new(0u32, 0);
        st.live
            .insert(bx(), SliceCtx::jumptable(BitRange::new(0, 16)));
        st.jump_table_format = Some(Expr::mem16(bx()));
        st
    }

    #[test]
    fn memory_writes_have_no_effect() {
        let mut st = seeded();
        let effect = st
            .visit_assign(&Expr::mem16(al()), &bx())
            .expect("assignment");

        assert!(effect.is_none());
        assert!(st.live.contains(&bx()));
    }

    #[test]
    fn assignment_kills_aliasing_registers() {
        let mut st = seeded();
        let effect = st
            .visit_assign(&bh(), &al())
            .expect("assignment")
            .expect("effect");

        assert!(!st.live.contains(&bx()));
        assert!(effect.live.contains(&al()));
        // bx was substituted away in the format.
        assert_eq!(st.jump_table_format, Some(Expr::mem16(al())));
    }

    #[test]
    fn zeroing_idiom_keeps_low_byte_live() {
        let mut st = seeded();
        let effect = st
            .visit_assign(&bh(), &Expr::xor(bh(), bh()))
            .expect("assignment")
            .expect("effect");

        assert_eq!(
            effect.live.get(&bx()),
            Some(&SliceCtx::jumptable(BitRange::new(0, 8)))
        );
        assert_eq!(
            st.jump_table_format,
            Some(Expr::mem16(Expr::cast(16, Expr::cast(8, bx()))))
        );
    }

    #[test]
    fn branch_to_other_successor_inverts_condition() {
        let mut st = seeded();
        st.addr_succ = Some(Addr(0x2000));
        st.visit_branch(
            &Expr::test(CondCode::Ugt, bx()),
            &Expr::addr(0x9000),
        )
        .expect("branch");

        assert!(st.invert_condition());
        assert_eq!(st.cc_next, Some(CondCode::Ugt));
    }

    #[test]
    fn branch_target_must_be_an_address() {
        let mut st = seeded();
        let err = st
            .visit_branch(&Expr::test(CondCode::Ule, bx()), &bx())
            .expect_err("branch");

        assert_eq!(err, SlicerError::MalformedOperand(bx()));
    }

    #[test]
    fn unsupported_statements_are_fatal() {
        let mut st = seeded();

        let err = st.visit_stmt(&RtlStmt::Ret).expect_err("return");
        assert_eq!(err, SlicerError::UnsupportedStmt(RtlStmt::Ret));
        let err = st.visit_stmt(&RtlStmt::Nop).expect_err("nop");
        assert_eq!(err, SlicerError::UnsupportedStmt(RtlStmt::Nop));
    }
}
