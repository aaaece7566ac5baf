//! Expression transfer functions.
//!
//! Each visit returns the expressions the operand makes live, a
//! reconstructed source expression for substitution into the jump-table
//! format, and a stop flag raised when a bounding comparison or mask has
//! been recognized.

use tracing::debug;

use crate::context::{LiveMap, SliceCtx};
use crate::error::SlicerError;
use crate::expr::{BinOp, CondCode, Expr};
use crate::interval::StridedInterval;
use crate::range::{BitRange, MAX_BIT};
use crate::state::{SliceEffect, SliceState};

impl<B> SliceState<B> {
    pub(crate) fn visit_expr(
        &mut self,
        expr: &Expr,
        ctx: SliceCtx,
    ) -> Result<SliceEffect, SlicerError> {
        match expr {
            Expr::Id(_) => {
                let mut live = LiveMap::new();
                live.insert(expr.clone(), ctx);

                Ok(SliceEffect::of(live, expr.clone()))
            }
            Expr::Const(_) | Expr::Addr(_) | Expr::Apply { .. } => {
                Ok(SliceEffect::of(LiveMap::new(), expr.clone()))
            }
            Expr::Mem { ea, bits } => self.visit_mem(expr, ea, *bits, ctx),
            Expr::SegMem { seg, ea, bits } => {
                let inner = self.visit_expr(ea, SliceCtx::new(ctx.kind, ea.bit_range()))?;
                let src = Expr::SegMem {
                    seg: seg.clone(),
                    ea: Box::new(inner.src.unwrap_or_else(|| (**ea).clone())),
                    bits: *bits,
                };

                Ok(SliceEffect {
                    live: inner.live,
                    src: Some(src),
                    stop: inner.stop,
                })
            }
            Expr::Cast { bits, expr: inner } => {
                let width = (*bits).min(MAX_BIT);
                let se =
                    self.visit_expr(inner, SliceCtx::new(ctx.kind, BitRange::new(0, width)))?;
                let src = Expr::cast(*bits, se.src.unwrap_or_else(|| (**inner).clone()));

                Ok(SliceEffect {
                    live: se.live,
                    src: Some(src),
                    stop: se.stop,
                })
            }
            Expr::Slice {
                expr: inner,
                offset,
                bits,
            } => {
                let range = BitRange::new(*offset, offset + bits);
                let se = self.visit_expr(inner, SliceCtx::new(ctx.kind, range))?;
                let src = Expr::slice(se.src.unwrap_or_else(|| (**inner).clone()), *offset, *bits);

                Ok(SliceEffect {
                    live: se.live,
                    src: Some(src),
                    stop: se.stop,
                })
            }
            Expr::Seq { head, tail, bits } => {
                let h = self.visit_expr(head, ctx)?;
                let t = self.visit_expr(tail, ctx)?;
                let mut live = h.live;
                live.merge(t.live);
                let src = Expr::Seq {
                    head: Box::new(h.src.unwrap_or_else(|| (**head).clone())),
                    tail: Box::new(t.src.unwrap_or_else(|| (**tail).clone())),
                    bits: *bits,
                };

                Ok(SliceEffect {
                    live,
                    src: Some(src),
                    stop: h.stop || t.stop,
                })
            }
            Expr::Deposit {
                host,
                inserted,
                pos,
            } => self.visit_deposit(host, inserted, *pos, ctx),
            Expr::CondOf(inner) => self.visit_cond_of(inner, expr),
            Expr::TestCond { cc, expr: inner } => self.visit_test_cond(*cc, inner, expr),
            Expr::Binary { op, left, right } => self.visit_binary(*op, left, right, ctx),
            Expr::Unary { op, expr: inner } => {
                let se = self.visit_expr(inner, ctx)?;
                let src = Expr::unary(*op, se.src.unwrap_or_else(|| (**inner).clone()));

                Ok(SliceEffect {
                    live: se.live,
                    src: Some(src),
                    stop: se.stop,
                })
            }
            Expr::Deref(_) | Expr::Array { .. } | Expr::Phi(_) => {
                Err(SlicerError::UnsupportedExpr(expr.clone()))
            }
        }
    }

    /// The effective address is traced under the caller's use kind; the
    /// access itself also stays live so later stores to the same location
    /// could be matched up.
    fn visit_mem(
        &mut self,
        whole: &Expr,
        ea: &Expr,
        bits: u16,
        ctx: SliceCtx,
    ) -> Result<SliceEffect, SlicerError> {
        let inner = self.visit_expr(ea, SliceCtx::new(ctx.kind, ea.bit_range()))?;
        let mut live = inner.live;
        live.insert_max(whole.clone(), ctx);
        let src = Expr::mem(inner.src.unwrap_or_else(|| ea.clone()), bits);

        Ok(SliceEffect {
            live,
            src: Some(src),
            stop: inner.stop,
        })
    }

    fn visit_deposit(
        &mut self,
        host: &Expr,
        inserted: &Expr,
        pos: u16,
        ctx: SliceCtx,
    ) -> Result<SliceEffect, SlicerError> {
        let h = self.visit_expr(host, ctx)?;
        let i = self.visit_expr(inserted, ctx)?;
        let mut live = h.live;
        live.merge(i.live);
        let stop = h.stop || i.stop;

        // When exactly the deposited bits are being read, the host never
        // reaches the consumer.
        let inserted_range = BitRange::with_extent(pos, inserted.bit_size());
        let src = if inserted_range == ctx.bits {
            i.src.unwrap_or_else(|| inserted.clone())
        } else {
            Expr::deposit(
                h.src.unwrap_or_else(|| host.clone()),
                i.src.unwrap_or_else(|| inserted.clone()),
                pos,
            )
        };

        Ok(SliceEffect {
            live,
            src: Some(src),
            stop,
        })
    }

    fn visit_cond_of(&mut self, inner: &Expr, whole: &Expr) -> Result<SliceEffect, SlicerError> {
        let se = self.visit_expr(inner, SliceCtx::condition(inner.bit_range()))?;
        if se.stop {
            return Ok(se);
        }

        self.jump_table_index = Some(inner.clone());
        self.jump_table_index_to_use = Some(inner.clone());
        Ok(SliceEffect {
            live: se.live,
            src: Some(whole.clone()),
            stop: false,
        })
    }

    fn visit_test_cond(
        &mut self,
        cc: CondCode,
        inner: &Expr,
        whole: &Expr,
    ) -> Result<SliceEffect, SlicerError> {
        let se = self.visit_expr(inner, SliceCtx::condition(inner.bit_range()))?;
        self.cc_next = Some(cc);
        self.jump_table_index = Some(inner.clone());

        Ok(SliceEffect {
            live: se.live,
            src: Some(whole.clone()),
            stop: se.stop,
        })
    }

    fn visit_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        ctx: SliceCtx,
    ) -> Result<SliceEffect, SlicerError> {
        // `xor r,r` and `sub r,r` clear a register. When the cleared
        // register is the high byte of the identifier this assignment
        // killed, only the low byte of the killed register remains
        // interesting: the 8086 `xor bh,bh` switch prologue.
        if matches!(op, BinOp::Xor | BinOp::Sub) && left == right {
            if let (Expr::Id(hi), Some(Expr::Id(killed))) = (left, self.assign_lhs.as_ref()) {
                if hi.storage().aliases(killed.storage())
                    && hi.storage().offset == killed.storage().offset + 8
                {
                    let lhs = Expr::Id(*killed);
                    let full = killed.storage().size;
                    let src = Expr::cast(full, Expr::cast(8, lhs.clone()));
                    let mut live = LiveMap::new();
                    live.insert(lhs, SliceCtx::jumptable(BitRange::new(0, 8)));
                    debug!(cleared = %hi, "high-byte clearing idiom");

                    return Ok(SliceEffect {
                        live,
                        src: Some(src),
                        stop: false,
                    });
                }
            }
        }

        // A subtraction against a constant is how comparisons reach the
        // flags; when it involves the register being tracked as the table
        // index, it is the bounding comparison.
        if op == BinOp::Sub {
            if let (Expr::Id(lid), Expr::Const(k)) = (left, right) {
                let l = self.visit_expr(left, ctx)?;
                let r = self.visit_expr(right, ctx)?;

                let entry = self
                    .live
                    .keys()
                    .find(|e| matches!(e, Expr::Id(i) if i.storage().aliases(lid.storage())))
                    .cloned();
                if let Some(entry) = entry {
                    let lhs_is_index = match (&self.assign_lhs, &self.jump_table_index) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    };
                    if lhs_is_index || entry == *left {
                        let interval = self.interval_from_sub(k.value())?;
                        self.jump_table_index = Some(left.clone());
                        self.jump_table_index_to_use = Some(left.clone());
                        self.jump_table_index_interval = interval;
                        debug!(index = %left, interval = %interval, "bounding comparison");

                        let mut live = l.live;
                        live.merge(r.live);
                        return Ok(SliceEffect {
                            live,
                            src: None,
                            stop: true,
                        });
                    }
                }

                return Ok(reconstruct(op, l, r, left, right));
            }
        }

        // Masking against a constant bounds the index directly.
        if op == BinOp::And {
            if let Expr::Const(k) = right {
                let interval = StridedInterval::from_mask(k.value());
                self.jump_table_index = Some(left.clone());
                self.jump_table_index_to_use = Some(left.clone());
                self.jump_table_index_interval = interval;
                debug!(index = %left, interval = %interval, "mask bound");

                return Ok(SliceEffect {
                    live: LiveMap::new(),
                    src: None,
                    stop: true,
                });
            }
        }

        let l = self.visit_expr(left, ctx)?;
        let r = self.visit_expr(right, ctx)?;

        Ok(reconstruct(op, l, r, left, right))
    }

    fn interval_from_sub(&self, k: i64) -> Result<StridedInterval, SlicerError> {
        let cc = self.cc_next.ok_or(SlicerError::MissingCondition)?;
        let cc = if self.invert_condition {
            cc.invert()
        } else {
            cc
        };

        match cc {
            CondCode::Ule => Ok(StridedInterval::from_ule(k)),
            CondCode::Uge => Ok(StridedInterval::from_uge(k)),
            other => Err(SlicerError::UnsupportedCondition(other)),
        }
    }
}

fn reconstruct(op: BinOp, l: SliceEffect, r: SliceEffect, left: &Expr, right: &Expr) -> SliceEffect {
    let stop = l.stop || r.stop;
    let mut live = l.live;
    live.merge(r.live);
    let src = Expr::binary(
        op,
        l.src.unwrap_or_else(|| left.clone()),
        r.src.unwrap_or_else(|| right.clone()),
    );

    SliceEffect {
        live,
        src: Some(src),
        stop,
    }
}
