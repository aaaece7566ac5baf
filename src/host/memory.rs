//! In-memory CFG host.

use crate::expr::Addr;
use crate::host::SlicerHost;
use crate::rtl::RtlStmt;

/// Handle to a block in a [`MemoryCfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

#[derive(Debug, Clone)]
struct BlockData {
    addr: Addr,
    stmts: Vec<RtlStmt>,
    preds: Vec<BlockId>,
}

#[derive(Debug, Default, Clone)]
/// A control flow graph fragment held in memory.
///
/// Used by the test suite and by embedders that materialize the portion of
/// the graph already scanned. Predecessors are reported in edge insertion
/// order.
pub struct MemoryCfg {
    blocks: Vec<BlockData>,
}

impl MemoryCfg {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block holding `stmts`, returning its handle.
    pub fn add_block(&mut self, addr: u64, stmts: Vec<RtlStmt>) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BlockData {
            addr: Addr(addr),
            stmts,
            preds: Vec::new(),
        });

        id
    }

    /// Record a control flow edge `from -> to`.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[to.0].preds.push(from);
    }

    /// Number of blocks in the fragment.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Return `true` if the fragment has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl SlicerHost for MemoryCfg {
    type Block = BlockId;

    fn predecessors(&self, block: &BlockId) -> Vec<BlockId> {
        self.blocks[block.0].preds.clone()
    }

    fn instructions(&self, block: &BlockId) -> &[RtlStmt] {
        &self.blocks[block.0].stmts
    }

    fn address(&self, block: &BlockId) -> Addr {
        self.blocks[block.0].addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn predecessors_keep_insertion_order() {
        let mut cfg = MemoryCfg::new();
        let a = cfg.add_block(0x1000, vec![RtlStmt::Nop]);
        let b = cfg.add_block(0x2000, vec![RtlStmt::Nop]);
        let c = cfg.add_block(0x3000, vec![RtlStmt::goto(Expr::addr(0x1000))]);
        cfg.add_edge(a, c);
        cfg.add_edge(b, c);

        assert_eq!(cfg.predecessors(&c), vec![a, b]);
        assert!(cfg.predecessors(&a).is_empty());
        assert_eq!(cfg.address(&b), Addr(0x2000));
    }
}
