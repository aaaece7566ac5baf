//! Slicer contexts and the liveness map.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;

use crate::expr::Expr;
use crate::range::BitRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Why a live expression is being tracked.
pub enum UseKind {
    /// Tracked, but not yet attributed to either role.
    None,
    /// The expression feeds the jump-table lookup.
    Jumptable,
    /// The expression feeds a branch condition guarding the lookup.
    Condition,
}

impl fmt::Display for UseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Jumptable => "jumptable",
            Self::Condition => "condition",
        };

        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Use kind plus the bits of the expression that are live. Contexts are
/// compared by bit range: a wider use subsumes a narrower one.
pub struct SliceCtx {
    /// Role of the tracked expression.
    pub kind: UseKind,
    /// Live bits of the tracked expression.
    pub bits: BitRange,
}

impl SliceCtx {
    /// Create a context.
    pub const fn new(kind: UseKind, bits: BitRange) -> Self {
        Self { kind, bits }
    }

    /// Context for an expression feeding the jump-table lookup.
    pub const fn jumptable(bits: BitRange) -> Self {
        Self::new(UseKind::Jumptable, bits)
    }

    /// Context for an expression feeding a guarding condition.
    pub const fn condition(bits: BitRange) -> Self {
        Self::new(UseKind::Condition, bits)
    }
}

impl fmt::Display for SliceCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.bits)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Map from expression to the context under which it is live.
///
/// Keys are whole expressions compared by structural value. The map is
/// ordered so that "first" is well defined and two identical slices produce
/// identical walks regardless of allocation history.
pub struct LiveMap(BTreeMap<Expr, SliceCtx>);

impl LiveMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live expressions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Return `true` if nothing is live.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Context under which `expr` is live, if it is.
    pub fn get(&self, expr: &Expr) -> Option<&SliceCtx> {
        self.0.get(expr)
    }

    /// Return `true` if `expr` is live.
    pub fn contains(&self, expr: &Expr) -> bool {
        self.0.contains_key(expr)
    }

    /// Track `expr` under `ctx`, replacing any previous context.
    pub fn insert(&mut self, expr: Expr, ctx: SliceCtx) {
        self.0.insert(expr, ctx);
    }

    /// Stop tracking `expr`.
    pub fn remove(&mut self, expr: &Expr) -> Option<SliceCtx> {
        self.0.remove(expr)
    }

    /// Track `expr` under `ctx` unless it is already live under a context
    /// with at least as wide a bit range.
    pub fn insert_max(&mut self, expr: Expr, ctx: SliceCtx) {
        match self.0.get_mut(&expr) {
            Some(prev) => {
                if ctx.bits > prev.bits {
                    *prev = ctx;
                }
            }
            None => {
                self.0.insert(expr, ctx);
            }
        }
    }

    /// Merge `other` into `self`, keeping the widest context per key.
    pub fn merge(&mut self, other: LiveMap) {
        for (expr, ctx) in other.0 {
            self.insert_max(expr, ctx);
        }
    }

    /// Iterate live expressions and their contexts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &SliceCtx)> {
        self.0.iter()
    }

    /// Iterate live expressions in key order.
    pub fn keys(&self) -> impl Iterator<Item = &Expr> {
        self.0.keys()
    }
}

impl FromIterator<(Expr, SliceCtx)> for LiveMap {
    fn from_iter<I: IntoIterator<Item = (Expr, SliceCtx)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for LiveMap {
    type Item = (Expr, SliceCtx);
    type IntoIter = std::collections::btree_map::IntoIter<Expr, SliceCtx>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for LiveMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.0.iter().map(|(e, c)| format!("{e}: {c}")).join(", ")
        )
    }
}
