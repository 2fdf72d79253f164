//! Optional phase-boundary instrumentation.
//!
//! Hardware bring-up wants to see where time goes (the original target
//! toggled debug GPIOs around these phases). The hook sits outside the
//! core control flow; the default implementation compiles to nothing.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Lookup,
    Put,
    Invalidate,
    Compact,
}

pub trait PhaseHook {
    fn enter(&self, _phase: Phase) {}
    fn exit(&self, _phase: Phase) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

impl PhaseHook for NoHook {}
