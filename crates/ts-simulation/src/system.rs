use crate::context::SimContext;
use crate::error::SimResult;

/// One stage of the town economy, run once per tick.
///
/// [`Simulation::new`](crate::Simulation::new) registers the standard
/// stages in the order goods flow through a town: generators, producers,
/// consumption, pricing, trade, merchants, growth. Each stage sees the
/// world as the previous one left it. An error aborts the rest of the tick.
pub trait System: std::fmt::Debug {
    /// Short name used in logs and lookups.
    fn name(&self) -> &str;

    /// Advance this stage by `ctx.delta` seconds.
    fn tick(&mut self, ctx: &mut SimContext<'_>) -> SimResult<()>;

    /// Runs once before the first tick, with a zero `delta`.
    fn init(&mut self, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }

    /// Support downcasting to concrete types.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Support downcasting to concrete types.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Stands in for a system while it is taken out of the list to run.
#[derive(Debug)]
pub(crate) struct Vacant;

impl System for Vacant {
    fn name(&self) -> &str {
        "vacant"
    }

    fn tick(&mut self, _ctx: &mut SimContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
