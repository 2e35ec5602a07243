pub mod cycle;
pub mod scheduler;

pub use cycle::AnalysisCycle;
pub use scheduler::{CaptureScheduler, Dispatcher, DEFAULT_PERIOD};

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TickKind {
    /// The capture fired as soon as the scheduler starts.
    Initial,
    Periodic,
    Manual,
}

/// One trigger of the capture cycle. `seq` increases in dispatch order.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub seq: u64,
    pub kind: TickKind,
    pub dispatched_at: Instant,
}

/// What the scheduler runs on every tick. Each run is spawned and awaited by
/// nobody; runs may overlap.
pub trait CycleRunner: Send + Sync + 'static {
    fn run(&self, tick: Tick) -> impl Future<Output = ()> + Send;
}
