//! Application services - background work orchestrating the adapters.

mod poller;

pub use poller::{CycleReport, CycleState, LastCycle, Poller, PollerStats, PollerStatus};
