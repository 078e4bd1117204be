//! Core traits and types for cycle-accurate emulation.
//!
//! Everything ticks at the master crystal frequency. All component timing
//! derives from this. No exceptions.

mod bus;
mod clock;
mod delay;
mod observable;
mod snapshot;
mod tickable;
mod ticks;

pub use bus::{Bus, SimpleBus};
pub use clock::MasterClock;
pub use delay::Delayed;
pub use observable::{Observable, Value};
pub use snapshot::{SnapshotError, SnapshotReader, SnapshotWriter, Snapshotable};
pub use tickable::Tickable;
pub use ticks::Ticks;
