//! Cycle-accurate Commodore 64 core.
//!
//! Emulates the 6510 CPU, the VIC-II video chip and the bus fabric
//! between them at single-cycle granularity: bad lines, sprite DMA
//! stalls, delayed register commits and collision interrupts all happen
//! on the same cycle as on the original machine.
//!
//! One frame is 312 raster lines x 63 cycles = 19,656 CPU cycles on PAL
//! (263 x 65 on NTSC). The host drives the machine through
//! [`machine_core::Tickable`] or [`C64::run_frame`] and reads the
//! completed frame from [`C64::stable_framebuffer`].
//!
//! SID, CIAs, drives and input devices are external collaborators; they
//! reach the core through the interrupt source lines, the VIC bank
//! input and the expansion port traits.

mod bus;
mod c64;
mod config;
mod expansion;
mod memory;
mod palette;
mod pixel;
mod pport;
mod vic;

pub use bus::C64Bus;
pub use c64::C64;
pub use config::{C64Config, Model, TimingSpec};
pub use expansion::{Cartridge, CartridgeMode, ExpansionPort};
pub use memory::C64Memory;
pub use palette::PALETTE;
pub use pport::ProcessorPort;
pub use vic::{Phi1Out, Vic};
