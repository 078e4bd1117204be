//! Top-level C64 system.
//!
//! The machine advances one master clock per `tick()`, driving the
//! subsystems in a fixed order:
//!
//! 1. VIC φ1: fetches, BA/AEC arbitration, delayed-register commit
//! 2. CPU: one micro-op, unless RDY holds it on a read
//! 3. VIC φ2: pixel synthesis, collisions, IRQ resolution
//!
//! BA feeds the CPU's RDY line, and the VIC IRQ output drives the
//! shared IRQ line through its own interrupt source. Other interrupt
//! sources (CIAs, expansion port) belong to external collaborators and
//! are pulled through the same per-source interface.

use log::debug;
use machine_core::{
    Bus, MasterClock, Observable, SnapshotError, SnapshotReader, SnapshotWriter, Snapshotable,
    Tickable, Value,
};
use mos_6510::{IntSource, Mos6510};

use crate::bus::C64Bus;
use crate::config::{C64Config, Model};
use crate::memory::C64Memory;
use crate::vic::Vic;

/// Snapshot magic bytes.
const SNAPSHOT_MAGIC: &[u8; 4] = b"C64S";

/// Snapshot format version. The wire layout is not a stable interface.
const SNAPSHOT_VERSION: u8 = 1;

/// C64 system.
pub struct C64 {
    cpu: Mos6510,
    bus: C64Bus,
    model: Model,
    /// Master clock: counts CPU cycles since poweron.
    master_clock: u64,
    /// Completed frame counter.
    frame_count: u64,
}

impl C64 {
    /// Create a new machine from the given configuration and reset it.
    ///
    /// # Panics
    ///
    /// Panics if the ROM images have the wrong sizes.
    #[must_use]
    pub fn new(config: &C64Config) -> Self {
        let memory = C64Memory::new(&config.kernal_rom, &config.basic_rom, &config.char_rom);
        let vic = Vic::new(config.model);
        let mut bus = C64Bus::new(memory, vic);

        let mut cpu = Mos6510::new();
        cpu.reset(&mut bus);
        debug!(target: "c64", "reset, PC={:#06X}", cpu.regs.pc);

        Self {
            cpu,
            bus,
            model: config.model,
            master_clock: 0,
            frame_count: 0,
        }
    }

    /// Hard reset: poweron RAM pattern, cleared chip state, PC from the
    /// reset vector.
    pub fn reset(&mut self) {
        self.bus.memory.reset();
        self.bus.vic.reset();
        self.cpu.reset(&mut self.bus);
        debug!(target: "c64", "reset, PC={:#06X}", self.cpu.regs.pc);
    }

    /// Run until the VIC signals end of frame. Returns the number of
    /// cycles executed.
    pub fn run_frame(&mut self) -> u64 {
        let start = self.master_clock;
        loop {
            self.tick();
            if self.bus.vic.take_frame_complete() {
                break;
            }
        }
        self.master_clock - start
    }

    // ------------------------------------------------------------------
    // Host-facing frame API
    // ------------------------------------------------------------------

    /// The completed, renderer-visible frame (ARGB32).
    #[must_use]
    pub fn stable_framebuffer(&self) -> &[u32] {
        self.bus.vic.stable_framebuffer()
    }

    /// Frame dimensions in pixels: (width, height).
    #[must_use]
    pub fn frame_size(&self) -> (usize, usize) {
        (self.model.pixels_per_line(), self.model.raster_lines())
    }

    /// The master clock this machine ticks at; hosts use it to pace
    /// `tick_n` against wall time.
    #[must_use]
    pub fn clock(&self) -> MasterClock {
        self.model.clock()
    }

    // ------------------------------------------------------------------
    // Collaborator input lines
    // ------------------------------------------------------------------

    /// Pull the IRQ line down for an external source.
    pub fn pull_down_irq(&mut self, source: IntSource) {
        self.cpu.pull_down_irq(source);
    }

    /// Release an external source's IRQ pull-down.
    pub fn release_irq(&mut self, source: IntSource) {
        self.cpu.release_irq(source);
    }

    /// Pull the NMI line down for an external source.
    pub fn pull_down_nmi(&mut self, source: IntSource) {
        self.cpu.pull_down_nmi(source);
    }

    /// Release an external source's NMI pull-down.
    pub fn release_nmi(&mut self, source: IntSource) {
        self.cpu.release_nmi(source);
    }

    /// Select the VIC bank. The value is the already-inverted CIA2 port
    /// A low bits, supplied by the CIA collaborator.
    pub fn set_vic_bank(&mut self, bank: u8) {
        self.bus.vic.set_bank(bank);
    }

    // ------------------------------------------------------------------
    // Access for collaborators, tests and tools
    // ------------------------------------------------------------------

    /// Reference to the CPU.
    #[must_use]
    pub fn cpu(&self) -> &Mos6510 {
        &self.cpu
    }

    /// Mutable reference to the CPU.
    pub fn cpu_mut(&mut self) -> &mut Mos6510 {
        &mut self.cpu
    }

    /// Reference to the bus.
    #[must_use]
    pub fn bus(&self) -> &C64Bus {
        &self.bus
    }

    /// Mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut C64Bus {
        &mut self.bus
    }

    /// Master clock tick count.
    #[must_use]
    pub fn master_clock(&self) -> u64 {
        self.master_clock
    }

    /// Completed frame count.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Size in bytes of a snapshot of the current state.
    #[must_use]
    pub fn state_size(&self) -> usize {
        SNAPSHOT_MAGIC.len()
            + 1
            + 16
            + self.cpu.state_size()
            + self.bus.memory.state_size()
            + self.bus.vic.state_size()
    }

    /// Append a snapshot of the whole machine to `buf`.
    pub fn save(&self, buf: &mut Vec<u8>) {
        let mut w = SnapshotWriter::new(self.state_size());
        w.put_bytes(SNAPSHOT_MAGIC);
        w.put_u8(SNAPSHOT_VERSION);
        w.put_u64(self.master_clock);
        w.put_u64(self.frame_count);
        self.cpu.save(&mut w);
        self.bus.memory.save(&mut w);
        self.bus.vic.save(&mut w);
        debug_assert_eq!(w.len(), self.state_size());
        buf.extend_from_slice(&w.into_bytes());
    }

    /// Restore the machine from a snapshot produced by `save`.
    ///
    /// # Errors
    ///
    /// Returns a `SnapshotError` when the buffer is not a snapshot of a
    /// compatible build; the machine state is unspecified afterwards
    /// and should be `reset()`.
    pub fn load(&mut self, buf: &[u8]) -> Result<(), SnapshotError> {
        let mut r = SnapshotReader::new(buf);
        let mut magic = [0u8; 4];
        r.get_bytes(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = r.get_u8()?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::BadVersion(version));
        }
        self.master_clock = r.get_u64()?;
        self.frame_count = r.get_u64()?;
        self.cpu.load(&mut r)?;
        self.bus.memory.load(&mut r)?;
        self.bus.vic.load(&mut r)?;
        Ok(())
    }
}

impl Tickable for C64 {
    fn tick(&mut self) {
        self.master_clock += 1;

        // φ1: VIC fetches and bus arbitration. The CPU's PC feeds the
        // open-bus colour value of blocked c-accesses.
        let pc = self.cpu.regs.pc;
        let out = self.bus.vic.phi1(&self.bus.memory, pc);

        // BA → RDY, VIC IRQ → shared IRQ line
        self.cpu.set_rdy(!out.ba_low);
        if out.irq {
            self.cpu.pull_down_irq(IntSource::Vic);
        } else {
            self.cpu.release_irq(IntSource::Vic);
        }

        // CPU: one micro-op (a stalled read repeats)
        self.cpu.tick(&mut self.bus);

        // φ2: pixels, collisions, counters
        if self.bus.vic.phi2() {
            self.frame_count += 1;
        }
    }
}

impl Observable for C64 {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("vic.") {
            match rest {
                "line" => Some(self.bus.vic.raster_line().into()),
                "cycle" => Some(self.bus.vic.raster_cycle().into()),
                "bad_line" => Some(self.bus.vic.is_bad_line().into()),
                "ba" => Some(self.bus.vic.ba_low().into()),
                "frames" => Some(self.bus.vic.frames().into()),
                "bank" => Some(self.bus.vic.bank().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let addr = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))
            {
                u16::from_str_radix(hex, 16).ok()
            } else if let Some(hex) = rest.strip_prefix('$') {
                u16::from_str_radix(hex, 16).ok()
            } else {
                rest.parse().ok()
            };
            addr.map(|a| Value::U8(self.bus.peek(a)))
        } else {
            match path {
                "master_clock" => Some(self.master_clock.into()),
                "frame_count" => Some(self.frame_count.into()),
                _ => self.cpu.query(path),
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<6510 paths>",
            "vic.line",
            "vic.cycle",
            "vic.bad_line",
            "vic.ba",
            "vic.frames",
            "vic.bank",
            "memory.<address>",
            "master_clock",
            "frame_count",
        ]
    }
}
