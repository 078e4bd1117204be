//! 6510 processor port.
//!
//! The port lives at $0000 (data direction) and $0001 (data) and drives
//! the memory banking lines LORAM, LOHIRAM and CHAREN. Undriven input
//! bits float high through pull-up resistors; the cassette lines on bits
//! 3-5 are not modelled beyond the pull-up value.

use machine_core::{SnapshotError, SnapshotReader, SnapshotWriter, Snapshotable};

/// Pull-up value seen on undriven port lines.
const PULL_UPS: u8 = 0x37;

/// The 6510 on-chip I/O port.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorPort {
    /// Data direction register ($0000). 1 = output.
    ddr: u8,
    /// Data register ($0001).
    data: u8,
}

impl Default for ProcessorPort {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorPort {
    /// Poweron state: banking bits driven, all ROMs and I/O visible.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ddr: 0x2F,
            data: 0x37,
        }
    }

    /// Read $0000.
    #[must_use]
    pub fn read_direction(&self) -> u8 {
        self.ddr
    }

    /// Read $0001: output bits from the data register, input bits from
    /// the external pull-ups.
    #[must_use]
    pub fn read_data(&self) -> u8 {
        (self.data & self.ddr) | (PULL_UPS & !self.ddr)
    }

    /// Write $0000.
    pub fn write_direction(&mut self, value: u8) {
        self.ddr = value;
    }

    /// Write $0001.
    pub fn write_data(&mut self, value: u8) {
        self.data = value;
    }

    /// Effective banking value as the PLA sees it.
    #[must_use]
    fn effective(&self) -> u8 {
        (self.data & self.ddr) | (PULL_UPS & !self.ddr)
    }

    /// LORAM (bit 0): BASIC ROM visible when set.
    #[must_use]
    pub fn loram(&self) -> bool {
        self.effective() & 0x01 != 0
    }

    /// HIRAM: Kernal ROM visible when set.
    #[must_use]
    pub fn hiram(&self) -> bool {
        self.effective() & 0x02 != 0
    }

    /// CHAREN: I/O visible when set, character ROM when clear.
    #[must_use]
    pub fn charen(&self) -> bool {
        self.effective() & 0x04 != 0
    }
}

impl Snapshotable for ProcessorPort {
    fn state_size(&self) -> usize {
        2
    }

    fn save(&self, w: &mut SnapshotWriter) {
        w.put_u8(self.ddr);
        w.put_u8(self.data);
    }

    fn load(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.ddr = r.get_u8()?;
        self.data = r.get_u8()?;
        Ok(())
    }
}
