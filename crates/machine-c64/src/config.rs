//! C64 configuration: model selection, timing tables, ROM images.

use machine_core::MasterClock;

/// C64 model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    /// PAL C64 (6569 VIC-II, 985,248 Hz CPU).
    Pal,
    /// NTSC C64 (6567R8 VIC-II, 1,022,727 Hz CPU).
    Ntsc,
}

/// Per-model timing constants.
///
/// Everything the sequencer needs to know about the video standard is
/// kept in one table so that PAL and NTSC share a single code path.
#[derive(Debug, Clone, Copy)]
pub struct TimingSpec {
    /// CPU cycles per raster line.
    pub cycles_per_line: u8,
    /// Raster lines per frame.
    pub lines_per_frame: u16,
    /// CPU clock in Hz.
    pub cpu_frequency: u32,
    /// Cycle (1-based) of the sprite pointer fetch for each sprite.
    /// Sprites 3-7 fetch at the start of the line, 0-2 at the end.
    pub sprite_ptr_cycles: [u8; 8],
    /// Whether colour register writes show the gray-dot glitch
    /// (6569R1 silicon).
    pub gray_dot_bug: bool,
}

impl Model {
    /// Timing table for this model.
    #[must_use]
    pub const fn spec(self) -> TimingSpec {
        match self {
            Model::Pal => TimingSpec {
                cycles_per_line: 63,
                lines_per_frame: 312,
                cpu_frequency: 985_248,
                sprite_ptr_cycles: [58, 60, 62, 1, 3, 5, 7, 9],
                gray_dot_bug: true,
            },
            Model::Ntsc => TimingSpec {
                cycles_per_line: 65,
                lines_per_frame: 263,
                cpu_frequency: 1_022_727,
                sprite_ptr_cycles: [60, 62, 64, 1, 3, 5, 7, 9],
                gray_dot_bug: false,
            },
        }
    }

    /// Master clock for this model (the CPU clock; everything in the
    /// core ticks at this rate).
    #[must_use]
    pub const fn clock(self) -> MasterClock {
        MasterClock::new(self.spec().cpu_frequency as u64)
    }

    /// Pixels per raster line (eight per cycle).
    #[must_use]
    pub const fn pixels_per_line(self) -> usize {
        self.spec().cycles_per_line as usize * 8
    }

    /// Raster lines per frame.
    #[must_use]
    pub const fn raster_lines(self) -> usize {
        self.spec().lines_per_frame as usize
    }
}

/// Configuration for constructing a C64 instance.
pub struct C64Config {
    /// Model variant.
    pub model: Model,
    /// Kernal ROM (8,192 bytes).
    pub kernal_rom: Vec<u8>,
    /// BASIC ROM (8,192 bytes).
    pub basic_rom: Vec<u8>,
    /// Character ROM (4,096 bytes).
    pub char_rom: Vec<u8>,
}
