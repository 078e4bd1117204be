//! VIC-II 6569/6567 video chip.
//!
//! The sequencer runs one raster line as a fixed schedule of cycles
//! (63 PAL, 65 NTSC), each with a fetch purpose from the published
//! chip-cycle map: sprite pointer/data fetches at the line edges, DRAM
//! refresh in 11-15, c-accesses in 15-54 on bad lines and g-accesses in
//! 16-55. Every cycle has a φ1 half (fetches, BA, register commit) and
//! a φ2 half (pixel synthesis, collisions, IRQ resolution); the CPU
//! executes between the two.
//!
//! Registers that the pixel engine reads mid-line are held as a
//! current/delayed pair with a single commit point per cycle, so a CPU
//! write becomes visible exactly one cycle later. IRQ line changes are
//! likewise delayed by one cycle.

use log::trace;
use machine_core::{Delayed, SnapshotError, SnapshotReader, SnapshotWriter, Snapshotable};

use crate::config::{Model, TimingSpec};
use crate::memory::C64Memory;
use crate::pixel::{CycleResult, DrawContext, GAccess, PixelEngine};

/// IRR/IMR bit: raster compare.
const IRQ_RASTER: u8 = 0x01;
/// IRR/IMR bit: sprite-background collision.
const IRQ_SPRITE_BACKGROUND: u8 = 0x02;
/// IRR/IMR bit: sprite-sprite collision.
const IRQ_SPRITE_SPRITE: u8 = 0x04;

/// Colour register slots (offset from $D020).
pub(crate) const COL_BORDER: usize = 0;
pub(crate) const COL_BG0: usize = 1;
pub(crate) const COL_SPR_MC0: usize = 5;
pub(crate) const COL_SPR_MC1: usize = 6;
pub(crate) const COL_SPR0: usize = 7;

/// The registers that participate in mid-line timing, kept as a
/// current/delayed pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct VicRegs {
    /// Sprite X coordinates (9 bit).
    pub spr_x: [u16; 8],
    /// Sprite Y coordinates.
    pub spr_y: [u8; 8],
    /// Control register 1 ($D011): RST8, ECM, BMM, DEN, RSEL, YSCROLL.
    pub ctrl1: u8,
    /// Control register 2 ($D016): MCM, CSEL, XSCROLL.
    pub ctrl2: u8,
    /// Sprite enable mask ($D015).
    pub spr_enable: u8,
    /// Sprite Y expansion mask ($D017).
    pub spr_expand_y: u8,
    /// Sprite X expansion mask ($D01D).
    pub spr_expand_x: u8,
    /// Sprite priority mask ($D01B). Set = behind foreground.
    pub spr_priority: u8,
    /// Sprite multicolour mask ($D01C).
    pub spr_mc: u8,
    /// Colour registers $D020-$D02E (low nibbles).
    pub colors: [u8; 15],
}

/// φ1 outputs wired to the CPU by the machine.
#[derive(Debug, Clone, Copy)]
pub struct Phi1Out {
    /// BA line state; low stalls CPU reads via RDY.
    pub ba_low: bool,
    /// IRQ line state towards the CPU.
    pub irq: bool,
}

/// The VIC-II chip.
pub struct Vic {
    model: Model,
    spec: TimingSpec,

    /// Timed register pair. Writers hit `pending`, the pixel engine
    /// reads the committed side.
    reg: Delayed<VicRegs>,
    /// Memory pointers ($D018).
    mem_select: u8,
    /// Interrupt request register ($D019), low four bits.
    irr: u8,
    /// Interrupt mask register ($D01A), low four bits.
    imr: u8,
    /// Raster compare value ($D012 + RST8).
    raster_compare: u16,
    /// Latched light pen position (input devices are collaborators;
    /// the latches only serve readback).
    lp_x: u8,
    lp_y: u8,

    /// Current raster line.
    y: u16,
    /// Current cycle within the line, 1-based.
    cycle: u8,
    /// Video counter and its line-start base.
    vc: u16,
    vc_base: u16,
    /// Row counter within the character cell.
    rc: u8,
    /// Video matrix line index.
    vmli: usize,
    /// Display (true) vs idle (false) state.
    display_state: bool,
    /// Bad-line condition, re-evaluated every cycle.
    bad_line: bool,
    /// DEN was seen set during some cycle of line $30.
    den_seen_in_30: bool,

    /// Character codes fetched by the c-accesses of the current row.
    video_matrix: [u8; 40],
    /// Colour nibbles fetched alongside.
    color_line: [u8; 40],

    /// BA output and how long it has been held low.
    ba_low: bool,
    ba_low_cycles: u32,

    /// Sprite DMA-on mask.
    spr_dma: u8,
    /// Sprite display-on mask.
    spr_display: u8,
    /// Sprite Y-expansion flip-flops.
    spr_exp_ff: u8,
    /// Sprite data counters and their line-start bases.
    spr_mc: [u8; 8],
    spr_mc_base: [u8; 8],
    /// Sprite data pointers (shifted left 6).
    spr_ptr: [u16; 8],

    /// One-cycle-delayed IRQ line transitions.
    raise_irq_next: bool,
    release_irq_next: bool,
    irq_out: bool,

    /// g-access pipeline: the result drawn in a cycle is the fetch of
    /// the previous cycle.
    g_access: Delayed<GAccess>,

    /// Collision registers ($D01E/$D01F), clear-on-read.
    sprite_sprite_collision: u8,
    sprite_background_collision: u8,

    /// VIC bank (inverted CIA2 PA0/1).
    bank: u8,
    /// Gray-dot glitch enable.
    gray_dot_enabled: bool,
    /// Colour slots written during the current cycle.
    gray_dot_mask: u16,

    pixel: PixelEngine,
    frame_complete: bool,
    frames: u64,
}

impl Vic {
    #[must_use]
    pub fn new(model: Model) -> Self {
        let spec = model.spec();
        Self {
            model,
            spec,
            reg: Delayed::new(VicRegs::default()),
            mem_select: 0,
            irr: 0,
            imr: 0,
            raster_compare: 0,
            lp_x: 0,
            lp_y: 0,
            y: 0,
            cycle: 1,
            vc: 0,
            vc_base: 0,
            rc: 0,
            vmli: 0,
            display_state: false,
            bad_line: false,
            den_seen_in_30: false,
            video_matrix: [0; 40],
            color_line: [0; 40],
            ba_low: false,
            ba_low_cycles: 0,
            spr_dma: 0,
            spr_display: 0,
            spr_exp_ff: 0xFF,
            spr_mc: [0; 8],
            spr_mc_base: [0; 8],
            spr_ptr: [0; 8],
            raise_irq_next: false,
            release_irq_next: false,
            irq_out: false,
            g_access: Delayed::new(GAccess::default()),
            sprite_sprite_collision: 0,
            sprite_background_collision: 0,
            bank: 0,
            gray_dot_enabled: spec.gray_dot_bug,
            gray_dot_mask: 0,
            pixel: PixelEngine::new(model.pixels_per_line(), model.raster_lines()),
            frame_complete: false,
            frames: 0,
        }
    }

    /// Reset the chip. Registers clear, counters clear, both screen
    /// buffers revert to the debug pattern.
    pub fn reset(&mut self) {
        self.reg = Delayed::new(VicRegs::default());
        self.mem_select = 0;
        self.irr = 0;
        self.imr = 0;
        self.raster_compare = 0;
        self.y = 0;
        self.cycle = 1;
        self.vc = 0;
        self.vc_base = 0;
        self.rc = 0;
        self.vmli = 0;
        self.display_state = false;
        self.bad_line = false;
        self.den_seen_in_30 = false;
        self.video_matrix = [0; 40];
        self.color_line = [0; 40];
        self.ba_low = false;
        self.ba_low_cycles = 0;
        self.spr_dma = 0;
        self.spr_display = 0;
        self.spr_exp_ff = 0xFF;
        self.spr_mc = [0; 8];
        self.spr_mc_base = [0; 8];
        self.spr_ptr = [0; 8];
        self.raise_irq_next = false;
        self.release_irq_next = false;
        self.irq_out = false;
        self.g_access = Delayed::new(GAccess::default());
        self.sprite_sprite_collision = 0;
        self.sprite_background_collision = 0;
        self.gray_dot_mask = 0;
        self.frame_complete = false;
        self.pixel.reset();
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current raster line.
    #[must_use]
    pub fn raster_line(&self) -> u16 {
        self.y
    }

    /// Current cycle within the line (1-based).
    #[must_use]
    pub fn raster_cycle(&self) -> u8 {
        self.cycle
    }

    /// Whether the current line meets the bad-line condition.
    #[must_use]
    pub fn is_bad_line(&self) -> bool {
        self.bad_line
    }

    /// BA line state.
    #[must_use]
    pub fn ba_low(&self) -> bool {
        self.ba_low
    }

    /// Completed frame count.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Video model.
    #[must_use]
    pub fn model(&self) -> Model {
        self.model
    }

    /// The stable (completed) framebuffer.
    #[must_use]
    pub fn stable_framebuffer(&self) -> &[u32] {
        self.pixel.stable_framebuffer()
    }

    /// Check and clear the frame-complete flag.
    pub fn take_frame_complete(&mut self) -> bool {
        let complete = self.frame_complete;
        self.frame_complete = false;
        complete
    }

    /// Select the VIC bank (already-inverted CIA2 PA0/1 value).
    pub fn set_bank(&mut self, bank: u8) {
        self.bank = bank & 0x03;
    }

    /// Current VIC bank.
    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// Enable or disable the 6569R1 gray-dot glitch.
    pub fn set_gray_dot_bug(&mut self, enabled: bool) {
        self.gray_dot_enabled = enabled;
    }

    // ------------------------------------------------------------------
    // φ1: fetches, BA, register commit
    // ------------------------------------------------------------------

    /// First clock phase. `cpu_pc` feeds the open-bus colour value of a
    /// blocked c-access.
    pub fn phi1(&mut self, mem: &C64Memory, cpu_pc: u16) -> Phi1Out {
        // Scheduled IRQ line changes from the previous cycle
        if self.raise_irq_next {
            self.irq_out = true;
            self.raise_irq_next = false;
        }
        if self.release_irq_next {
            self.irq_out = false;
            self.release_irq_next = false;
        }

        let cycle = self.cycle;

        // Raster compare fires at cycle 1, except on line 0 where the
        // comparison happens one cycle later
        if (cycle == 1 && self.y != 0) || (cycle == 2 && self.y == 0) {
            if self.y == self.raster_compare {
                self.trigger_irq(IRQ_RASTER);
            }
        }

        // DEN seen at any cycle of line $30 arms the display for the frame
        if self.y == 0x30 && self.reg.pending().ctrl1 & 0x10 != 0 {
            self.den_seen_in_30 = true;
        }

        self.update_bad_line();
        if self.bad_line {
            self.display_state = true;
        }

        self.run_sprite_unit(cycle);
        self.update_ba(cycle);

        // Move last cycle's g-access into the visible slot
        self.g_access.commit();
        self.g_access.write(GAccess::default());

        self.run_fetches(mem, cpu_pc, cycle);

        if cycle == 14 {
            self.vc = self.vc_base;
            self.vmli = 0;
            if self.bad_line {
                self.rc = 0;
            }
        }

        if cycle == 58 {
            if self.rc == 7 {
                self.display_state = false;
                self.vc_base = self.vc;
            }
            if self.bad_line {
                self.display_state = true;
            }
            if self.display_state {
                self.rc = (self.rc + 1) & 0x07;
            }
        }

        // Single commit point: CPU writes from the previous cycle become
        // visible to the pixel engine now
        self.reg.commit();

        Phi1Out {
            ba_low: self.ba_low,
            irq: self.irq_out,
        }
    }

    /// Bad line: upper border limit, YSCROLL match, DEN armed.
    fn update_bad_line(&mut self) {
        let yscroll = u16::from(self.reg.pending().ctrl1 & 0x07);
        self.bad_line = (0x30..=0xF7).contains(&self.y)
            && (self.y & 0x07) == yscroll
            && self.den_seen_in_30;
    }

    /// Sprite unit rules tied to fixed cycles of the line.
    fn run_sprite_unit(&mut self, cycle: u8) {
        let regs = self.reg.pending();

        match cycle {
            15 => {
                // Expansion flip-flop advances the base counter ahead of
                // the upcoming data fetches
                for n in 0..8 {
                    if self.spr_exp_ff & (1 << n) != 0 {
                        self.spr_mc_base[n] = (self.spr_mc_base[n] + 2) & 0x3F;
                    }
                }
            }
            16 => {
                for n in 0..8 {
                    let bit = 1 << n;
                    if self.spr_exp_ff & bit != 0 {
                        self.spr_mc_base[n] = (self.spr_mc_base[n] + 1) & 0x3F;
                    }
                    if self.spr_mc_base[n] == 63 {
                        self.spr_dma &= !bit;
                    }
                }
            }
            55 => {
                // Y-expansion flip-flops invert, then the first DMA-on check
                self.spr_exp_ff ^= regs.spr_expand_y;
                self.check_sprite_dma(&regs);
            }
            56 => {
                self.check_sprite_dma(&regs);
            }
            58 => {
                for n in 0..8 {
                    let bit = 1 << n;
                    self.spr_mc[n] = self.spr_mc_base[n];
                    if self.spr_dma & bit != 0 {
                        if regs.spr_y[n] == (self.y & 0xFF) as u8 {
                            self.spr_display |= bit;
                        }
                    } else {
                        self.spr_display &= !bit;
                    }
                }
            }
            _ => {}
        }
    }

    /// Rule 3: enabled sprite whose Y matches turns its DMA on.
    fn check_sprite_dma(&mut self, regs: &VicRegs) {
        for n in 0..8 {
            let bit = 1 << n;
            if regs.spr_enable & bit != 0
                && regs.spr_y[n] == (self.y & 0xFF) as u8
                && self.spr_dma & bit == 0
            {
                self.spr_dma |= bit;
                self.spr_mc_base[n] = 0;
                if regs.spr_expand_y & bit != 0 {
                    self.spr_exp_ff &= !bit;
                }
            }
        }
    }

    /// BA: low for the c-access window on bad lines and around each
    /// DMA-active sprite's fetches.
    fn update_ba(&mut self, cycle: u8) {
        let mut low = self.bad_line && (12..=54).contains(&cycle);

        for n in 0..8 {
            if self.spr_dma & (1 << n) != 0 && self.sprite_ba_window(n, cycle) {
                low = true;
            }
        }

        self.ba_low = low;
        if low {
            self.ba_low_cycles += 1;
        } else {
            self.ba_low_cycles = 0;
        }
    }

    /// Is `cycle` inside sprite `n`'s BA window [p-3, p+1]?
    fn sprite_ba_window(&self, n: usize, cycle: u8) -> bool {
        let len = i16::from(self.spec.cycles_per_line);
        let p = i16::from(self.spec.sprite_ptr_cycles[n]);
        let rel = (i16::from(cycle) - (p - 3)).rem_euclid(len);
        (0..=4).contains(&rel)
    }

    /// The cycle's scheduled memory accesses.
    fn run_fetches(&mut self, mem: &C64Memory, cpu_pc: u16, cycle: u8) {
        // Sprite pointer + data fetches
        for n in 0..8 {
            let p = self.spec.sprite_ptr_cycles[n];
            if cycle == p {
                self.p_access(mem, n);
                self.s_access(mem, n, 0);
            } else if cycle == p + 1 {
                self.s_access(mem, n, 1);
                self.s_access(mem, n, 2);
                self.pixel.load_sprite_sr(n);
            }
        }

        // Graphics fetch first: it consumes the video matrix slot the
        // φ2 c-access of this cycle will then refill
        if (16..=55).contains(&cycle) {
            self.g_fetch(mem);
        }

        // Character/colour fetches on bad lines
        if (15..=54).contains(&cycle) && self.bad_line {
            self.c_access(mem, cpu_pc);
        }
    }

    /// c-access: video matrix + colour RAM, valid only once BA has been
    /// held low for three cycles. Before that the bus is still owned by
    /// the CPU and the chip sees $FF and the low nibble of the opcode
    /// at the CPU's PC.
    fn c_access(&mut self, mem: &C64Memory, cpu_pc: u16) {
        if self.ba_low_cycles >= 3 {
            let addr = (u16::from(self.mem_select & 0xF0) << 6) | self.vc;
            self.video_matrix[self.vmli] = mem.vic_read(self.bank, addr);
            self.color_line[self.vmli] = mem.color_ram_read(self.vc);
        } else {
            self.video_matrix[self.vmli] = 0xFF;
            self.color_line[self.vmli] = mem.ram_read(cpu_pc) & 0x0F;
        }
    }

    /// g-access: character generator or bitmap fetch in display state,
    /// $3FFF ($39FF under ECM) in idle state.
    fn g_fetch(&mut self, mem: &C64Memory) {
        let delayed = self.reg.get();
        let ecm = delayed.ctrl1 & 0x40 != 0;
        let bmm = delayed.ctrl1 & 0x20 != 0;

        if self.display_state {
            debug_assert!(self.vmli < 40);
            let character = self.video_matrix[self.vmli % 40];
            let color = self.color_line[self.vmli % 40];

            let mut addr = if bmm {
                (u16::from(self.mem_select & 0x08) << 10) | (self.vc << 3) | u16::from(self.rc)
            } else {
                (u16::from(self.mem_select & 0x0E) << 10)
                    | (u16::from(character) << 3)
                    | u16::from(self.rc)
            };
            if ecm {
                addr &= 0xF9FF;
            }

            let data = mem.vic_read(self.bank, addr);
            self.g_access.write(GAccess {
                data,
                character,
                color,
                valid: true,
            });

            self.vc = (self.vc + 1) & 0x3FF;
            self.vmli = (self.vmli + 1) & 0x3F;
        } else {
            let addr = if ecm { 0x39FF } else { 0x3FFF };
            let data = mem.vic_read(self.bank, addr);
            self.g_access.write(GAccess {
                data,
                character: 0,
                color: 0,
                valid: true,
            });
        }
    }

    /// p-access: sprite data pointer from the end of the video matrix.
    fn p_access(&mut self, mem: &C64Memory, n: usize) {
        let addr = (u16::from(self.mem_select & 0xF0) << 6) | 0x03F8 | n as u16;
        self.spr_ptr[n] = u16::from(mem.vic_read(self.bank, addr)) << 6;
    }

    /// s-access: one sprite data chunk. With DMA off (or BA not held
    /// long enough) the chip performs an idle read instead and the
    /// shift register chunk stays empty.
    fn s_access(&mut self, mem: &C64Memory, n: usize, chunk: u8) {
        let data = if self.spr_dma & (1 << n) != 0 {
            let value = if self.ba_low_cycles >= 3 {
                mem.vic_read(self.bank, self.spr_ptr[n] | u16::from(self.spr_mc[n]))
            } else {
                let _ = mem.vic_read(self.bank, 0x3FFF);
                0x00
            };
            self.spr_mc[n] = (self.spr_mc[n] + 1) & 0x3F;
            value
        } else {
            let _ = mem.vic_read(self.bank, 0x3FFF);
            0x00
        };
        self.pixel.set_sprite_chunk(n, chunk, data);
    }

    // ------------------------------------------------------------------
    // φ2: pixel synthesis, collisions, counters
    // ------------------------------------------------------------------

    /// Second clock phase. Returns true at the end of a frame.
    pub fn phi2(&mut self) -> bool {
        let delayed = self.reg.get();
        let ctx = DrawContext {
            regs: &delayed,
            y: self.y,
            x_base: self.x_counter(),
            g: self.g_access.get(),
            spr_display: self.spr_display,
            gray_dot: self.gray_dot_mask,
        };
        let result = self.pixel.draw_cycle(&ctx);
        self.gray_dot_mask = 0;

        self.merge_collisions(result);

        let mut frame_done = false;
        if self.cycle == self.spec.cycles_per_line {
            // Vertical border flip-flop rules at the end of the line
            let rsel = delayed.ctrl1 & 0x08 != 0;
            let den = delayed.ctrl1 & 0x10 != 0;
            self.pixel.update_vertical_ff(self.y, rsel, den);

            self.cycle = 1;
            self.y += 1;
            if self.y == self.spec.lines_per_frame {
                self.y = 0;
                self.vc_base = 0;
                self.den_seen_in_30 = false;
                self.pixel.end_frame();
                self.frame_complete = true;
                frame_done = true;
                self.frames += 1;
                trace!(target: "vic", "frame {} complete", self.frames);
            }
        } else {
            self.cycle += 1;
        }

        frame_done
    }

    /// X counter of the first pixel of the current cycle. Cycle 14 is
    /// X = 0; earlier cycles wrap around the end of the line.
    fn x_counter(&self) -> u16 {
        let width = i32::from(self.spec.cycles_per_line) * 8;
        ((i32::from(self.cycle) - 14) * 8).rem_euclid(width) as u16
    }

    /// Fold new collision bits into the registers; a 0 to nonzero
    /// transition raises the matching interrupt.
    fn merge_collisions(&mut self, result: CycleResult) {
        if result.sprite_sprite != 0 {
            if self.sprite_sprite_collision == 0 {
                self.trigger_irq(IRQ_SPRITE_SPRITE);
            }
            self.sprite_sprite_collision |= result.sprite_sprite;
        }
        if result.sprite_background != 0 {
            if self.sprite_background_collision == 0 {
                self.trigger_irq(IRQ_SPRITE_BACKGROUND);
            }
            self.sprite_background_collision |= result.sprite_background;
        }
    }

    /// Set an IRR bit; assert the CPU line one cycle later if unmasked.
    fn trigger_irq(&mut self, bit: u8) {
        self.irr |= bit;
        if self.irr & self.imr != 0 {
            self.raise_irq_next = true;
        }
    }

    // ------------------------------------------------------------------
    // Register file
    // ------------------------------------------------------------------

    /// CPU read of register `reg` (0-63). $D01E/$D01F clear on read.
    pub fn read(&mut self, reg: u8) -> u8 {
        let value = match reg & 0x3F {
            0x1E => {
                let value = self.sprite_sprite_collision;
                self.sprite_sprite_collision = 0;
                value
            }
            0x1F => {
                let value = self.sprite_background_collision;
                self.sprite_background_collision = 0;
                value
            }
            r => self.peek(r),
        };
        trace!(target: "vic::reg", "read {reg:#04X} = {value:#04X}");
        value
    }

    /// Side-effect-free register read, with the documented readback
    /// masks (unused bits return 1).
    #[must_use]
    pub fn peek(&self, reg: u8) -> u8 {
        let cur = self.reg.pending();
        match reg & 0x3F {
            r @ (0x00 | 0x02 | 0x04 | 0x06 | 0x08 | 0x0A | 0x0C | 0x0E) => {
                (cur.spr_x[usize::from(r) >> 1] & 0xFF) as u8
            }
            r @ (0x01 | 0x03 | 0x05 | 0x07 | 0x09 | 0x0B | 0x0D | 0x0F) => {
                cur.spr_y[usize::from(r) >> 1]
            }
            0x10 => {
                let mut bits = 0u8;
                for n in 0..8 {
                    if cur.spr_x[n] & 0x100 != 0 {
                        bits |= 1 << n;
                    }
                }
                bits
            }
            0x11 => (cur.ctrl1 & 0x7F) | if self.y > 0xFF { 0x80 } else { 0 },
            0x12 => (self.y & 0xFF) as u8,
            0x13 => self.lp_x,
            0x14 => self.lp_y,
            0x15 => cur.spr_enable,
            0x16 => cur.ctrl2 | 0xC0,
            0x17 => cur.spr_expand_y,
            0x18 => self.mem_select | 0x01,
            0x19 => {
                if self.irr & self.imr != 0 {
                    self.irr | 0xF0
                } else {
                    self.irr | 0x70
                }
            }
            0x1A => self.imr | 0xF0,
            0x1B => cur.spr_priority,
            0x1C => cur.spr_mc,
            0x1D => cur.spr_expand_x,
            0x1E => self.sprite_sprite_collision,
            0x1F => self.sprite_background_collision,
            r @ 0x20..=0x2E => cur.colors[usize::from(r) - 0x20] | 0xF0,
            // $D02F-$D03F are open bus
            _ => 0xFF,
        }
    }

    /// CPU write of register `reg` (0-63).
    pub fn write(&mut self, reg: u8, value: u8) {
        trace!(target: "vic::reg", "write {reg:#04X} = {value:#04X}");
        let mut cur = self.reg.pending();
        match reg & 0x3F {
            r @ (0x00 | 0x02 | 0x04 | 0x06 | 0x08 | 0x0A | 0x0C | 0x0E) => {
                let n = usize::from(r) >> 1;
                cur.spr_x[n] = (cur.spr_x[n] & 0x100) | u16::from(value);
            }
            r @ (0x01 | 0x03 | 0x05 | 0x07 | 0x09 | 0x0B | 0x0D | 0x0F) => {
                cur.spr_y[usize::from(r) >> 1] = value;
            }
            0x10 => {
                for n in 0..8 {
                    cur.spr_x[n] = (cur.spr_x[n] & 0xFF) | (u16::from(value >> n) & 0x01) << 8;
                }
            }
            0x11 => {
                cur.ctrl1 = value;
                let compare = (self.raster_compare & 0xFF) | (u16::from(value & 0x80) << 1);
                if compare != self.raster_compare {
                    self.raster_compare = compare;
                    if self.y == self.raster_compare {
                        self.trigger_irq(IRQ_RASTER);
                    }
                }
                if self.y == 0x30 && value & 0x10 != 0 {
                    self.den_seen_in_30 = true;
                }
                self.reg.write(cur);
                self.update_bad_line();
                if self.bad_line {
                    self.display_state = true;
                }
                return;
            }
            0x12 => {
                let compare = (self.raster_compare & 0x100) | u16::from(value);
                if compare != self.raster_compare {
                    self.raster_compare = compare;
                    if self.y == self.raster_compare {
                        self.trigger_irq(IRQ_RASTER);
                    }
                }
                return;
            }
            0x13 | 0x14 => return,
            0x15 => cur.spr_enable = value,
            0x16 => cur.ctrl2 = value,
            0x17 => {
                cur.spr_expand_y = value;
                // The flip flop is set as long as the expansion bit is clear
                self.spr_exp_ff |= !value;
            }
            0x18 => {
                self.mem_select = value;
                return;
            }
            0x19 => {
                // Bits are acknowledged by writing 1
                self.irr &= !value & 0x0F;
                if self.irr & self.imr == 0 {
                    self.release_irq_next = true;
                }
                return;
            }
            0x1A => {
                self.imr = value & 0x0F;
                if self.irr & self.imr != 0 {
                    self.raise_irq_next = true;
                } else {
                    self.release_irq_next = true;
                }
                return;
            }
            0x1B => cur.spr_priority = value,
            0x1C => cur.spr_mc = value,
            0x1D => cur.spr_expand_x = value,
            0x1E | 0x1F => return,
            r @ 0x20..=0x2E => {
                let slot = usize::from(r) - 0x20;
                cur.colors[slot] = value & 0x0F;
                if self.gray_dot_enabled {
                    self.gray_dot_mask |= 1 << slot;
                }
            }
            _ => return,
        }
        self.reg.write(cur);
    }
}

impl Snapshotable for Vic {
    fn state_size(&self) -> usize {
        // One register set: 8 sprite X (u16), 8 sprite Y, 7 control/mask
        // bytes, 15 colours
        const REGS: usize = 16 + 8 + 7 + 15;
        REGS * 2            // current + delayed
            + 7             // mem_select, irr, imr, lightpen, gray-dot, reserved
            + 2             // raster compare
            + 3             // y, cycle
            + 6             // vc, vc_base, rc, vmli
            + 3             // display_state, bad_line, den_seen
            + 80            // video matrix + colour line
            + 5             // ba_low + ba_low_cycles
            + 3 + 16 + 16   // sprite unit masks, counters, pointers
            + 3             // irq events + line
            + 8             // g pipeline (2 slots)
            + 2             // collisions
            + 1             // bank
            + 2             // gray-dot mask
            + 9             // frame flag + counter
            + self.pixel.state_size()
    }

    fn save(&self, w: &mut SnapshotWriter) {
        fn put_regs(w: &mut SnapshotWriter, regs: &VicRegs) {
            for &x in &regs.spr_x {
                w.put_u16(x);
            }
            w.put_bytes(&regs.spr_y);
            w.put_u8(regs.ctrl1);
            w.put_u8(regs.ctrl2);
            w.put_u8(regs.spr_enable);
            w.put_u8(regs.spr_expand_y);
            w.put_u8(regs.spr_expand_x);
            w.put_u8(regs.spr_priority);
            w.put_u8(regs.spr_mc);
            w.put_bytes(&regs.colors);
        }

        let pending = self.reg.pending();
        let committed = self.reg.get();
        put_regs(w, &pending);
        put_regs(w, &committed);
        w.put_u8(self.mem_select);
        w.put_u8(self.irr);
        w.put_u8(self.imr);
        w.put_u8(self.lp_x);
        w.put_u8(self.lp_y);
        w.put_bool(self.gray_dot_enabled);
        w.put_u8(0); // reserved
        w.put_u16(self.raster_compare);
        w.put_u16(self.y);
        w.put_u8(self.cycle);
        w.put_u16(self.vc);
        w.put_u16(self.vc_base);
        w.put_u8(self.rc);
        w.put_u8(self.vmli as u8);
        w.put_bool(self.display_state);
        w.put_bool(self.bad_line);
        w.put_bool(self.den_seen_in_30);
        w.put_bytes(&self.video_matrix);
        w.put_bytes(&self.color_line);
        w.put_bool(self.ba_low);
        w.put_u32(self.ba_low_cycles);
        w.put_u8(self.spr_dma);
        w.put_u8(self.spr_display);
        w.put_u8(self.spr_exp_ff);
        w.put_bytes(&self.spr_mc);
        w.put_bytes(&self.spr_mc_base);
        for &ptr in &self.spr_ptr {
            w.put_u16(ptr);
        }
        w.put_bool(self.raise_irq_next);
        w.put_bool(self.release_irq_next);
        w.put_bool(self.irq_out);
        for g in [self.g_access.pending(), self.g_access.get()] {
            w.put_u8(g.data);
            w.put_u8(g.character);
            w.put_u8(g.color);
            w.put_bool(g.valid);
        }
        w.put_u8(self.sprite_sprite_collision);
        w.put_u8(self.sprite_background_collision);
        w.put_u8(self.bank);
        w.put_u16(self.gray_dot_mask);
        w.put_bool(self.frame_complete);
        w.put_u64(self.frames);
        self.pixel.save(w);
    }

    fn load(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        fn get_regs(r: &mut SnapshotReader<'_>) -> Result<VicRegs, SnapshotError> {
            let mut regs = VicRegs::default();
            for x in &mut regs.spr_x {
                *x = r.get_u16()?;
            }
            r.get_bytes(&mut regs.spr_y)?;
            regs.ctrl1 = r.get_u8()?;
            regs.ctrl2 = r.get_u8()?;
            regs.spr_enable = r.get_u8()?;
            regs.spr_expand_y = r.get_u8()?;
            regs.spr_expand_x = r.get_u8()?;
            regs.spr_priority = r.get_u8()?;
            regs.spr_mc = r.get_u8()?;
            r.get_bytes(&mut regs.colors)?;
            Ok(regs)
        }

        let pending = get_regs(r)?;
        let committed = get_regs(r)?;
        self.reg = Delayed::new(committed);
        self.reg.write(pending);
        self.mem_select = r.get_u8()?;
        self.irr = r.get_u8()?;
        self.imr = r.get_u8()?;
        self.lp_x = r.get_u8()?;
        self.lp_y = r.get_u8()?;
        self.gray_dot_enabled = r.get_bool()?;
        let _ = r.get_u8()?;
        self.raster_compare = r.get_u16()?;
        self.y = r.get_u16()?;
        self.cycle = r.get_u8()?;
        self.vc = r.get_u16()?;
        self.vc_base = r.get_u16()?;
        self.rc = r.get_u8()?;
        self.vmli = usize::from(r.get_u8()?) & 0x3F;
        self.display_state = r.get_bool()?;
        self.bad_line = r.get_bool()?;
        self.den_seen_in_30 = r.get_bool()?;
        r.get_bytes(&mut self.video_matrix)?;
        r.get_bytes(&mut self.color_line)?;
        self.ba_low = r.get_bool()?;
        self.ba_low_cycles = r.get_u32()?;
        self.spr_dma = r.get_u8()?;
        self.spr_display = r.get_u8()?;
        self.spr_exp_ff = r.get_u8()?;
        r.get_bytes(&mut self.spr_mc)?;
        r.get_bytes(&mut self.spr_mc_base)?;
        for ptr in &mut self.spr_ptr {
            *ptr = r.get_u16()?;
        }
        self.raise_irq_next = r.get_bool()?;
        self.release_irq_next = r.get_bool()?;
        self.irq_out = r.get_bool()?;
        let mut g = [GAccess::default(); 2];
        for slot in &mut g {
            slot.data = r.get_u8()?;
            slot.character = r.get_u8()?;
            slot.color = r.get_u8()?;
            slot.valid = r.get_bool()?;
        }
        self.g_access = Delayed::new(g[1]);
        self.g_access.write(g[0]);
        self.sprite_sprite_collision = r.get_u8()?;
        self.sprite_background_collision = r.get_u8()?;
        self.bank = r.get_u8()? & 0x03;
        self.gray_dot_mask = r.get_u16()?;
        self.frame_complete = r.get_bool()?;
        self.frames = r.get_u64()?;
        self.pixel.load(r)
    }
}
