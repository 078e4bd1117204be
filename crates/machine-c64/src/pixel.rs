//! VIC-II pixel synthesis.
//!
//! Eight pixels are produced per cycle through a fixed pipeline: sprite
//! shift registers first, then the canvas shift register, then the
//! border flip-flops, then collision resolution, then palette lookup
//! into the working framebuffer.
//!
//! Priority is a depth buffer: a pixel is overwritten only if the new
//! layer depth is less than or equal to the stored one. Collision
//! detection runs on a separate per-pixel source mask, so covered
//! sprites still collide.

use machine_core::{SnapshotError, SnapshotReader, SnapshotWriter, Snapshotable};

use crate::palette::PALETTE;
use crate::vic::{VicRegs, COL_BG0, COL_BORDER, COL_SPR0, COL_SPR_MC0, COL_SPR_MC1};

/// Drawing layer depths. Lower is closer to the viewer.
const DEPTH_BORDER: u8 = 0x10;
const DEPTH_SPRITE_FG: u8 = 0x20;
const DEPTH_FOREGROUND: u8 = 0x30;
const DEPTH_SPRITE_BG: u8 = 0x40;
const DEPTH_BACKGROUND: u8 = 0x50;
/// Depth of pixels nothing has drawn yet.
const DEPTH_NONE: u8 = 0x7F;

/// Source mask bit for a foreground canvas pixel (bits 0-7 are sprites).
const SOURCE_FOREGROUND: u16 = 0x100;

/// Result of one g-access, carried one cycle through the fetch pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GAccess {
    /// Bitmap byte fetched.
    pub data: u8,
    /// Matching character code from the video matrix line buffer.
    pub character: u8,
    /// Matching colour nibble from the colour line buffer.
    pub color: u8,
    /// True when a g-access actually happened (display window cycles).
    pub valid: bool,
}

/// Everything the pixel engine needs for one cycle's eight pixels.
pub(crate) struct DrawContext<'a> {
    /// Committed (delayed) register set.
    pub regs: &'a VicRegs,
    /// Current raster line.
    pub y: u16,
    /// X counter of the first pixel of this cycle.
    pub x_base: u16,
    /// Previous cycle's g-access result.
    pub g: GAccess,
    /// Sprite display-on mask.
    pub spr_display: u8,
    /// Colour slots written this cycle; the affected slot reads as $F
    /// for the first pixel (gray-dot glitch). Zero when disabled.
    pub gray_dot: u16,
}

/// New collision bits discovered in one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CycleResult {
    /// Sprite-sprite collision participants.
    pub sprite_sprite: u8,
    /// Sprite-background collision participants.
    pub sprite_background: u8,
}

/// Canvas (text/bitmap) shift register.
#[derive(Debug, Clone, Copy, Default)]
struct CanvasSr {
    data: u8,
    latched_character: u8,
    latched_color: u8,
    mc_flop: bool,
    color_bits: u8,
    remaining: u8,
    can_load: bool,
}

/// One sprite's 24-bit shift register.
#[derive(Debug, Clone, Copy, Default)]
struct SpriteSr {
    data: u32,
    chunk1: u8,
    chunk2: u8,
    chunk3: u8,
    remaining: u8,
    active: bool,
    mc_flop: bool,
    exp_flop: bool,
    col_bits: u8,
}

/// The pixel synthesis unit.
pub(crate) struct PixelEngine {
    width: usize,
    height: usize,
    /// Double buffer; `working` indexes the frame being drawn.
    buffers: [Vec<u32>; 2],
    working: usize,

    col_buffer: [u8; 8],
    z_buffer: [u8; 8],
    pixel_source: [u16; 8],

    sr: CanvasSr,
    spr: [SpriteSr; 8],

    main_border_ff: bool,
    vertical_border_ff: bool,
}

impl PixelEngine {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        let mut engine = Self {
            width,
            height,
            buffers: [vec![0; width * height], vec![0; width * height]],
            working: 0,
            col_buffer: [0; 8],
            z_buffer: [DEPTH_NONE; 8],
            pixel_source: [0; 8],
            sr: CanvasSr::default(),
            spr: [SpriteSr::default(); 8],
            main_border_ff: true,
            vertical_border_ff: true,
        };
        engine.reset();
        engine
    }

    /// Reset shift registers and paint the debug pattern into both
    /// buffers so missed rasters are visually obvious.
    pub(crate) fn reset(&mut self) {
        self.sr = CanvasSr::default();
        self.spr = [SpriteSr::default(); 8];
        self.main_border_ff = true;
        self.vertical_border_ff = true;
        self.col_buffer = [0; 8];
        self.z_buffer = [DEPTH_NONE; 8];
        self.pixel_source = [0; 8];

        for buffer in &mut self.buffers {
            for (i, pixel) in buffer.iter_mut().enumerate() {
                let x = i % self.width;
                let y = i / self.width;
                let checker = ((x >> 4) + (y >> 4)) & 1;
                *pixel = PALETTE[if checker == 0 { 11 } else { 12 }];
            }
        }
    }

    /// The completed frame (the buffer not being drawn into).
    #[must_use]
    pub(crate) fn stable_framebuffer(&self) -> &[u32] {
        &self.buffers[self.working ^ 1]
    }

    /// Swap buffers at end of frame.
    pub(crate) fn end_frame(&mut self) {
        self.working ^= 1;
    }

    /// Store a fetched sprite data chunk.
    pub(crate) fn set_sprite_chunk(&mut self, sprite: usize, chunk: u8, value: u8) {
        match chunk {
            0 => self.spr[sprite].chunk1 = value,
            1 => self.spr[sprite].chunk2 = value,
            _ => self.spr[sprite].chunk3 = value,
        }
    }

    /// Assemble the three fetched chunks into the 24-bit register.
    pub(crate) fn load_sprite_sr(&mut self, sprite: usize) {
        let sr = &mut self.spr[sprite];
        sr.data = (u32::from(sr.chunk1) << 16) | (u32::from(sr.chunk2) << 8) | u32::from(sr.chunk3);
    }

    /// Vertical border flip-flop rules at the last cycle of a line.
    pub(crate) fn update_vertical_ff(&mut self, y: u16, rsel: bool, den: bool) {
        let (top, bottom) = if rsel { (51, 251) } else { (55, 247) };
        if y == bottom {
            self.vertical_border_ff = true;
        } else if y == top && den {
            self.vertical_border_ff = false;
        }
    }

    /// Synthesize the eight pixels of one cycle.
    pub(crate) fn draw_cycle(&mut self, ctx: &DrawContext<'_>) -> CycleResult {
        self.col_buffer = [0; 8];
        self.z_buffer = [DEPTH_NONE; 8];
        self.pixel_source = [0; 8];
        self.sr.can_load = ctx.g.valid;

        for i in 0..8usize {
            let x = ctx.x_base + i as u16;
            self.draw_sprite_pixels(i, x, ctx);
            self.draw_canvas_pixel(i, ctx);
            self.update_main_border_ff(x, ctx);
            if self.main_border_ff {
                let color = self.color_lookup(ctx, COL_BORDER, i);
                self.col_buffer[i] = color;
                self.z_buffer[i] = DEPTH_BORDER;
            }
        }

        let mut result = CycleResult::default();
        for i in 0..8usize {
            let source = self.pixel_source[i];
            let sprites = (source & 0xFF) as u8;
            if sprites.count_ones() >= 2 {
                result.sprite_sprite |= sprites;
            }
            if sprites != 0 && source & SOURCE_FOREGROUND != 0 {
                result.sprite_background |= sprites;
            }
        }

        let row = ctx.y as usize * self.width;
        let buffer = &mut self.buffers[self.working];
        for i in 0..8usize {
            let x = (ctx.x_base as usize + i) % self.width;
            buffer[row + x] = PALETTE[(self.col_buffer[i] & 0x0F) as usize];
        }

        result
    }

    /// Colour register lookup with the gray-dot glitch on pixel 0.
    fn color_lookup(&self, ctx: &DrawContext<'_>, slot: usize, pixel: usize) -> u8 {
        if pixel == 0 && ctx.gray_dot & (1 << slot) != 0 {
            0x0F
        } else {
            ctx.regs.colors[slot]
        }
    }

    fn put_pixel(&mut self, i: usize, depth: u8, color: u8, source: u16) {
        if depth <= self.z_buffer[i] {
            self.z_buffer[i] = depth;
            self.col_buffer[i] = color;
        }
        self.pixel_source[i] |= source;
    }

    // ------------------------------------------------------------------
    // Sprites
    // ------------------------------------------------------------------

    fn draw_sprite_pixels(&mut self, i: usize, x: u16, ctx: &DrawContext<'_>) {
        for n in 0..8usize {
            let bit = 1u8 << n;

            if !self.spr[n].active
                && ctx.spr_display & bit != 0
                && x == ctx.regs.spr_x[n]
            {
                let sr = &mut self.spr[n];
                sr.active = true;
                sr.remaining = 24;
                sr.exp_flop = true;
                sr.mc_flop = true;
                sr.col_bits = 0;
            }

            if !self.spr[n].active {
                continue;
            }

            let expand = ctx.regs.spr_expand_x & bit != 0;
            let multicolor = ctx.regs.spr_mc & bit != 0;

            {
                let sr = &mut self.spr[n];
                let do_shift = !expand || sr.exp_flop;
                if do_shift {
                    if sr.remaining == 0 {
                        sr.active = false;
                        sr.col_bits = 0;
                    } else {
                        if multicolor {
                            if sr.mc_flop {
                                sr.col_bits = ((sr.data >> 22) & 0x03) as u8;
                            }
                            sr.mc_flop = !sr.mc_flop;
                        } else {
                            sr.col_bits = ((sr.data >> 23) & 0x01) as u8;
                        }
                        sr.data <<= 1;
                        sr.remaining -= 1;
                    }
                }
                if expand {
                    sr.exp_flop = !sr.exp_flop;
                }
            }

            if !self.spr[n].active {
                continue;
            }

            let col_bits = self.spr[n].col_bits;
            if col_bits == 0 {
                continue;
            }

            let color = if multicolor {
                match col_bits {
                    0b01 => self.color_lookup(ctx, COL_SPR_MC0, i),
                    0b10 => self.color_lookup(ctx, COL_SPR0 + n, i),
                    _ => self.color_lookup(ctx, COL_SPR_MC1, i),
                }
            } else {
                self.color_lookup(ctx, COL_SPR0 + n, i)
            };

            // Collision participation is unconditional
            let already_drawn = self.pixel_source[i] & 0xFF != 0;
            self.pixel_source[i] |= u16::from(bit);

            // Among sprites, the lowest number wins even when it sits
            // behind the foreground and a later sprite does not
            if already_drawn {
                continue;
            }

            let depth = if ctx.regs.spr_priority & bit != 0 {
                DEPTH_SPRITE_BG
            } else {
                DEPTH_SPRITE_FG
            };
            if depth <= self.z_buffer[i] {
                self.z_buffer[i] = depth;
                self.col_buffer[i] = color;
            }
        }
    }

    // ------------------------------------------------------------------
    // Canvas
    // ------------------------------------------------------------------

    fn draw_canvas_pixel(&mut self, i: usize, ctx: &DrawContext<'_>) {
        let regs = ctx.regs;
        let xscroll = regs.ctrl2 & 0x07;

        if i as u8 == xscroll && self.sr.can_load {
            self.sr.data = ctx.g.data;
            self.sr.latched_character = ctx.g.character;
            self.sr.latched_color = ctx.g.color;
            self.sr.mc_flop = true;
            self.sr.remaining = 8;
            self.sr.can_load = false;
        }

        if self.sr.remaining == 0 {
            // Sequencer ran dry: plain background
            let color = self.color_lookup(ctx, COL_BG0, i);
            self.put_pixel(i, DEPTH_BACKGROUND, color, 0);
            return;
        }

        let ecm = regs.ctrl1 & 0x40 != 0;
        let bmm = regs.ctrl1 & 0x20 != 0;
        let mcm = regs.ctrl2 & 0x10 != 0;

        // Multicolour consumption: bit pairs latched every other pixel
        let use_pairs = mcm && (bmm || self.sr.latched_color & 0x08 != 0);
        if use_pairs {
            if self.sr.mc_flop {
                self.sr.color_bits = (self.sr.data >> 6) & 0x03;
            }
            self.sr.mc_flop = !self.sr.mc_flop;
        } else {
            self.sr.color_bits = (self.sr.data >> 7) & 0x01;
        }
        self.sr.data <<= 1;
        self.sr.remaining -= 1;

        let bits = self.sr.color_bits;
        let foreground = if use_pairs { bits & 0x02 != 0 } else { bits != 0 };

        let invalid = ecm && (bmm || mcm);
        let color = if invalid {
            // Invalid modes output black with intact foreground flags
            0
        } else if bmm {
            if mcm {
                match bits {
                    0b00 => self.color_lookup(ctx, COL_BG0, i),
                    0b01 => self.sr.latched_character >> 4,
                    0b10 => self.sr.latched_character & 0x0F,
                    _ => self.sr.latched_color,
                }
            } else if foreground {
                self.sr.latched_character >> 4
            } else {
                self.sr.latched_character & 0x0F
            }
        } else if ecm {
            if foreground {
                self.sr.latched_color
            } else {
                let slot = COL_BG0 + usize::from(self.sr.latched_character >> 6);
                self.color_lookup(ctx, slot, i)
            }
        } else if mcm && self.sr.latched_color & 0x08 != 0 {
            match bits {
                0b00 => self.color_lookup(ctx, COL_BG0, i),
                0b01 => self.color_lookup(ctx, COL_BG0 + 1, i),
                0b10 => self.color_lookup(ctx, COL_BG0 + 2, i),
                _ => self.sr.latched_color & 0x07,
            }
        } else if mcm {
            // MC text with colour bit 3 clear renders as standard text
            // from the low three colour bits
            if foreground {
                self.sr.latched_color & 0x07
            } else {
                self.color_lookup(ctx, COL_BG0, i)
            }
        } else if foreground {
            self.sr.latched_color
        } else {
            self.color_lookup(ctx, COL_BG0, i)
        };

        if foreground {
            self.put_pixel(i, DEPTH_FOREGROUND, color, SOURCE_FOREGROUND);
        } else {
            self.put_pixel(i, DEPTH_BACKGROUND, color, 0);
        }
    }

    // ------------------------------------------------------------------
    // Border
    // ------------------------------------------------------------------

    /// Main border flip-flop edges, evaluated per pixel. The left-edge
    /// comparison also applies the vertical flip-flop rules, which is
    /// what makes cycles 17 and 55 come out right without special cases.
    fn update_main_border_ff(&mut self, x: u16, ctx: &DrawContext<'_>) {
        let csel = ctx.regs.ctrl2 & 0x08 != 0;
        let (left, right) = if csel { (24, 344) } else { (31, 335) };

        if x == right {
            self.main_border_ff = true;
        }
        if x == left {
            let rsel = ctx.regs.ctrl1 & 0x08 != 0;
            let den = ctx.regs.ctrl1 & 0x10 != 0;
            self.update_vertical_ff(ctx.y, rsel, den);
            if !self.vertical_border_ff {
                self.main_border_ff = false;
            }
        }
    }
}

impl Snapshotable for PixelEngine {
    fn state_size(&self) -> usize {
        // Both framebuffers + pixel scratch + shift registers + flip-flops
        self.buffers[0].len() * 4 * 2 + 1 + 8 + 8 + 16 + 7 + 8 * 12 + 2
    }

    fn save(&self, w: &mut SnapshotWriter) {
        for buffer in &self.buffers {
            for &pixel in buffer {
                w.put_u32(pixel);
            }
        }
        w.put_u8(self.working as u8);
        w.put_bytes(&self.col_buffer);
        w.put_bytes(&self.z_buffer);
        for &source in &self.pixel_source {
            w.put_u16(source);
        }
        w.put_u8(self.sr.data);
        w.put_u8(self.sr.latched_character);
        w.put_u8(self.sr.latched_color);
        w.put_bool(self.sr.mc_flop);
        w.put_u8(self.sr.color_bits);
        w.put_u8(self.sr.remaining);
        w.put_bool(self.sr.can_load);
        for sr in &self.spr {
            w.put_u32(sr.data);
            w.put_u8(sr.chunk1);
            w.put_u8(sr.chunk2);
            w.put_u8(sr.chunk3);
            w.put_u8(sr.remaining);
            w.put_bool(sr.active);
            w.put_bool(sr.mc_flop);
            w.put_bool(sr.exp_flop);
            w.put_u8(sr.col_bits);
        }
        w.put_bool(self.main_border_ff);
        w.put_bool(self.vertical_border_ff);
    }

    fn load(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        for buffer in &mut self.buffers {
            for pixel in buffer.iter_mut() {
                *pixel = r.get_u32()?;
            }
        }
        self.working = usize::from(r.get_u8()?) & 1;
        r.get_bytes(&mut self.col_buffer)?;
        r.get_bytes(&mut self.z_buffer)?;
        for source in &mut self.pixel_source {
            *source = r.get_u16()?;
        }
        self.sr.data = r.get_u8()?;
        self.sr.latched_character = r.get_u8()?;
        self.sr.latched_color = r.get_u8()?;
        self.sr.mc_flop = r.get_bool()?;
        self.sr.color_bits = r.get_u8()?;
        self.sr.remaining = r.get_u8()?;
        self.sr.can_load = r.get_bool()?;
        for sr in &mut self.spr {
            sr.data = r.get_u32()?;
            sr.chunk1 = r.get_u8()?;
            sr.chunk2 = r.get_u8()?;
            sr.chunk3 = r.get_u8()?;
            sr.remaining = r.get_u8()?;
            sr.active = r.get_bool()?;
            sr.mc_flop = r.get_bool()?;
            sr.exp_flop = r.get_bool()?;
            sr.col_bits = r.get_u8()?;
        }
        self.main_border_ff = r.get_bool()?;
        self.vertical_border_ff = r.get_bool()?;
        Ok(())
    }
}
