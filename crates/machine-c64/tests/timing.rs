//! Machine-level timing scenarios.
//!
//! Drives the whole machine (CPU + VIC + bus) through the classic
//! cycle-exact situations: raster interrupts, bad-line stalls, sprite
//! collisions, the gray-dot glitch, and whole-frame pixel coverage.

use machine_core::{Bus, Observable, Tickable, Value};
use machine_c64::{C64, C64Config, Model, PALETTE};

/// Build a machine of the given model whose reset vector points at
/// `start`, with the given program already in RAM.
fn make_c64_for(model: Model, start: u16, program: &[u8]) -> C64 {
    let mut kernal = vec![0xEA; 8192];
    kernal[0x1FFC] = (start & 0xFF) as u8;
    kernal[0x1FFD] = (start >> 8) as u8;
    // IRQ/BRK vector at $FFFE -> $C100
    kernal[0x1FFE] = 0x00;
    kernal[0x1FFF] = 0xC1;

    let mut c64 = C64::new(&C64Config {
        model,
        kernal_rom: kernal,
        basic_rom: vec![0; 8192],
        char_rom: vec![0; 4096],
    });

    for (i, &byte) in program.iter().enumerate() {
        c64.bus_mut().memory.ram_write(start + i as u16, byte);
    }
    c64
}

fn make_c64(start: u16, program: &[u8]) -> C64 {
    make_c64_for(Model::Pal, start, program)
}

fn vic_line(c64: &C64) -> u16 {
    match c64.query("vic.line") {
        Some(Value::U16(line)) => line,
        other => panic!("unexpected vic.line value {other:?}"),
    }
}

fn vic_cycle(c64: &C64) -> u8 {
    match c64.query("vic.cycle") {
        Some(Value::U8(cycle)) => cycle,
        other => panic!("unexpected vic.cycle value {other:?}"),
    }
}

/// Tick until the VIC reaches the given line and cycle. The bound
/// covers two frames of either video standard.
fn run_to(c64: &mut C64, line: u16, cycle: u8) {
    for _ in 0..(2 * 312 * 65) {
        if vic_line(c64) == line && vic_cycle(c64) == cycle {
            return;
        }
        c64.tick();
    }
    panic!("never reached line {line} cycle {cycle}");
}

#[test]
fn raster_irq_on_line_f8() {
    // CLI; JMP self — then configure a raster interrupt on line $F8
    let c64 = &mut make_c64(0xC000, &[0x58, 0x4C, 0x01, 0xC0]);
    // IRQ handler at $C100: JMP self
    c64.bus_mut().memory.ram_write(0xC100, 0x4C);
    c64.bus_mut().memory.ram_write(0xC101, 0x00);
    c64.bus_mut().memory.ram_write(0xC102, 0xC1);

    c64.bus_mut().write(0xD012, 0xF8);
    c64.bus_mut().write(0xD011, 0x00); // RST8 = 0
    c64.bus_mut().write(0xD01A, 0x01); // unmask raster IRQ

    // Run until the CPU lands in the handler
    for _ in 0..(2 * 312 * 63) {
        c64.tick();
        if c64.cpu().pc0() == 0xC100 {
            break;
        }
    }
    assert_eq!(c64.cpu().pc0(), 0xC100, "CPU never reached the handler");

    // Entry happens on line $F8, within the first cycles of the line
    assert_eq!(vic_line(c64), 0xF8);
    assert!(
        vic_cycle(c64) <= 16,
        "IRQ entry too late in the line: cycle {}",
        vic_cycle(c64)
    );

    // The stacked PC points at the interrupted loop instruction
    let s = c64.cpu().regs.s;
    let lo = c64.bus().peek(0x0100 + u16::from(s.wrapping_add(2)));
    let hi = c64.bus().peek(0x0100 + u16::from(s.wrapping_add(3)));
    assert_eq!(u16::from(lo) | (u16::from(hi) << 8), 0xC001);

    // IRR has the raster bit plus the asserted-interrupt flag
    let irr = c64.bus().peek(0xD019);
    assert_eq!(irr & 0x0F, 0x01);
    assert_eq!(irr & 0x80, 0x80);
}

#[test]
fn bad_line_stalls_the_cpu() {
    // NOP sled long enough to still be executing on line $33; the bad
    // line (YSCROLL=3) must freeze it
    let c64 = &mut make_c64(0xC000, &[0xEA; 0x800]);
    c64.bus_mut().write(0xD011, 0x1B); // DEN, YSCROLL=3
    c64.bus_mut().write(0xD018, 0x14);

    run_to(c64, 0x33, 14);
    assert_eq!(c64.query("vic.bad_line"), Some(Value::Bool(true)));
    assert_eq!(c64.query("vic.ba"), Some(Value::Bool(true)));

    // NOPs only perform read cycles, so the CPU makes no progress while
    // BA holds RDY down
    let pc_before = c64.cpu().regs.pc;
    for _ in 0..38 {
        c64.tick();
        assert_eq!(c64.cpu().regs.pc, pc_before, "CPU advanced during DMA");
    }

    // BA releases after cycle 54; the sled resumes
    run_to(c64, 0x33, 60);
    assert_eq!(c64.query("vic.ba"), Some(Value::Bool(false)));
    let pc_after_release = c64.cpu().regs.pc;
    for _ in 0..8 {
        c64.tick();
    }
    assert!(c64.cpu().regs.pc > pc_after_release, "CPU did not resume");
}

#[test]
fn bad_line_costs_about_forty_cycles_of_cpu_time() {
    let c64 = &mut make_c64(0xC000, &[0xEA; 0x800]);
    c64.bus_mut().write(0xD011, 0x1B);

    // Count executed cycles' worth of PC progress on a bad line vs the
    // line before it (NOP = 2 cycles per byte of progress)
    run_to(c64, 0x32, 1);
    let start = c64.cpu().regs.pc;
    run_to(c64, 0x33, 1);
    let normal_progress = c64.cpu().regs.pc - start;

    let start = c64.cpu().regs.pc;
    run_to(c64, 0x34, 1);
    let badline_progress = c64.cpu().regs.pc - start;

    // 43 cycles of stall remove ~21 NOPs of progress
    let lost = normal_progress - badline_progress;
    assert!(
        (19..=23).contains(&lost),
        "expected ~21 NOPs lost to the bad line, lost {lost}"
    );
}

#[test]
fn sprite_sprite_collision_sets_and_clears_d01e() {
    let c64 = &mut make_c64(0xC000, &[0x4C, 0x00, 0xC0]); // JMP self
    c64.bus_mut().write(0xD011, 0x1B);
    c64.bus_mut().write(0xD018, 0x14);

    // Sprites 0 and 1, both at (100, 100), identical solid patterns
    c64.bus_mut().write(0xD000, 100);
    c64.bus_mut().write(0xD001, 100);
    c64.bus_mut().write(0xD002, 100);
    c64.bus_mut().write(0xD003, 100);
    c64.bus_mut().write(0xD015, 0x03);

    // Pointers at $07F8/$07F9 (screen at $0400) -> data at $2000
    c64.bus_mut().memory.ram_write(0x07F8, 0x80);
    c64.bus_mut().memory.ram_write(0x07F9, 0x80);
    for i in 0..63 {
        c64.bus_mut().memory.ram_write(0x2000 + i, 0xFF);
    }

    c64.run_frame();
    c64.run_frame();

    // Both sprites collided; the IRR latched the collision bit
    assert_eq!(c64.bus().peek(0xD019) & 0x04, 0x04);
    let collision = c64.bus_mut().read(0xD01E);
    assert_eq!(collision, 0x03);
    // Clear-on-read: the second read returns zero
    assert_eq!(c64.bus_mut().read(0xD01E), 0x00);
}

#[test]
fn sprite_background_collision() {
    let c64 = &mut make_c64(0xC000, &[0x4C, 0x00, 0xC0]);
    c64.bus_mut().write(0xD011, 0x1B);
    c64.bus_mut().write(0xD018, 0x14);

    // Fill the character cell bitmap with solid foreground: char 0
    // renders all-ones rows via a RAM charset at $3000 (CB=6)
    c64.bus_mut().write(0xD018, 0x1C); // screen $0400, charset $3000
    for i in 0..8 {
        c64.bus_mut().memory.ram_write(0x3000 + i, 0xFF);
    }
    // Clear the poweron pattern out of screen RAM so every cell shows
    // character 0; colour RAM nonzero for visibility
    for i in 0..1000u16 {
        c64.bus_mut().memory.ram_write(0x0400 + i, 0x00);
        c64.bus_mut().memory.color_ram_write(i, 1);
    }

    // Sprite 0 inside the display window
    c64.bus_mut().write(0xD000, 100);
    c64.bus_mut().write(0xD001, 100);
    c64.bus_mut().write(0xD015, 0x01);
    c64.bus_mut().memory.ram_write(0x07F8, 0x80);
    for i in 0..63 {
        c64.bus_mut().memory.ram_write(0x2000 + i, 0xFF);
    }

    c64.run_frame();
    c64.run_frame();

    let collision = c64.bus_mut().read(0xD01F);
    assert_eq!(collision & 0x01, 0x01);
    assert_eq!(c64.bus_mut().read(0xD01F), 0x00);
    assert_eq!(c64.bus().peek(0xD019) & 0x02, 0x02);
}

#[test]
fn gray_dot_glitch_on_border_colour_write() {
    use machine_c64::{C64Memory, Vic};

    // Drive the chip directly so the register write lands between φ1
    // and φ2 of one cycle, exactly where a CPU write sits in the
    // machine's tick order
    let mut vic = Vic::new(Model::Pal);
    let mem = C64Memory::new(&vec![0; 8192], &vec![0; 8192], &vec![0; 4096]);

    while !(vic.raster_line() == 10 && vic.raster_cycle() == 30) {
        vic.phi1(&mem, 0);
        vic.phi2();
    }
    vic.phi1(&mem, 0);
    vic.write(0x20, 0x02);
    vic.phi2();

    while !vic.take_frame_complete() {
        vic.phi1(&mem, 0);
        vic.phi2();
    }

    let width = Model::Pal.pixels_per_line();
    let frame = vic.stable_framebuffer();
    let row = 10 * width;
    let x_base = (30 - 14) * 8;

    // One pixel of colour $F, the rest of the chunk still the old
    // (black) border, the next chunk the committed red
    assert_eq!(frame[row + x_base], PALETTE[0x0F], "gray dot missing");
    assert_eq!(frame[row + x_base + 1], PALETTE[0x00]);
    assert_eq!(frame[row + x_base + 8], PALETTE[0x02]);
}

#[test]
fn blanked_frame_is_entirely_border() {
    // DEN never set: every pixel of the frame is border colour
    let c64 = &mut make_c64(0xC000, &[0x4C, 0x00, 0xC0]);
    c64.run_frame();
    c64.run_frame();

    let (width, height) = c64.frame_size();
    let frame = c64.stable_framebuffer();
    assert_eq!(frame.len(), width * height);
    assert!(
        frame.iter().all(|&p| p == PALETTE[0]),
        "blanked frame must be solid border colour"
    );
}

#[test]
fn display_window_shows_background_when_enabled() {
    let c64 = &mut make_c64(0xC000, &[0x4C, 0x00, 0xC0]);
    c64.bus_mut().write(0xD011, 0x1B); // DEN, YSCROLL=3
    c64.bus_mut().write(0xD016, 0x08); // CSEL=1
    c64.bus_mut().write(0xD018, 0x14);
    c64.bus_mut().write(0xD020, 0x02); // red border
    c64.bus_mut().write(0xD021, 0x06); // blue background

    c64.run_frame();
    c64.run_frame();

    let (width, _) = c64.frame_size();
    let frame = c64.stable_framebuffer();

    // Centre of the display window: line 100, x = 200
    assert_eq!(frame[100 * width + 200], PALETTE[6]);
    // Left border of the same line
    assert_eq!(frame[100 * width + 8], PALETTE[2]);
    // Top border
    assert_eq!(frame[20 * width + 200], PALETTE[2]);
}

#[test]
fn ntsc_frame_is_cycle_exact() {
    let c64 = &mut make_c64_for(Model::Ntsc, 0xC000, &[0x4C, 0x00, 0xC0]);
    assert_eq!(c64.run_frame(), 263 * 65);
    assert_eq!(c64.run_frame(), 263 * 65);
    assert_eq!(c64.frame_size(), (520, 263));
}

#[test]
fn ntsc_raster_irq_on_line_f8() {
    // Same scenario as the PAL test, on the 65-cycle/263-line sequencer
    let c64 = &mut make_c64_for(Model::Ntsc, 0xC000, &[0x58, 0x4C, 0x01, 0xC0]);
    c64.bus_mut().memory.ram_write(0xC100, 0x4C);
    c64.bus_mut().memory.ram_write(0xC101, 0x00);
    c64.bus_mut().memory.ram_write(0xC102, 0xC1);

    c64.bus_mut().write(0xD012, 0xF8);
    c64.bus_mut().write(0xD011, 0x00);
    c64.bus_mut().write(0xD01A, 0x01);

    for _ in 0..(2 * 263 * 65) {
        c64.tick();
        if c64.cpu().pc0() == 0xC100 {
            break;
        }
    }
    assert_eq!(c64.cpu().pc0(), 0xC100, "CPU never reached the handler");
    assert_eq!(vic_line(c64), 0xF8);
    assert!(
        vic_cycle(c64) <= 16,
        "IRQ entry too late in the line: cycle {}",
        vic_cycle(c64)
    );
}

#[test]
fn ntsc_bad_line_stalls_the_cpu() {
    let c64 = &mut make_c64_for(Model::Ntsc, 0xC000, &[0xEA; 0x800]);
    c64.bus_mut().write(0xD011, 0x1B); // DEN, YSCROLL=3
    c64.bus_mut().write(0xD018, 0x14);

    run_to(c64, 0x33, 14);
    assert_eq!(c64.query("vic.bad_line"), Some(Value::Bool(true)));
    assert_eq!(c64.query("vic.ba"), Some(Value::Bool(true)));

    let pc_before = c64.cpu().regs.pc;
    for _ in 0..38 {
        c64.tick();
        assert_eq!(c64.cpu().regs.pc, pc_before, "CPU advanced during DMA");
    }

    // The c-access window ends at cycle 54 on NTSC too; the sled then
    // runs through the longer back porch
    run_to(c64, 0x33, 62);
    assert_eq!(c64.query("vic.ba"), Some(Value::Bool(false)));
    let pc_after_release = c64.cpu().regs.pc;
    for _ in 0..8 {
        c64.tick();
    }
    assert!(c64.cpu().regs.pc > pc_after_release, "CPU did not resume");
}

#[test]
fn ntsc_sprite_ba_windows_wrap_the_65_cycle_line() {
    use machine_c64::{C64Memory, Vic};

    // Sprite 0 fetches its pointer at cycle 60, sprite 3 at cycle 1 of
    // the next line; their BA windows are [57,61] and [63,2]
    let mut vic = Vic::new(Model::Ntsc);
    let mem = C64Memory::new(&vec![0; 8192], &vec![0; 8192], &vec![0; 4096]);

    vic.write(0x15, 0x09); // enable sprites 0 and 3
    vic.write(0x01, 0x42); // sprite 0 Y
    vic.write(0x07, 0x42); // sprite 3 Y

    while !(vic.raster_line() == 0x42 && vic.raster_cycle() == 56) {
        vic.phi1(&mem, 0);
        vic.phi2();
    }

    // (cycle, BA low) across the line wrap; DMA for both sprites turned
    // on at cycle 55
    let expected = [
        (56, false),
        (57, true),
        (58, true),
        (59, true),
        (60, true),
        (61, true),
        (62, false),
        (63, true),
        (64, true),
        (65, true),
        (1, true),
        (2, true),
        (3, false),
    ];
    for &(cycle, ba) in &expected {
        assert_eq!(vic.raster_cycle(), cycle);
        vic.phi1(&mem, 0);
        assert_eq!(
            vic.ba_low(),
            ba,
            "BA at cycle {cycle} of the sprite fetch window"
        );
        vic.phi2();
    }
    assert_eq!(vic.raster_line(), 0x43);
}

#[test]
fn ultimax_mode_via_machine_cartridge() {
    use machine_c64::{Cartridge, CartridgeMode};

    struct RomhCart;
    impl Cartridge for RomhCart {
        fn peek_roml(&self, _addr: u16) -> u8 {
            0x11
        }
        fn peek_romh(&self, addr: u16) -> u8 {
            if addr & 0x0FFF == 0xFFC { 0x00 } else { 0x60 }
        }
    }

    let c64 = &mut make_c64(0xC000, &[0xEA]);
    c64.bus_mut()
        .memory
        .expansion
        .attach(Box::new(RomhCart), CartridgeMode::Ultimax);
    c64.reset();

    // Reset vector now comes from cartridge ROMH
    assert_eq!(c64.bus_mut().read(0x8000), 0x11);
    assert_eq!(c64.bus_mut().read(0xE000), 0x60);
    assert_eq!(c64.bus_mut().read(0x4000), 0xFF);
}
