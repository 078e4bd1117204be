//! 6510 CPU implementation.
//!
//! Cycle-accurate emulation where each `tick()` performs exactly one
//! bus access. Instructions are broken down into their component cycles.
//!
//! # RDY
//!
//! The VIC-II pulls RDY low to take over the bus. A low RDY freezes the
//! CPU on its next *read* cycle: the same micro-op repeats until RDY goes
//! high again. Write cycles are unaffected, which is why a stalled
//! instruction can still finish its stack pushes.
//!
//! # Interrupts
//!
//! The NMI and IRQ inputs are wired-OR lines pulled down per source.
//! Internally they feed the NMOS edge/level detectors, whose outputs are
//! one cycle delayed and polled at the end of each instruction's final
//! work cycle. NMI beats IRQ; a coincident IRQ is forgotten. A BRK whose
//! sequence overlaps an incoming NMI is hijacked through $FFFA.

use machine_core::{Bus, Observable, SnapshotError, SnapshotReader, SnapshotWriter, Snapshotable, Value};

use crate::flags::{C, D, I, N, V, Z};
use crate::{Registers, Status};

/// Interrupt request origin.
///
/// Each source owns one bit of the wired-OR line; the physical line is
/// low while any source bit is set. Releasing a line only releases the
/// matching source's pull-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSource {
    /// Expansion port / cartridge.
    Exp,
    /// CIA 1.
    Cia1,
    /// CIA 2.
    Cia2,
    /// VIC-II.
    Vic,
    /// Keyboard (RESTORE key).
    Keyboard,
    /// CIA time-of-day alarm.
    Tod,
}

impl IntSource {
    #[must_use]
    const fn mask(self) -> u8 {
        match self {
            IntSource::Exp => 0x01,
            IntSource::Cia1 => 0x02,
            IntSource::Cia2 => 0x04,
            IntSource::Vic => 0x08,
            IntSource::Keyboard => 0x10,
            IntSource::Tod => 0x20,
        }
    }
}

/// Internal state tracking instruction execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Fetching opcode byte (or entering an interrupt sequence).
    FetchOpcode,
    /// Executing instruction cycles.
    Execute,
    /// CPU is jammed (KIL opcode). Only reset recovers.
    Jammed,
}

/// Which event the BRK-shaped sequence is servicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// A real BRK instruction.
    None,
    /// Maskable interrupt, vector $FFFE/F.
    Irq,
    /// Non-maskable interrupt, vector $FFFA/B.
    Nmi,
}

/// The MOS 6510 CPU.
#[derive(Debug)]
pub struct Mos6510 {
    /// CPU registers.
    pub regs: Registers,

    /// Current execution state.
    state: State,

    /// Current opcode being executed.
    opcode: u8,

    /// Current cycle within the instruction (0 = opcode fetch).
    cycle: u8,

    /// Temporary address register for addressing modes.
    addr: u16,

    /// Temporary data register.
    data: u8,

    /// Pointer latch for indirect addressing.
    pointer: u8,

    /// Set when an indexed effective address crossed a page.
    page_crossed: bool,

    /// Frozen program counter: address of the opcode byte of the
    /// instruction currently executing. Stable across its microcycles.
    pc0: u16,

    /// What the current BRK-shaped sequence services.
    servicing: Interrupt,

    /// Per-source NMI pull-downs. Line is low while nonzero.
    nmi_line: u8,

    /// Per-source IRQ pull-downs. Line is low while nonzero.
    irq_line: u8,

    /// NMI line as sampled at the start of the current cycle.
    nmi_sampled: bool,

    /// IRQ line as sampled at the start of the current cycle.
    irq_sampled: bool,

    /// Edge detector output: a high-to-low NMI transition was seen and
    /// has not been serviced yet.
    nmi_edge: bool,

    /// Polled decision: enter the NMI sequence at the next fetch.
    do_nmi: bool,

    /// Polled decision: enter the IRQ sequence at the next fetch.
    do_irq: bool,

    /// RDY line. Low stalls the next read cycle.
    rdy: bool,

    /// Cycle of the most recent falling edge of RDY.
    rdy_line_down: u64,

    /// Cycle of the most recent rising edge of RDY.
    rdy_line_up: u64,

    /// Elapsed clock cycles since poweron.
    total_cycles: u64,
}

/// Serialized size of the CPU state in bytes.
const STATE_SIZE: usize = 50;

impl Default for Mos6510 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6510 {
    /// Create a new 6510 in reset state. PC is loaded by `reset()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            state: State::FetchOpcode,
            opcode: 0,
            cycle: 0,
            addr: 0,
            data: 0,
            pointer: 0,
            page_crossed: false,
            pc0: 0,
            servicing: Interrupt::None,
            nmi_line: 0,
            irq_line: 0,
            nmi_sampled: false,
            irq_sampled: false,
            nmi_edge: false,
            do_nmi: false,
            do_irq: false,
            rdy: true,
            rdy_line_down: 0,
            rdy_line_up: 0,
            total_cycles: 0,
        }
    }

    /// Reset the CPU and load PC from the reset vector at $FFFC/D.
    pub fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.regs = Registers::new();
        self.state = State::FetchOpcode;
        self.opcode = 0;
        self.cycle = 0;
        self.addr = 0;
        self.data = 0;
        self.pointer = 0;
        self.page_crossed = false;
        self.servicing = Interrupt::None;
        self.nmi_line = 0;
        self.irq_line = 0;
        self.nmi_sampled = false;
        self.irq_sampled = false;
        self.nmi_edge = false;
        self.do_nmi = false;
        self.do_irq = false;
        self.rdy = true;

        let lo = bus.read(0xFFFC);
        let hi = bus.read(0xFFFD);
        self.regs.pc = u16::from(lo) | (u16::from(hi) << 8);
        self.pc0 = self.regs.pc;
    }

    // ========================================================================
    // Input lines
    // ========================================================================

    /// Pull the NMI line down for the given source.
    pub fn pull_down_nmi(&mut self, source: IntSource) {
        self.nmi_line |= source.mask();
    }

    /// Release the NMI pull-down of the given source.
    pub fn release_nmi(&mut self, source: IntSource) {
        self.nmi_line &= !source.mask();
    }

    /// Pull the IRQ line down for the given source.
    pub fn pull_down_irq(&mut self, source: IntSource) {
        self.irq_line |= source.mask();
    }

    /// Release the IRQ pull-down of the given source.
    pub fn release_irq(&mut self, source: IntSource) {
        self.irq_line &= !source.mask();
    }

    /// Drive the RDY line. Records edge cycles for diagnostics.
    pub fn set_rdy(&mut self, high: bool) {
        if self.rdy && !high {
            self.rdy_line_down = self.total_cycles;
        }
        if !self.rdy && high {
            self.rdy_line_up = self.total_cycles;
        }
        self.rdy = high;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Address of the opcode byte of the instruction currently executing.
    #[must_use]
    pub fn pc0(&self) -> u16 {
        self.pc0
    }

    /// True if the CPU hit a KIL opcode and is jammed until reset.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state == State::Jammed
    }

    /// True if the next cycle starts a new instruction.
    #[must_use]
    pub fn in_fetch_phase(&self) -> bool {
        self.state == State::FetchOpcode
    }

    /// Elapsed cycles since poweron.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Cycle of the most recent falling RDY edge.
    #[must_use]
    pub fn rdy_line_down(&self) -> u64 {
        self.rdy_line_down
    }

    /// Cycle of the most recent rising RDY edge.
    #[must_use]
    pub fn rdy_line_up(&self) -> u64 {
        self.rdy_line_up
    }

    // ========================================================================
    // Cycle execution
    // ========================================================================

    /// Execute one CPU cycle.
    pub fn tick<B: Bus>(&mut self, bus: &mut B) {
        if self.state == State::Jammed {
            return;
        }

        self.total_cycles += 1;
        self.sample_interrupt_lines();

        match self.state {
            State::FetchOpcode => self.fetch_or_interrupt(bus),
            State::Execute => self.execute_instruction(bus),
            State::Jammed => unreachable!(),
        }
    }

    /// Sample the interrupt lines into the one-cycle-delayed detectors.
    ///
    /// Runs at the start of every cycle, so the values seen here are the
    /// lines as driven up to the end of the previous cycle.
    fn sample_interrupt_lines(&mut self) {
        let nmi_low = self.nmi_line != 0;
        if nmi_low && !self.nmi_sampled {
            self.nmi_edge = true;
        }
        self.nmi_sampled = nmi_low;
        self.irq_sampled = self.irq_line != 0;
    }

    /// Poll the detectors. Runs at the end of an instruction's final
    /// work cycle. `i_flag` is the I value the poll observes, which for
    /// CLI/SEI/PLP/RTI is the value before the instruction changed it.
    fn poll_interrupts(&mut self, i_flag: bool) {
        if self.nmi_edge {
            self.nmi_edge = false;
            self.do_nmi = true;
        }
        self.do_irq = self.irq_sampled && !i_flag;
    }

    /// Finish the current instruction and poll for interrupts.
    fn finish(&mut self) {
        let i_flag = self.regs.p.is_set(I);
        self.finish_with_i(i_flag);
    }

    /// Finish, polling with an explicit I value (flag-change quirk).
    fn finish_with_i(&mut self, i_flag: bool) {
        self.poll_interrupts(i_flag);
        self.state = State::FetchOpcode;
        self.cycle = 0;
    }

    /// Fetch the next opcode, or divert into an interrupt sequence.
    fn fetch_or_interrupt<B: Bus>(&mut self, bus: &mut B) {
        if self.do_nmi {
            if self.read(bus, self.regs.pc).is_none() {
                return;
            }
            self.do_nmi = false;
            // A coincident IRQ is forgotten, not latched.
            self.do_irq = false;
            self.begin_sequence(Interrupt::Nmi);
        } else if self.do_irq {
            if self.read(bus, self.regs.pc).is_none() {
                return;
            }
            self.do_irq = false;
            self.begin_sequence(Interrupt::Irq);
        } else {
            let Some(op) = self.read(bus, self.regs.pc) else {
                return;
            };
            self.pc0 = self.regs.pc;
            self.opcode = op;
            self.servicing = Interrupt::None;
            self.regs.pc = self.regs.pc.wrapping_add(1);
            self.cycle = 1;
            self.state = State::Execute;
        }
    }

    /// Enter the BRK-shaped sequence for an interrupt.
    fn begin_sequence(&mut self, kind: Interrupt) {
        self.pc0 = self.regs.pc;
        self.opcode = 0x00;
        self.servicing = kind;
        self.cycle = 1;
        self.state = State::Execute;
    }

    /// One bus read, honouring RDY. `None` means the cycle stalled and
    /// the caller must return without touching any state.
    fn read<B: Bus>(&mut self, bus: &mut B, addr: u16) -> Option<u8> {
        if self.rdy {
            Some(bus.read(addr))
        } else {
            None
        }
    }

    /// Execute one cycle of the current instruction.
    #[allow(clippy::too_many_lines)]
    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) {
        match self.opcode {
            // BRK - 7 cycles (also carries the IRQ/NMI sequences)
            0x00 => self.op_brk(bus),

            // ORA (zp,X) - 6 cycles
            0x01 => self.addr_izx(bus, Self::do_ora),
            // SLO (zp,X) - 8 cycles
            0x03 => self.addr_izx_rmw(bus, Self::do_slo),
            // NOP zp - 3 cycles
            0x04 => self.addr_zp(bus, Self::do_nop_read),
            // ORA zp - 3 cycles
            0x05 => self.addr_zp(bus, Self::do_ora),
            // ASL zp - 5 cycles
            0x06 => self.addr_zp_rmw(bus, Self::do_asl),
            // SLO zp - 5 cycles
            0x07 => self.addr_zp_rmw(bus, Self::do_slo),
            // PHP - 3 cycles
            0x08 => self.op_php(bus),
            // ORA imm - 2 cycles
            0x09 => self.addr_imm(bus, Self::do_ora),
            // ASL A - 2 cycles
            0x0A => self.op_acc(bus, Self::do_asl),
            // ANC imm - 2 cycles
            0x0B => self.addr_imm(bus, Self::do_anc),
            // NOP abs - 4 cycles
            0x0C => self.addr_abs(bus, Self::do_nop_read),
            // ORA abs - 4 cycles
            0x0D => self.addr_abs(bus, Self::do_ora),
            // ASL abs - 6 cycles
            0x0E => self.addr_abs_rmw(bus, Self::do_asl),
            // SLO abs - 6 cycles
            0x0F => self.addr_abs_rmw(bus, Self::do_slo),

            // BPL rel - 2/3/4 cycles
            0x10 => self.op_branch(bus, !self.regs.p.is_set(N)),
            // ORA (zp),Y - 5/6 cycles
            0x11 => self.addr_izy(bus, Self::do_ora),
            // SLO (zp),Y - 8 cycles
            0x13 => self.addr_izy_rmw(bus, Self::do_slo),
            // NOP zp,X - 4 cycles
            0x14 => self.addr_zpx(bus, Self::do_nop_read),
            // ORA zp,X - 4 cycles
            0x15 => self.addr_zpx(bus, Self::do_ora),
            // ASL zp,X - 6 cycles
            0x16 => self.addr_zpx_rmw(bus, Self::do_asl),
            // SLO zp,X - 6 cycles
            0x17 => self.addr_zpx_rmw(bus, Self::do_slo),
            // CLC - 2 cycles
            0x18 => self.op_flag(bus, C, false),
            // ORA abs,Y - 4/5 cycles
            0x19 => self.addr_aby(bus, Self::do_ora),
            // NOP - 2 cycles
            0x1A => self.op_nop(bus),
            // SLO abs,Y - 7 cycles
            0x1B => self.addr_aby_rmw(bus, Self::do_slo),
            // NOP abs,X - 4/5 cycles
            0x1C => self.addr_abx(bus, Self::do_nop_read),
            // ORA abs,X - 4/5 cycles
            0x1D => self.addr_abx(bus, Self::do_ora),
            // ASL abs,X - 7 cycles
            0x1E => self.addr_abx_rmw(bus, Self::do_asl),
            // SLO abs,X - 7 cycles
            0x1F => self.addr_abx_rmw(bus, Self::do_slo),

            // JSR abs - 6 cycles
            0x20 => self.op_jsr(bus),
            // AND (zp,X) - 6 cycles
            0x21 => self.addr_izx(bus, Self::do_and),
            // RLA (zp,X) - 8 cycles
            0x23 => self.addr_izx_rmw(bus, Self::do_rla),
            // BIT zp - 3 cycles
            0x24 => self.addr_zp(bus, Self::do_bit),
            // AND zp - 3 cycles
            0x25 => self.addr_zp(bus, Self::do_and),
            // ROL zp - 5 cycles
            0x26 => self.addr_zp_rmw(bus, Self::do_rol),
            // RLA zp - 5 cycles
            0x27 => self.addr_zp_rmw(bus, Self::do_rla),
            // PLP - 4 cycles
            0x28 => self.op_plp(bus),
            // AND imm - 2 cycles
            0x29 => self.addr_imm(bus, Self::do_and),
            // ROL A - 2 cycles
            0x2A => self.op_acc(bus, Self::do_rol),
            // ANC imm - 2 cycles
            0x2B => self.addr_imm(bus, Self::do_anc),
            // BIT abs - 4 cycles
            0x2C => self.addr_abs(bus, Self::do_bit),
            // AND abs - 4 cycles
            0x2D => self.addr_abs(bus, Self::do_and),
            // ROL abs - 6 cycles
            0x2E => self.addr_abs_rmw(bus, Self::do_rol),
            // RLA abs - 6 cycles
            0x2F => self.addr_abs_rmw(bus, Self::do_rla),

            // BMI rel - 2/3/4 cycles
            0x30 => self.op_branch(bus, self.regs.p.is_set(N)),
            // AND (zp),Y - 5/6 cycles
            0x31 => self.addr_izy(bus, Self::do_and),
            // RLA (zp),Y - 8 cycles
            0x33 => self.addr_izy_rmw(bus, Self::do_rla),
            // NOP zp,X - 4 cycles
            0x34 => self.addr_zpx(bus, Self::do_nop_read),
            // AND zp,X - 4 cycles
            0x35 => self.addr_zpx(bus, Self::do_and),
            // ROL zp,X - 6 cycles
            0x36 => self.addr_zpx_rmw(bus, Self::do_rol),
            // RLA zp,X - 6 cycles
            0x37 => self.addr_zpx_rmw(bus, Self::do_rla),
            // SEC - 2 cycles
            0x38 => self.op_flag(bus, C, true),
            // AND abs,Y - 4/5 cycles
            0x39 => self.addr_aby(bus, Self::do_and),
            // NOP - 2 cycles
            0x3A => self.op_nop(bus),
            // RLA abs,Y - 7 cycles
            0x3B => self.addr_aby_rmw(bus, Self::do_rla),
            // NOP abs,X - 4/5 cycles
            0x3C => self.addr_abx(bus, Self::do_nop_read),
            // AND abs,X - 4/5 cycles
            0x3D => self.addr_abx(bus, Self::do_and),
            // ROL abs,X - 7 cycles
            0x3E => self.addr_abx_rmw(bus, Self::do_rol),
            // RLA abs,X - 7 cycles
            0x3F => self.addr_abx_rmw(bus, Self::do_rla),

            // RTI - 6 cycles
            0x40 => self.op_rti(bus),
            // EOR (zp,X) - 6 cycles
            0x41 => self.addr_izx(bus, Self::do_eor),
            // SRE (zp,X) - 8 cycles
            0x43 => self.addr_izx_rmw(bus, Self::do_sre),
            // NOP zp - 3 cycles
            0x44 => self.addr_zp(bus, Self::do_nop_read),
            // EOR zp - 3 cycles
            0x45 => self.addr_zp(bus, Self::do_eor),
            // LSR zp - 5 cycles
            0x46 => self.addr_zp_rmw(bus, Self::do_lsr),
            // SRE zp - 5 cycles
            0x47 => self.addr_zp_rmw(bus, Self::do_sre),
            // PHA - 3 cycles
            0x48 => self.op_pha(bus),
            // EOR imm - 2 cycles
            0x49 => self.addr_imm(bus, Self::do_eor),
            // LSR A - 2 cycles
            0x4A => self.op_acc(bus, Self::do_lsr),
            // ALR imm - 2 cycles
            0x4B => self.addr_imm(bus, Self::do_alr),
            // JMP abs - 3 cycles
            0x4C => self.op_jmp_abs(bus),
            // EOR abs - 4 cycles
            0x4D => self.addr_abs(bus, Self::do_eor),
            // LSR abs - 6 cycles
            0x4E => self.addr_abs_rmw(bus, Self::do_lsr),
            // SRE abs - 6 cycles
            0x4F => self.addr_abs_rmw(bus, Self::do_sre),

            // BVC rel - 2/3/4 cycles
            0x50 => self.op_branch(bus, !self.regs.p.is_set(V)),
            // EOR (zp),Y - 5/6 cycles
            0x51 => self.addr_izy(bus, Self::do_eor),
            // SRE (zp),Y - 8 cycles
            0x53 => self.addr_izy_rmw(bus, Self::do_sre),
            // NOP zp,X - 4 cycles
            0x54 => self.addr_zpx(bus, Self::do_nop_read),
            // EOR zp,X - 4 cycles
            0x55 => self.addr_zpx(bus, Self::do_eor),
            // LSR zp,X - 6 cycles
            0x56 => self.addr_zpx_rmw(bus, Self::do_lsr),
            // SRE zp,X - 6 cycles
            0x57 => self.addr_zpx_rmw(bus, Self::do_sre),
            // CLI - 2 cycles
            0x58 => self.op_flag(bus, I, false),
            // EOR abs,Y - 4/5 cycles
            0x59 => self.addr_aby(bus, Self::do_eor),
            // NOP - 2 cycles
            0x5A => self.op_nop(bus),
            // SRE abs,Y - 7 cycles
            0x5B => self.addr_aby_rmw(bus, Self::do_sre),
            // NOP abs,X - 4/5 cycles
            0x5C => self.addr_abx(bus, Self::do_nop_read),
            // EOR abs,X - 4/5 cycles
            0x5D => self.addr_abx(bus, Self::do_eor),
            // LSR abs,X - 7 cycles
            0x5E => self.addr_abx_rmw(bus, Self::do_lsr),
            // SRE abs,X - 7 cycles
            0x5F => self.addr_abx_rmw(bus, Self::do_sre),

            // RTS - 6 cycles
            0x60 => self.op_rts(bus),
            // ADC (zp,X) - 6 cycles
            0x61 => self.addr_izx(bus, Self::do_adc),
            // RRA (zp,X) - 8 cycles
            0x63 => self.addr_izx_rmw(bus, Self::do_rra),
            // NOP zp - 3 cycles
            0x64 => self.addr_zp(bus, Self::do_nop_read),
            // ADC zp - 3 cycles
            0x65 => self.addr_zp(bus, Self::do_adc),
            // ROR zp - 5 cycles
            0x66 => self.addr_zp_rmw(bus, Self::do_ror),
            // RRA zp - 5 cycles
            0x67 => self.addr_zp_rmw(bus, Self::do_rra),
            // PLA - 4 cycles
            0x68 => self.op_pla(bus),
            // ADC imm - 2 cycles
            0x69 => self.addr_imm(bus, Self::do_adc),
            // ROR A - 2 cycles
            0x6A => self.op_acc(bus, Self::do_ror),
            // ARR imm - 2 cycles
            0x6B => self.addr_imm(bus, Self::do_arr),
            // JMP (ind) - 5 cycles
            0x6C => self.op_jmp_ind(bus),
            // ADC abs - 4 cycles
            0x6D => self.addr_abs(bus, Self::do_adc),
            // ROR abs - 6 cycles
            0x6E => self.addr_abs_rmw(bus, Self::do_ror),
            // RRA abs - 6 cycles
            0x6F => self.addr_abs_rmw(bus, Self::do_rra),

            // BVS rel - 2/3/4 cycles
            0x70 => self.op_branch(bus, self.regs.p.is_set(V)),
            // ADC (zp),Y - 5/6 cycles
            0x71 => self.addr_izy(bus, Self::do_adc),
            // RRA (zp),Y - 8 cycles
            0x73 => self.addr_izy_rmw(bus, Self::do_rra),
            // NOP zp,X - 4 cycles
            0x74 => self.addr_zpx(bus, Self::do_nop_read),
            // ADC zp,X - 4 cycles
            0x75 => self.addr_zpx(bus, Self::do_adc),
            // ROR zp,X - 6 cycles
            0x76 => self.addr_zpx_rmw(bus, Self::do_ror),
            // RRA zp,X - 6 cycles
            0x77 => self.addr_zpx_rmw(bus, Self::do_rra),
            // SEI - 2 cycles
            0x78 => self.op_flag(bus, I, true),
            // ADC abs,Y - 4/5 cycles
            0x79 => self.addr_aby(bus, Self::do_adc),
            // NOP - 2 cycles
            0x7A => self.op_nop(bus),
            // RRA abs,Y - 7 cycles
            0x7B => self.addr_aby_rmw(bus, Self::do_rra),
            // NOP abs,X - 4/5 cycles
            0x7C => self.addr_abx(bus, Self::do_nop_read),
            // ADC abs,X - 4/5 cycles
            0x7D => self.addr_abx(bus, Self::do_adc),
            // ROR abs,X - 7 cycles
            0x7E => self.addr_abx_rmw(bus, Self::do_ror),
            // RRA abs,X - 7 cycles
            0x7F => self.addr_abx_rmw(bus, Self::do_rra),

            // NOP imm - 2 cycles
            0x80 | 0x82 | 0x89 => self.addr_imm(bus, Self::do_nop_read),
            // STA (zp,X) - 6 cycles
            0x81 => self.addr_izx_w(bus, |cpu| cpu.regs.a),
            // SAX (zp,X) - 6 cycles
            0x83 => self.addr_izx_w(bus, |cpu| cpu.regs.a & cpu.regs.x),
            // STY zp - 3 cycles
            0x84 => self.addr_zp_w(bus, |cpu| cpu.regs.y),
            // STA zp - 3 cycles
            0x85 => self.addr_zp_w(bus, |cpu| cpu.regs.a),
            // STX zp - 3 cycles
            0x86 => self.addr_zp_w(bus, |cpu| cpu.regs.x),
            // SAX zp - 3 cycles
            0x87 => self.addr_zp_w(bus, |cpu| cpu.regs.a & cpu.regs.x),
            // DEY - 2 cycles
            0x88 => self.op_implied(bus, |cpu| {
                cpu.regs.y = cpu.regs.y.wrapping_sub(1);
                cpu.regs.p.update_nz(cpu.regs.y);
            }),
            // TXA - 2 cycles
            0x8A => self.op_implied(bus, |cpu| {
                cpu.regs.a = cpu.regs.x;
                cpu.regs.p.update_nz(cpu.regs.a);
            }),
            // XAA imm - 2 cycles (unstable: uses the $EE magic constant)
            0x8B => self.addr_imm(bus, Self::do_xaa),
            // STY abs - 4 cycles
            0x8C => self.addr_abs_w(bus, |cpu| cpu.regs.y),
            // STA abs - 4 cycles
            0x8D => self.addr_abs_w(bus, |cpu| cpu.regs.a),
            // STX abs - 4 cycles
            0x8E => self.addr_abs_w(bus, |cpu| cpu.regs.x),
            // SAX abs - 4 cycles
            0x8F => self.addr_abs_w(bus, |cpu| cpu.regs.a & cpu.regs.x),

            // BCC rel - 2/3/4 cycles
            0x90 => self.op_branch(bus, !self.regs.p.is_set(C)),
            // STA (zp),Y - 6 cycles
            0x91 => self.addr_izy_w(bus, |cpu| cpu.regs.a),
            // AHX (zp),Y - 6 cycles
            0x93 => self.addr_izy_sh(bus),
            // STY zp,X - 4 cycles
            0x94 => self.addr_zpx_w(bus, |cpu| cpu.regs.y),
            // STA zp,X - 4 cycles
            0x95 => self.addr_zpx_w(bus, |cpu| cpu.regs.a),
            // STX zp,Y - 4 cycles
            0x96 => self.addr_zpy_w(bus, |cpu| cpu.regs.x),
            // SAX zp,Y - 4 cycles
            0x97 => self.addr_zpy_w(bus, |cpu| cpu.regs.a & cpu.regs.x),
            // TYA - 2 cycles
            0x98 => self.op_implied(bus, |cpu| {
                cpu.regs.a = cpu.regs.y;
                cpu.regs.p.update_nz(cpu.regs.a);
            }),
            // STA abs,Y - 5 cycles
            0x99 => self.addr_aby_w(bus, |cpu| cpu.regs.a),
            // TXS - 2 cycles (no flags)
            0x9A => self.op_implied(bus, |cpu| cpu.regs.s = cpu.regs.x),
            // TAS abs,Y - 5 cycles (S = A & X, then SH-store)
            0x9B => self.addr_ab_sh(bus, IndexReg::Y, ShSource::AxWithS),
            // SHY abs,X - 5 cycles
            0x9C => self.addr_ab_sh(bus, IndexReg::X, ShSource::Y),
            // STA abs,X - 5 cycles
            0x9D => self.addr_abx_w(bus, |cpu| cpu.regs.a),
            // SHX abs,Y - 5 cycles
            0x9E => self.addr_ab_sh(bus, IndexReg::Y, ShSource::X),
            // AHX abs,Y - 5 cycles
            0x9F => self.addr_ab_sh(bus, IndexReg::Y, ShSource::Ax),

            // LDY imm - 2 cycles
            0xA0 => self.addr_imm(bus, Self::do_ldy),
            // LDA (zp,X) - 6 cycles
            0xA1 => self.addr_izx(bus, Self::do_lda),
            // LDX imm - 2 cycles
            0xA2 => self.addr_imm(bus, Self::do_ldx),
            // LAX (zp,X) - 6 cycles
            0xA3 => self.addr_izx(bus, Self::do_lax),
            // LDY zp - 3 cycles
            0xA4 => self.addr_zp(bus, Self::do_ldy),
            // LDA zp - 3 cycles
            0xA5 => self.addr_zp(bus, Self::do_lda),
            // LDX zp - 3 cycles
            0xA6 => self.addr_zp(bus, Self::do_ldx),
            // LAX zp - 3 cycles
            0xA7 => self.addr_zp(bus, Self::do_lax),
            // TAY - 2 cycles
            0xA8 => self.op_implied(bus, |cpu| {
                cpu.regs.y = cpu.regs.a;
                cpu.regs.p.update_nz(cpu.regs.y);
            }),
            // LDA imm - 2 cycles
            0xA9 => self.addr_imm(bus, Self::do_lda),
            // TAX - 2 cycles
            0xAA => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.a;
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // LAX imm - 2 cycles (unstable: magic constant)
            0xAB => self.addr_imm(bus, Self::do_lxa),
            // LDY abs - 4 cycles
            0xAC => self.addr_abs(bus, Self::do_ldy),
            // LDA abs - 4 cycles
            0xAD => self.addr_abs(bus, Self::do_lda),
            // LDX abs - 4 cycles
            0xAE => self.addr_abs(bus, Self::do_ldx),
            // LAX abs - 4 cycles
            0xAF => self.addr_abs(bus, Self::do_lax),

            // BCS rel - 2/3/4 cycles
            0xB0 => self.op_branch(bus, self.regs.p.is_set(C)),
            // LDA (zp),Y - 5/6 cycles
            0xB1 => self.addr_izy(bus, Self::do_lda),
            // LAX (zp),Y - 5/6 cycles
            0xB3 => self.addr_izy(bus, Self::do_lax),
            // LDY zp,X - 4 cycles
            0xB4 => self.addr_zpx(bus, Self::do_ldy),
            // LDA zp,X - 4 cycles
            0xB5 => self.addr_zpx(bus, Self::do_lda),
            // LDX zp,Y - 4 cycles
            0xB6 => self.addr_zpy(bus, Self::do_ldx),
            // LAX zp,Y - 4 cycles
            0xB7 => self.addr_zpy(bus, Self::do_lax),
            // CLV - 2 cycles
            0xB8 => self.op_flag(bus, V, false),
            // LDA abs,Y - 4/5 cycles
            0xB9 => self.addr_aby(bus, Self::do_lda),
            // TSX - 2 cycles
            0xBA => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.s;
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // LAS abs,Y - 4/5 cycles
            0xBB => self.addr_aby(bus, Self::do_las),
            // LDY abs,X - 4/5 cycles
            0xBC => self.addr_abx(bus, Self::do_ldy),
            // LDA abs,X - 4/5 cycles
            0xBD => self.addr_abx(bus, Self::do_lda),
            // LDX abs,Y - 4/5 cycles
            0xBE => self.addr_aby(bus, Self::do_ldx),
            // LAX abs,Y - 4/5 cycles
            0xBF => self.addr_aby(bus, Self::do_lax),

            // CPY imm - 2 cycles
            0xC0 => self.addr_imm(bus, Self::do_cpy),
            // CMP (zp,X) - 6 cycles
            0xC1 => self.addr_izx(bus, Self::do_cmp),
            // NOP imm - 2 cycles
            0xC2 => self.addr_imm(bus, Self::do_nop_read),
            // DCP (zp,X) - 8 cycles
            0xC3 => self.addr_izx_rmw(bus, Self::do_dcp),
            // CPY zp - 3 cycles
            0xC4 => self.addr_zp(bus, Self::do_cpy),
            // CMP zp - 3 cycles
            0xC5 => self.addr_zp(bus, Self::do_cmp),
            // DEC zp - 5 cycles
            0xC6 => self.addr_zp_rmw(bus, Self::do_dec),
            // DCP zp - 5 cycles
            0xC7 => self.addr_zp_rmw(bus, Self::do_dcp),
            // INY - 2 cycles
            0xC8 => self.op_implied(bus, |cpu| {
                cpu.regs.y = cpu.regs.y.wrapping_add(1);
                cpu.regs.p.update_nz(cpu.regs.y);
            }),
            // CMP imm - 2 cycles
            0xC9 => self.addr_imm(bus, Self::do_cmp),
            // DEX - 2 cycles
            0xCA => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.x.wrapping_sub(1);
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // SBX imm - 2 cycles
            0xCB => self.addr_imm(bus, Self::do_sbx),
            // CPY abs - 4 cycles
            0xCC => self.addr_abs(bus, Self::do_cpy),
            // CMP abs - 4 cycles
            0xCD => self.addr_abs(bus, Self::do_cmp),
            // DEC abs - 6 cycles
            0xCE => self.addr_abs_rmw(bus, Self::do_dec),
            // DCP abs - 6 cycles
            0xCF => self.addr_abs_rmw(bus, Self::do_dcp),

            // BNE rel - 2/3/4 cycles
            0xD0 => self.op_branch(bus, !self.regs.p.is_set(Z)),
            // CMP (zp),Y - 5/6 cycles
            0xD1 => self.addr_izy(bus, Self::do_cmp),
            // DCP (zp),Y - 8 cycles
            0xD3 => self.addr_izy_rmw(bus, Self::do_dcp),
            // NOP zp,X - 4 cycles
            0xD4 => self.addr_zpx(bus, Self::do_nop_read),
            // CMP zp,X - 4 cycles
            0xD5 => self.addr_zpx(bus, Self::do_cmp),
            // DEC zp,X - 6 cycles
            0xD6 => self.addr_zpx_rmw(bus, Self::do_dec),
            // DCP zp,X - 6 cycles
            0xD7 => self.addr_zpx_rmw(bus, Self::do_dcp),
            // CLD - 2 cycles
            0xD8 => self.op_flag(bus, D, false),
            // CMP abs,Y - 4/5 cycles
            0xD9 => self.addr_aby(bus, Self::do_cmp),
            // NOP - 2 cycles
            0xDA => self.op_nop(bus),
            // DCP abs,Y - 7 cycles
            0xDB => self.addr_aby_rmw(bus, Self::do_dcp),
            // NOP abs,X - 4/5 cycles
            0xDC => self.addr_abx(bus, Self::do_nop_read),
            // CMP abs,X - 4/5 cycles
            0xDD => self.addr_abx(bus, Self::do_cmp),
            // DEC abs,X - 7 cycles
            0xDE => self.addr_abx_rmw(bus, Self::do_dec),
            // DCP abs,X - 7 cycles
            0xDF => self.addr_abx_rmw(bus, Self::do_dcp),

            // CPX imm - 2 cycles
            0xE0 => self.addr_imm(bus, Self::do_cpx),
            // SBC (zp,X) - 6 cycles
            0xE1 => self.addr_izx(bus, Self::do_sbc),
            // NOP imm - 2 cycles
            0xE2 => self.addr_imm(bus, Self::do_nop_read),
            // ISC (zp,X) - 8 cycles
            0xE3 => self.addr_izx_rmw(bus, Self::do_isc),
            // CPX zp - 3 cycles
            0xE4 => self.addr_zp(bus, Self::do_cpx),
            // SBC zp - 3 cycles
            0xE5 => self.addr_zp(bus, Self::do_sbc),
            // INC zp - 5 cycles
            0xE6 => self.addr_zp_rmw(bus, Self::do_inc),
            // ISC zp - 5 cycles
            0xE7 => self.addr_zp_rmw(bus, Self::do_isc),
            // INX - 2 cycles
            0xE8 => self.op_implied(bus, |cpu| {
                cpu.regs.x = cpu.regs.x.wrapping_add(1);
                cpu.regs.p.update_nz(cpu.regs.x);
            }),
            // SBC imm - 2 cycles (0xEB is the same instruction)
            0xE9 | 0xEB => self.addr_imm(bus, Self::do_sbc),
            // NOP - 2 cycles
            0xEA => self.op_nop(bus),
            // CPX abs - 4 cycles
            0xEC => self.addr_abs(bus, Self::do_cpx),
            // SBC abs - 4 cycles
            0xED => self.addr_abs(bus, Self::do_sbc),
            // INC abs - 6 cycles
            0xEE => self.addr_abs_rmw(bus, Self::do_inc),
            // ISC abs - 6 cycles
            0xEF => self.addr_abs_rmw(bus, Self::do_isc),

            // BEQ rel - 2/3/4 cycles
            0xF0 => self.op_branch(bus, self.regs.p.is_set(Z)),
            // SBC (zp),Y - 5/6 cycles
            0xF1 => self.addr_izy(bus, Self::do_sbc),
            // ISC (zp),Y - 8 cycles
            0xF3 => self.addr_izy_rmw(bus, Self::do_isc),
            // NOP zp,X - 4 cycles
            0xF4 => self.addr_zpx(bus, Self::do_nop_read),
            // SBC zp,X - 4 cycles
            0xF5 => self.addr_zpx(bus, Self::do_sbc),
            // INC zp,X - 6 cycles
            0xF6 => self.addr_zpx_rmw(bus, Self::do_inc),
            // ISC zp,X - 6 cycles
            0xF7 => self.addr_zpx_rmw(bus, Self::do_isc),
            // SED - 2 cycles
            0xF8 => self.op_flag(bus, D, true),
            // SBC abs,Y - 4/5 cycles
            0xF9 => self.addr_aby(bus, Self::do_sbc),
            // NOP - 2 cycles
            0xFA => self.op_nop(bus),
            // ISC abs,Y - 7 cycles
            0xFB => self.addr_aby_rmw(bus, Self::do_isc),
            // NOP abs,X - 4/5 cycles
            0xFC => self.addr_abx(bus, Self::do_nop_read),
            // SBC abs,X - 4/5 cycles
            0xFD => self.addr_abx(bus, Self::do_sbc),
            // INC abs,X - 7 cycles
            0xFE => self.addr_abx_rmw(bus, Self::do_inc),
            // ISC abs,X - 7 cycles
            0xFF => self.addr_abx_rmw(bus, Self::do_isc),

            // KIL - jam the CPU
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
                self.state = State::Jammed;
            }
        }
    }

    // ========================================================================
    // Addressing mode helpers - read operations
    // ========================================================================

    /// Immediate addressing: operand is next byte.
    fn addr_imm<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        if self.cycle == 1 {
            let Some(value) = self.read(bus, self.regs.pc) else {
                return;
            };
            self.regs.pc = self.regs.pc.wrapping_add(1);
            op(self, value);
            self.finish();
        }
    }

    /// Zero page addressing: operand is at zero page address.
    fn addr_zp<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Zero page,X addressing.
    fn addr_zpx<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        self.addr_zp_indexed(bus, op, IndexReg::X);
    }

    /// Zero page,Y addressing.
    fn addr_zpy<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        self.addr_zp_indexed(bus, op, IndexReg::Y);
    }

    fn addr_zp_indexed<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8), index: IndexReg) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                // Dummy read while adding the index (wraps in page zero)
                if self.read(bus, u16::from(self.pointer)).is_none() {
                    return;
                }
                self.addr = u16::from(self.pointer.wrapping_add(self.index_value(index)));
                self.cycle = 3;
            }
            3 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Absolute addressing: operand is at 16-bit address.
    fn addr_abs<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 3;
            }
            3 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Absolute,X addressing with page crossing check.
    fn addr_abx<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        self.addr_ab_indexed(bus, op, IndexReg::X);
    }

    /// Absolute,Y addressing with page crossing check.
    fn addr_aby<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        self.addr_ab_indexed(bus, op, IndexReg::Y);
    }

    fn addr_ab_indexed<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8), index: IndexReg) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.regs.pc = self.regs.pc.wrapping_add(1);
                let idx = self.index_value(index);
                let lo = (self.addr as u8).wrapping_add(idx);
                self.page_crossed = lo < idx;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 3;
            }
            3 => {
                if self.page_crossed {
                    // Dummy read from the unfixed address, then fix
                    if self.read(bus, self.addr).is_none() {
                        return;
                    }
                    self.addr = self.addr.wrapping_add(0x100);
                    self.cycle = 4;
                } else {
                    let Some(value) = self.read(bus, self.addr) else {
                        return;
                    };
                    op(self, value);
                    self.finish();
                }
            }
            4 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Indexed indirect (zp,X) addressing.
    fn addr_izx<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, u16::from(self.pointer)).is_none() {
                    return;
                }
                self.pointer = self.pointer.wrapping_add(self.regs.x);
                self.cycle = 3;
            }
            3 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 4;
            }
            4 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.cycle = 5;
            }
            5 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Indirect indexed (zp),Y addressing.
    fn addr_izy<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 3;
            }
            3 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                let lo = (self.addr as u8).wrapping_add(self.regs.y);
                self.page_crossed = lo < self.regs.y;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 4;
            }
            4 => {
                if self.page_crossed {
                    if self.read(bus, self.addr).is_none() {
                        return;
                    }
                    self.addr = self.addr.wrapping_add(0x100);
                    self.cycle = 5;
                } else {
                    let Some(value) = self.read(bus, self.addr) else {
                        return;
                    };
                    op(self, value);
                    self.finish();
                }
            }
            5 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    // ========================================================================
    // Addressing mode helpers - write operations
    // ========================================================================

    /// Zero page write.
    fn addr_zp_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Zero page,X write.
    fn addr_zpx_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        self.addr_zp_indexed_w(bus, val, IndexReg::X);
    }

    /// Zero page,Y write.
    fn addr_zpy_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        self.addr_zp_indexed_w(bus, val, IndexReg::Y);
    }

    fn addr_zp_indexed_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8, index: IndexReg) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, u16::from(self.pointer)).is_none() {
                    return;
                }
                self.addr = u16::from(self.pointer.wrapping_add(self.index_value(index)));
                self.cycle = 3;
            }
            3 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Absolute write.
    fn addr_abs_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 3;
            }
            3 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Absolute,X write (always 5 cycles).
    fn addr_abx_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        self.addr_ab_indexed_w(bus, val, IndexReg::X);
    }

    /// Absolute,Y write (always 5 cycles).
    fn addr_aby_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        self.addr_ab_indexed_w(bus, val, IndexReg::Y);
    }

    fn addr_ab_indexed_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8, index: IndexReg) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.regs.pc = self.regs.pc.wrapping_add(1);
                let idx = self.index_value(index);
                let lo = (self.addr as u8).wrapping_add(idx);
                self.page_crossed = lo < idx;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 3;
            }
            3 => {
                // Writes always take the dummy-read fixup cycle
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                if self.page_crossed {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Indexed indirect (zp,X) write.
    fn addr_izx_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, u16::from(self.pointer)).is_none() {
                    return;
                }
                self.pointer = self.pointer.wrapping_add(self.regs.x);
                self.cycle = 3;
            }
            3 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 4;
            }
            4 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Indirect indexed (zp),Y write (always 6 cycles).
    fn addr_izy_w<B: Bus>(&mut self, bus: &mut B, val: fn(&Self) -> u8) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 3;
            }
            3 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                let lo = (self.addr as u8).wrapping_add(self.regs.y);
                self.page_crossed = lo < self.regs.y;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 4;
            }
            4 => {
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                if self.page_crossed {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, val(self));
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// AHX/SHX/SHY/TAS-style store: value is masked with the incremented
    /// high byte of the base address, which also corrupts the target page
    /// on an index carry.
    fn addr_ab_sh<B: Bus>(&mut self, bus: &mut B, index: IndexReg, source: ShSource) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.pointer = hi;
                let idx = self.index_value(index);
                let lo = (self.addr as u8).wrapping_add(idx);
                self.page_crossed = lo < idx;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 3;
            }
            3 => {
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                if let ShSource::AxWithS = source {
                    self.regs.s = self.regs.a & self.regs.x;
                }
                let value = self.sh_mask(source) & self.pointer.wrapping_add(1);
                if self.page_crossed {
                    self.addr = (u16::from(value) << 8) | (self.addr & 0x00FF);
                } else {
                    // No carry: high byte stays as fetched
                }
                self.data = value;
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// AHX (zp),Y: same high-byte mask quirk through a zero-page pointer.
    fn addr_izy_sh<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 3;
            }
            3 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                self.pointer = hi;
                let lo = (self.addr as u8).wrapping_add(self.regs.y);
                self.page_crossed = lo < self.regs.y;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 4;
            }
            4 => {
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                let value = self.regs.a & self.regs.x & self.pointer.wrapping_add(1);
                if self.page_crossed {
                    self.addr = (u16::from(value) << 8) | (self.addr & 0x00FF);
                }
                self.data = value;
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    // ========================================================================
    // Addressing mode helpers - read-modify-write operations
    // ========================================================================

    /// Zero page read-modify-write.
    fn addr_zp_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = value;
                self.cycle = 3;
            }
            3 => {
                // Write original value back (dummy write)
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Zero page,X read-modify-write.
    fn addr_zpx_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, u16::from(self.pointer)).is_none() {
                    return;
                }
                self.addr = u16::from(self.pointer.wrapping_add(self.regs.x));
                self.cycle = 3;
            }
            3 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = value;
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Absolute read-modify-write.
    fn addr_abs_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 3;
            }
            3 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = value;
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Absolute,X read-modify-write (always 7 cycles).
    fn addr_abx_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        self.addr_ab_indexed_rmw(bus, op, IndexReg::X);
    }

    /// Absolute,Y read-modify-write (always 7 cycles; illegal opcodes).
    fn addr_aby_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        self.addr_ab_indexed_rmw(bus, op, IndexReg::Y);
    }

    fn addr_ab_indexed_rmw<B: Bus>(
        &mut self,
        bus: &mut B,
        op: fn(&mut Self, u8) -> u8,
        index: IndexReg,
    ) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.regs.pc = self.regs.pc.wrapping_add(1);
                let idx = self.index_value(index);
                let lo = (self.addr as u8).wrapping_add(idx);
                self.page_crossed = lo < idx;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 3;
            }
            3 => {
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                if self.page_crossed {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 4;
            }
            4 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = value;
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle = 6;
            }
            6 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// (zp,X) read-modify-write (8 cycles; illegal opcodes).
    fn addr_izx_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, u16::from(self.pointer)).is_none() {
                    return;
                }
                self.pointer = self.pointer.wrapping_add(self.regs.x);
                self.cycle = 3;
            }
            3 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 4;
            }
            4 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.cycle = 5;
            }
            5 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = value;
                self.cycle = 6;
            }
            6 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle = 7;
            }
            7 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// (zp),Y read-modify-write (8 cycles; illegal opcodes).
    fn addr_izy_rmw<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                let Some(ptr) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.pointer = ptr;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(lo) = self.read(bus, u16::from(self.pointer)) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.cycle = 3;
            }
            3 => {
                let Some(hi) = self.read(bus, u16::from(self.pointer.wrapping_add(1))) else {
                    return;
                };
                let lo = (self.addr as u8).wrapping_add(self.regs.y);
                self.page_crossed = lo < self.regs.y;
                self.addr = u16::from(lo) | (u16::from(hi) << 8);
                self.cycle = 4;
            }
            4 => {
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                if self.page_crossed {
                    self.addr = self.addr.wrapping_add(0x100);
                }
                self.cycle = 5;
            }
            5 => {
                let Some(value) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = value;
                self.cycle = 6;
            }
            6 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
                self.cycle = 7;
            }
            7 => {
                bus.write(self.addr, self.data);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn index_value(&self, index: IndexReg) -> u8 {
        match index {
            IndexReg::X => self.regs.x,
            IndexReg::Y => self.regs.y,
        }
    }

    fn sh_mask(&self, source: ShSource) -> u8 {
        match source {
            ShSource::Ax | ShSource::AxWithS => self.regs.a & self.regs.x,
            ShSource::X => self.regs.x,
            ShSource::Y => self.regs.y,
        }
    }

    // ========================================================================
    // ALU operations
    // ========================================================================

    fn do_lda(&mut self, val: u8) {
        self.regs.a = val;
        self.regs.p.update_nz(val);
    }

    fn do_ldx(&mut self, val: u8) {
        self.regs.x = val;
        self.regs.p.update_nz(val);
    }

    fn do_ldy(&mut self, val: u8) {
        self.regs.y = val;
        self.regs.p.update_nz(val);
    }

    fn do_lax(&mut self, val: u8) {
        self.regs.a = val;
        self.regs.x = val;
        self.regs.p.update_nz(val);
    }

    fn do_ora(&mut self, val: u8) {
        self.regs.a |= val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_and(&mut self, val: u8) {
        self.regs.a &= val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_eor(&mut self, val: u8) {
        self.regs.a ^= val;
        self.regs.p.update_nz(self.regs.a);
    }

    fn do_adc(&mut self, val: u8) {
        if self.regs.p.is_set(D) {
            self.do_adc_decimal(val);
        } else {
            self.do_adc_binary(val);
        }
    }

    fn do_adc_binary(&mut self, val: u8) {
        let a = self.regs.a;
        let carry = u16::from(self.regs.p.is_set(C));
        let sum = u16::from(a) + u16::from(val) + carry;
        let result = sum as u8;

        self.regs.p.set_if(C, sum > 0xFF);
        self.regs
            .p
            .set_if(V, (a ^ result) & (val ^ result) & 0x80 != 0);
        self.regs.a = result;
        self.regs.p.update_nz(result);
    }

    fn do_adc_decimal(&mut self, val: u8) {
        let a = self.regs.a;
        let carry = u8::from(self.regs.p.is_set(C));

        let mut lo = (a & 0x0F) + (val & 0x0F) + carry;
        if lo > 9 {
            lo += 6;
        }

        let mut hi = (a >> 4) + (val >> 4) + u8::from(lo > 0x0F);

        // Z, N and V come from the binary intermediate on NMOS
        let bin = u16::from(a) + u16::from(val) + u16::from(carry);
        let bin_result = bin as u8;
        self.regs.p.set_if(Z, bin_result == 0);
        self.regs.p.set_if(N, hi & 0x08 != 0);
        self.regs
            .p
            .set_if(V, (a ^ bin_result) & (val ^ bin_result) & 0x80 != 0);

        if hi > 9 {
            hi += 6;
        }

        self.regs.p.set_if(C, hi > 0x0F);
        self.regs.a = (hi << 4) | (lo & 0x0F);
    }

    fn do_sbc(&mut self, val: u8) {
        if self.regs.p.is_set(D) {
            self.do_sbc_decimal(val);
        } else {
            // SBC is ADC with inverted operand
            self.do_adc_binary(!val);
        }
    }

    fn do_sbc_decimal(&mut self, val: u8) {
        let a = self.regs.a;
        let borrow = i16::from(!self.regs.p.is_set(C));

        // Flags from the binary intermediate (NMOS behaviour)
        let bin = i16::from(a) - i16::from(val) - borrow;
        self.regs.p.set_if(C, bin >= 0);
        self.regs.p.set_if(Z, (bin as u8) == 0);
        self.regs.p.set_if(N, bin & 0x80 != 0);
        self.regs.p.set_if(
            V,
            (i16::from(a) ^ bin) & (i16::from(a) ^ i16::from(val)) & 0x80 != 0,
        );

        let mut lo = i16::from(a & 0x0F) - i16::from(val & 0x0F) - borrow;
        let mut hi = i16::from(a >> 4) - i16::from(val >> 4);

        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }

        self.regs.a = (((hi as u8) << 4) & 0xF0) | ((lo as u8) & 0x0F);
    }

    fn do_cmp(&mut self, val: u8) {
        let result = self.regs.a.wrapping_sub(val);
        self.regs.p.set_if(C, self.regs.a >= val);
        self.regs.p.update_nz(result);
    }

    fn do_cpx(&mut self, val: u8) {
        let result = self.regs.x.wrapping_sub(val);
        self.regs.p.set_if(C, self.regs.x >= val);
        self.regs.p.update_nz(result);
    }

    fn do_cpy(&mut self, val: u8) {
        let result = self.regs.y.wrapping_sub(val);
        self.regs.p.set_if(C, self.regs.y >= val);
        self.regs.p.update_nz(result);
    }

    fn do_bit(&mut self, val: u8) {
        self.regs.p.set_if(Z, self.regs.a & val == 0);
        self.regs.p.set_if(N, val & 0x80 != 0);
        self.regs.p.set_if(V, val & 0x40 != 0);
    }

    fn do_asl(&mut self, val: u8) -> u8 {
        self.regs.p.set_if(C, val & 0x80 != 0);
        let result = val << 1;
        self.regs.p.update_nz(result);
        result
    }

    fn do_lsr(&mut self, val: u8) -> u8 {
        self.regs.p.set_if(C, val & 0x01 != 0);
        let result = val >> 1;
        self.regs.p.update_nz(result);
        result
    }

    fn do_rol(&mut self, val: u8) -> u8 {
        let carry = u8::from(self.regs.p.is_set(C));
        self.regs.p.set_if(C, val & 0x80 != 0);
        let result = (val << 1) | carry;
        self.regs.p.update_nz(result);
        result
    }

    fn do_ror(&mut self, val: u8) -> u8 {
        let carry = if self.regs.p.is_set(C) { 0x80 } else { 0 };
        self.regs.p.set_if(C, val & 0x01 != 0);
        let result = (val >> 1) | carry;
        self.regs.p.update_nz(result);
        result
    }

    fn do_inc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.regs.p.update_nz(result);
        result
    }

    fn do_dec(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.regs.p.update_nz(result);
        result
    }

    fn do_nop_read(&mut self, _val: u8) {}

    // ------------------------------------------------------------------------
    // Illegal opcode ALU combinations
    // ------------------------------------------------------------------------

    /// SLO: ASL memory, then ORA the result into A.
    fn do_slo(&mut self, val: u8) -> u8 {
        let shifted = self.do_asl(val);
        self.do_ora(shifted);
        shifted
    }

    /// RLA: ROL memory, then AND the result into A.
    fn do_rla(&mut self, val: u8) -> u8 {
        let rolled = self.do_rol(val);
        self.do_and(rolled);
        rolled
    }

    /// SRE: LSR memory, then EOR the result into A.
    fn do_sre(&mut self, val: u8) -> u8 {
        let shifted = self.do_lsr(val);
        self.do_eor(shifted);
        shifted
    }

    /// RRA: ROR memory, then ADC the result.
    fn do_rra(&mut self, val: u8) -> u8 {
        let rotated = self.do_ror(val);
        self.do_adc(rotated);
        rotated
    }

    /// DCP: DEC memory, then CMP with A.
    fn do_dcp(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.do_cmp(result);
        result
    }

    /// ISC: INC memory, then SBC the result.
    fn do_isc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.do_sbc(result);
        result
    }

    /// ANC: AND, with C mirroring N.
    fn do_anc(&mut self, val: u8) {
        self.do_and(val);
        self.regs.p.set_if(C, self.regs.a & 0x80 != 0);
    }

    /// ALR: AND then LSR A.
    fn do_alr(&mut self, val: u8) {
        let masked = self.regs.a & val;
        self.regs.p.set_if(C, masked & 0x01 != 0);
        self.regs.a = masked >> 1;
        self.regs.p.update_nz(self.regs.a);
    }

    /// ARR: AND then ROR A, with its own flag rules and a decimal-mode
    /// fixup pass.
    fn do_arr(&mut self, val: u8) {
        let masked = self.regs.a & val;
        let carry_in = if self.regs.p.is_set(C) { 0x80u8 } else { 0 };
        let mut result = (masked >> 1) | carry_in;

        self.regs.p.update_nz(result);
        self.regs
            .p
            .set_if(V, ((result >> 6) ^ (result >> 5)) & 0x01 != 0);

        if self.regs.p.is_set(D) {
            // Decimal fixups operate on the pre-rotate nibbles
            if (masked & 0x0F) + (masked & 0x01) > 5 {
                result = (result & 0xF0) | ((result.wrapping_add(6)) & 0x0F);
            }
            if (masked & 0xF0) as u16 + (masked & 0x10) as u16 > 0x50 {
                self.regs.p.set(C);
                result = result.wrapping_add(0x60);
            } else {
                self.regs.p.clear(C);
            }
        } else {
            self.regs.p.set_if(C, result & 0x40 != 0);
        }

        self.regs.a = result;
    }

    /// XAA: unstable, A = (A | $EE) & X & operand.
    fn do_xaa(&mut self, val: u8) {
        self.regs.a = (self.regs.a | 0xEE) & self.regs.x & val;
        self.regs.p.update_nz(self.regs.a);
    }

    /// LAX #imm (LXA): unstable, A = X = (A | $EE) & operand.
    fn do_lxa(&mut self, val: u8) {
        let result = (self.regs.a | 0xEE) & val;
        self.regs.a = result;
        self.regs.x = result;
        self.regs.p.update_nz(result);
    }

    /// SBX: X = (A & X) - operand, flags like CMP.
    fn do_sbx(&mut self, val: u8) {
        let masked = self.regs.a & self.regs.x;
        let result = masked.wrapping_sub(val);
        self.regs.p.set_if(C, masked >= val);
        self.regs.x = result;
        self.regs.p.update_nz(result);
    }

    /// LAS: A = X = S = memory & S.
    fn do_las(&mut self, val: u8) {
        let result = val & self.regs.s;
        self.regs.a = result;
        self.regs.x = result;
        self.regs.s = result;
        self.regs.p.update_nz(result);
    }

    // ========================================================================
    // Individual instruction implementations
    // ========================================================================

    /// BRK, and the IRQ/NMI sequences which share its shape.
    fn op_brk<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                // Padding byte; a real BRK advances PC past it
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                if self.servicing == Interrupt::None {
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                self.cycle = 2;
            }
            2 => {
                let addr = self.regs.push();
                bus.write(addr, (self.regs.pc >> 8) as u8);
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.pc as u8);
                self.cycle = 4;
            }
            4 => {
                // An NMI edge by now hijacks the sequence: the pushed P
                // and the vector both become NMI-shaped
                self.maybe_hijack_nmi();
                let p = if self.servicing == Interrupt::None {
                    self.regs.p.to_byte_brk()
                } else {
                    self.regs.p.to_byte_irq()
                };
                let addr = self.regs.push();
                bus.write(addr, p);
                self.cycle = 5;
            }
            5 => {
                self.maybe_hijack_nmi();
                let Some(lo) = self.read(bus, self.vector_base()) else {
                    return;
                };
                self.data = lo;
                self.regs.p.set(I);
                self.cycle = 6;
            }
            6 => {
                let Some(hi) = self.read(bus, self.vector_base().wrapping_add(1)) else {
                    return;
                };
                self.regs.pc = u16::from(self.data) | (u16::from(hi) << 8);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Redirect the in-flight BRK/IRQ sequence to the NMI vector if an
    /// NMI edge has arrived.
    fn maybe_hijack_nmi(&mut self) {
        if self.servicing != Interrupt::Nmi && (self.nmi_edge || self.do_nmi) {
            self.nmi_edge = false;
            self.do_nmi = false;
            self.servicing = Interrupt::Nmi;
        }
    }

    fn vector_base(&self) -> u16 {
        match self.servicing {
            Interrupt::Nmi => 0xFFFA,
            Interrupt::None | Interrupt::Irq => 0xFFFE,
        }
    }

    fn op_rti<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, self.regs.stack_addr()).is_none() {
                    return;
                }
                self.cycle = 3;
            }
            3 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(p) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                // I takes effect after this instruction's poll
                self.data = u8::from(self.regs.p.is_set(I));
                self.regs.p = Status::from_byte(p);
                self.cycle = 4;
            }
            4 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(lo) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                self.addr = u16::from(lo);
                self.cycle = 5;
            }
            5 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(hi) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                self.regs.pc = self.addr | (u16::from(hi) << 8);
                let old_i = self.data != 0;
                self.finish_with_i(old_i);
            }
            _ => unreachable!(),
        }
    }

    fn op_rts<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, self.regs.stack_addr()).is_none() {
                    return;
                }
                self.cycle = 3;
            }
            3 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(lo) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                self.addr = u16::from(lo);
                self.cycle = 4;
            }
            4 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(hi) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                self.addr |= u16::from(hi) << 8;
                self.cycle = 5;
            }
            5 => {
                if self.read(bus, self.addr).is_none() {
                    return;
                }
                self.regs.pc = self.addr.wrapping_add(1);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_jsr<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, self.regs.stack_addr()).is_none() {
                    return;
                }
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.push();
                bus.write(addr, (self.regs.pc >> 8) as u8);
                self.cycle = 4;
            }
            4 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.pc as u8);
                self.cycle = 5;
            }
            5 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.regs.pc = self.addr | (u16::from(hi) << 8);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_jmp_abs<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.regs.pc = self.addr | (u16::from(hi) << 8);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_jmp_ind<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let Some(lo) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr = u16::from(lo);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.cycle = 2;
            }
            2 => {
                let Some(hi) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.addr |= u16::from(hi) << 8;
                self.cycle = 3;
            }
            3 => {
                let Some(lo) = self.read(bus, self.addr) else {
                    return;
                };
                self.data = lo;
                self.cycle = 4;
            }
            4 => {
                // The pointer high byte fetch wraps within the page
                let hi_addr = (self.addr & 0xFF00) | (self.addr.wrapping_add(1) & 0x00FF);
                let Some(hi) = self.read(bus, hi_addr) else {
                    return;
                };
                self.regs.pc = u16::from(self.data) | (u16::from(hi) << 8);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_branch<B: Bus>(&mut self, bus: &mut B, taken: bool) {
        match self.cycle {
            1 => {
                let Some(offset) = self.read(bus, self.regs.pc) else {
                    return;
                };
                self.data = offset;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                if taken {
                    self.cycle = 2;
                } else {
                    self.finish();
                }
            }
            2 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                let offset = i16::from(self.data as i8);
                let new_pc = (self.regs.pc as i16).wrapping_add(offset) as u16;
                if (new_pc ^ self.regs.pc) & 0xFF00 != 0 {
                    // Page crossed: the fixup cycle re-polls interrupts
                    self.addr = new_pc;
                    self.cycle = 3;
                } else {
                    // A taken branch without page cross does not poll on
                    // this cycle; the pending decision carries over.
                    self.regs.pc = new_pc;
                    self.state = State::FetchOpcode;
                    self.cycle = 0;
                }
            }
            3 => {
                if self
                    .read(bus, (self.regs.pc & 0xFF00) | (self.addr & 0x00FF))
                    .is_none()
                {
                    return;
                }
                self.regs.pc = self.addr;
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_php<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                self.cycle = 2;
            }
            2 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.p.to_byte_brk());
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_plp<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, self.regs.stack_addr()).is_none() {
                    return;
                }
                self.cycle = 3;
            }
            3 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(p) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                let old_i = self.regs.p.is_set(I);
                self.regs.p = Status::from_byte(p);
                self.finish_with_i(old_i);
            }
            _ => unreachable!(),
        }
    }

    fn op_pha<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                self.cycle = 2;
            }
            2 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.a);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_pla<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                if self.read(bus, self.regs.pc).is_none() {
                    return;
                }
                self.cycle = 2;
            }
            2 => {
                if self.read(bus, self.regs.stack_addr()).is_none() {
                    return;
                }
                self.cycle = 3;
            }
            3 => {
                let addr = 0x0100 | u16::from(self.regs.s.wrapping_add(1));
                let Some(value) = self.read(bus, addr) else {
                    return;
                };
                self.regs.pop();
                self.regs.a = value;
                self.regs.p.update_nz(self.regs.a);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// Flag set/clear instructions. The I-flag variants poll with the
    /// old value, which is what makes CLI take effect one instruction
    /// late and SEI let a pending IRQ through.
    fn op_flag<B: Bus>(&mut self, bus: &mut B, flag: u8, set: bool) {
        if self.cycle == 1 {
            if self.read(bus, self.regs.pc).is_none() {
                return;
            }
            let old_i = self.regs.p.is_set(I);
            self.regs.p.set_if(flag, set);
            if flag == I {
                self.finish_with_i(old_i);
            } else {
                self.finish();
            }
        }
    }

    fn op_nop<B: Bus>(&mut self, bus: &mut B) {
        if self.cycle == 1 {
            if self.read(bus, self.regs.pc).is_none() {
                return;
            }
            self.finish();
        }
    }

    /// Single-cycle implied instruction with a dummy operand read.
    fn op_implied<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self)) {
        if self.cycle == 1 {
            if self.read(bus, self.regs.pc).is_none() {
                return;
            }
            op(self);
            self.finish();
        }
    }

    /// Accumulator-mode shift/rotate.
    fn op_acc<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        if self.cycle == 1 {
            if self.read(bus, self.regs.pc).is_none() {
                return;
            }
            self.regs.a = op(self, self.regs.a);
            self.finish();
        }
    }
}

/// Index register selector for the shared addressing helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexReg {
    X,
    Y,
}

/// Value source for the AHX/SHX/SHY/TAS store family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShSource {
    /// A & X (AHX).
    Ax,
    /// A & X, also loading S first (TAS).
    AxWithS,
    /// X (SHX).
    X,
    /// Y (SHY).
    Y,
}

// ============================================================================
// Trait implementations
// ============================================================================

impl Observable for Mos6510 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(self.regs.pc.into()),
            "pc0" => Some(self.pc0.into()),
            "a" => Some(self.regs.a.into()),
            "x" => Some(self.regs.x.into()),
            "y" => Some(self.regs.y.into()),
            "s" | "sp" => Some(self.regs.s.into()),
            "p" | "status" => Some(self.regs.p.0.into()),
            "flags.c" | "c" => Some(self.regs.p.is_set(C).into()),
            "flags.z" | "z" => Some(self.regs.p.is_set(Z).into()),
            "flags.i" | "i" => Some(self.regs.p.is_set(I).into()),
            "flags.d" | "d" => Some(self.regs.p.is_set(D).into()),
            "flags.v" | "v" => Some(self.regs.p.is_set(V).into()),
            "flags.n" | "n" => Some(self.regs.p.is_set(N).into()),
            "cycle" => Some(Value::U64(self.total_cycles)),
            "halted" => Some(self.is_halted().into()),
            "rdy" => Some(self.rdy.into()),
            "nmi_line" => Some(self.nmi_line.into()),
            "irq_line" => Some(self.irq_line.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc", "pc0", "a", "x", "y", "s", "p", "flags.c", "flags.z", "flags.i", "flags.d",
            "flags.v", "flags.n", "cycle", "halted", "rdy", "nmi_line", "irq_line",
        ]
    }
}

impl Snapshotable for Mos6510 {
    fn state_size(&self) -> usize {
        STATE_SIZE
    }

    fn save(&self, w: &mut SnapshotWriter) {
        w.put_u8(self.regs.a);
        w.put_u8(self.regs.x);
        w.put_u8(self.regs.y);
        w.put_u8(self.regs.s);
        w.put_u16(self.regs.pc);
        w.put_u8(self.regs.p.0);
        w.put_u16(self.pc0);
        w.put_u8(match self.state {
            State::FetchOpcode => 0,
            State::Execute => 1,
            State::Jammed => 2,
        });
        w.put_u8(match self.servicing {
            Interrupt::None => 0,
            Interrupt::Irq => 1,
            Interrupt::Nmi => 2,
        });
        w.put_u8(self.opcode);
        w.put_u8(self.cycle);
        w.put_u16(self.addr);
        w.put_u8(self.data);
        w.put_u8(self.pointer);
        w.put_bool(self.page_crossed);
        w.put_u8(self.nmi_line);
        w.put_u8(self.irq_line);
        w.put_bool(self.nmi_sampled);
        w.put_bool(self.irq_sampled);
        w.put_bool(self.nmi_edge);
        w.put_bool(self.do_nmi);
        w.put_bool(self.do_irq);
        w.put_bool(self.rdy);
        w.put_u64(self.rdy_line_down);
        w.put_u64(self.rdy_line_up);
        w.put_u64(self.total_cycles);
    }

    fn load(&mut self, r: &mut SnapshotReader<'_>) -> Result<(), SnapshotError> {
        self.regs.a = r.get_u8()?;
        self.regs.x = r.get_u8()?;
        self.regs.y = r.get_u8()?;
        self.regs.s = r.get_u8()?;
        self.regs.pc = r.get_u16()?;
        self.regs.p = Status(r.get_u8()?);
        self.pc0 = r.get_u16()?;
        self.state = match r.get_u8()? {
            0 => State::FetchOpcode,
            1 => State::Execute,
            _ => State::Jammed,
        };
        self.servicing = match r.get_u8()? {
            0 => Interrupt::None,
            1 => Interrupt::Irq,
            _ => Interrupt::Nmi,
        };
        self.opcode = r.get_u8()?;
        self.cycle = r.get_u8()?;
        self.addr = r.get_u16()?;
        self.data = r.get_u8()?;
        self.pointer = r.get_u8()?;
        self.page_crossed = r.get_bool()?;
        self.nmi_line = r.get_u8()?;
        self.irq_line = r.get_u8()?;
        self.nmi_sampled = r.get_bool()?;
        self.irq_sampled = r.get_bool()?;
        self.nmi_edge = r.get_bool()?;
        self.do_nmi = r.get_bool()?;
        self.do_irq = r.get_bool()?;
        self.rdy = r.get_bool()?;
        self.rdy_line_down = r.get_u64()?;
        self.rdy_line_up = r.get_u64()?;
        self.total_cycles = r.get_u64()?;
        Ok(())
    }
}
