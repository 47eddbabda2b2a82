//! The runtime context: register file, bus, PPU and platform handles, and
//! the tick loop that keeps emulated time, interrupts, video, and input in
//! lockstep.
//!
//! Generated code receives `&mut Runtime` and calls the memory, ALU, and
//! control-flow primitives directly; `run_frame` is the host-side entry
//! point that spins dispatch until the PPU finishes a frame.

use crate::dispatch::DispatchFn;
use crate::joypad::JoypadLines;
use crate::memory_bus::MemoryBus;
use crate::memory_map::*;
use crate::platform::Platform;
use crate::ppu::Ppu;
use crate::registers::Registers;

pub struct Runtime {
    pub regs: Registers,
    pub bus: MemoryBus,
    pub(crate) ppu: Box<dyn Ppu>,
    pub(crate) platform: Box<dyn Platform>,

    // Interrupt master enable, with the two-stage EI countdown.
    pub(crate) ime: bool,
    pub(crate) ime_pending: u8,
    pub(crate) halted: bool,
    pub(crate) stopped: bool,

    cycles: u64,
    frame_cycles: u32,
    poll_counter: u32,
    frame_done: bool,

    pub(crate) dispatch_fn: DispatchFn,
    pub(crate) dispatch_call_fn: DispatchFn,
    pub(crate) stub_log_count: u32,
}

impl Runtime {
    pub fn new(ppu: Box<dyn Ppu>, platform: Box<dyn Platform>) -> Self {
        let mut rt = Runtime {
            regs: Registers::new(),
            bus: MemoryBus::new(),
            ppu,
            platform,
            ime: false,
            ime_pending: 0,
            halted: false,
            stopped: false,
            cycles: 0,
            frame_cycles: 0,
            poll_counter: 0,
            frame_done: false,
            dispatch_fn: Runtime::stub_dispatch,
            dispatch_call_fn: Runtime::stub_dispatch_call,
            stub_log_count: 0,
        };
        rt.reset();
        rt
    }

    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), String> {
        self.bus.load_rom(data)
    }

    /// Returns the context to the DMG post-boot state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.bus.reset();
        self.ppu.reset();
        self.ime = false;
        self.ime_pending = 0;
        self.halted = false;
        self.stopped = false;
        self.cycles = 0;
        self.frame_cycles = 0;
        self.poll_counter = 0;
        self.frame_done = false;
    }

    // --- Memory access ---
    //
    // The LCD register window belongs to the PPU; everything else decodes on
    // the bus.

    pub fn read8(&self, addr: u16) -> u8 {
        match addr {
            LCD_REGS_START..=LCD_REGS_END => self.ppu.read_register(addr),
            _ => self.bus.read8(addr),
        }
    }

    pub fn write8(&mut self, addr: u16, value: u8) {
        match addr {
            LCD_REGS_START..=LCD_REGS_END => {
                self.ppu.write_register(&mut self.bus, addr, value)
            }
            _ => self.bus.write8(addr, value),
        }
    }

    pub fn read16(&self, addr: u16) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write16(&mut self, addr: u16, value: u16) {
        self.write8(addr, (value & 0xFF) as u8);
        self.write8(addr.wrapping_add(1), (value >> 8) as u8);
    }

    // --- Stack ---

    pub fn push16(&mut self, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.write16(self.regs.sp, value);
    }

    pub fn pop16(&mut self) -> u16 {
        let value = self.read16(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    // --- Control flow ---

    /// CALL: PC already points past the operand; push it and enter `addr`.
    pub fn call(&mut self, addr: u16) {
        let pc = self.regs.pc;
        self.push16(pc);
        self.dispatch(addr);
    }

    pub fn ret(&mut self) {
        self.regs.pc = self.pop16();
    }

    pub fn rst(&mut self, vector: u16) {
        let pc = self.regs.pc;
        self.push16(pc);
        self.dispatch(vector);
    }

    /// RETI: return and enable interrupts immediately (no EI delay).
    pub fn reti(&mut self) {
        self.ret();
        self.ime = true;
        self.ime_pending = 0;
    }

    /// EI: arms the interrupt master enable with a one-instruction delay.
    pub fn ei(&mut self) {
        if !self.ime {
            self.ime_pending = 2;
        }
    }

    pub fn di(&mut self) {
        self.ime = false;
        self.ime_pending = 0;
    }

    /// HALT: suspend dispatch and idle-tick the hardware until an interrupt
    /// becomes pending, for at most one frame.
    pub fn halt(&mut self) {
        self.halted = true;
        let mut max_cycles = CYCLES_PER_FRAME;
        while self.halted && !self.stopped && max_cycles > 0 {
            self.tick(4);
            max_cycles -= 4;
        }
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    // --- Timing ---

    /// Advances emulated time: IME promotion, cycle counters, interrupt
    /// service, PPU, and the frame/input suspension points.
    pub fn tick(&mut self, cycles: u32) {
        self.promote_ime();
        self.advance(cycles);
    }

    /// The clock side of `tick`, without the IME promotion. Used where the
    /// surrounding boundary has already promoted, so each dispatch or tick
    /// boundary counts exactly once against the EI delay.
    fn advance(&mut self, cycles: u32) {
        self.cycles += cycles as u64;
        self.frame_cycles += cycles;

        self.service_interrupts();

        self.ppu.tick(&mut self.bus, cycles);

        if self.ppu.frame_ready() {
            self.poll_platform();
            self.platform.render_frame(self.ppu.framebuffer());
            self.platform.vsync();
            self.ppu.clear_frame_ready();
            self.frame_done = true;
            self.frame_cycles = 0;
            self.poll_counter = 0;
        }

        self.poll_counter += cycles;
        if self.poll_counter >= POLL_INTERVAL_CYCLES {
            self.poll_counter = 0;
            self.poll_platform();
        }
    }

    /// One dispatch boundary: enter generated code at PC, then apply the EI
    /// deferral. Returns the T-cycles consumed.
    pub fn step(&mut self) -> u32 {
        let start = self.cycles;
        let pc = self.regs.pc;
        self.dispatch(pc);
        self.promote_ime();
        (self.cycles - start) as u32
    }

    /// Runs dispatch (or idle ticks while halted) until the PPU completes a
    /// frame. Returns the elapsed T-cycles.
    pub fn run_frame(&mut self) -> u32 {
        let start = self.cycles;
        self.reset_frame();
        while !self.frame_done && !self.stopped {
            if self.halted {
                self.tick(4);
            } else {
                let spent = self.step();
                if spent == 0 {
                    // Interpreter-stub dispatch made no progress; keep the
                    // clock moving so the frame still completes. `step`
                    // already promoted the EI countdown for this boundary.
                    self.advance(4);
                }
            }
        }
        (self.cycles - start) as u32
    }

    pub fn frame_complete(&self) -> bool {
        self.frame_done
    }

    pub fn reset_frame(&mut self) {
        self.frame_done = false;
    }

    fn poll_platform(&mut self) {
        if !self.platform.poll_events() {
            self.stopped = true;
        }
        self.bus.joypad = JoypadLines {
            dpad: self.platform.dpad(),
            buttons: self.platform.buttons(),
        };
    }

    pub fn set_title(&mut self, title: &str) {
        self.platform.set_title(title);
    }

    // --- Accessors ---

    #[inline(always)]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
    #[inline(always)]
    pub fn frame_cycles(&self) -> u32 {
        self.frame_cycles
    }
    #[inline(always)]
    pub fn ime(&self) -> bool {
        self.ime
    }
    #[inline(always)]
    pub fn halted(&self) -> bool {
        self.halted
    }
    #[inline(always)]
    pub fn stopped(&self) -> bool {
        self.stopped
    }
}

#[cfg(test)]
pub(crate) fn test_runtime() -> Runtime {
    use crate::platform::HeadlessPlatform;
    use crate::ppu::DmgPpu;

    let mut rom = vec![0u8; 8 * ROM_BANK_SIZE];
    rom[HEADER_MBC_TYPE] = 0x03; // MBC1+RAM+BATTERY
    rom[HEADER_RAM_SIZE] = 0x03; // 32 KiB
    for bank in 0..8 {
        rom[bank * ROM_BANK_SIZE] = bank as u8;
    }

    let mut rt = Runtime::new(
        Box::new(DmgPpu::new()),
        Box::new(HeadlessPlatform::new()),
    );
    rt.load_rom(&rom).unwrap();
    rt.reset();
    rt
}
