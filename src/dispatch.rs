//! Dispatch bridge between the runtime and generated code.
//!
//! The recompiler rebinds `dispatch`/`dispatch_call` to its generated entry
//! table at startup; until then both point at the interpreter fallback,
//! which only understands the HRAM OAM-DMA idioms games copy to high RAM.

use crate::memory_map::*;
use crate::runtime::Runtime;

/// Entry point into generated code. The default implementations fall back
/// to the interpreter stub.
pub type DispatchFn = fn(&mut Runtime, u16);

const STUB_LOG_LIMIT: u32 = 20;

impl Runtime {
    /// Enters generated code at `addr`.
    pub fn dispatch(&mut self, addr: u16) {
        (self.dispatch_fn)(self, addr)
    }

    /// Like `dispatch`, but pushes the current PC first. Used when generated
    /// code calls into a region the recompiler did not translate.
    pub fn dispatch_call(&mut self, addr: u16) {
        (self.dispatch_call_fn)(self, addr)
    }

    pub fn set_dispatch(&mut self, f: DispatchFn) {
        self.dispatch_fn = f;
    }

    pub fn set_dispatch_call(&mut self, f: DispatchFn) {
        self.dispatch_call_fn = f;
    }

    pub(crate) fn stub_dispatch(rt: &mut Runtime, addr: u16) {
        rt.regs.pc = addr;
        rt.interpret(addr);
    }

    pub(crate) fn stub_dispatch_call(rt: &mut Runtime, addr: u16) {
        let pc = rt.regs.pc;
        rt.push16(pc);
        rt.regs.pc = addr;
        rt.interpret(addr);
    }

    /// Interpreter fallback. Recognizes the two OAM-DMA routines games place
    /// in HRAM and emulates them directly:
    ///
    ///   LDH (FF46),A          ; E0 46
    ///   LD A,n ; LDH (FF46),A ; 3E n E0 46
    ///
    /// Anything else is a diagnostic dead end: log and return.
    fn interpret(&mut self, addr: u16) {
        self.regs.pc = addr;

        if (HRAM_START..=HRAM_END).contains(&addr) {
            let opcode = self.read8(addr);
            if opcode == 0xE0 && self.read8(addr.wrapping_add(1)) == 0x46 {
                log::debug!("HRAM OAM-DMA routine intercepted at {:04X}", addr);
                let a = self.regs.a;
                self.write8(DMA_ADDR, a);
                self.ret();
                return;
            }
            if opcode == 0x3E
                && self.read8(addr.wrapping_add(2)) == 0xE0
                && self.read8(addr.wrapping_add(3)) == 0x46
            {
                log::debug!("HRAM OAM-DMA routine (immediate form) at {:04X}", addr);
                self.regs.a = self.read8(addr.wrapping_add(1));
                let a = self.regs.a;
                self.write8(DMA_ADDR, a);
                self.ret();
                return;
            }
        }

        if self.stub_log_count < STUB_LOG_LIMIT {
            self.stub_log_count += 1;
            log::warn!(
                "Executing uncompiled code at {:04X} (ROM bank {}); interpreter stub has no handler",
                addr,
                self.bus.rom_bank
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_runtime;

    #[test]
    fn hram_dma_idiom_writes_page_and_returns() {
        let mut rt = test_runtime();
        // LDH (FF46),A ; RET-via-stack
        rt.write8(0xFF80, 0xE0);
        rt.write8(0xFF81, 0x46);
        rt.regs.a = 0xC1;
        rt.push16(0x0234);

        rt.dispatch(0xFF80);

        assert_eq!(rt.read8(DMA_ADDR), 0xC1, "page forwarded to the PPU");
        assert_eq!(rt.regs.pc, 0x0234, "returned to the pushed address");
    }

    #[test]
    fn hram_dma_immediate_idiom_loads_a_first() {
        let mut rt = test_runtime();
        for (i, byte) in [0x3E, 0x80, 0xE0, 0x46].into_iter().enumerate() {
            rt.write8(0xFF80 + i as u16, byte);
        }
        // Seed the 0x8000 source page so the copy is observable.
        rt.write8(0x8000, 0x7E);
        rt.push16(0x0456);

        rt.dispatch(0xFF80);

        assert_eq!(rt.regs.a, 0x80);
        assert_eq!(rt.read8(DMA_ADDR), 0x80);
        assert_eq!(rt.regs.pc, 0x0456);
        // The DMA copied the VRAM page into OAM.
        assert_eq!(rt.read8(OAM_START), 0x7E);
    }

    #[test]
    fn unrecognized_address_leaves_state_alone() {
        let mut rt = test_runtime();
        let sp = rt.regs.sp;
        rt.dispatch(0x4000);
        assert_eq!(rt.regs.pc, 0x4000);
        assert_eq!(rt.regs.sp, sp);
    }

    #[test]
    fn dispatch_call_pushes_the_return_address() {
        let mut rt = test_runtime();
        rt.regs.pc = 0x0150;
        rt.dispatch_call(0x4000);
        assert_eq!(rt.regs.pc, 0x4000);
        assert_eq!(rt.pop16(), 0x0150);
    }

    #[test]
    fn dispatch_slots_are_rebindable() {
        fn generated(rt: &mut Runtime, addr: u16) {
            rt.regs.pc = addr.wrapping_add(3);
            rt.tick(12);
        }
        let mut rt = test_runtime();
        rt.set_dispatch(generated);
        let spent = rt.step();
        assert_eq!(spent, 12);
        assert_eq!(rt.regs.pc, 0x0103);
    }
}
