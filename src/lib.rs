//! matcha - runtime core for a statically recompiled Game Boy (DMG).
//!
//! Generated code links against this crate and drives the machine through
//! `Runtime`: memory and stack primitives, ALU/flag helpers, interrupt
//! service, and the frame-paced tick loop. An interpreter fallback covers
//! the HRAM OAM-DMA routines games execute outside of ROM.

pub mod joypad;
pub mod mbc;
pub mod memory_bus;
pub mod memory_map;
pub mod platform;
pub mod ppu;
pub mod registers;
pub mod runtime;

mod alu;
mod dispatch;
mod interrupts;
mod shift;

pub use dispatch::DispatchFn;
pub use interrupts::{
    JOYPAD_VECTOR, SERIAL_VECTOR, STAT_VECTOR, TIMER_VECTOR, VBLANK_VECTOR,
};
pub use memory_bus::MemoryBus;
pub use platform::{HeadlessPlatform, Platform, SdlPlatform};
pub use ppu::{DMG_COLOR_0, DmgPpu, Ppu};
pub use registers::Registers;
pub use runtime::Runtime;
