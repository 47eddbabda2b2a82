//! Host shell: loads a ROM, opens the SDL window, and runs frames until the
//! user quits. Without a linked dispatch table this exercises the runtime's
//! interpreter fallback only, so it is mostly useful for bring-up and
//! debugging of generated code.

use std::{env, fs, path::Path, process};

use matcha::{DmgPpu, Runtime, SdlPlatform};

const DEFAULT_SCALE: u32 = 3;

fn main() -> Result<(), String> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <rom_path> [scale]", args[0]);
        process::exit(1);
    }
    let rom_path = Path::new(&args[1]);
    let scale = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SCALE);

    let rom = fs::read(rom_path)
        .map_err(|e| format!("Failed to read ROM '{}': {}", rom_path.display(), e))?;

    let platform = SdlPlatform::new(scale)?;
    let mut runtime = Runtime::new(Box::new(DmgPpu::new()), Box::new(platform));
    runtime.load_rom(&rom)?;
    runtime.reset();

    let rom_name = rom_path.file_name().unwrap_or_default().to_string_lossy();
    runtime.set_title(&format!("matcha - {}", rom_name));

    log::info!("Entering frame loop");
    let mut frames: u64 = 0;
    while !runtime.stopped() {
        runtime.run_frame();
        frames += 1;
        if frames % 600 == 0 {
            log::debug!("{} frames, {} cycles", frames, runtime.cycles());
        }
    }
    log::info!("Stopped after {} frames", frames);
    Ok(())
}
