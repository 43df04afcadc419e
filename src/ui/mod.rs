//! Terminal front end: the single-key input thread with its menus, and
//! the periodic status printer. Both talk to the core only through the
//! public surfaces: config updates, god actions, the exit flag, and read
//! sections for anything they display.

mod input;
mod output;

pub use input::spawn_input_thread;
pub use output::{spawn_output_thread, REFRESH_PERIOD};

use std::io::Write;

/// Clear the terminal.
///
/// Starts with a newline in case the escape code is not honored, so menus
/// at least get a blank separator line.
pub(crate) fn clear_screen(enabled: bool) {
    println!();
    if enabled {
        print!("\x1b[2J\x1b[;H");
    }
    let _ = std::io::stdout().flush();
}
