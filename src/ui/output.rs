//! Periodic status printer.
//!
//! Once a second, prints the island size, the live population per species
//! (counted by walking the kind views inside one read section) and the
//! vegetation counters. Muted while a menu is open.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use crate::animal::Species;
use crate::reclaim::ThreadReader;
use crate::ui::clear_screen;
use crate::world::World;

pub const REFRESH_PERIOD: Duration = Duration::from_secs(1);

pub fn spawn_output_thread(
    world: &Arc<World>,
    clear_screen_enabled: bool,
) -> io::Result<JoinHandle<()>> {
    let world = Arc::clone(world);
    std::thread::Builder::new()
        .name("island-output".to_string())
        .spawn(move || output_loop(world, clear_screen_enabled))
}

fn output_loop(world: Arc<World>, clear_screen_enabled: bool) {
    debug!("output thread running");
    let reader = world.domain.register();

    while !world.exit_requested() {
        if !world.output_hidden() {
            print_status(&world, &reader, clear_screen_enabled);
        }
        std::thread::sleep(REFRESH_PERIOD);
    }
    debug!("output thread exiting");
}

fn print_status(world: &World, reader: &ThreadReader, clear_screen_enabled: bool) {
    let _print = world.print_lock.lock();
    clear_screen(clear_screen_enabled);

    let guard = reader.enter();
    let config = world.config.snapshot(&guard);
    println!("Island size: {}", config.island_size);
    for species in Species::ALL {
        println!(
            "  {:<7} {}",
            format!("{}s:", species),
            world.animals.count_kind(species, &guard)
        );
    }
    drop(guard);

    let veg = world.vegetation.counts();
    println!("  flowers: {}", veg.flowers);
    println!("  trees:   {}", veg.trees);
    let _ = io::stdout().flush();
}
