//! Keyboard input thread and menus.
//!
//! Keys are read one at a time in raw mode (no echo, no line buffering)
//! and raw mode is dropped again between keys, so numeric entry and any
//! exit path leave the terminal usable. While a menu is open the periodic
//! printer is muted via the world's hide flag.
//!
//! Command map:
//! - `q` quit, `m` menu
//! - root menu: `c` config, `g` god actions, `x` close
//! - config menu: `i` island size (grow only), `d` step delay,
//!   `g`/`c`/`s` per-species birth stamina, `x` save, `q` cancel
//! - god menu: `f`/`t` set vegetation, `g`/`c`/`s` spawn animals, `x` close

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use tracing::debug;

use crate::animal::Species;
use crate::engine;
use crate::reclaim::ThreadReader;
use crate::rng;
use crate::world::World;

/// Largest accepted step delay, in milliseconds.
const MAX_STEP_DELAY_MS: u32 = 60_000;

pub fn spawn_input_thread(world: &Arc<World>) -> io::Result<JoinHandle<()>> {
    let world = Arc::clone(world);
    std::thread::Builder::new()
        .name("island-input".to_string())
        .spawn(move || input_loop(world))
}

fn input_loop(world: Arc<World>) {
    debug!("input thread running");
    let reader = world.domain.register();
    rng::seed_thread(rng::clock_seed(u64::MAX));

    loop {
        let Some(key) = read_key() else {
            // End of input: treat like a quit so a headless run stops.
            world.request_exit();
            break;
        };
        debug!("user input {:?}", key);
        match key {
            'q' => {
                world.request_exit();
                break;
            }
            'm' => root_menu(&world, &reader),
            _ => {}
        }
    }
    debug!("input thread exiting");
}

/// Read one character in raw mode. `None` on end of input or a terminal
/// error; the terminal is restored before returning either way.
fn read_key() -> Option<char> {
    if terminal::enable_raw_mode().is_err() {
        return None;
    }
    let key = loop {
        match event::read() {
            Ok(Event::Key(event)) if event.kind == KeyEventKind::Press => {
                if let KeyCode::Char(c) = event.code {
                    break Some(c);
                }
            }
            Ok(_) => {}
            Err(_) => break None,
        }
    };
    let _ = terminal::disable_raw_mode();
    key
}

/// Prompt for a number on its own line (raw mode is off here).
fn read_number(world: &World, prompt: &str) -> Option<u64> {
    {
        let _print = world.print_lock.lock();
        print!("{}: ", prompt);
        let _ = io::stdout().flush();
    }
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return None;
    }
    match line.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            let _print = world.print_lock.lock();
            println!("Not a number: {}", line.trim());
            None
        }
    }
}

fn root_menu(world: &World, reader: &ThreadReader) {
    world.set_output_hidden(true);
    loop {
        {
            let _print = world.print_lock.lock();
            println!();
            println!("Menu:  [c] configuration  [g] god actions  [x] exit menu");
        }
        match read_key() {
            Some('c') => config_menu(world, reader),
            Some('g') => god_menu(world, reader),
            Some('x') | None => break,
            _ => {}
        }
    }
    world.set_output_hidden(false);
}

fn config_menu(world: &World, reader: &ThreadReader) {
    let mut update = world.config.update();
    loop {
        {
            let _print = world.print_lock.lock();
            println!();
            println!("Configuration (island {}, step {} ms):", update.island_size, update.step_delay_ms);
            println!("  [i] island size (increase only)");
            println!("  [d] step delay (ms)");
            println!("  [g] gerbil birth stamina ({})", update.gerbil.max_birth_stamina);
            println!("  [c] cat birth stamina ({})", update.cat.max_birth_stamina);
            println!("  [s] snake birth stamina ({})", update.snake.max_birth_stamina);
            println!("  [x] save   [q] cancel");
        }
        match read_key() {
            Some('i') => {
                if let Some(size) = read_number(world, "island size") {
                    if size > update.island_size {
                        update.island_size = size;
                    } else {
                        let _print = world.print_lock.lock();
                        println!("The island never shrinks ({} <= {})", size, update.island_size);
                    }
                }
            }
            Some('d') => {
                if let Some(delay) = read_number(world, "step delay (ms)") {
                    if delay >= 1 && delay <= u64::from(MAX_STEP_DELAY_MS) {
                        update.step_delay_ms = delay as u32;
                    } else {
                        let _print = world.print_lock.lock();
                        println!("Step delay must be within 1..={} ms", MAX_STEP_DELAY_MS);
                    }
                }
            }
            Some(key @ ('g' | 'c' | 's')) => {
                let species = match key {
                    'g' => Species::Gerbil,
                    'c' => Species::Cat,
                    _ => Species::Snake,
                };
                if let Some(stamina) = read_number(world, "max birth stamina") {
                    if stamina > 0 {
                        update.kind_mut(species).max_birth_stamina = stamina;
                    } else {
                        let _print = world.print_lock.lock();
                        println!("Birth stamina must be positive");
                    }
                }
            }
            Some('x') => {
                let guard = reader.enter();
                update.commit(&guard);
                let _print = world.print_lock.lock();
                println!("Configuration saved.");
                return;
            }
            Some('q') | None => {
                // Dropping the draft abandons the edit.
                let _print = world.print_lock.lock();
                println!("Configuration unchanged.");
                return;
            }
            _ => {}
        }
    }
}

fn god_menu(world: &World, reader: &ThreadReader) {
    loop {
        {
            let _print = world.print_lock.lock();
            println!();
            println!("God actions:");
            println!("  [f] set flowers   [t] set trees");
            println!("  [g] spawn gerbils [c] spawn cats [s] spawn snakes");
            println!("  [x] exit");
        }
        match read_key() {
            Some('f') => {
                if let Some(flowers) = read_number(world, "flowers") {
                    world.vegetation.set_flowers(flowers);
                }
            }
            Some('t') => {
                if let Some(trees) = read_number(world, "trees") {
                    world.vegetation.set_trees(trees);
                }
            }
            Some(key @ ('g' | 'c' | 's')) => {
                let species = match key {
                    'g' => Species::Gerbil,
                    'c' => Species::Cat,
                    _ => Species::Snake,
                };
                if let Some(count) = read_number(world, "how many") {
                    let spawned = spawn_many(world, reader, species, count);
                    let _print = world.print_lock.lock();
                    println!("Spawned {} of {} requested {}s.", spawned, count, species);
                }
            }
            Some('x') | None => return,
            _ => {}
        }
    }
}

/// Spawn up to `count` animals of `species` at random keys. Collisions
/// with existing keys simply reduce the yield.
fn spawn_many(world: &World, reader: &ThreadReader, species: Species, count: u64) -> u64 {
    let guard = reader.enter();
    let island_size = world.config.snapshot(&guard).island_size;
    let mut spawned = 0;
    for _ in 0..count {
        let key = rng::below(island_size);
        if engine::god_spawn(world, &guard, species, key) {
            spawned += 1;
        }
    }
    spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    #[test]
    fn test_spawn_many_counts_only_new_keys() {
        rng::seed_thread(7);
        let world = World::new(GameConfig::default(), 1);
        let reader = world.domain.register();

        let spawned = spawn_many(&world, &reader, Species::Cat, 200);
        assert!(spawned > 0);
        assert!(spawned <= 200);

        let guard = reader.enter();
        assert_eq!(
            world.animals.count_kind(Species::Cat, &guard),
            spawned as usize
        );
    }

    #[test]
    fn test_spawn_many_saturates_tiny_island() {
        rng::seed_thread(8);
        let mut config = GameConfig::default();
        config.island_size = 4;
        let world = World::new(config, 2);
        let reader = world.domain.register();

        // Far more requests than keys: at most island_size can land.
        let spawned = spawn_many(&world, &reader, Species::Gerbil, 100);
        assert!(spawned <= 4);

        let guard = reader.enter();
        assert_eq!(world.animals.count_all(&guard), spawned as usize);
    }
}
