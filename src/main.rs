//! Menagerie CLI: parse flags, wire the threads, shut down cleanly.
use std::process;
use std::sync::Arc;

use tracing::Level;

use menagerie::{dispatch, engine, rng, ui, GameConfig, World, DEFAULT_WORKERS};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Menagerie v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    menagerie [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -v             Verbose debug output");
    eprintln!("    -c             Disable the clear-screen escape");
    eprintln!("    -w <N>         Number of worker threads (default {})", DEFAULT_WORKERS);
    eprintln!("    -h             Print this help message");
    eprintln!();
    eprintln!("KEYS:");
    eprintln!("    q              Quit");
    eprintln!("    m              Open the menu (configuration, god actions)");
}

struct Options {
    verbose: bool,
    clear_screen: bool,
    workers: usize,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = std::env::args().collect();

    let mut verbose = false;
    let mut clear_screen = true;
    let mut workers = DEFAULT_WORKERS;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" => {
                print_usage();
                process::exit(0);
            }
            "-v" => {
                verbose = true;
            }
            "-c" => {
                clear_screen = false;
            }
            "-w" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing thread count after -w".to_string());
                }
                workers = args[i]
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid thread count: {}", args[i]))?;
                if workers == 0 {
                    return Err("Worker thread count must be positive".to_string());
                }
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(Options {
        verbose,
        clear_screen,
        workers,
    })
}

fn main() {
    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if options.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    println!("Welcome to the island.");
    println!("Spawning {} worker threads.", options.workers);

    let world = Arc::new(World::new(GameConfig::default(), rng::clock_seed(0)));

    let pool = match dispatch::WorkerPool::spawn(&world, options.workers) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Error: failed to spawn worker threads: {}", e);
            process::exit(1);
        }
    };
    let input = match ui::spawn_input_thread(&world) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: failed to spawn input thread: {}", e);
            process::exit(1);
        }
    };
    let output = match ui::spawn_output_thread(&world, options.clear_screen) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: failed to spawn output thread: {}", e);
            process::exit(1);
        }
    };
    let dispatcher = match dispatch::spawn_dispatcher(&world, pool.senders()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: failed to spawn dispatch thread: {}", e);
            process::exit(1);
        }
    };

    let mut failed = false;
    if dispatcher.join().is_err() {
        eprintln!("Error: dispatch thread panicked");
        failed = true;
    }
    if output.join().is_err() {
        eprintln!("Error: output thread panicked");
        failed = true;
    }
    if input.join().is_err() {
        eprintln!("Error: input thread panicked");
        failed = true;
    }
    if pool.join().is_err() {
        eprintln!("Error: a worker thread panicked");
        failed = true;
    }

    // Every thread is joined: the main thread sweeps the island and
    // drains deferred reclamation before exiting.
    {
        let reader = world.domain.register();
        let guard = reader.enter();
        engine::apocalypse(&world, &guard);
    }

    let world = match Arc::try_unwrap(world) {
        Ok(world) => world,
        Err(_) => {
            eprintln!("Error: world still shared after joining all threads");
            process::exit(1);
        }
    };
    world.teardown();

    println!("Goodbye!");
    if failed {
        process::exit(1);
    }
}
