use heapdb::{DbConfig, Engine};
use std::io::{self, BufRead, Write};

fn main() {
    env_logger::init();

    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.txt".to_string());

    let cfg = match DbConfig::load(&cfg_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config {}: {}", cfg_path, e);
            std::process::exit(2);
        }
    };

    let mut engine = match Engine::new(cfg) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("failed to initialize engine: {}", e);
            std::process::exit(2);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match engine.process_command(line, &mut stdout) {
            Ok(true) => {}
            Ok(false) => return, // EXIT: state saved, clean shutdown
            Err(e) => eprintln!("error: {}", e),
        }
        stdout.flush().unwrap();
    }
}
