//! quire-replay: rebuild a document from its RocksDB operation log.
//!
//! Usage: `quire-replay <db-path> <document-name>`
//!
//! Writes the recovered content to stdout. Set `RUST_LOG=info` for the
//! record count and content length.

use std::io::Write;
use std::process::ExitCode;

use log::{error, info};
use quire_collab::storage::{LogProvider, RocksLogConfig, RocksLogProvider};
use quire_collab::History;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let (db_path, name) = match args.as_slice() {
        [_, db_path, name] => (db_path, name),
        _ => {
            eprintln!("usage: quire-replay <db-path> <document-name>");
            return ExitCode::from(2);
        }
    };

    let config = RocksLogConfig {
        path: db_path.into(),
        ..RocksLogConfig::default()
    };
    let store = match RocksLogProvider::open(config) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open {db_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Recovering an unknown name would create an empty log for it.
    match store.contains(name) {
        Ok(true) => {}
        Ok(false) => {
            error!("No operation log for '{name}' in {db_path}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Failed to look up '{name}': {e}");
            return ExitCode::FAILURE;
        }
    }

    let log = match store.recover(name) {
        Ok(log) => log,
        Err(e) => {
            error!("Failed to recover '{name}': {e}");
            return ExitCode::FAILURE;
        }
    };
    // One entry is enough; nothing is rebased here.
    let (history, content) = match History::recover(log, 1) {
        Ok(recovered) => recovered,
        Err(e) => {
            error!("Replay of '{name}' failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Replayed '{name}': nextIx {} ({} bytes)",
        history.next_index(),
        content.len()
    );

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(&content).and_then(|_| stdout.flush()) {
        error!("Failed to write content: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
