/// Routine CLI
///
/// Runs JSON scripts through the routine runtime with the built-in handlers.
/// Useful for checking how a command sequence is routed without a host app.

use routine_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
