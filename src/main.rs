// main.rs — startup gates, routing, and exit-code policy only.
// All real work lives in the modules below.
mod cli;
mod debugger;
mod elevation;
mod launch;
mod lock;
mod paths;
mod pid;
mod process;
mod scan;
mod supervise;
mod version;

use cli::Mode;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // both gates come before any filesystem or lock work
    debugger::wait_if_requested();
    if let Err(e) = elevation::gate() {
        eprintln!("[corerun] {e}");
        return 1;
    }

    let invocation = match cli::parse(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("[corerun] {e}");
            return 1;
        }
    };

    match invocation.mode {
        Mode::Launch => launch::run(
            &invocation.onward,
            invocation.env_extra,
            process::SHOW_DEFAULT,
        ),
        Mode::Supervise {
            watched_pid,
            app_id,
        } => supervise::run(
            watched_pid,
            &app_id,
            &invocation.onward,
            invocation.env_extra,
            process::SHOW_DEFAULT,
        ),
    }
}
