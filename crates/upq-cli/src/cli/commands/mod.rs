//! CLI command handlers. Each command is in its own file.

mod cancel;
mod cancel_all;
mod daemon;
mod list;
mod queue;
mod submit;

pub use cancel::run_cancel;
pub use cancel_all::run_cancel_all;
pub use daemon::run_daemon;
pub use list::run_list;
pub use queue::run_queue;
pub use submit::run_submit;

/// Prints reply lines from the daemon.
fn print_reply(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
