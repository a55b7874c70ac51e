use std::io;
use std::process::ExitCode;

use aslr_core::platform::resolve_selector;
use aslr_core::privileges::is_elevated;
use aslr_core::native_inspector;
use aslr_utils::{debug, init_logging};
use get_aslr::Driver;

fn main() -> ExitCode
{
    // Initialize logging (reads RUST_LOG, GET_ASLR_LOG_FORMAT and GET_ASLR_LOG_FILE)
    // Records go to stderr; the guard flushes the optional log file on exit
    let _guard = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let inspector = native_inspector();
    debug!(inspector = ?inspector, "starting");

    let driver = Driver::new(&inspector, &inspector, resolve_selector).elevated(is_elevated());
    let code = driver.run(std::env::args_os(), &mut io::stdout().lock(), &mut io::stderr().lock());

    ExitCode::from(code)
}
