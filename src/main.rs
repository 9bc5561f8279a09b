#![forbid(unsafe_code)]

use std::process::ExitCode;

fn main() -> ExitCode {
    // The local offset can only be read safely while the process is single-threaded.
    taskminder::clock::init_local_offset();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };
    runtime.block_on(taskminder::cli::main())
}
