use std::process::ExitCode;

use log::{error, info};

use rawstream::copy::copy_to_output;
use rawstream::{Error, StreamHandle};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut handle = match StreamHandle::open(std::env::args_os()) {
        Ok(handle) => handle,
        Err(Error::Parse(e)) => e.exit(),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match copy_to_output(&mut handle) {
        Ok(summary) => {
            info!("{} bytes written to {}", summary.bytes_copied, summary.output_path);
            handle.close();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("copy failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
