mod args;
mod runner;

use clap::Parser;
use engine_logging::engine_error;

fn main() -> std::process::ExitCode {
    let args = args::Args::parse();
    engine_logging::initialize(args.log.into());

    match runner::run(&args) {
        Ok(_) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            engine_error!("{err:#}");
            std::process::ExitCode::FAILURE
        }
    }
}
