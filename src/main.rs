use std::process::ExitCode;

fn main() -> ExitCode {
    nbforge::cli::run()
}
