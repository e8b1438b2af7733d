use std::process::ExitCode;

fn main() -> ExitCode {
    lineup_cli::run()
}
