use std::process::ExitCode;

fn main() -> ExitCode {
    premia_cli::run()
}
