use std::process::ExitCode;

fn main() -> ExitCode {
    shelfmate_cli::run()
}
