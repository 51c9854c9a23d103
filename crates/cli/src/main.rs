use std::process::ExitCode;

fn main() -> ExitCode {
    parsergen_cli::run()
}
