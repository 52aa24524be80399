use mewo::mewoparse::cli::{parse_args, run};
use mewo::mewoparse::logging;
use mewo::mewoparse::output::OutputFormatter;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let options = match parse_args(env::args().collect()) {
        Ok(options) => options,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    logging::init(options.debug);

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::for_stderr().error(&e);
            ExitCode::FAILURE
        }
    }
}
