use envbake::cli::{self, Invocation};

fn main() {
    let config = match cli::parse_from_env() {
        Ok(Invocation::Run(config)) => config,
        Ok(Invocation::Help) => {
            cli::print_usage();
            return;
        }
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = envbake::run(&config) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
