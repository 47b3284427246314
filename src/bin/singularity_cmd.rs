use clap::Parser;
use containers_tools::cli::{self, ConfigDiscovery, SandboxArgs};
use containers_tools::executor::HostRunner;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match SandboxArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(cli::clap_exit_code(&e));
        }
    };

    cli::init_logging(false);

    let config = match ConfigDiscovery::discover_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli::sandbox::run(args, &config, &HostRunner::new()).await {
        Ok(code) => cli::process_exit_code(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
