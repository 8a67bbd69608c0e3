use settlehook_cli::{run_cli, CliError};

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        eprintln!("error: {}", e);

        let exit_code = match e {
            CliError::Connection { .. } => 2,
            CliError::Api { .. } => 3,
            CliError::InvalidArgument { .. } => 4,
            CliError::UnexpectedResponse { .. } => 5,
        };

        std::process::exit(exit_code);
    }
}
