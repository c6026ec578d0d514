use clap::Parser;
use std::process::ExitCode;
use trustlens_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    trustlens_cli::init_tracing();
    let cli = Cli::parse();

    match trustlens_cli::run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
