use clap::Parser;

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_and_apply(None) {
        eprintln!("config load failed: {}", e);
        std::process::exit(2);
    }
    let cfg = match config::HubConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(2);
        }
    };
    cli::init_tracing(&cfg.log_level);

    let parsed = cli::Cli::parse();
    if let Err(e) = cli::run(parsed, cfg).await {
        tracing::error!(error = %e, "hub exited with error");
        std::process::exit(1);
    }
}
