use clap::Parser;
use memjudge_cli::cmd::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    args.exec().await.unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        std::process::exit(-1);
    });
}
