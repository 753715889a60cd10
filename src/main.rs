mod app;
mod cli;

use clap::Parser;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .init();

    let cli = cli::Cli::parse();
    app::run(cli);
}
