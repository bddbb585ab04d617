use anyhow::Result;
use clap::Parser;

use confsync::{Loader, OptionsOverride, SyncOptions, logging};

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = cli.settings()?;

    logging::init_with_config(&settings.logging);

    // Command line flags win over the settings file
    let configured: OptionsOverride = settings.sync.into();
    let options = SyncOptions::resolve([&cli.options.to_override(), &configured]);
    let loader = Loader::new(options.into());

    match &cli.command {
        Commands::Show { file, pointer } => {
            cli::commands::show::run(file, pointer.as_deref(), &options)
        }
        Commands::Set {
            file,
            pointer,
            value,
        } => cli::commands::set::run(&loader, file, pointer, value).await,
        Commands::Watch { file } => cli::commands::watch::run(&loader, file).await,
        Commands::Config => {
            cli::commands::config::run(&settings);
            Ok(())
        }
    }
}
