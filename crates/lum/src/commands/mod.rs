pub mod earc;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle EARC files
    Earc {
        #[command(subcommand)]
        command: earc::EarcCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Earc { command } => command.handle(),
        }
    }
}
