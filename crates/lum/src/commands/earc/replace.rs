use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ReplaceArgs {
    /// The EARC file to modify
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// The end of the URI of the file to replace
    #[arg(short, long)]
    query: String,

    /// The new content of the file
    #[arg(short, long, value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the modified archive, the input file is replaced when omitted
    #[arg(short, long, value_name = "OUT")]
    output: Option<PathBuf>,
}

impl ReplaceArgs {
    pub fn handle(&self) -> Result<()> {
        let data = std::fs::read(&self.input)
            .into_diagnostic()
            .context(format!("reading {}", self.input.display()))?;

        let mut earc = super::open_archive(&self.file)?
            .into_writer()
            .context(format!("loading {}", self.file.display()))?;
        earc.update_file(&self.query, data)?;

        let target = self.output.as_ref().unwrap_or(&self.file);
        info!("writing {}", target.display());
        earc.write_to_file(target)
            .context(format!("writing {}", target.display()))?;

        Ok(())
    }
}
