use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use std::{io::Write, path::PathBuf};
use tracing::{info, warn};

use lum_earc::error::Error;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input EARC file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Only extract files whose URI contains this text
    #[arg(short, long)]
    query: Option<String>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut earc = super::open_archive(&self.file)?;

        let selected = earc
            .files()
            .enumerate()
            .filter(|(_, f)| !f.is_reference())
            .filter(|(_, f)| self.query.as_ref().map_or(true, |q| f.uri.contains(q.as_str())))
            .map(|(i, f)| (i, f.uri.to_string(), f.relative_path.to_string()))
            .collect::<Vec<_>>();

        for (index, uri, relative_path) in selected {
            let data = match earc.materialize(index) {
                Ok(data) => data,
                Err(Error::CipherUnavailable(uri)) => {
                    warn!("skipping encrypted file {uri}");
                    continue;
                }
                Err(e) => return Err(e).context(format!("reading {uri}")),
            };

            let p = self.directory.join(&relative_path);
            info!("writing {}", p.display());

            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)
                    .into_diagnostic()
                    .context(format!("creating {}", parent.display()))?;
            }

            super::create_output(&p, self.overwrite)?
                .write_all(&data)
                .into_diagnostic()
                .context(format!("writing {}", p.display()))?;
        }
        Ok(())
    }
}
