pub mod extract;
pub mod list;
pub mod pack;
pub mod replace;
pub mod verify;

use miette::{Context, IntoDiagnostic, Result};
use std::{fs::File, path::Path};

use lum_earc::EarcArchive;

#[derive(clap::Subcommand)]
pub enum EarcCommands {
    /// List the files of one or more EARC files
    List(list::ListArgs),
    /// Extract an EARC file into a directory
    Extract(extract::ExtractArgs),
    /// Pack a directory into an EARC file
    Pack(pack::PackArgs),
    /// Replace the content of a file inside an EARC file
    Replace(replace::ReplaceArgs),
    /// Check that every file of one or more EARC files can be read
    Verify(verify::VerifyArgs),
}

impl EarcCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            EarcCommands::List(list) => list.handle(),
            EarcCommands::Extract(extract) => extract.handle(),
            EarcCommands::Pack(pack) => pack.handle(),
            EarcCommands::Replace(replace) => replace.handle(),
            EarcCommands::Verify(verify) => verify.handle(),
        }
    }
}

pub(crate) fn open_archive(path: &Path) -> Result<EarcArchive<File>> {
    let f = File::open(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;
    EarcArchive::new(f).context(format!("reading {}", path.display()))
}

/// Creates the output file, refusing to replace an existing one unless `overwrite` is set
pub(crate) fn create_output(path: &Path, overwrite: bool) -> Result<File> {
    if !overwrite {
        File::create_new(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))
    } else {
        File::create(path)
            .into_diagnostic()
            .context(format!("creating {}", path.display()))
    }
}
