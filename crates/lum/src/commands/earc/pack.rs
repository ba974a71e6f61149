use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::info;
use walkdir::WalkDir;

use lum_earc::{EarcWriter, EarcWriterOptions, HeaderFlags};

#[derive(Args)]
pub struct PackArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target EARC file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Prefix turning a relative path into a URI
    #[arg(long, default_value = "data://")]
    uri_prefix: String,

    /// Store files as zlib chunks
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Mark the archive as copyguarded
    #[arg(long, default_value_t = false)]
    copyguard: bool,

    /// Size of a compression chunk in KiB
    #[arg(long, default_value_t = lum_earc::types::DEFAULT_CHUNK_SIZE_KIB)]
    chunk_size: u32,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl PackArgs {
    pub fn handle(&self) -> Result<()> {
        info!("creating {}", &self.file.display());

        let files = WalkDir::new(&self.directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .collect::<Vec<_>>();

        if files.is_empty() {
            return Err(miette!("directory is empty"));
        }

        let mut flags = HeaderFlags::empty();
        flags.set(HeaderFlags::COPYGUARD, self.copyguard);

        let mut earc = EarcWriter::new(
            EarcWriterOptions::builder()
                .flags(flags)
                .chunk_size_kib(self.chunk_size)
                .build(),
        );

        for file in files {
            let name = file
                .path()
                .strip_prefix(&self.directory)
                .into_diagnostic()?;
            let relative = name
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect::<Option<Vec<_>>>()
                .ok_or(miette!("unable to convert {} to a string", name.display()))?
                .join("/");
            let uri = format!("{}{}", self.uri_prefix, relative);
            info!("packing {uri}");

            let data = std::fs::read(file.path())
                .into_diagnostic()
                .context(format!("reading {}", file.path().display()))?;

            if self.compress {
                earc.add_compressed_file(uri, data, false)?;
            } else {
                earc.add_file(uri, data)?;
            }
        }

        let out = super::create_output(&self.file, self.overwrite)?;
        earc.finish(out).context("finalizing earc file")?;

        Ok(())
    }
}
