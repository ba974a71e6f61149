use clap::Args;
use miette::{miette, Result};
use owo_colors::OwoColorize;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{error, info, warn};

use lum_earc::error::Error;

#[derive(Args)]
pub struct VerifyArgs {
    /// The EARC files to check
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct Report {
    read: usize,
    references: usize,
    skipped: usize,
    failed: usize,
}

impl VerifyArgs {
    fn verify(path: &PathBuf) -> Result<Report> {
        let mut earc = super::open_archive(path)?;
        if !earc.hash_matches() {
            warn!("{}: header hash mismatch", path.display());
        }
        if !earc.is_supported_version() {
            warn!(
                "{}: unsupported version {:#x}",
                path.display(),
                earc.header().base_version()
            );
        }

        let mut report = Report::default();
        for index in 0..earc.len() {
            if earc.by_index(index)?.is_reference() {
                report.references += 1;
                continue;
            }

            match earc.materialize(index) {
                Ok(_) => report.read += 1,
                Err(Error::CipherUnavailable(_)) => report.skipped += 1,
                Err(e) => {
                    let uri = earc.name_for_index(index).unwrap_or_default();
                    error!("{}: {uri}: {e}", path.display());
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    pub fn handle(&self) -> Result<()> {
        let reports = self
            .files
            .par_iter()
            .map(|path| (path, Self::verify(path)))
            .collect::<Vec<_>>();

        let mut failures = 0;
        for (path, report) in reports {
            match report {
                Ok(report) if report.failed == 0 => {
                    println!(
                        "{} {} ({} read, {} references, {} encrypted skipped)",
                        "ok".green(),
                        path.display(),
                        report.read,
                        report.references,
                        report.skipped
                    );
                }
                Ok(report) => {
                    failures += 1;
                    println!(
                        "{} {} ({} of {} files unreadable)",
                        "failed".red(),
                        path.display(),
                        report.failed,
                        report.read + report.failed + report.skipped
                    );
                }
                Err(e) => {
                    failures += 1;
                    println!("{} {}: {e:?}", "failed".red(), path.display());
                }
            }
        }

        info!("verified {} archives", self.files.len());
        if failures > 0 {
            return Err(miette!("{failures} archives failed verification"));
        }
        Ok(())
    }
}
