use clap::Args;
use itertools::Itertools;
use miette::{miette, Result};
use owo_colors::OwoColorize;
use rayon::prelude::*;
use std::{fmt::Write, path::PathBuf};

use lum_earc::read::EarcFileData;

#[derive(Args)]
pub struct ListArgs {
    /// The EARC files to list
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,
}

fn describe(file: &EarcFileData) -> String {
    let flags = file.flags.iter_names().map(|(name, _)| name).join("|");
    format!(
        "{:>10} {:>10} {:<24} {}",
        file.size,
        file.processed_size,
        flags,
        file.uri
    )
}

impl ListArgs {
    fn listing(path: &PathBuf) -> Result<String> {
        let earc = super::open_archive(path)?;
        let header = earc.header();

        let mut out = String::new();
        writeln!(
            out,
            "{} (version {:#x}, {} files)",
            path.display().bold(),
            header.base_version(),
            earc.len()
        )
        .map_err(|e| miette!("{e}"))?;

        for file in earc.files() {
            writeln!(out, "{}", describe(file)).map_err(|e| miette!("{e}"))?;
        }

        Ok(out)
    }

    /// Joins the listings, failed archives get a single line each
    ///
    /// Returns the text together with the number of failures.
    fn render<'a>(
        listings: impl IntoIterator<Item = (&'a PathBuf, Result<String>)>,
    ) -> (String, usize) {
        let mut out = String::new();
        let mut failures = 0;
        for (path, listing) in listings {
            match listing {
                Ok(listing) => out.push_str(&listing),
                Err(e) => {
                    failures += 1;
                    out.push_str(&format!("{} {}: {e:?}\n", "failed".red(), path.display()));
                }
            }
        }
        (out, failures)
    }

    pub fn handle(&self) -> Result<()> {
        let listings = self
            .files
            .par_iter()
            .map(|path| (path, Self::listing(path)))
            .collect::<Vec<_>>();

        let (out, failures) = Self::render(listings);
        print!("{out}");

        if failures > 0 {
            return Err(miette!("{failures} archives could not be listed"));
        }
        Ok(())
    }
}
