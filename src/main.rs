use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use svnmeld::config;
use svnmeld::merge::{MergeOptions, Merger};
use svnmeld::svn::{SvnDestination, SvnSource, SvnTools};
use svnmeld::telemetry;

/// Merge independent Subversion repositories into one
///
/// svnmeld combines the full histories of several unrelated repositories
/// into a single destination repository, interleaving revisions by commit
/// time. Each source lands under its own top-level directory (named after
/// the source's final path component), revisions are renumbered into one
/// global sequence, and copy-from references are fixed up to match.
///
/// The destination must already exist (create it with `svnadmin create`)
/// and should be empty. Sources are never modified.
///
/// EXAMPLE:
///
///   svnadmin create /srv/svn/combined
///   svnmeld /srv/svn/combined /srv/svn/frontend /srv/svn/backend
///
/// A failed run stops at the first error and leaves the destination with
/// whatever was already committed; diagnose before retrying into a fresh
/// destination.
#[derive(Parser)]
#[command(name = "svnmeld")]
#[command(version, about)]
struct Cli {
    /// Destination repository path
    destination: PathBuf,

    /// Source repository paths, in tie-break priority order
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Config file path (default: ./svnmeld.toml if present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// After every commit, check the destination revision number against
    /// the merge counter
    #[arg(long)]
    verify: bool,

    /// Print a JSON merge report to stdout when done
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let cfg = config::load(cli.config.as_deref())?;
    let tools = SvnTools::from(&cfg.svn);

    let sources = cli
        .sources
        .iter()
        .map(|path| {
            SvnSource::open(path, tools.clone())
                .with_context(|| format!("opening source repository {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let destination = SvnDestination::open(
        &cli.destination,
        tools,
        cfg.merge.username.clone(),
        cfg.merge.namespace_message.clone(),
    )
    .with_context(|| {
        format!(
            "opening destination repository {}",
            cli.destination.display()
        )
    })?;

    let options = MergeOptions {
        verify_destination: cli.verify || cfg.merge.verify_destination,
    };

    let merger = Merger::new(sources, destination, options)?;
    let report = merger.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Done: merged {} revision(s) from {} source(s); destination is at r{}",
            report.revisions_merged,
            report.sources.len(),
            report.final_revision
        );
    }
    Ok(())
}
