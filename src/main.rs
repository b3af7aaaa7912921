use clap::Parser;
use filesorter::cli::{Cli, run_cli};
use filesorter::logging::setup_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.verbose, cli.log_dir.as_deref())?;
    run_cli(cli)
}
