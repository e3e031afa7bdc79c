mod cli;
mod console;
mod engine;
mod paths;
mod run;
mod sync;
mod window;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Generate(args)) => run::generate(args),
        Some(Command::Profiles) => run::list_profiles(),
        None => run::run(cli.run),
    }
}
