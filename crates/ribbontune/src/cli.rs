use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ribbontune",
    author,
    version,
    about = "Live preview and tuning for the ribbon banner shader",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Preview window width in logical pixels (overrides the settings file).
    #[arg(long, value_name = "PIXELS", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,

    /// Preview window height in logical pixels (overrides the settings file).
    #[arg(long, value_name = "PIXELS", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,

    /// Skip the remote store: start from defaults and disable publishing.
    #[arg(long)]
    pub no_remote: bool,

    /// Remote store endpoint (overrides `[remote] endpoint`).
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Publish credential; can also be supplied via the `RIBBONTUNE_CREDENTIAL` env var.
    #[arg(long, env = "RIBBONTUNE_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// Merge a stored profile into the configuration before the first build.
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the generated shader source for the default or a stored configuration.
    Generate(GenerateArgs),
    /// List stored profiles.
    Profiles,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Profile to merge over the defaults before generating.
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Also print the fixed vertex shader.
    #[arg(long)]
    pub vertex: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
