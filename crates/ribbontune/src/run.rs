use std::env;
use std::fs;
use std::io;

use anyhow::{Context, Result};
use ribbonconfig::{ParameterSet, TunerSettings};
use ribbonstore::{ConfigRemote, FileStorage, ProfileStore, RpcClient};
use tracing_subscriber::EnvFilter;

use crate::cli::{GenerateArgs, RunArgs};
use crate::paths::AppPaths;
use crate::window::{self, PreviewOptions};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Reads `ribbontune.toml`, falling back to defaults when it does not exist.
pub fn load_settings(paths: &AppPaths) -> Result<TunerSettings> {
    let path = paths.settings_file();
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no settings file; using defaults");
            return Ok(TunerSettings::default());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file at {}", path.display()))
        }
    };
    TunerSettings::from_toml_str(&contents)
        .with_context(|| format!("failed to parse settings file at {}", path.display()))
}

pub fn open_profiles(paths: &AppPaths) -> ProfileStore<FileStorage> {
    ProfileStore::open(FileStorage::new(paths.profiles_dir()))
}

/// Remote client for seeding and publishing, or `None` when the remote is
/// disabled or not fully configured.
fn build_remote(args: &RunArgs, settings: &TunerSettings) -> Option<Box<dyn ConfigRemote>> {
    if args.no_remote {
        tracing::info!("remote store disabled (--no-remote)");
        return None;
    }

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| settings.remote.as_ref().map(|remote| remote.endpoint.clone()));
    let Some(endpoint) = endpoint else {
        tracing::info!("no remote endpoint configured; starting from defaults");
        return None;
    };

    let credential = args.credential.clone().or_else(|| {
        settings
            .remote
            .as_ref()
            .and_then(|remote| env::var(&remote.credential_env).ok())
    });
    let Some(credential) = credential else {
        tracing::warn!("remote endpoint configured but no credential supplied; remote disabled");
        return None;
    };

    match RpcClient::new(&endpoint, credential) {
        Ok(client) => {
            tracing::debug!(%endpoint, "remote store client ready");
            Some(Box::new(client))
        }
        Err(err) => {
            tracing::warn!("remote store unavailable; starting from defaults: {err}");
            None
        }
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = load_settings(&paths)?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        debounce_ms = settings.debounce.as_millis() as u64,
        "resolved ribbontune paths"
    );

    let remote = build_remote(&args, &settings);
    let profiles = open_profiles(&paths);
    let options = PreviewOptions {
        title: settings.window.title.clone(),
        width: args.width.unwrap_or(settings.window.width),
        height: args.height.unwrap_or(settings.window.height),
        profile: args.profile,
    };
    tracing::info!(
        width = options.width,
        height = options.height,
        remote = remote.is_some(),
        "starting ribbon preview"
    );
    window::run_preview(options, &settings, profiles, remote)
}

/// Parameters used by `generate`: defaults, the configured palette and an
/// optional profile. The remote store is never consulted.
pub fn offline_params(
    settings: &TunerSettings,
    profiles: &ProfileStore<FileStorage>,
    profile: Option<&str>,
) -> Result<ParameterSet> {
    let mut params = ParameterSet::default();
    if let Some(colors) = &settings.colors {
        params.colors = colors.clone();
    }
    if let Some(name) = profile {
        profiles
            .load(name, &mut params)
            .with_context(|| format!("failed to load profile '{name}'"))?;
    }
    Ok(params)
}

pub fn generate(args: GenerateArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = load_settings(&paths)?;
    let profiles = open_profiles(&paths);
    let params = offline_params(&settings, &profiles, args.profile.as_deref())?;
    let shader = shadergen::generate(&params).context("failed to generate shader source")?;
    if args.vertex {
        println!("{}", shader.vertex);
    }
    print!("{}", shader.fragment);
    Ok(())
}

pub fn list_profiles() -> Result<()> {
    let paths = AppPaths::discover()?;
    let profiles = open_profiles(&paths);
    if profiles.profiles().is_empty() {
        println!("No profiles stored in {}", paths.profiles_dir().display());
        return Ok(());
    }
    println!("Stored profiles:");
    for profile in profiles.profiles() {
        let saved = profile
            .saved_at_local()
            .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".into());
        println!("  {:<24} saved={saved}", profile.name);
    }
    Ok(())
}
