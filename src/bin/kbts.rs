// Kbts CLI
// Compiles a rule table and writes it into a Karabiner-Elements profile

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use kbts_core::config::Config;
use kbts_core::karabiner;

/// Profile name that means "print instead of writing"
const DRY_RUN_PROFILE: &str = "--dry-run";

/// Keyboard rule compiler for Karabiner-Elements
#[derive(Parser, Debug)]
#[command(name = "kbts")]
#[command(version)]
#[command(about = "Compile tap-hold, chord, double-tap and layer rules for Karabiner-Elements", long_about = None)]
struct Args {
    /// TOML rule file (default: ~/.config/kbts/kbts.toml)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Karabiner-Elements profile name
    #[arg(short, long, default_value = DRY_RUN_PROFILE, allow_hyphen_values = true)]
    profile: String,

    /// Print the rules as JSON instead of writing them
    #[arg(long)]
    dry_run: bool,

    /// karabiner.json to update (default: ~/.config/karabiner/karabiner.json)
    #[arg(long, value_name = "PATH")]
    karabiner_config: Option<PathBuf>,

    /// Validate the rule file and exit
    #[arg(long)]
    check_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn is_dry_run(&self) -> bool {
        self.dry_run || self.profile == DRY_RUN_PROFILE
    }
}

fn home_path(relative: &str) -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(relative))
        .ok_or_else(|| anyhow!("could not determine the home directory"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => home_path(".config/kbts/kbts.toml")?,
    };
    let config = Config::from_toml_path(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let rules = config
        .compile()
        .with_context(|| format!("failed to compile {}", config_path.display()))?;
    log::debug!(
        "compiled {} groups from {}",
        rules.groups().len(),
        config_path.display()
    );

    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    let lowered = karabiner::lower(&rules);
    if args.is_dry_run() {
        println!("{}", karabiner::to_json(&lowered)?);
        return Ok(());
    }

    let karabiner_path = match &args.karabiner_config {
        Some(path) => path.clone(),
        None => home_path(".config/karabiner/karabiner.json")?,
    };
    karabiner::write_to_profile(&karabiner_path, &args.profile, &lowered)
        .with_context(|| format!("failed to update {}", karabiner_path.display()))?;
    println!(
        "Profile '{}' updated with {} rules",
        args.profile,
        lowered.len()
    );
    Ok(())
}
