//! Meshability report for a RON model description

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use meshsep_core::{PolicyKind, SeparationConfig, ShapeSeparator};
use meshsep_kernel::MemoryKernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Strict,
    Coverage,
    Diagnostic,
}

impl From<PolicyArg> for PolicyKind {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Strict => PolicyKind::Strict,
            PolicyArg::Coverage => PolicyKind::Coverage,
            PolicyArg::Diagnostic => PolicyKind::Diagnostic,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "meshsep")]
#[command(about = "Separate a B-rep model into meshable and non-meshable parts", long_about = None)]
struct Cli {
    /// Model description (RON)
    model: PathBuf,

    /// Separation settings (RON); command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Acceptance policy; selects that policy's default settings when no config file is given
    #[arg(short, long, value_enum)]
    policy: Option<PolicyArg>,

    /// Linear tessellation tolerance
    #[arg(long)]
    deflection: Option<f64>,

    /// Angular tessellation tolerance (radians)
    #[arg(long)]
    angle: Option<f64>,

    /// Coverage threshold for the coverage and diagnostic policies
    #[arg(long)]
    threshold: Option<f64>,

    /// Number of non-meshable shapes listed in the report
    #[arg(short, long)]
    limit: Option<usize>,

    /// Disable the decision cache
    #[arg(long)]
    no_cache: bool,

    /// Skip the repair attempt before meshing
    #[arg(long)]
    no_repair: bool,

    /// Print only the shapes that could not be meshed
    #[arg(long)]
    remove_meshable: bool,

    /// Emit JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Write the effective settings to this file
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Cli {
    /// Settings from the config file or policy defaults, with flag overrides applied
    fn separation_config(&self) -> Result<SeparationConfig> {
        let mut config = match &self.config {
            Some(path) => SeparationConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SeparationConfig::for_policy(
                self.policy.map(PolicyKind::from).unwrap_or_default(),
            ),
        };

        if let Some(policy) = self.policy {
            config.policy = policy.into();
        }
        if let Some(deflection) = self.deflection {
            config = config.with_deflection(deflection);
        }
        if let Some(angle) = self.angle {
            config = config.with_angle(angle);
        }
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if let Some(limit) = self.limit {
            config = config.with_report_limit(limit);
        }
        if self.no_cache {
            config = config.with_cache(false);
        }
        if self.no_repair {
            config = config.with_repair(false);
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshsep_cli=info,meshsep_core=info,meshsep_kernel=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.separation_config()?;

    if let Some(path) = &cli.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to save config {}", path.display()))?;
        tracing::info!("Saved settings to {}", path.display());
    }

    let (kernel, root) = MemoryKernel::load_model(&cli.model)
        .with_context(|| format!("Failed to load model {}", cli.model.display()))?;
    tracing::info!("Loaded {} shapes from {}", kernel.shape_count(), cli.model.display());

    let mut separator = ShapeSeparator::new(&kernel, config);

    if cli.remove_meshable {
        let remaining = separator.remove_meshable(root)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&remaining)?);
        } else {
            for shape in remaining {
                println!("{}", shape);
            }
        }
        return Ok(());
    }

    let separation = separator.separate(root)?;
    if cli.json {
        let output = serde_json::json!({
            "separation": separation,
            "report": separator.report(),
            "meshable": separator.meshable_info(),
            "non_meshable": separator.non_meshable_info(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", separator.analysis_report());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let cli = Cli::parse_from(["meshsep", "model.ron", "--policy", "coverage"]);
        let config = cli.separation_config().unwrap();
        assert_eq!(config, SeparationConfig::multi_level());
    }

    #[test]
    fn test_flag_overrides() {
        let cli = Cli::parse_from([
            "meshsep",
            "model.ron",
            "--deflection",
            "0.2",
            "--limit",
            "3",
            "--no-cache",
            "--no-repair",
        ]);
        let config = cli.separation_config().unwrap();
        assert_eq!(config.policy, PolicyKind::Strict);
        assert_eq!(config.deflection, 0.2);
        assert_eq!(config.report_limit, 3);
        assert!(!config.use_cache);
        assert!(!config.try_fix_before_meshing);
    }

    #[test]
    fn test_demo_model_separates() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/bracket.ron");
        let (kernel, root) = MemoryKernel::load_model(path).unwrap();
        let mut separator = ShapeSeparator::new(&kernel, SeparationConfig::strict());
        let separation = separator.separate(root).unwrap();
        assert!(!separation.meshable.is_empty());
        assert!(!separation.non_meshable.is_empty());

        let config = SeparationConfig::load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../demos/coverage.ron"
        ))
        .unwrap();
        assert_eq!(config.policy, PolicyKind::Coverage);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["meshsep", "model.ron", "--threshold", "1.5"]);
        assert!(cli.separation_config().is_err());
    }
}
