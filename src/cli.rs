use crate::config::{AutomationLayer, ConfigLayer, ProviderLayer, RepoLayer, ScanLayer};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "depdetective",
    about = "DepDetective - dependency automation bot for multi-ecosystem repositories",
    version,
    author
)]
pub struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone, scan, update and open or refresh a pull request
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the depdetective YAML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Repository clone URL override
    #[arg(long, value_name = "URL")]
    pub repo_url: Option<String>,

    /// Base branch to track
    #[arg(long, value_name = "BRANCH")]
    pub base_branch: Option<String>,

    /// Provider type
    #[arg(long, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Provider repository slug (e.g. OWNER/REPO)
    #[arg(long, value_name = "SLUG")]
    pub provider_repo: Option<String>,

    /// Name of the environment variable holding the provider token
    #[arg(long, value_name = "VAR")]
    pub provider_token_env: Option<String>,

    /// Provider API host/base URL override
    #[arg(long, value_name = "URL")]
    pub provider_host: Option<String>,

    /// Plan updates without committing, pushing or calling the provider
    #[arg(long)]
    pub dry_run: bool,

    /// Limit scanning to an ecosystem (repeatable); `auto` adds detected ones
    #[arg(long = "ecosystem", value_name = "NAME")]
    pub ecosystems: Vec<String>,

    /// Enable ecosystem auto-detection
    #[arg(long, conflicts_with = "no_auto_detect")]
    pub auto_detect: bool,

    /// Disable ecosystem auto-detection
    #[arg(long)]
    pub no_auto_detect: bool,

    /// Write the JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report_path: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderArg {
    Github,
    Gitlab,
    #[value(name = "azure_devops")]
    AzureDevops,
    Ado,
    Azure,
    Generic,
}

impl ProviderArg {
    fn as_config_value(&self) -> &'static str {
        match self {
            ProviderArg::Github => "github",
            ProviderArg::Gitlab => "gitlab",
            ProviderArg::AzureDevops => "azure_devops",
            ProviderArg::Ado => "ado",
            ProviderArg::Azure => "azure",
            ProviderArg::Generic => "generic",
        }
    }
}

impl RunArgs {
    /// Configuration layer holding only the settings given on the command line.
    pub fn overrides(&self) -> ConfigLayer {
        let auto_detect = match (self.auto_detect, self.no_auto_detect) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };

        ConfigLayer {
            repo: RepoLayer {
                url: self.repo_url.clone(),
                base_branch: self.base_branch.clone(),
                clone_dir: None,
            },
            provider: ProviderLayer {
                kind: self.provider.map(|p| p.as_config_value().to_string()),
                repo: self.provider_repo.clone(),
                token_env: self.provider_token_env.clone(),
                host: self.provider_host.clone(),
            },
            scan: ScanLayer {
                ecosystems: (!self.ecosystems.is_empty()).then(|| self.ecosystems.clone()),
                auto_detect,
                include_vulnerabilities: None,
            },
            automation: AutomationLayer {
                dry_run: self.dry_run.then_some(true),
                ..AutomationLayer::default()
            },
            ..ConfigLayer::default()
        }
    }
}
