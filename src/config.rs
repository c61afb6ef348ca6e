//! Layered run configuration.
//!
//! A YAML file and the command line each produce a [`ConfigLayer`] in which
//! every setting is optional. Layers are combined with [`ConfigLayer::merge`]
//! and turned into a validated [`DepConfig`] by [`ConfigLayer::resolve`].

use crate::error::{DepError, Result};
use crate::providers::{ProviderKind, ProviderSettings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BRANCH_NAME: &str = "depdetective/autoupdate";
pub const DEFAULT_PR_TITLE: &str = "chore(deps): automated dependency updates";
pub const DEFAULT_MAX_UPDATES: usize = 50;
const DEFAULT_LABEL: &str = "dependencies";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub repo: RepoLayer,
    #[serde(default)]
    pub provider: ProviderLayer,
    #[serde(default)]
    pub scan: ScanLayer,
    #[serde(default)]
    pub update: UpdateLayer,
    #[serde(default)]
    pub automation: AutomationLayer,
    #[serde(default)]
    pub hooks: HooksLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoLayer {
    pub url: Option<String>,
    pub base_branch: Option<String>,
    pub clone_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderLayer {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub repo: Option<String>,
    pub token_env: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanLayer {
    pub ecosystems: Option<Vec<String>>,
    pub auto_detect: Option<bool>,
    pub include_vulnerabilities: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLayer {
    pub enabled: Option<bool>,
    pub max_updates: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutomationLayer {
    pub branch_name: Option<String>,
    pub pr_title: Option<String>,
    pub labels: Option<Vec<String>>,
    pub dry_run: Option<bool>,
    /// Accepted for older config files; has no effect.
    pub pr_body_template: Option<String>,
    /// Accepted for older config files; has no effect.
    pub rebase_existing: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksLayer {
    pub before_scan: Option<Vec<String>>,
    pub after_scan: Option<Vec<String>>,
    pub before_update: Option<Vec<String>>,
    pub after_update: Option<Vec<String>>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct DepConfig {
    pub repo: RepoConfig,
    pub provider: ProviderSettings,
    pub scan: ScanConfig,
    pub update: UpdateConfig,
    pub automation: AutomationConfig,
    pub hooks: HookConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepoConfig {
    pub url: String,
    pub base_branch: Option<String>,
    pub clone_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub ecosystems: Vec<String>,
    pub auto_detect: bool,
    pub include_vulnerabilities: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateConfig {
    pub enabled: bool,
    pub max_updates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationConfig {
    pub branch_name: String,
    pub pr_title: String,
    pub labels: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookConfig {
    pub before_scan: Vec<String>,
    pub after_scan: Vec<String>,
    pub before_update: Vec<String>,
    pub after_update: Vec<String>,
}

impl ConfigLayer {
    /// Reads a YAML layer from `path`. An empty file is an empty layer.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DepError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents).map_err(|e| match e {
            DepError::Yaml(inner) => {
                DepError::Config(format!("Invalid config file '{}': {inner}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Combines two layers; every setting present in `overrides` wins.
    pub fn merge(self, overrides: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            repo: RepoLayer {
                url: overrides.repo.url.or(self.repo.url),
                base_branch: overrides.repo.base_branch.or(self.repo.base_branch),
                clone_dir: overrides.repo.clone_dir.or(self.repo.clone_dir),
            },
            provider: ProviderLayer {
                kind: overrides.provider.kind.or(self.provider.kind),
                repo: overrides.provider.repo.or(self.provider.repo),
                token_env: overrides.provider.token_env.or(self.provider.token_env),
                host: overrides.provider.host.or(self.provider.host),
            },
            scan: ScanLayer {
                ecosystems: overrides.scan.ecosystems.or(self.scan.ecosystems),
                auto_detect: overrides.scan.auto_detect.or(self.scan.auto_detect),
                include_vulnerabilities: overrides
                    .scan
                    .include_vulnerabilities
                    .or(self.scan.include_vulnerabilities),
            },
            update: UpdateLayer {
                enabled: overrides.update.enabled.or(self.update.enabled),
                max_updates: overrides.update.max_updates.or(self.update.max_updates),
            },
            automation: AutomationLayer {
                branch_name: overrides.automation.branch_name.or(self.automation.branch_name),
                pr_title: overrides.automation.pr_title.or(self.automation.pr_title),
                labels: overrides.automation.labels.or(self.automation.labels),
                dry_run: overrides.automation.dry_run.or(self.automation.dry_run),
                pr_body_template: overrides
                    .automation
                    .pr_body_template
                    .or(self.automation.pr_body_template),
                rebase_existing: overrides
                    .automation
                    .rebase_existing
                    .or(self.automation.rebase_existing),
            },
            hooks: HooksLayer {
                before_scan: overrides.hooks.before_scan.or(self.hooks.before_scan),
                after_scan: overrides.hooks.after_scan.or(self.hooks.after_scan),
                before_update: overrides.hooks.before_update.or(self.hooks.before_update),
                after_update: overrides.hooks.after_update.or(self.hooks.after_update),
            },
        }
    }

    /// Applies defaults and validates the combined layer.
    pub fn resolve(self) -> Result<DepConfig> {
        let url = self
            .repo
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| DepError::Config("repo.url is required".to_string()))?;

        let kind = match self.provider.kind.as_deref() {
            Some(kind) => kind.parse::<ProviderKind>()?,
            None => ProviderKind::Generic,
        };

        let ecosystems = self.scan.ecosystems.unwrap_or_default();
        let auto_detect = self.scan.auto_detect.unwrap_or(true);
        if !auto_detect && ecosystems.is_empty() {
            return Err(DepError::Config(
                "scan.ecosystems cannot be empty when scan.auto_detect is false".to_string(),
            ));
        }

        if self.automation.pr_body_template.is_some() {
            tracing::warn!("automation.pr_body_template is ignored; the pull request body is generated");
        }
        if self.automation.rebase_existing.is_some() {
            tracing::warn!("automation.rebase_existing is ignored; the branch is always reset from the base tip");
        }

        let max_updates = self.update.max_updates.unwrap_or(DEFAULT_MAX_UPDATES as i64);
        if max_updates < 1 {
            return Err(DepError::Config(format!(
                "update.max_updates must be >= 1 (got {max_updates})"
            )));
        }

        Ok(DepConfig {
            repo: RepoConfig {
                url,
                base_branch: self.repo.base_branch.filter(|b| !b.trim().is_empty()),
                clone_dir: self.repo.clone_dir,
            },
            provider: ProviderSettings {
                kind,
                repo: self.provider.repo,
                token_env: self.provider.token_env,
                host: self.provider.host,
            },
            scan: ScanConfig {
                ecosystems,
                auto_detect,
                include_vulnerabilities: self.scan.include_vulnerabilities.unwrap_or(true),
            },
            update: UpdateConfig {
                enabled: self.update.enabled.unwrap_or(true),
                max_updates: usize::try_from(max_updates).unwrap_or(usize::MAX),
            },
            automation: AutomationConfig {
                branch_name: self
                    .automation
                    .branch_name
                    .unwrap_or_else(|| DEFAULT_BRANCH_NAME.to_string()),
                pr_title: self
                    .automation
                    .pr_title
                    .unwrap_or_else(|| DEFAULT_PR_TITLE.to_string()),
                labels: self
                    .automation
                    .labels
                    .unwrap_or_else(|| vec![DEFAULT_LABEL.to_string()]),
                dry_run: self.automation.dry_run.unwrap_or(false),
            },
            hooks: HookConfig {
                before_scan: non_blank(self.hooks.before_scan),
                after_scan: non_blank(self.hooks.after_scan),
                before_update: non_blank(self.hooks.before_update),
                after_update: non_blank(self.hooks.after_update),
            },
        })
    }
}

fn non_blank(commands: Option<Vec<String>>) -> Vec<String> {
    commands
        .unwrap_or_default()
        .into_iter()
        .filter(|command| !command.trim().is_empty())
        .collect()
}

/// Reads the optional config file, applies `overrides` on top and resolves.
pub fn load(config_path: Option<&Path>, overrides: ConfigLayer) -> Result<DepConfig> {
    let base = match config_path {
        Some(path) => ConfigLayer::from_file(path)?,
        None => ConfigLayer::default(),
    };
    base.merge(overrides).resolve()
}
