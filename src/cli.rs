use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::auth::{Credentials, Token};
use crate::config::{Config, OutputFormat};
use crate::output;
use crate::providers::teamcity::client::locator::{
    BuildLocator, BuildStatus, BuildTypeLocator, LocatorFlag,
};
use crate::providers::teamcity::types::BuildTypeId;
use crate::providers::teamcity::LatestBuildsQuery;
use crate::providers::TeamCityProvider;

#[derive(Parser)]
#[command(name = "tclens")]
#[command(author, version, about = "Latest TeamCity builds per configuration and branch", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./tclens.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the output to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Args)]
struct ServerArgs {
    /// TeamCity base URL
    #[arg(short, long, global = true, env = "TEAMCITY_URL")]
    url: Option<String>,

    /// Access token (bearer authentication)
    #[arg(short, long, global = true, env = "TEAMCITY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Username (basic authentication)
    #[arg(long, global = true, env = "TEAMCITY_USER")]
    username: Option<String>,

    /// Password (basic authentication)
    #[arg(long, global = true, env = "TEAMCITY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Maximum number of concurrent HTTP calls
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the latest build of every configuration and branch
    Latest {
        /// Query this branch everywhere instead of discovering branches
        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short, long, value_enum)]
        status: Option<BuildStatus>,

        #[arg(long, value_enum)]
        running: Option<LocatorFlag>,

        #[arg(long, value_enum)]
        canceled: Option<LocatorFlag>,

        /// Builds per filter; 0 follows every page
        #[arg(long)]
        count: Option<u32>,

        /// Only configurations of this project
        #[arg(short = 'P', long)]
        project: Option<String>,

        /// Include paused configurations
        #[arg(long, default_value_t = false)]
        include_paused: bool,

        /// Look up real branch names of builds labelled <default>
        #[arg(long, default_value_t = false)]
        name_default_branches: bool,
    },
    /// List build configurations
    Configs {
        #[arg(short = 'P', long)]
        project: Option<String>,

        #[arg(long, default_value_t = false)]
        include_paused: bool,
    },
    /// List the branches of a build configuration
    Branches { build_type: String },
    /// Show the statistics of a build
    Stats { build_id: u64 },
    /// Show the resulting properties of a build
    Properties { build_id: u64 },
}

impl Cli {
    fn provider(&self, config: &Config) -> Result<TeamCityProvider> {
        let url = self
            .server
            .url
            .clone()
            .or_else(|| config.server.url.clone())
            .context("No TeamCity URL given (use --url, TEAMCITY_URL or the config file)")?;

        let token = self
            .server
            .token
            .clone()
            .or_else(|| config.server.token.clone())
            .map(Token::from);
        let username = self
            .server
            .username
            .clone()
            .or_else(|| config.server.username.clone());
        let password = self
            .server
            .password
            .clone()
            .or_else(|| config.server.password.clone());
        let credentials = Credentials::from_parts(token, username, password);

        let mut settings = config.client_settings();
        if let Some(concurrency) = self.server.concurrency {
            settings.dispatch.concurrency = concurrency;
        }

        Ok(TeamCityProvider::new(&url, credentials, &settings)?)
    }

    fn configurations_filter(config: &Config, project: Option<&str>, include_paused: bool) -> BuildTypeLocator {
        let mut filter = if config.query.exclude_paused && !include_paused {
            BuildTypeLocator::active_only()
        } else {
            BuildTypeLocator::default()
        };
        filter.project = project
            .map(ToString::to_string)
            .or_else(|| config.query.project.clone());
        filter
    }

    fn write_json(&self, config: &Config, value: &impl Serialize) -> Result<()> {
        let json_output = if self.pretty || config.output.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }

    fn wants_json(&self, config: &Config) -> bool {
        self.output.is_some() || self.format.unwrap_or(config.output.format) == OutputFormat::Json
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_latest(
        &self,
        config: &Config,
        branch: Option<&str>,
        status: Option<BuildStatus>,
        running: Option<LocatorFlag>,
        canceled: Option<LocatorFlag>,
        count: Option<u32>,
        project: Option<&str>,
        include_paused: bool,
        name_default_branches: bool,
    ) -> Result<()> {
        let provider = self.provider(config)?;

        let query = LatestBuildsQuery {
            configurations: Self::configurations_filter(config, project, include_paused),
            branch: branch
                .map(ToString::to_string)
                .or_else(|| config.query.branch.clone()),
            template: BuildLocator {
                status: status.or(config.query.status),
                running: running.or(config.query.running),
                canceled: canceled.or(config.query.canceled),
                count: count.unwrap_or(config.query.count),
                ..BuildLocator::latest(BuildTypeId::default())
            },
            name_default_branches: name_default_branches || config.query.name_default_branches,
        };

        if query.template.is_uncapped() {
            info!("Count is 0, every page of each build listing will be fetched");
        }

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling outstanding requests");
                interrupt.cancel();
            }
        });

        let report = provider
            .collect_latest_builds(&query, cancel)
            .await
            .context("Failed to resolve latest builds")?;

        if self.wants_json(config) {
            self.write_json(config, &report)
        } else {
            output::print_summary(&report);
            Ok(())
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Latest {
                branch,
                status,
                running,
                canceled,
                count,
                project,
                include_paused,
                name_default_branches,
            } => {
                self.execute_latest(
                    &config,
                    branch.as_deref(),
                    *status,
                    *running,
                    *canceled,
                    *count,
                    project.as_deref(),
                    *include_paused,
                    *name_default_branches,
                )
                .await
            }
            Commands::Configs {
                project,
                include_paused,
            } => {
                let provider = self.provider(&config)?;
                let filter =
                    Self::configurations_filter(&config, project.as_deref(), *include_paused);
                let build_types = provider
                    .client()
                    .list_build_types(Some(&filter))
                    .await
                    .context("Failed to list build configurations")?;

                if self.wants_json(&config) {
                    self.write_json(&config, &build_types)
                } else {
                    output::print_build_types(&build_types);
                    Ok(())
                }
            }
            Commands::Branches { build_type } => {
                let provider = self.provider(&config)?;
                let branches = provider
                    .client()
                    .branches(&BuildTypeId::new(build_type.as_str()))
                    .await
                    .with_context(|| format!("Failed to list branches of {build_type}"))?;

                if self.wants_json(&config) {
                    self.write_json(&config, &branches)
                } else {
                    output::print_branches(&branches);
                    Ok(())
                }
            }
            Commands::Stats { build_id } => {
                let provider = self.provider(&config)?;
                let statistics = provider
                    .client()
                    .build_statistics(*build_id)
                    .await
                    .with_context(|| format!("Failed to fetch statistics of build {build_id}"))?;

                if self.wants_json(&config) {
                    self.write_json(&config, &statistics)
                } else {
                    output::print_properties(&statistics);
                    Ok(())
                }
            }
            Commands::Properties { build_id } => {
                let provider = self.provider(&config)?;
                let properties = provider
                    .client()
                    .resulting_properties(*build_id)
                    .await
                    .with_context(|| format!("Failed to fetch properties of build {build_id}"))?;

                if self.wants_json(&config) {
                    self.write_json(&config, &properties)
                } else {
                    output::print_properties(&properties);
                    Ok(())
                }
            }
        }
    }
}
