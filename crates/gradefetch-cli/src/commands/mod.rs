mod resolve;
mod sources;

use std::path::Path;
use std::sync::Arc;

use gradefetch_core::{
    DefaultConnector, HttpClient, ReqwestHttpClient, Resolver, ResolverConfig,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Rows for `--format table`.
#[derive(Debug, Default)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

pub struct CommandResult {
    pub data: Value,
    pub table: Table,
    pub not_found: bool,
}

impl CommandResult {
    pub fn ok(data: Value, table: Table) -> Self {
        Self {
            data,
            table,
            not_found: false,
        }
    }

    pub fn with_not_found(mut self, not_found: bool) -> Self {
        self.not_found = not_found;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = load_config(cli.config.as_deref())?;
    let resolver = build_resolver(&config)?;

    match &cli.command {
        Command::Resolve(args) => resolve::run(args, &resolver).await,
        Command::Sources(args) => sources::run(args, &resolver),
    }
}

fn load_config(path: Option<&Path>) -> Result<ResolverConfig, CliError> {
    let config = match path {
        Some(path) => {
            let mut config = ResolverConfig::from_path(path)?;
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        }
        None => ResolverConfig::load_default()?,
    };
    Ok(config)
}

fn build_resolver(config: &ResolverConfig) -> Result<Resolver, CliError> {
    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let connector = DefaultConnector::new(Arc::clone(&http_client), config.source_timeout());
    Ok(Resolver::from_config(config, Arc::new(connector), http_client)?)
}
