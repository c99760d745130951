use serde::Serialize;

use gradefetch_core::{Resolver, SourceDescriptor, SourceId};

use crate::cli::SourcesArgs;
use crate::error::CliError;

use super::{CommandResult, Table};

#[derive(Debug, Serialize)]
struct SourceStatus {
    #[serde(flatten)]
    descriptor: SourceDescriptor,
    current: bool,
    /// Position in the next dispatch, absent for inactive sources.
    dispatch_position: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    current_source: Option<SourceId>,
    fallback_configured: bool,
    sources: Vec<SourceStatus>,
}

pub fn run(args: &SourcesArgs, resolver: &Resolver) -> Result<CommandResult, CliError> {
    let registry = resolver.registry();
    let current = registry.current_source();
    let order = registry.dispatch_order();

    let sources = registry
        .list_sources()
        .into_iter()
        .filter(|descriptor| args.all || descriptor.active)
        .map(|descriptor| SourceStatus {
            current: current.as_ref() == Some(&descriptor.id),
            dispatch_position: order.iter().position(|id| id == &descriptor.id),
            descriptor,
        })
        .collect::<Vec<_>>();

    let table = Table {
        headers: vec!["id", "active", "current", "position", "endpoint"],
        rows: sources
            .iter()
            .map(|status| {
                vec![
                    status.descriptor.id.to_string(),
                    status.descriptor.active.to_string(),
                    status.current.to_string(),
                    status
                        .dispatch_position
                        .map(|position| position.to_string())
                        .unwrap_or_else(|| String::from("-")),
                    status.descriptor.endpoint.clone(),
                ]
            })
            .collect(),
    };

    let data = serde_json::to_value(SourcesResponseData {
        current_source: current,
        fallback_configured: resolver.has_fallback(),
        sources,
    })?;

    Ok(CommandResult::ok(data, table))
}
