use gradefetch_core::{QueryKey, Resolution, Resolver, SourceId};

use crate::cli::ResolveArgs;
use crate::error::CliError;

use super::{CommandResult, Table};

pub async fn run(args: &ResolveArgs, resolver: &Resolver) -> Result<CommandResult, CliError> {
    let key = QueryKey::new(&args.roll, &args.regulation, &args.program)?;

    if let Some(prefer) = &args.prefer {
        let id = SourceId::parse(prefer)?;
        resolver.registry().set_active(&id)?;
    }

    let resolution = resolver.resolve(&key).await;
    let data = serde_json::to_value(&resolution)?;
    let not_found = !resolution.is_found();

    Ok(CommandResult::ok(data, table(&resolution)).with_not_found(not_found))
}

fn table(resolution: &Resolution) -> Table {
    match resolution {
        Resolution::Found(result) => Table {
            headers: vec!["semester", "result", "passed", "referred", "published"],
            rows: result
                .result_data
                .iter()
                .map(|entry| {
                    vec![
                        entry.semester.to_string(),
                        entry.result.clone(),
                        entry.passed.to_string(),
                        entry.reference_subjects.join(","),
                        entry.published_at.to_string(),
                    ]
                })
                .chain(result.cgpa_data.iter().map(|entry| {
                    vec![
                        format!("cgpa {}", entry.semester),
                        entry.cgpa.clone(),
                        String::new(),
                        String::new(),
                        entry.published_at.to_string(),
                    ]
                }))
                .collect(),
        },
        Resolution::NotFound(report) => Table {
            headers: vec!["participant", "outcome", "latency_ms", "detail"],
            rows: report
                .attempts
                .iter()
                .map(|attempt| {
                    vec![
                        attempt.source.to_string(),
                        attempt.outcome.to_string(),
                        attempt.latency_ms.to_string(),
                        attempt.detail.clone().unwrap_or_default(),
                    ]
                })
                .chain(std::iter::once(vec![
                    String::from("fallback"),
                    report.fallback.outcome.to_string(),
                    report.fallback.latency_ms.to_string(),
                    report.fallback.detail.clone().unwrap_or_default(),
                ]))
                .collect(),
        },
    }
}
