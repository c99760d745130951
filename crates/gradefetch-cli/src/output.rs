use std::io::{self, Write};

use crate::cli::OutputFormat;
use crate::commands::{CommandResult, Table};
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(&result.data)?
            } else {
                serde_json::to_string(&result.data)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => {
            let stdout = io::stdout();
            write_table(&mut stdout.lock(), &result.table)?;
        }
    }

    Ok(())
}

fn write_table<W: Write>(writer: &mut W, table: &Table) -> io::Result<()> {
    let mut widths = table.headers.iter().map(|h| h.len()).collect::<Vec<_>>();
    for row in &table.rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let header = table
        .headers
        .iter()
        .zip(widths.iter().copied())
        .map(|(header, width)| format!("{header:<width$}"))
        .collect::<Vec<_>>();
    writeln!(writer, "{}", header.join("  ").trim_end())?;

    for row in &table.rows {
        let cells = row
            .iter()
            .zip(widths.iter().copied())
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>();
        writeln!(writer, "{}", cells.join("  ").trim_end())?;
    }

    Ok(())
}
