use anyhow::Result;
use colored::Colorize;
use pi_engine::TierContext;
use serde::Serialize;
use std::io::Write;

use super::collect::{BatchSummary, ItemOutcome};
use super::compile::{Compendium, ItemEntry, TierEntry, column_best};
use super::recompute::RecomputeSummary;
use crate::common::format_elapsed;

fn percent(perfection: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", perfection * 100.0)
}

fn value_cell(value: Option<f64>) -> String {
    value.map_or_else(String::new, |value| format!("{value:.5}"))
}

pub fn generate_json_report<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    let json_output = serde_json::to_string_pretty(value)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}

pub fn generate_console_report(out: &mut dyn Write, compendium: &Compendium) -> Result<()> {
    writeln!(
        out,
        "{}",
        format!("📖 Compendium for game version {}", compendium.game_version)
            .bright_cyan()
            .bold()
    )?;
    writeln!(out, "{}", "=".repeat(40).cyan())?;

    for section in &compendium.sections {
        writeln!(out)?;
        writeln!(out, "{}", section.title.bright_yellow().bold())?;
        writeln!(out, "{}", "-".repeat(section.title.len()).yellow())?;
        for entry in &section.entries {
            write_console_entry(out, entry)?;
        }
    }
    Ok(())
}

fn write_console_entry(out: &mut dyn Write, entry: &ItemEntry) -> Result<()> {
    writeln!(out, "{}", entry.heading().bold())?;
    if let Some(placeholder) = &entry.placeholder {
        writeln!(out, "   {}", placeholder.red())?;
        return Ok(());
    }
    for tier in &entry.tiers {
        let label = if tier.quality.is_empty() {
            format!("max {} stats", tier.max_stats_per_seed)
        } else {
            format!("{} · max {} stats", tier.quality, tier.max_stats_per_seed)
        };
        match &tier.note {
            Some(note) => writeln!(out, "   {} {}", label.green(), note.dimmed())?,
            None => writeln!(out, "   {}", label.green())?,
        }
        let best = column_best(tier, entry.columns.len());
        for row in &tier.rows {
            let values: Vec<String> = row
                .values
                .iter()
                .zip(&entry.columns)
                .zip(&best)
                .filter_map(|((value, column), best)| {
                    let value = (*value)?;
                    let cell = format!("{column}={}", value_cell(Some(value)));
                    Some(if Some(value) == *best {
                        cell.bright_white().bold().to_string()
                    } else {
                        cell
                    })
                })
                .collect();
            writeln!(
                out,
                "     #{:<6} {:>9}  {}  {}",
                row.seed,
                percent(row.perfection, 3),
                row.name,
                values.join(", ")
            )?;
        }
    }
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, compendium: &Compendium) -> Result<()> {
    writeln!(out, "# Compendium\n")?;
    writeln!(
        out,
        "Game version {} · names in `{}`\n",
        compendium.game_version,
        compendium.language.code()
    )?;
    for section in &compendium.sections {
        writeln!(out, "## {}\n", section.title)?;
        for entry in &section.entries {
            writeln!(out, "### {}\n", entry.heading())?;
            if let Some(placeholder) = &entry.placeholder {
                writeln!(out, "> {placeholder}\n")?;
                continue;
            }
            for tier in &entry.tiers {
                write_markdown_tier(out, entry, tier)?;
            }
        }
    }
    Ok(())
}

fn write_markdown_tier(out: &mut dyn Write, entry: &ItemEntry, tier: &TierEntry) -> Result<()> {
    if !tier.quality.is_empty() {
        write!(out, "**{}** (max {} stats)", tier.quality, tier.max_stats_per_seed)?;
        if let Some(note) = &tier.note {
            write!(out, " _{note}_")?;
        }
        writeln!(out, "\n")?;
    }

    let mut header = vec!["Name".to_string(), "Seed".to_string(), "Perfection".to_string()];
    header.extend(entry.columns.iter().cloned());
    writeln!(out, "| {} |", header.join(" | "))?;
    writeln!(out, "|{}", " --- |".repeat(header.len()))?;

    let best = column_best(tier, entry.columns.len());
    let decimals = if tier.quality.is_empty() { 0 } else { 3 };
    for row in &tier.rows {
        let mut cells = vec![
            row.name.clone(),
            row.seed.to_string(),
            percent(row.perfection, decimals),
        ];
        cells.extend(row.values.iter().zip(&best).map(|(value, best)| {
            let cell = value_cell(*value);
            if value.is_some() && value == best {
                format!("**{cell}**")
            } else {
                cell
            }
        }));
        writeln!(out, "| {} |", cells.join(" | "))?;
    }
    writeln!(out)?;
    Ok(())
}

pub fn generate_batch_report(out: &mut dyn Write, summary: &BatchSummary) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Collection Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "=====================".cyan())?;

    for outcome in &summary.outcomes {
        let line = match outcome {
            ItemOutcome::Finalized {
                item,
                rows,
                max_stats_possible,
                out_of_range,
            } => {
                let mut line = format!(
                    "{} {} - {rows} rows, up to {max_stats_possible} stats",
                    "✅".green(),
                    item.bold()
                );
                if !out_of_range.is_empty() {
                    let stats: Vec<String> =
                        out_of_range.iter().map(ToString::to_string).collect();
                    let note = format!(" (outside range: {})", stats.join(", "));
                    line.push_str(&note.yellow().to_string());
                }
                line
            }
            ItemOutcome::Partial { item, next_seed } => {
                format!("{} {} - slice done, next seed {next_seed}", "⏸".cyan(), item.bold())
            }
            ItemOutcome::Incomplete { item, missing } => format!(
                "{} {} - {missing} seeds missing from earlier slices",
                "⚠️".yellow(),
                item.bold()
            ),
            ItemOutcome::Unavailable { item } => {
                format!("{} {} - unavailable", "➖".dimmed(), item.bold())
            }
            ItemOutcome::Failed { item, error } => {
                format!("{} {} - {}", "❌".red(), item.bold(), error.red())
            }
            ItemOutcome::Cancelled { item } => {
                format!("{} {} - cancelled", "🛑".yellow(), item.bold())
            }
        };
        writeln!(out, "{line}")?;
    }

    let failed = summary.outcomes.iter().filter(|o| o.is_failure()).count();
    writeln!(out)?;
    writeln!(
        out,
        "Workers: {}/{} finished",
        summary.counters.finished, summary.counters.spawned
    )?;
    writeln!(out, "Failed: {}", failed.to_string().red())?;
    writeln!(out, "Total time: {}", format_elapsed(summary.elapsed))?;
    Ok(())
}

pub fn generate_recompute_report(out: &mut dyn Write, summary: &RecomputeSummary) -> Result<()> {
    writeln!(out, "{}", "♻️  Recompute Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===================".cyan())?;
    for table in &summary.tables {
        let status = if table.changed {
            "rescored".yellow()
        } else {
            "unchanged".green()
        };
        writeln!(out, "{:<12} {:>7} rows  {status}", table.item, table.rows)?;
    }
    for skipped in &summary.skipped {
        writeln!(out, "{} {}", "skipped".dimmed(), skipped.display())?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "Tables: {} ({} changed, {} skipped)",
        summary.tables.len(),
        summary.changed(),
        summary.skipped.len()
    )?;
    writeln!(out, "Total time: {}", format_elapsed(summary.elapsed))?;
    Ok(())
}

pub fn generate_recompute_markdown(
    out: &mut dyn Write,
    summary: &RecomputeSummary,
) -> Result<()> {
    writeln!(out, "# Recompute\n")?;
    writeln!(out, "| Table | Rows | Status | Digest |")?;
    writeln!(out, "| --- | --- | --- | --- |")?;
    for table in &summary.tables {
        let status = if table.changed { "rescored" } else { "unchanged" };
        writeln!(
            out,
            "| {} | {} | {status} | `{}` |",
            table.item, table.rows, table.digest
        )?;
    }
    if !summary.skipped.is_empty() {
        writeln!(out, "\nSkipped:\n")?;
        for skipped in &summary.skipped {
            writeln!(out, "- `{}`", skipped.display())?;
        }
    }
    writeln!(
        out,
        "\n{} tables, {} changed, {} skipped in {}",
        summary.tables.len(),
        summary.changed(),
        summary.skipped.len(),
        format_elapsed(summary.elapsed)
    )?;
    Ok(())
}

pub fn generate_listing(out: &mut dyn Write, tiers: &[TierContext<'_>]) -> Result<()> {
    for tier in tiers {
        let flag = if tier.spec.unverified { " (unverified)" } else { "" };
        writeln!(
            out,
            "  {:<12} {:<28} {:<20} max {} stats{flag}",
            tier.key().to_string(),
            tier.item.display_title(),
            tier.family().folder(),
            tier.spec.max_stats
        )?;
    }
    Ok(())
}
