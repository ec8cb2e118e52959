//! Rendering of analytics reports for the terminal and for external tools.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use showmmr_analytics::Report;
use showmmr_core::LOCAL_DATE_FORMAT;

/// Human readable statistics block.
pub fn write_text(report: &Report, heroes: bool, out: &mut impl Write) -> Result<()> {
    writeln!(out, "\nStatistics:\n")?;
    writeln!(out, "Matches in ledger: {}", report.matches)?;
    if let Some(rank) = report.current_rank {
        writeln!(out, "Current MMR: {rank}")?;
    }

    let dd = &report.double_down;
    writeln!(
        out,
        "Double down accuracy: {} / {} = {}% (estimated using matches where |rank change| > 40)",
        dd.wins, dd.count, dd.accuracy_pct
    )?;
    writeln!(out, "MMR inflated by (at least): {}\n", dd.mmr_inflated_estimate)?;

    if let Some(queues) = &report.queue_totals {
        writeln!(out, "Total MMR gained in solo queue: {}", queues.solo)?;
        writeln!(out, "Total MMR gained in party queue: {}", queues.party)?;
    }

    if heroes {
        let ranking = report.hero_ranking();
        if ranking.is_empty() {
            writeln!(out, "\nNo per-hero data in this ledger.")?;
        } else {
            writeln!(out, "\nMMR by hero:")?;
            for standing in ranking {
                match standing.name {
                    Some(name) => writeln!(out, "{name}: {}", standing.net_change)?,
                    None => writeln!(out, "hero #{}: {}", standing.hero_id, standing.net_change)?,
                }
            }
        }
    }
    Ok(())
}

pub fn write_json(report: &Report, out: &mut impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report).context("failed to encode report")?;
    writeln!(out)?;
    Ok(())
}

/// Oldest-first rating series for plotting.
pub fn write_series(report: &Report, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["Date", "Unix time", "MatchID", "MMR"])?;
    for point in report.chronological_series() {
        writer.write_record([
            point.at.format(LOCAL_DATE_FORMAT).to_string(),
            point.at.timestamp().to_string(),
            point.match_id.to_string(),
            point.rank.to_string(),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
