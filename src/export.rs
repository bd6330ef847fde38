//! Export a recorded analysis as a Markdown, JSON or CSV report.
//!
//! Markdown reports carry the same sections as the dashboard: summary,
//! risk, attachment, defense mechanisms, triggers, themes, emotion trend,
//! quotes, recommendations and the academic notes verbatim. JSON exports
//! the full [`HistoryItem`] in its persisted shape. CSV holds the
//! spreadsheet view: a `[summary]`, a `[defense_mechanisms]` and an
//! `[emotion_trend]` table, each opened by its title row.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::WriterBuilder;

use crate::compare::ComparisonSummary;
use crate::models::HistoryItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    #[value(alias = "md")]
    Markdown,
    Json,
    Csv,
}

pub fn render(item: &HistoryItem, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(render_markdown(item)),
        ExportFormat::Json => {
            serde_json::to_string_pretty(item).context("Failed to serialize history item")
        }
        ExportFormat::Csv => render_csv(item),
    }
}

/// Write the rendered report to `output`, or to stdout when `None`.
pub fn run_export(item: &HistoryItem, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let rendered = render(item, format)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} to {}", item.id, path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn format_date(item: &HistoryItem) -> String {
    item.created_at()
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| item.timestamp.to_string())
}

pub fn render_markdown(item: &HistoryItem) -> String {
    let data = &item.data;
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# Psychological Analysis Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "- **ID:** {}", item.id);
    let _ = writeln!(out, "- **Date:** {}", format_date(item));
    let _ = writeln!(out, "- **Language:** {}", data.language);
    let _ = writeln!(out, "- **Risk level:** {}", data.risk_level);
    if item.user_rating > 0 {
        let _ = writeln!(out, "- **Rating:** {}/5", item.user_rating);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", data.summary);
    let _ = writeln!(out);

    let profile = &data.attachment_profile;
    let _ = writeln!(out, "## Attachment");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "**{}** (confidence {:.0}%)",
        if profile.style.is_empty() { "n/a" } else { &profile.style },
        profile.confidence
    );
    for indicator in &profile.indicators {
        let _ = writeln!(out, "- {}", indicator);
    }
    let _ = writeln!(out);

    if !data.defense_mechanisms.is_empty() {
        let _ = writeln!(out, "## Defense Mechanisms");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Mechanism | Frequency | Description | Example |");
        let _ = writeln!(out, "|---|---|---|---|");
        for d in &data.defense_mechanisms {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                cell(&d.name),
                d.frequency,
                cell(&d.description),
                cell(&d.example_quote)
            );
        }
        let _ = writeln!(out);
    }

    if !data.emotional_triggers.is_empty() {
        let _ = writeln!(out, "## Emotional Triggers");
        let _ = writeln!(out);
        for t in &data.emotional_triggers {
            let _ = writeln!(
                out,
                "- **{}** → {} (intensity {:.0}/10)",
                t.trigger, t.response, t.intensity
            );
        }
        let _ = writeln!(out);
    }

    if !data.themes.is_empty() {
        let _ = writeln!(out, "## Themes");
        let _ = writeln!(out);
        for theme in &data.themes {
            let _ = writeln!(
                out,
                "- **{}** ({:.0}%): {}",
                theme.title, theme.relevance_score, theme.description
            );
        }
        let _ = writeln!(out);
    }

    if !data.emotion_trend.is_empty() {
        let _ = writeln!(out, "## Emotion Trend");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Segment | Happiness | Sadness | Anger | Anxiety |");
        let _ = writeln!(out, "|---|---|---|---|---|");
        for p in &data.emotion_trend {
            let _ = writeln!(
                out,
                "| {} | {:.1} | {:.1} | {:.1} | {:.1} |",
                p.segment, p.happiness, p.sadness, p.anger, p.anxiety
            );
        }
        let _ = writeln!(out);
    }

    if !data.key_quotes.is_empty() {
        let _ = writeln!(out, "## Key Quotes");
        let _ = writeln!(out);
        for q in &data.key_quotes {
            let _ = writeln!(out, "> {}", q.text);
            let _ = writeln!(out);
            let _ = writeln!(out, "_{}_: {}", q.category, q.analysis);
            let _ = writeln!(out);
        }
    }

    if !data.therapy_recommendations.is_empty() {
        let _ = writeln!(out, "## Therapy Recommendations");
        let _ = writeln!(out);
        for (i, rec) in data.therapy_recommendations.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, rec);
        }
        let _ = writeln!(out);
    }

    if !data.academic_notes.trim().is_empty() {
        let _ = writeln!(out, "## Academic Notes");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", data.academic_notes.trim());
    }

    out
}

/// Structured fields as CSV tables, one per section.
pub fn render_csv(item: &HistoryItem) -> Result<String> {
    let data = &item.data;
    // Sections have different column counts.
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    writer.write_record(["[summary]"])?;
    writer.write_record(["field", "value"])?;
    writer.write_record(["ID", item.id.as_str()])?;
    writer.write_record(["Date", format_date(item).as_str()])?;
    writer.write_record(["Summary", data.summary.as_str()])?;
    writer.write_record(["Language", data.language.as_str()])?;
    writer.write_record(["Risk level", data.risk_level.to_string().as_str()])?;
    writer.write_record(["Attachment style", data.attachment_profile.style.as_str()])?;
    writer.write_record([
        "Attachment confidence",
        format!("{}%", data.attachment_profile.confidence).as_str(),
    ])?;
    writer.write_record(["Rating", item.user_rating.to_string().as_str()])?;

    writer.write_record(["[defense_mechanisms]"])?;
    writer.write_record(["name", "description", "frequency", "example_quote"])?;
    for d in &data.defense_mechanisms {
        writer.write_record([
            d.name.as_str(),
            d.description.as_str(),
            d.frequency.to_string().as_str(),
            d.example_quote.as_str(),
        ])?;
    }

    writer.write_record(["[emotion_trend]"])?;
    writer.write_record(["segment", "happiness", "sadness", "anger", "anxiety"])?;
    for p in &data.emotion_trend {
        writer.write_record([
            p.segment.to_string(),
            p.happiness.to_string(),
            p.sadness.to_string(),
            p.anger.to_string(),
            p.anxiety.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV export: {}", e))?;
    String::from_utf8(bytes).context("CSV export is not valid UTF-8")
}

/// Keep table cells on one line.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Markdown table comparing two analyses.
pub fn render_comparison_markdown(summary: &ComparisonSummary) -> String {
    let (a, b) = (&summary.a, &summary.b);
    let mut out = String::new();

    let _ = writeln!(out, "# Comparative Analysis");
    let _ = writeln!(out);
    let _ = writeln!(out, "| | Interview A | Interview B |");
    let _ = writeln!(out, "|---|---|---|");
    let _ = writeln!(out, "| ID | {} | {} |", a.id, b.id);
    let _ = writeln!(out, "| Summary | {} | {} |", cell(&a.summary), cell(&b.summary));
    let _ = writeln!(out, "| Risk level | {} | {} |", a.risk_level, b.risk_level);
    let _ = writeln!(
        out,
        "| Attachment | {} ({:.0}%) | {} ({:.0}%) |",
        cell(&a.attachment_style),
        a.attachment_confidence,
        cell(&b.attachment_style),
        b.attachment_confidence
    );
    let _ = writeln!(
        out,
        "| Happiness (avg) | {:.1} | {:.1} |",
        a.emotions.happiness, b.emotions.happiness
    );
    let _ = writeln!(
        out,
        "| Sadness (avg) | {:.1} | {:.1} |",
        a.emotions.sadness, b.emotions.sadness
    );
    let _ = writeln!(
        out,
        "| Anger (avg) | {:.1} | {:.1} |",
        a.emotions.anger, b.emotions.anger
    );
    let _ = writeln!(
        out,
        "| Anxiety (avg) | {:.1} | {:.1} |",
        a.emotions.anxiety, b.emotions.anxiety
    );
    let _ = writeln!(
        out,
        "| Defenses | {} | {} |",
        cell(&a.defense_mechanisms.join(", ")),
        cell(&b.defense_mechanisms.join(", "))
    );
    if !summary.shared_defenses.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Shared defenses: {}", summary.shared_defenses.join(", "));
    }

    out
}
