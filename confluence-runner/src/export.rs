//! Output renderings of a scoring run.

use anyhow::{Context, Result};

use crate::runner::SymbolScore;

/// Pretty JSON array of scores.
pub fn scores_json(scores: &[SymbolScore]) -> Result<String> {
    serde_json::to_string_pretty(scores).context("failed to serialize scores")
}

/// One CSV row per symbol, with each indicator's score as its own column.
///
/// Columns: symbol, timestamp, decision, cached, score, score_raw,
/// confidence, consensus, disagreement, quality_impact, then one column per
/// indicator in name order.
pub fn scores_csv(scores: &[SymbolScore]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let indicators: Vec<&str> = confluence_core::IndicatorKind::ALL
        .iter()
        .map(|k| k.name())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut header = vec![
        "symbol",
        "timestamp",
        "decision",
        "cached",
        "score",
        "score_raw",
        "confidence",
        "consensus",
        "disagreement",
        "quality_impact",
    ];
    header.extend(indicators.iter().copied());
    wtr.write_record(&header)?;

    for s in scores {
        let r = &s.result;
        let mut row = vec![
            s.symbol.clone(),
            s.timestamp.to_rfc3339(),
            serde_json::to_value(s.decision)?
                .as_str()
                .unwrap_or_default()
                .to_string(),
            s.cached.to_string(),
            format!("{:.4}", r.score),
            format!("{:.4}", r.score_raw),
            format!("{:.4}", r.confidence),
            format!("{:.4}", r.consensus),
            format!("{:.6}", r.disagreement),
            format!("{:.4}", r.quality_impact),
        ];
        row.extend(indicators.iter().map(|name| {
            r.components
                .get(*name)
                .map(|c| format!("{:.4}", c.score()))
                .unwrap_or_default()
        }));
        wtr.write_record(&row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}
