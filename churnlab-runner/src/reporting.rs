//! Drift reports: the service summary as JSON plus a Markdown rendering.
//!
//! Files are named `drift_{reference}_vs_{current}.{json,md}` inside the
//! configured report directory.

use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use churnlab_core::domain::RetrainingSignal;
use churnlab_core::drift::{ColumnDrift, DriftEvaluation, ShareSource};
use churnlab_core::store::AppliedAlignment;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report serialization: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Everything a drift report shows besides the service summary.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub reference_as_of: NaiveDate,
    pub current_as_of: NaiveDate,
    pub reference_alignment: Option<AppliedAlignment>,
    pub current_alignment: Option<AppliedAlignment>,
    pub retrain_threshold: f64,
    pub signal: RetrainingSignal,
}

pub fn report_stem(reference: NaiveDate, current: NaiveDate) -> String {
    format!("drift_{reference}_vs_{current}")
}

/// Write both report files. The JSON is the service summary with a
/// `context` object added.
pub fn write_drift_report(
    dir: &Path,
    context: &ReportContext,
    evaluation: &DriftEvaluation,
) -> Result<ReportPaths, ReportError> {
    fs::create_dir_all(dir)?;
    let stem = report_stem(context.reference_as_of, context.current_as_of);
    let json = dir.join(format!("{stem}.json"));
    let markdown = dir.join(format!("{stem}.md"));

    let mut summary = evaluation.summary.clone();
    if let Some(obj) = summary.as_object_mut() {
        obj.insert(
            "context".into(),
            serde_json::json!({
                "reference_as_of": context.reference_as_of,
                "current_as_of": context.current_as_of,
                "reference_alignment": context.reference_alignment,
                "current_alignment": context.current_alignment,
                "drift_share": evaluation.result.drift_share,
                "share_source": evaluation.share_source,
                "target_drift": finite(evaluation.result.target_drift),
                "retrain_threshold": context.retrain_threshold,
                "signal": context.signal,
            }),
        );
    }
    fs::write(&json, serde_json::to_string_pretty(&summary)?)?;
    fs::write(&markdown, render_markdown(context, evaluation))?;

    info!(json = %json.display(), markdown = %markdown.display(), "drift report written");
    Ok(ReportPaths { json, markdown })
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

fn alignment_label(a: Option<AppliedAlignment>) -> String {
    a.map_or_else(|| "none (features only)".to_string(), |a| a.to_string())
}

pub fn render_markdown(context: &ReportContext, evaluation: &DriftEvaluation) -> String {
    let result = &evaluation.result;
    let target = finite(result.target_drift)
        .map_or_else(|| "n/a".to_string(), |t| format!("{t:.4}"));
    let share_note = match evaluation.share_source {
        ShareSource::Reported => "",
        ShareSource::Defaulted => " (defaulted: summary had no drifted-columns share)",
    };

    let mut report = format!(
        "# Drift Report\n\n\
Reference: `{}` | Current: `{}`\n\n\
## Summary\n\
- Drift share: {:.2}{}\n\
- Target drift: {}\n\
- Retrain threshold: {:.2}\n\
- Decision: **{}**\n\
- Labels: reference {}, current {}\n",
        context.reference_as_of,
        context.current_as_of,
        result.drift_share,
        share_note,
        target,
        context.retrain_threshold,
        context.signal,
        alignment_label(context.reference_alignment),
        alignment_label(context.current_alignment),
    );

    let columns: Vec<ColumnDrift> = evaluation
        .summary
        .get("columns")
        .cloned()
        .and_then(|c| serde_json::from_value(c).ok())
        .unwrap_or_default();

    if !columns.is_empty() {
        report.push_str("\n## Columns\n\n");
        report.push_str("| Column | Type | Test | Score | Threshold | Drifted |\n");
        report.push_str("|--------|------|------|-------|-----------|---------|\n");
        for c in &columns {
            let score = c.score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
            report.push_str(&format!(
                "| {} | {} | {:?} | {} | {} | {} |\n",
                c.column,
                c.kind,
                c.stat_test,
                score,
                c.threshold,
                if c.drifted { "yes" } else { "no" }
            ));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use churnlab_core::domain::DriftResult;
    use churnlab_core::drift::ColumnPartition;

    fn context() -> ReportContext {
        ReportContext {
            reference_as_of: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            current_as_of: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            reference_alignment: Some(AppliedAlignment::Period),
            current_alignment: None,
            retrain_threshold: 0.3,
            signal: RetrainingSignal::NoAction,
        }
    }

    fn evaluation(summary: serde_json::Value, source: ShareSource) -> DriftEvaluation {
        DriftEvaluation {
            result: DriftResult {
                drift_share: 0.25,
                target_drift: f64::NAN,
            },
            share_source: source,
            partition: ColumnPartition::default(),
            summary,
        }
    }

    #[test]
    fn stem_names_both_dates() {
        let c = context();
        assert_eq!(
            report_stem(c.reference_as_of, c.current_as_of),
            "drift_2024-01-31_vs_2024-02-29"
        );
    }

    #[test]
    fn writes_json_with_context_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let summary = serde_json::json!({
            "metrics": [{"metric_id": "DriftedColumnsCount(drift_share=0.3)", "value": {"count": 1, "share": 0.25}}],
            "columns": [{
                "column": "watch_hours_30d", "kind": "numerical", "stat_test": "ks",
                "score": 0.001, "threshold": 0.05, "drifted": true,
                "reference_values": 60, "current_values": 60
            }]
        });
        let paths = write_drift_report(
            &dir.path().join("reports/drift"),
            &context(),
            &evaluation(summary, ShareSource::Reported),
        )
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(json["context"]["drift_share"], 0.25);
        assert!(json["context"]["target_drift"].is_null());
        assert_eq!(json["context"]["signal"], "no_action");
        assert_eq!(json["metrics"][0]["value"]["share"], 0.25);

        let md = fs::read_to_string(&paths.markdown).unwrap();
        assert!(md.contains("| watch_hours_30d | num | Ks | 0.0010 | 0.05 | yes |"));
        assert!(md.contains("Target drift: n/a"));
        assert!(md.contains("current none (features only)"));
    }

    #[test]
    fn markdown_flags_defaulted_share() {
        let md = render_markdown(
            &context(),
            &evaluation(serde_json::json!({}), ShareSource::Defaulted),
        );
        assert!(md.contains("defaulted"));
        assert!(!md.contains("## Columns"));
    }
}
