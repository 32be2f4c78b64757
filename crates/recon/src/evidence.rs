use crate::model::{MatchStatus, ReconSummary, ReconciliationResult, TotalStatus};

/// Per-status counts over reconciled orders. Row-level counters are left
/// at zero for the caller to fill.
pub fn compute_summary(results: &[ReconciliationResult]) -> ReconSummary {
    let mut summary = ReconSummary {
        orders: results.len(),
        ..Default::default()
    };

    for r in results {
        if r.status == TotalStatus::Mismatch {
            summary.total_mismatches += 1;
        }
        match r.match_status {
            MatchStatus::Match => summary.item_matches += 1,
            MatchStatus::Mismatch => summary.item_mismatches += 1,
            MatchStatus::NotFound => summary.not_found += 1,
            MatchStatus::SourceError => summary.source_errors += 1,
        }
    }

    summary
}
