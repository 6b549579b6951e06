use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};

use super::arbitration::Arbitrator;
use crate::dimensions::registry::DIMENSIONS;
use crate::dimensions::Dimension;
use crate::errors::ReviewError;
use crate::merge::{canonical_key, deduplicate, match_across, merge_group, sort_canonical, DEFAULT_POSITION_TOLERANCE};
use crate::models::comparison::{ComparisonResult, SeverityDisagreement};
use crate::models::finding::{Finding, Severity, SourceId};
use crate::models::report::RunReport;
use crate::pipeline::events::{emit, EventSender, RunEvent};

/// Cross-run view: what the runs agree on, what only one saw, and where
/// they rated the same issue differently.
pub struct Comparator {
    arbitrator: Option<Arc<dyn Arbitrator>>,
    tolerance: u32,
    event_tx: Option<EventSender>,
}

impl Comparator {
    pub fn new(arbitrator: Option<Arc<dyn Arbitrator>>) -> Self {
        Self { arbitrator, tolerance: DEFAULT_POSITION_TOLERANCE, event_tx: None }
    }

    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_event_channel(mut self, tx: Option<EventSender>) -> Self {
        self.event_tx = tx;
        self
    }

    /// Reports that did not complete are ignored. The result does not depend
    /// on the order of `reports`.
    pub async fn compare(&self, reports: &[RunReport]) -> Result<ComparisonResult, ReviewError> {
        let mut comparable: Vec<&RunReport> = reports.iter().filter(|r| r.is_comparable()).collect();
        comparable.sort_by(|a, b| a.source_label.cmp(&b.source_label));
        for pair in comparable.windows(2) {
            if pair[0].source_label == pair[1].source_label {
                return Err(ReviewError::Config(format!(
                    "Two reports share the label '{}'",
                    pair[0].source_label
                )));
            }
        }

        let catalog: Vec<&Dimension> = DIMENSIONS.iter().collect();
        let per_run: Vec<Vec<Finding>> = comparable
            .iter()
            .map(|report| deduplicate(report.findings.clone(), &catalog, self.tolerance))
            .collect();
        let items: Vec<(usize, &Finding)> = per_run
            .iter()
            .enumerate()
            .flat_map(|(run, findings)| findings.iter().map(move |f| (run, f)))
            .collect();

        let mut result = ComparisonResult {
            sources: comparable.iter().map(|r| r.source_label.clone()).collect(),
            ..ComparisonResult::default()
        };
        for source in &result.sources {
            result.unique_to.insert(source.clone(), Vec::new());
        }

        let mut disputed: Vec<(Finding, BTreeMap<SourceId, Severity>)> = Vec::new();
        for group in match_across(&items, self.tolerance) {
            let ratings: BTreeMap<SourceId, Severity> = group
                .iter()
                .map(|&idx| {
                    let (run, finding) = items[idx];
                    (comparable[run].source_label.clone(), finding.severity)
                })
                .collect();

            let mut merged = merge_group(group.iter().map(|&i| items[i].1).collect(), &catalog);
            merged.contributing_sources = ratings.keys().cloned().collect::<BTreeSet<_>>();

            if ratings.len() == 1 {
                if let Some(label) = ratings.keys().next() {
                    merged.severity = ratings[label];
                    result.unique_to.entry(label.clone()).or_default().push(merged);
                }
                continue;
            }

            let most_severe = ratings.values().copied().fold(Severity::Low, Severity::max);
            merged.severity = most_severe;
            if ratings.values().any(|s| *s != most_severe) {
                disputed.push((merged, ratings));
            } else {
                result.overlapping.push(merged);
            }
        }

        let decisions = futures::future::join_all(
            disputed.into_iter().map(|(finding, ratings)| self.settle(finding, ratings)),
        )
        .await;
        for disagreement in decisions {
            result.overlapping.push(disagreement.finding.clone());
            result.severity_disagreements.push(disagreement);
        }

        sort_canonical(&mut result.overlapping);
        for findings in result.unique_to.values_mut() {
            sort_canonical(findings);
        }
        result.severity_disagreements.sort_by_cached_key(|d| canonical_key(&d.finding));

        info!(
            sources = result.sources.len(),
            overlapping = result.overlapping.len(),
            unique = result.unique_count(),
            disagreements = result.severity_disagreements.len(),
            "Comparison complete"
        );
        Ok(result)
    }

    async fn settle(&self, mut finding: Finding, ratings: BTreeMap<SourceId, Severity>) -> SeverityDisagreement {
        let place = finding
            .location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_else(|| finding.description.clone());

        let Some(arbitrator) = &self.arbitrator else {
            warn!(finding = %place, "Severity disagreement left for review, no arbitrator configured");
            return SeverityDisagreement {
                finding,
                ratings,
                resolved: None,
                resolved_by: None,
                needs_review: true,
                arbitration_error: Some("no arbitrator configured".into()),
            };
        };

        match arbitrator.arbitrate(&finding, &ratings).await {
            Ok(choice) => {
                info!(
                    finding = %place,
                    ratings = ?ratings,
                    resolved = %choice,
                    arbitrator = %arbitrator.identity(),
                    "Severity override"
                );
                emit(&self.event_tx, RunEvent::ArbitrationResolved {
                    finding: place,
                    resolved: Some(choice),
                    arbitrator: arbitrator.identity().clone(),
                });
                finding.severity = choice;
                SeverityDisagreement {
                    finding,
                    ratings,
                    resolved: Some(choice),
                    resolved_by: Some(arbitrator.identity().clone()),
                    needs_review: false,
                    arbitration_error: None,
                }
            }
            Err(e) => {
                warn!(finding = %place, arbitrator = %arbitrator.identity(), error = %e, "Arbitration failed, flagged for review");
                emit(&self.event_tx, RunEvent::ArbitrationResolved {
                    finding: place,
                    resolved: None,
                    arbitrator: arbitrator.identity().clone(),
                });
                SeverityDisagreement {
                    finding,
                    ratings,
                    resolved: None,
                    resolved_by: None,
                    needs_review: true,
                    arbitration_error: Some(e.to_string()),
                }
            }
        }
    }
}
