use std::collections::BTreeSet;

use super::key::cluster;
use crate::dimensions::registry::Dimension;
use crate::models::finding::{CategoryClass, Finding, Location, Severity};

/// Collapse findings from one run's dimension workers that describe the same
/// issue. Idempotent: deduplicating the output again changes nothing.
pub fn deduplicate(findings: Vec<Finding>, catalog: &[&Dimension], tolerance: u32) -> Vec<Finding> {
    let groups = cluster(&findings, tolerance);
    let mut merged: Vec<Finding> = groups
        .iter()
        .map(|group| merge_group(group.iter().map(|&i| &findings[i]).collect(), catalog))
        .collect();
    sort_canonical(&mut merged);
    merged
}

/// Ordering key: located findings by place, then unlocated ones by description.
pub fn canonical_key(f: &Finding) -> (bool, Option<Location>, CategoryClass, String, u8) {
    (
        !f.is_located(),
        f.location.clone(),
        f.class(),
        f.description.clone(),
        f.severity.rank(),
    )
}

pub fn sort_canonical(findings: &mut [Finding]) {
    findings.sort_by_cached_key(canonical_key);
}

/// Merge a non-empty group of findings in input order.
pub fn merge_group(members: Vec<&Finding>, catalog: &[&Dimension]) -> Finding {
    let first = members[0];
    let class = first.class();

    let mut contributing_sources = BTreeSet::new();
    let mut dimensions = BTreeSet::new();
    let mut descriptions: Vec<&str> = Vec::new();
    let mut confidence = first.confidence;
    let mut location = first.location.clone();

    for member in &members {
        contributing_sources.extend(member.contributing_sources.iter().cloned());
        dimensions.extend(member.dimensions.iter().cloned());
        let text = member.description.trim();
        if !descriptions.contains(&text) {
            descriptions.push(text);
        }
        confidence = confidence.max(member.confidence);
        if let (Some(current), Some(candidate)) = (&location, &member.location) {
            if candidate.position < current.position {
                location = Some(candidate.clone());
            }
        }
    }

    Finding {
        location,
        severity: resolve_severity(&members, &class, catalog),
        category: first.category.clone(),
        description: descriptions.join("\n"),
        confidence,
        contributing_sources,
        dimensions,
    }
}

/// Highest severity; when members disagree only the narrowest members vote.
fn resolve_severity(members: &[&Finding], class: &CategoryClass, catalog: &[&Dimension]) -> Severity {
    let first = members[0].severity;
    if members.iter().all(|m| m.severity == first) {
        return first;
    }

    let narrowest = members.iter().map(|m| narrowness(m, class, catalog)).min().unwrap_or(u8::MAX);
    members
        .iter()
        .filter(|m| narrowness(m, class, catalog) == narrowest)
        .map(|m| m.severity)
        .fold(Severity::Low, Severity::max)
}

/// 0 for a specialist in `class`, otherwise the dimension's breadth plus one.
/// Findings with no known dimension rank last.
fn narrowness(finding: &Finding, class: &CategoryClass, catalog: &[&Dimension]) -> u8 {
    finding
        .dimensions
        .iter()
        .filter_map(|focus| catalog.iter().find(|d| d.name.as_str() == focus))
        .map(|d| if &d.focus_class == class { 0 } else { d.breadth.saturating_add(1) })
        .min()
        .unwrap_or(u8::MAX)
}
