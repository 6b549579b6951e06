use std::collections::BTreeMap;

use crate::models::finding::{CategoryClass, Finding};

/// Default window within which two positions in the same unit are treated
/// as the same place.
pub const DEFAULT_POSITION_TOLERANCE: u32 = 3;

/// Group findings that describe the same underlying issue.
///
/// Located findings are keyed by `(unit, class)` and chained by position:
/// sorted by position, a new cluster starts whenever the gap to the previous
/// member exceeds `tolerance`. Unlocated findings group by exact trimmed
/// description. Returns input indices; each group is in input order and the
/// groups themselves come out in a canonical order.
pub fn cluster<'a, I>(findings: I, tolerance: u32) -> Vec<Vec<usize>>
where
    I: IntoIterator<Item = &'a Finding>,
{
    let mut located: BTreeMap<(String, CategoryClass), Vec<(u32, usize)>> = BTreeMap::new();
    let mut unlocated: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for (idx, finding) in findings.into_iter().enumerate() {
        match &finding.location {
            Some(loc) => located
                .entry((loc.unit.clone(), finding.class()))
                .or_default()
                .push((loc.position, idx)),
            None => unlocated
                .entry(finding.description.trim().to_string())
                .or_default()
                .push(idx),
        }
    }

    let mut groups = Vec::new();
    for (_, mut members) in located {
        members.sort_unstable();
        let mut current: Vec<usize> = Vec::new();
        let mut previous: Option<u32> = None;
        for (position, idx) in members {
            if let Some(prev) = previous {
                if position - prev > tolerance {
                    groups.push(std::mem::take(&mut current));
                }
            }
            current.push(idx);
            previous = Some(position);
        }
        if !current.is_empty() {
            groups.push(current);
        }
    }
    groups.extend(unlocated.into_values());

    for group in &mut groups {
        group.sort_unstable();
    }
    groups
}

/// Match findings from several runs against each other.
///
/// `findings` pairs each finding with the index of the run it came from;
/// each run's findings should already be deduplicated. Unlike [`cluster`],
/// matching does not chain: a group holds at most one finding per run, and
/// every located member sits within `tolerance` of every other. Closest
/// pairs are matched first, ties broken by input index. Returns input
/// indices, each group sorted.
pub fn match_across(findings: &[(usize, &Finding)], tolerance: u32) -> Vec<Vec<usize>> {
    let mut buckets: BTreeMap<(Option<(String, CategoryClass)>, String), Vec<usize>> = BTreeMap::new();
    for (idx, (_, finding)) in findings.iter().enumerate() {
        let key = match &finding.location {
            Some(loc) => (Some((loc.unit.clone(), finding.class())), String::new()),
            None => (None, finding.description.trim().to_string()),
        };
        buckets.entry(key).or_default().push(idx);
    }
    let position = |idx: usize| findings[idx].1.location.as_ref().map_or(0, |l| l.position);

    let mut pairs: Vec<(u32, usize, usize)> = Vec::new();
    for members in buckets.values() {
        for (n, &a) in members.iter().enumerate() {
            for &b in &members[n + 1..] {
                let distance = position(a).abs_diff(position(b));
                if findings[a].0 != findings[b].0 && distance <= tolerance {
                    pairs.push((distance, a, b));
                }
            }
        }
    }
    pairs.sort_unstable();

    let mut owner: Vec<usize> = (0..findings.len()).collect();
    let mut groups: Vec<Vec<usize>> = (0..findings.len()).map(|idx| vec![idx]).collect();
    for (_, a, b) in pairs {
        let (into, from) = (owner[a], owner[b]);
        if into == from {
            continue;
        }
        let shares_run = groups[from]
            .iter()
            .any(|&m| groups[into].iter().any(|&n| findings[m].0 == findings[n].0));
        let positions = groups[into].iter().chain(&groups[from]).map(|&m| position(m));
        let (lo, hi) = positions.fold((u32::MAX, 0), |(lo, hi), p| (lo.min(p), hi.max(p)));
        if shares_run || hi - lo > tolerance {
            continue;
        }
        let moved = std::mem::take(&mut groups[from]);
        for &m in &moved {
            owner[m] = into;
        }
        groups[into].extend(moved);
    }

    let mut groups: Vec<Vec<usize>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    for group in &mut groups {
        group.sort_unstable();
    }
    groups.sort_unstable();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding::{Confidence, Location, Severity};
    use std::collections::BTreeSet;

    fn at(unit: &str, position: u32, category: &str) -> Finding {
        Finding {
            location: Some(Location::new(unit, position)),
            severity: Severity::Medium,
            category: category.into(),
            description: format!("{}:{}", unit, position),
            confidence: Confidence::Likely,
            contributing_sources: BTreeSet::new(),
            dimensions: BTreeSet::new(),
        }
    }

    fn unlocated(description: &str) -> Finding {
        Finding { location: None, description: description.into(), ..at("x.rs", 0, "bug") }
    }

    #[test]
    fn test_chain_clustering_within_tolerance() {
        let findings = vec![at("a.rs", 10, "bug"), at("a.rs", 13, "defect"), at("a.rs", 16, "logic"), at("a.rs", 20, "bug")];
        let groups = cluster(&findings, 3);
        assert_eq!(groups, vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn test_class_and_unit_separate_clusters() {
        let findings = vec![at("a.rs", 10, "bug"), at("a.rs", 10, "coverage"), at("b.rs", 10, "bug")];
        assert_eq!(cluster(&findings, 3).len(), 3);
    }

    #[test]
    fn test_unlocated_group_by_trimmed_description() {
        let findings = vec![unlocated("no tests "), unlocated("no tests"), unlocated("No tests")];
        let groups = cluster(&findings, 3);
        assert_eq!(groups, vec![vec![2], vec![0, 1]]);
    }

    #[test]
    fn test_zero_tolerance_requires_exact_position() {
        let findings = vec![at("a.rs", 10, "bug"), at("a.rs", 11, "bug"), at("a.rs", 10, "bug")];
        assert_eq!(cluster(&findings, 0), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_match_across_takes_one_finding_per_run() {
        let findings = vec![at("a.rs", 10, "bug"), at("a.rs", 16, "bug"), at("a.rs", 13, "bug")];
        let tagged: Vec<(usize, &Finding)> = vec![(0, &findings[0]), (0, &findings[1]), (1, &findings[2])];
        assert_eq!(match_across(&tagged, 3), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_match_across_does_not_chain() {
        let findings = vec![at("a.rs", 10, "bug"), at("a.rs", 13, "bug"), at("a.rs", 16, "bug")];
        let tagged: Vec<(usize, &Finding)> = findings.iter().enumerate().map(|(run, f)| (run, f)).collect();
        let groups = match_across(&tagged, 3);
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_match_across_prefers_the_closest_partner() {
        let findings = vec![at("a.rs", 10, "bug"), at("a.rs", 14, "bug"), at("a.rs", 12, "bug")];
        let tagged: Vec<(usize, &Finding)> = vec![(0, &findings[0]), (0, &findings[1]), (1, &findings[2])];
        assert_eq!(match_across(&tagged, 3), vec![vec![0, 2], vec![1]]);

        let closer = vec![at("a.rs", 10, "bug"), at("a.rs", 14, "bug"), at("a.rs", 13, "bug")];
        let tagged: Vec<(usize, &Finding)> = vec![(0, &closer[0]), (0, &closer[1]), (1, &closer[2])];
        assert_eq!(match_across(&tagged, 3), vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_match_across_unlocated_by_description() {
        let findings = vec![unlocated("no tests"), unlocated("no tests"), unlocated("no tests")];
        let tagged: Vec<(usize, &Finding)> = vec![(0, &findings[0]), (1, &findings[1]), (1, &findings[2])];
        assert_eq!(match_across(&tagged, 3), vec![vec![0, 1], vec![2]]);
    }
}
