use std::collections::HashSet;

use crate::models::Finding;
use crate::services::analyzer::catalog::SeverityTable;

/// Orders findings by category rank, drops exact duplicates and keeps at
/// most `max` of them.
///
/// The sort is stable, so findings of equal rank stay in discovery order
/// and truncation always removes the lowest-priority tail.
pub fn rank_findings(findings: Vec<Finding>, table: &SeverityTable, max: usize) -> Vec<Finding> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Finding> = findings
        .into_iter()
        .filter(|f| seen.insert((f.kind.clone(), f.line, f.why.clone())))
        .collect();

    unique.sort_by_key(|f| table.rank(&f.kind));
    unique.truncate(max);
    unique
}
