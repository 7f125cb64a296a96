//! Failure grouping: bucket records by error signature.

use std::collections::HashMap;

use crate::model::{FailureGroup, FailureRecord};

/// Group records by exact signature.
///
/// Records keep their input order within a group. Groups are ordered by
/// descending size; ties keep the order in which each signature was first
/// seen.
pub fn group(records: Vec<FailureRecord>) -> Vec<FailureGroup> {
    let mut groups: Vec<FailureGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let existing = index.get(record.error_signature()).copied();
        match existing {
            Some(i) => groups[i].push(record),
            None => {
                index.insert(record.error_signature().to_string(), groups.len());
                groups.push(FailureGroup::from_first(record));
            }
        }
    }

    // `sort_by` is stable, which gives the first-seen tie-break.
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
