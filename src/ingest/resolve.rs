use std::collections::BTreeMap;

use crate::model::{Target, VersionRecord};

/// Pick the representative version of every tracked target
///
/// History is walked in catalog order and the first match of each target
/// wins, even when a later record has a higher version. `current` matches
/// the current-version pointer by string equality; majors match by declared
/// compatibility range. Records without compatibility data are skipped.
pub fn resolve_targets<'a>(
    history: &'a [VersionRecord],
    current: Option<&str>,
    supported: &[u32],
) -> BTreeMap<Target, &'a VersionRecord> {
    let mut resolved = BTreeMap::new();
    let wanted = supported.len() + usize::from(current.is_some());

    for record in history {
        if resolved.len() == wanted {
            break;
        }
        let Some(range) = &record.compatibility else {
            continue;
        };

        if current == Some(record.version.as_str()) {
            resolved.entry(Target::Current).or_insert(record);
        }
        for &major in supported {
            if range.accepts(major) {
                resolved.entry(Target::Major(major)).or_insert(record);
            }
        }
    }

    resolved
}
