use crate::model::{ChangeStatus, HashPair};

/// Maps two hash pairs to a change status.
///
/// Rules, in order: no previous hashes means the scan is a baseline and is
/// treated as content change; identical full hashes mean nothing changed at
/// all; identical content hashes with differing full hashes mean only
/// markup/technical output moved. `SCAN_FAILED` is assigned by the caller on
/// fetch error, never derived here.
pub fn classify(new: &HashPair, prev: Option<&HashPair>) -> ChangeStatus {
    let Some(prev) = prev else {
        return ChangeStatus::ContentChanged;
    };

    if new.full_hash == prev.full_hash {
        return ChangeStatus::NoChange;
    }

    if new.content_hash == prev.content_hash {
        return ChangeStatus::TechChangeOnly;
    }

    ChangeStatus::ContentChanged
}
