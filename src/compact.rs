use crate::model::AuditRecord;

// Caps chosen so a compacted record stays well under the ~1MB storage
// ceiling even when every field is populated.
const MAX_TITLE_CHARS: usize = 200;
const MAX_H1_CHARS: usize = 200;
const MAX_META_DESCRIPTION_CHARS: usize = 300;
const MAX_SNAPSHOT_HEADINGS: usize = 10;
const MAX_CHECK_HEADINGS: usize = 20;
const MAX_BROKEN_LINKS: usize = 10;
const MAX_ACCESSIBILITY_ISSUES: usize = 20;
const MAX_FIELD_CHANGES: usize = 10;
const MAX_FIELD_VALUE_CHARS: usize = 200;
const MAX_VALUE_ARRAY_ITEMS: usize = 5;
const KEPT_VALUE_ARRAY_ITEMS: usize = 3;
const MAX_SUMMARY_CHARS: usize = 500;

/// Shrinks an audit record to its durable "current state" form.
///
/// Deterministic and idempotent: `compact(compact(x)) == compact(x)`.
/// Missing fields are treated as already compact. Least-valuable data goes
/// first: inline screenshots, then the raw patch, then large arrays, then
/// long strings. The full record survives in history, so nothing here is
/// the only copy.
pub fn compact(mut record: AuditRecord) -> AuditRecord {
    if let Some(snapshot) = record.snapshot.as_mut() {
        truncate_opt(&mut snapshot.title, MAX_TITLE_CHARS);
        truncate_opt(&mut snapshot.h1, MAX_H1_CHARS);
        truncate_opt(&mut snapshot.meta_description, MAX_META_DESCRIPTION_CHARS);
        snapshot.headings.truncate(MAX_SNAPSHOT_HEADINGS);
        snapshot.simplified_content = None;
    }

    if let Some(checks) = record.checks.as_mut() {
        if let Some(schema) = checks.schema_markup.as_mut() {
            // Raw parsed objects are the bulk; the derived metadata stays.
            schema.raw_objects.clear();
        }
        if let Some(headings) = checks.heading_structure.as_mut() {
            headings.headings.truncate(MAX_CHECK_HEADINGS);
        }
        if let Some(links) = checks.broken_links.as_mut() {
            links.broken.truncate(MAX_BROKEN_LINKS);
        }
        if let Some(accessibility) = checks.accessibility.as_mut() {
            accessibility.issues.truncate(MAX_ACCESSIBILITY_ISSUES);
        }
    }

    if let Some(screenshots) = record.screenshots.as_mut() {
        screenshots.inline_base64 = None;
        screenshots.thumbnail_base64 = None;
    }

    record.field_changes.truncate(MAX_FIELD_CHANGES);
    for change in &mut record.field_changes {
        compact_value(&mut change.old_value);
        compact_value(&mut change.new_value);
    }

    truncate_opt(&mut record.diff_summary, MAX_SUMMARY_CHARS);
    record.diff_patch = None;

    record
}

fn truncate_opt(value: &mut Option<String>, max_chars: usize) {
    if let Some(text) = value.as_mut() {
        if text.chars().count() > max_chars {
            *text = text.chars().take(max_chars).collect();
        }
    }
}

/// Field-change values may carry JSON-encoded arrays; long ones are cut to
/// their first few items before the character cap applies.
fn compact_value(value: &mut Option<String>) {
    let Some(text) = value.as_mut() else {
        return;
    };

    if text.trim_start().starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) =
            serde_json::from_str::<serde_json::Value>(text)
        {
            if items.len() > MAX_VALUE_ARRAY_ITEMS {
                let kept: Vec<_> = items.into_iter().take(KEPT_VALUE_ARRAY_ITEMS).collect();
                if let Ok(shortened) = serde_json::to_string(&kept) {
                    *text = shortened;
                }
            }
        }
    }

    if text.chars().count() > MAX_FIELD_VALUE_CHARS {
        let mut truncated: String = text.chars().take(MAX_FIELD_VALUE_CHARS).collect();
        truncated.push('…');
        *text = truncated;
    }
}
