use similar::{ChangeTag, TextDiff};

use crate::model::{ChangedField, ContentKind, FieldChange, Snapshot};

/// Tag-only fragments shorter than this are markup noise, not content.
const MIN_TAG_CHUNK_CHARS: usize = 5;

/// Body previews are compared truncated when simplified content is absent
/// (records written before simplified content existed).
const PREVIEW_COMPARE_CHARS: usize = 500;

/// Compares two snapshots field-by-field and emits ordered change records.
///
/// Scalar fields first (title, h1, metaDescription, wordCount), then a
/// line diff over the simplified content. Both snapshots missing yields an
/// empty list; a missing side is treated as an empty snapshot so presence
/// drives added/removed classification.
pub fn diff_fields(new: Option<&Snapshot>, prev: Option<&Snapshot>) -> Vec<FieldChange> {
    if new.is_none() && prev.is_none() {
        return Vec::new();
    }

    let empty = Snapshot::default();
    let new = new.unwrap_or(&empty);
    let prev = prev.unwrap_or(&empty);

    let mut changes = Vec::new();

    push_scalar(
        &mut changes,
        ChangedField::Title,
        prev.title.as_deref(),
        new.title.as_deref(),
    );
    push_scalar(
        &mut changes,
        ChangedField::H1,
        prev.h1.as_deref(),
        new.h1.as_deref(),
    );
    push_scalar(
        &mut changes,
        ChangedField::MetaDescription,
        prev.meta_description.as_deref(),
        new.meta_description.as_deref(),
    );

    if prev.word_count != new.word_count {
        changes.push(FieldChange::from_values(
            ChangedField::WordCount,
            prev.word_count.map(|n| n.to_string()),
            new.word_count.map(|n| n.to_string()),
        ));
    }

    match (
        prev.simplified_content.as_deref(),
        new.simplified_content.as_deref(),
    ) {
        (Some(prev_content), Some(new_content)) => {
            changes.extend(diff_simplified_content(prev_content, new_content));
        }
        _ => {
            changes.extend(diff_preview_fallback(
                prev.body_preview.as_deref(),
                new.body_preview.as_deref(),
            ));
        }
    }

    changes
}

/// One-line human summary of a change list, stored on the audit record.
pub fn summarize(changes: &[FieldChange]) -> String {
    if changes.is_empty() {
        return "no changes detected".to_owned();
    }

    let mut fields: Vec<&str> = Vec::new();
    for change in changes {
        let tag = change.field.wire_tag();
        if !fields.contains(&tag) {
            fields.push(tag);
        }
    }

    format!(
        "{} change{}: {}",
        changes.len(),
        if changes.len() == 1 { "" } else { "s" },
        fields.join(", ")
    )
}

fn push_scalar(
    changes: &mut Vec<FieldChange>,
    field: ChangedField,
    old_value: Option<&str>,
    new_value: Option<&str>,
) {
    if old_value != new_value {
        changes.push(FieldChange::from_values(
            field,
            old_value.map(str::to_owned),
            new_value.map(str::to_owned),
        ));
    }
}

/// Line diff over simplified content, grouped into added/removed chunks
/// with markup noise filtered out.
fn diff_simplified_content(prev: &str, new: &str) -> Vec<FieldChange> {
    let diff = TextDiff::from_lines(prev, new);

    let mut changes = Vec::new();
    let mut removed = String::new();
    let mut added = String::new();

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                flush_chunk(&mut changes, &mut removed, false);
                flush_chunk(&mut changes, &mut added, true);
            }
            ChangeTag::Delete => removed.push_str(change.value()),
            ChangeTag::Insert => added.push_str(change.value()),
        }
    }
    flush_chunk(&mut changes, &mut removed, false);
    flush_chunk(&mut changes, &mut added, true);

    changes
}

fn flush_chunk(changes: &mut Vec<FieldChange>, chunk: &mut String, is_addition: bool) {
    if chunk.is_empty() {
        return;
    }
    let text = std::mem::take(chunk);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return;
    }
    if is_tag_only(trimmed) && trimmed.chars().count() < MIN_TAG_CHUNK_CHARS {
        return;
    }

    let kind = if contains_tag(trimmed) {
        ContentKind::Structural
    } else {
        ContentKind::Textual
    };

    let (old_value, new_value) = if is_addition {
        (None, Some(trimmed.to_owned()))
    } else {
        (Some(trimmed.to_owned()), None)
    };
    changes.push(FieldChange::from_values(
        ChangedField::Content(kind),
        old_value,
        new_value,
    ));
}

fn contains_tag(text: &str) -> bool {
    let mut rest = text;
    while let Some(pos) = rest.find('<') {
        rest = &rest[pos + 1..];
        if rest
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/')
        {
            return true;
        }
    }
    false
}

fn is_tag_only(text: &str) -> bool {
    text.starts_with('<') && text.ends_with('>') && !text_outside_tags(text)
}

fn text_outside_tags(text: &str) -> bool {
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag && !c.is_whitespace() => return true,
            _ => {}
        }
    }
    false
}

/// Legacy records carry no simplified content; compare short previews and
/// collapse the result into a single bodyText change.
fn diff_preview_fallback(prev: Option<&str>, new: Option<&str>) -> Vec<FieldChange> {
    let prev = prev.map(|p| truncate_chars(p, PREVIEW_COMPARE_CHARS));
    let new = new.map(|n| truncate_chars(n, PREVIEW_COMPARE_CHARS));

    if prev == new {
        return Vec::new();
    }

    vec![FieldChange::from_values(
        ChangedField::Content(ContentKind::Textual),
        prev,
        new,
    )]
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeType;

    fn snapshot(title: &str) -> Snapshot {
        Snapshot {
            title: Some(title.to_owned()),
            h1: Some("Heading".to_owned()),
            meta_description: Some("Description".to_owned()),
            word_count: Some(120),
            simplified_content: Some("<h1>Heading</h1>\nBody text here.\n".to_owned()),
            ..Snapshot::default()
        }
    }

    #[test]
    fn title_change_emits_single_modified_record() {
        let prev = snapshot("Home | Acme");
        let new = snapshot("Welcome | Acme");

        let changes = diff_fields(Some(&new), Some(&prev));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, ChangedField::Title);
        assert_eq!(changes[0].old_value.as_deref(), Some("Home | Acme"));
        assert_eq!(changes[0].new_value.as_deref(), Some("Welcome | Acme"));
        assert_eq!(changes[0].change_type, ChangeType::Modified);
    }

    #[test]
    fn both_snapshots_missing_is_empty() {
        assert!(diff_fields(None, None).is_empty());
    }

    #[test]
    fn missing_previous_marks_fields_added() {
        let new = snapshot("Fresh");
        let changes = diff_fields(Some(&new), None);

        let title = changes
            .iter()
            .find(|c| c.field == ChangedField::Title)
            .unwrap();
        assert_eq!(title.change_type, ChangeType::Added);
        assert!(title.old_value.is_none());
    }

    #[test]
    fn word_count_diff_carries_stringified_values() {
        let mut prev = snapshot("Same");
        let mut new = snapshot("Same");
        prev.word_count = Some(100);
        new.word_count = Some(180);

        let changes = diff_fields(Some(&new), Some(&prev));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, ChangedField::WordCount);
        assert_eq!(changes[0].old_value.as_deref(), Some("100"));
        assert_eq!(changes[0].new_value.as_deref(), Some("180"));
    }

    #[test]
    fn content_chunks_classified_as_sections_or_body_text() {
        let mut prev = snapshot("Same");
        let mut new = snapshot("Same");
        prev.simplified_content =
            Some("<h2>Pricing</h2>\nOld paragraph about plans.\nShared line.\n".to_owned());
        new.simplified_content =
            Some("<h2>Plans</h2>\nNew paragraph about tiers.\nShared line.\n".to_owned());

        let changes = diff_fields(Some(&new), Some(&prev));
        let removed: Vec<_> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Removed)
            .collect();
        let added: Vec<_> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Added)
            .collect();

        assert_eq!(removed.len(), 1);
        assert_eq!(added.len(), 1);
        assert_eq!(
            removed[0].field,
            ChangedField::Content(ContentKind::Structural)
        );
        assert_eq!(
            added[0].field,
            ChangedField::Content(ContentKind::Structural)
        );
        assert!(
            added[0]
                .new_value
                .as_deref()
                .unwrap()
                .contains("New paragraph")
        );
    }

    #[test]
    fn whitespace_and_short_tag_chunks_are_discarded() {
        let mut prev = snapshot("Same");
        let mut new = snapshot("Same");
        prev.simplified_content = Some("Line one.\n\nLine two.\n".to_owned());
        new.simplified_content = Some("Line one.\n<br>\n   \nLine two.\n".to_owned());

        let changes = diff_fields(Some(&new), Some(&prev));
        assert!(changes.is_empty(), "noise survived: {changes:?}");
    }

    #[test]
    fn plain_text_chunk_is_body_text() {
        let mut prev = snapshot("Same");
        let mut new = snapshot("Same");
        prev.simplified_content = Some("Alpha.\n".to_owned());
        new.simplified_content = Some("Alpha.\nBrand new closing paragraph.\n".to_owned());

        let changes = diff_fields(Some(&new), Some(&prev));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, ChangedField::Content(ContentKind::Textual));
        assert_eq!(changes[0].change_type, ChangeType::Added);
    }

    #[test]
    fn preview_fallback_when_simplified_content_missing() {
        let mut prev = snapshot("Same");
        let mut new = snapshot("Same");
        prev.simplified_content = None;
        prev.body_preview = Some("Old body preview.".to_owned());
        new.simplified_content = None;
        new.body_preview = Some("New body preview.".to_owned());

        let changes = diff_fields(Some(&new), Some(&prev));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, ChangedField::Content(ContentKind::Textual));
        assert_eq!(changes[0].change_type, ChangeType::Modified);
        assert_eq!(changes[0].old_value.as_deref(), Some("Old body preview."));
    }

    #[test]
    fn preview_fallback_equal_previews_emit_nothing() {
        let mut prev = snapshot("Same");
        let mut new = snapshot("Same");
        prev.simplified_content = None;
        prev.body_preview = Some("Stable preview.".to_owned());
        new.simplified_content = None;
        new.body_preview = Some("Stable preview.".to_owned());

        assert!(diff_fields(Some(&new), Some(&prev)).is_empty());
    }

    #[test]
    fn summary_lists_distinct_fields_in_order() {
        let changes = vec![
            FieldChange::from_values(ChangedField::Title, Some("a".into()), Some("b".into())),
            FieldChange::from_values(ChangedField::WordCount, Some("1".into()), Some("2".into())),
            FieldChange::from_values(
                ChangedField::Content(ContentKind::Textual),
                None,
                Some("new text".into()),
            ),
        ];
        assert_eq!(summarize(&changes), "3 changes: title, wordCount, bodyText");
        assert_eq!(summarize(&[]), "no changes detected");
    }
}
