use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    NoChange,
    TechChangeOnly,
    ContentChanged,
    ScanFailed,
}

/// Dual hash of one scan: `full_hash` covers the normalized page output
/// (markup + content), `content_hash` covers content only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HashPair {
    pub full_hash: String,
    pub content_hash: String,
}

impl HashPair {
    /// Hashes two already-normalized representations. Production hash pairs
    /// come from the page scanner; this is for tests and CLI input.
    pub fn compute(full: &str, content: &str) -> Self {
        Self {
            full_hash: sha256_hex(full),
            content_hash: sha256_hex(content),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    use sha2::Digest as _;
    let mut hasher = sha2::Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable resource id derived from the normalized URL (query and fragment
/// stripped).
pub fn resource_id_from_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.set_query(None);
    format!("r_{}", sha256_hex(normalized.as_str()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Immutable extraction of observable page content at scan time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<Heading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simplified_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_preview: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// Kind of a surviving content-diff chunk. The wire tags (`sections`,
/// `bodyText`) are the presentation names the UI keys its icons on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Structural,
    Textual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedField {
    Title,
    H1,
    MetaDescription,
    WordCount,
    Content(ContentKind),
}

impl ChangedField {
    pub fn wire_tag(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::H1 => "h1",
            Self::MetaDescription => "metaDescription",
            Self::WordCount => "wordCount",
            Self::Content(ContentKind::Structural) => "sections",
            Self::Content(ContentKind::Textual) => "bodyText",
        }
    }

    fn from_wire_tag(tag: &str) -> Option<Self> {
        match tag {
            "title" => Some(Self::Title),
            "h1" => Some(Self::H1),
            "metaDescription" => Some(Self::MetaDescription),
            "wordCount" => Some(Self::WordCount),
            "sections" => Some(Self::Content(ContentKind::Structural)),
            "bodyText" => Some(Self::Content(ContentKind::Textual)),
            _ => None,
        }
    }
}

impl Serialize for ChangedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_tag())
    }
}

impl<'de> Deserialize<'de> for ChangedField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Self::from_wire_tag(&tag)
            .ok_or_else(|| D::Error::custom(format!("unknown changed field: {tag}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: ChangedField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub change_type: ChangeType,
}

impl FieldChange {
    /// Change type is derived from presence: no old value means added, no
    /// new value means removed.
    pub fn from_values(
        field: ChangedField,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        let change_type = match (&old_value, &new_value) {
            (None, Some(_)) => ChangeType::Added,
            (Some(_), None) => ChangeType::Removed,
            _ => ChangeType::Modified,
        };
        Self {
            field,
            old_value,
            new_value,
            change_type,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMarkupCheck {
    /// Raw parsed JSON-LD objects. Dropped during compaction; the derived
    /// `types`/`count` metadata survives.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_objects: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeadingStructureCheck {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headings: Vec<Heading>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLinksCheck {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub broken: Vec<BrokenLink>,
    #[serde(default)]
    pub checked: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityIssue {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityCheck {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<AccessibilityIssue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_markup: Option<SchemaMarkupCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_structure: Option<HeadingStructureCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_links: Option<BrokenLinksCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilityCheck>,
}

/// Screenshot references. Blob-store URLs are durable; inline base64 copies
/// only exist between capture and compaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Screenshots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_blob_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_base64: Option<String>,
}

/// Aggregate result of one scan. The compacted copy is the durable current
/// state; the full copy goes to history only on a real change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Checks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Screenshots>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_changes: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<HashPair>,
    pub change_status: ChangeStatus,
    pub scanned_at: DateTime<Utc>,
}

/// Append-only history entry, created on every non-NO_CHANGE scan and on
/// the first scan of a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub change_type: ChangeStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_changes: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<HashPair>,
    /// Full unified patch. Compaction drops it from the current state, so
    /// the history entry is its only durable home.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_patch: Option<String>,
    pub score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_derived_from_presence() {
        let added = FieldChange::from_values(ChangedField::Title, None, Some("New".into()));
        assert_eq!(added.change_type, ChangeType::Added);

        let removed = FieldChange::from_values(ChangedField::H1, Some("Old".into()), None);
        assert_eq!(removed.change_type, ChangeType::Removed);

        let modified =
            FieldChange::from_values(ChangedField::Title, Some("a".into()), Some("b".into()));
        assert_eq!(modified.change_type, ChangeType::Modified);
    }

    #[test]
    fn changed_field_wire_tags_round_trip() {
        for field in [
            ChangedField::Title,
            ChangedField::H1,
            ChangedField::MetaDescription,
            ChangedField::WordCount,
            ChangedField::Content(ContentKind::Structural),
            ChangedField::Content(ContentKind::Textual),
        ] {
            let json = serde_json::to_string(&field).unwrap();
            let back: ChangedField = serde_json::from_str(&json).unwrap();
            assert_eq!(back, field);
        }

        assert_eq!(
            serde_json::to_string(&ChangedField::Content(ContentKind::Structural)).unwrap(),
            "\"sections\""
        );
    }

    #[test]
    fn change_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ChangeStatus::TechChangeOnly).unwrap(),
            "\"TECH_CHANGE_ONLY\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeStatus::NoChange).unwrap(),
            "\"NO_CHANGE\""
        );
    }

    #[test]
    fn resource_id_ignores_query_and_fragment() {
        let a = Url::parse("https://example.com/pricing?utm=x#plans").unwrap();
        let b = Url::parse("https://example.com/pricing").unwrap();
        assert_eq!(resource_id_from_url(&a), resource_id_from_url(&b));
        assert!(resource_id_from_url(&a).starts_with("r_"));
    }
}
