//! Content kinds and the document rules shared by every collection.

use serde_json::{Map, Value};

use crate::errors::AppError;

/// Key of the singleton site settings document.
pub const SETTINGS_KEY: &str = "settings";

/// Required fields of the settings document.
pub const SETTINGS_REQUIRED_FIELDS: &[&str] = &[
    "churchName",
    "tagline",
    "contactEmail",
    "contactPhone",
    "address",
    "bankName",
    "accountNumber",
    "accountName",
];

/// Fields owned by the server. Client-supplied values are discarded.
pub const SYSTEM_FIELDS: &[&str] = &[
    "id",
    "createdAt",
    "created_at",
    "createdBy",
    "updatedAt",
    "updatedBy",
];

/// A collection of content records sharing one key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Event,
    News,
    Media,
    Testimony,
    Leader,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Event,
        ContentKind::News,
        ContentKind::Media,
        ContentKind::Testimony,
        ContentKind::Leader,
    ];

    /// Singular name used in keys, e.g. `event`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Event => "event",
            ContentKind::News => "news",
            ContentKind::Media => "media",
            ContentKind::Testimony => "testimony",
            ContentKind::Leader => "leader",
        }
    }

    /// Plural name used in routes and list response bodies.
    pub fn collection(&self) -> &'static str {
        match self {
            ContentKind::Event => "events",
            ContentKind::News => "news",
            ContentKind::Media => "media",
            ContentKind::Testimony => "testimonies",
            ContentKind::Leader => "leaders",
        }
    }

    /// Human-readable label for messages.
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Event => "Event",
            ContentKind::News => "News",
            ContentKind::Media => "Media",
            ContentKind::Testimony => "Testimony",
            ContentKind::Leader => "Leader",
        }
    }

    pub fn prefix(&self) -> String {
        format!("{}:", self.as_str())
    }

    /// Field holding the creation timestamp. Testimonies and leaders use snake case.
    pub fn created_field(&self) -> &'static str {
        match self {
            ContentKind::Testimony | ContentKind::Leader => "created_at",
            _ => "createdAt",
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ContentKind::Event => &["title", "date", "time", "location", "description"],
            ContentKind::News => &["title", "author", "category", "excerpt", "content"],
            ContentKind::Media => &["title"],
            ContentKind::Testimony => &["name", "testimony"],
            ContentKind::Leader => &["name", "role", "bio"],
        }
    }

    /// Mint a fresh key. UUIDv7 is time-ordered, so keys sort by creation.
    pub fn new_key(&self) -> String {
        format!("{}{}", self.prefix(), uuid::Uuid::now_v7())
    }

    /// Whether `key` belongs to this collection.
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(self.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|id| !id.is_empty())
    }
}

/// Current time in the format stored on documents.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Require a JSON object body and drop server-owned fields from it.
pub fn into_payload(body: Value) -> Result<Map<String, Value>, AppError> {
    let Value::Object(mut fields) = body else {
        return Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };
    for field in SYSTEM_FIELDS {
        fields.remove(*field);
    }
    Ok(fields)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Every required field must be present and non-blank.
pub fn require_fields(fields: &Map<String, Value>, required: &[&str]) -> Result<(), AppError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| fields.get(*name).map_or(true, is_blank))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// Required fields may be omitted from a partial update but not blanked.
pub fn reject_blanked_fields(
    fields: &Map<String, Value>,
    required: &[&str],
) -> Result<(), AppError> {
    let blanked: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| fields.get(*name).is_some_and(is_blank))
        .collect();

    if blanked.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Required fields cannot be empty: {}",
            blanked.join(", ")
        )))
    }
}

/// Build a new record from a create payload.
pub fn new_record(
    kind: ContentKind,
    key: &str,
    mut fields: Map<String, Value>,
    created_by: &str,
) -> Value {
    fields.insert("id".to_string(), Value::String(key.to_string()));
    fields.insert(kind.created_field().to_string(), Value::String(now_timestamp()));
    fields.insert("createdBy".to_string(), Value::String(created_by.to_string()));
    Value::Object(fields)
}

/// Shallow-merge `updates` over `existing` and stamp the editor.
pub fn merge_update(existing: &Value, updates: &Map<String, Value>, updated_by: &str) -> Value {
    let mut merged = match existing {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    for (name, value) in updates {
        merged.insert(name.clone(), value.clone());
    }
    merged.insert("updatedAt".to_string(), Value::String(now_timestamp()));
    merged.insert("updatedBy".to_string(), Value::String(updated_by.to_string()));
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_new_key_has_kind_prefix() {
        for kind in ContentKind::ALL {
            let key = kind.new_key();
            assert!(key.starts_with(&kind.prefix()));
            assert!(kind.owns(&key));
        }
    }

    #[test]
    fn test_new_keys_are_unique_within_a_millisecond() {
        let keys: std::collections::HashSet<String> =
            (0..1000).map(|_| ContentKind::Event.new_key()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_owns_rejects_foreign_keys() {
        assert!(!ContentKind::Event.owns("news:123"));
        assert!(!ContentKind::Event.owns("event:"));
        assert!(!ContentKind::Event.owns("events:123"));
        assert!(!ContentKind::Event.owns(SETTINGS_KEY));
        assert!(ContentKind::News.owns("news:123"));
    }

    #[test]
    fn test_into_payload_strips_system_fields() {
        let fields = into_payload(json!({
            "title": "Revival Night",
            "id": "event:forged",
            "createdBy": "someone-else",
            "created_at": "1999-01-01"
        }))
        .unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["title"], "Revival Night");
    }

    #[test]
    fn test_into_payload_rejects_non_objects() {
        assert!(matches!(
            into_payload(json!(["a", "b"])),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_require_fields_lists_missing_and_blank() {
        let fields = object(json!({ "title": "  ", "date": "2025-12-01", "time": 0 }));
        let err = require_fields(&fields, ContentKind::Event.required_fields()).unwrap_err();
        assert_eq!(
            err.message(),
            "Missing required fields: title, location, description"
        );
    }

    #[test]
    fn test_reject_blanked_fields_allows_omission() {
        let fields = object(json!({ "featured": false }));
        assert!(reject_blanked_fields(&fields, ContentKind::Event.required_fields()).is_ok());

        let fields = object(json!({ "title": "" }));
        assert!(reject_blanked_fields(&fields, ContentKind::Event.required_fields()).is_err());
    }

    #[test]
    fn test_new_record_uses_kind_created_field() {
        let record = new_record(ContentKind::Leader, "leader:1", Map::new(), "user-1");
        assert!(record.get("created_at").is_some());
        assert!(record.get("createdAt").is_none());
        assert_eq!(record["createdBy"], "user-1");
        assert_eq!(record["id"], "leader:1");

        let record = new_record(ContentKind::Event, "event:1", Map::new(), "user-1");
        assert!(record.get("createdAt").is_some());
    }

    #[test]
    fn test_merge_update_preserves_untouched_fields() {
        let existing = json!({
            "id": "event:1",
            "title": "Revival Night",
            "featured": true,
            "createdAt": "2025-01-01T00:00:00.000Z",
            "createdBy": "user-1"
        });
        let updates = object(json!({ "featured": false }));

        let merged = merge_update(&existing, &updates, "user-2");

        assert_eq!(merged["title"], "Revival Night");
        assert_eq!(merged["featured"], false);
        assert_eq!(merged["createdAt"], "2025-01-01T00:00:00.000Z");
        assert_eq!(merged["createdBy"], "user-1");
        assert_eq!(merged["updatedBy"], "user-2");
        assert!(merged["updatedAt"].is_string());
    }
}
