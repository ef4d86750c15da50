//! Firestore REST document encoding.
//!
//! Firestore wraps every field value in a single-key type tag:
//!
//! ```text
//! {"name": "projects/p/databases/(default)/documents/feeders/F1/schedules/S1",
//!  "fields": {"isEnabled":   {"booleanValue": true},
//!             "bowlNumber":  {"integerValue": "1"},
//!             "time":        {"stringValue": "08:00"},
//!             "repeatDays":  {"arrayValue": {"values": [{"stringValue": "M"}]}}}}
//! ```
//!
//! List responses carry the documents plus an optional `nextPageToken`.
//! Documents are kept as raw JSON until the caller decodes them, so one
//! malformed entry cannot fail the whole page.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ParseError;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// One decoded document: resource name plus tagged fields.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Store-assigned id: the trailing segment of the resource name.
    pub fn id(&self) -> Result<&str, ParseError> {
        trailing_segment(&self.name).ok_or(ParseError::InvalidField("name"))
    }

    /// `booleanValue` field; `None` when absent.
    pub fn bool_field(&self, key: &'static str) -> Result<Option<bool>, ParseError> {
        self.typed(key, "booleanValue")?
            .map(|v| v.as_bool().ok_or(ParseError::InvalidField(key)))
            .transpose()
    }

    /// `integerValue` field; Firestore sends int64 as a decimal string.
    pub fn integer_field(&self, key: &'static str) -> Result<Option<i64>, ParseError> {
        self.typed(key, "integerValue")?
            .map(|v| match v {
                Value::String(s) => s.parse().map_err(|_| ParseError::InvalidField(key)),
                Value::Number(n) => n.as_i64().ok_or(ParseError::InvalidField(key)),
                _ => Err(ParseError::InvalidField(key)),
            })
            .transpose()
    }

    /// `stringValue` field.
    pub fn string_field(&self, key: &'static str) -> Result<Option<&str>, ParseError> {
        self.typed(key, "stringValue")?
            .map(|v| v.as_str().ok_or(ParseError::InvalidField(key)))
            .transpose()
    }

    /// `arrayValue` of `stringValue`s.  An empty array has no `values` key.
    pub fn string_array_field(&self, key: &'static str) -> Result<Option<Vec<&str>>, ParseError> {
        let Some(array) = self.typed(key, "arrayValue")? else {
            return Ok(None);
        };
        let Some(values) = array.get("values") else {
            return Ok(Some(Vec::new()));
        };
        let values = values.as_array().ok_or(ParseError::InvalidField(key))?;
        values
            .iter()
            .map(|item| {
                item.get("stringValue")
                    .and_then(Value::as_str)
                    .ok_or(ParseError::InvalidField(key))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn typed(&self, key: &'static str, tag: &str) -> Result<Option<&Value>, ParseError> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) if v.get("nullValue").is_some() => Ok(None),
            Some(v) => v.get(tag).map(Some).ok_or(ParseError::InvalidField(key)),
        }
    }
}

/// Last non-empty `/`-separated segment of a resource path.
pub fn trailing_segment(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

// ---------------------------------------------------------------------------
// List responses
// ---------------------------------------------------------------------------

/// One page of a `documents.list` call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    #[serde(default)]
    pub documents: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl ListPage {
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        // An empty collection comes back as `{}`.
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(body)?)
    }

    /// Token for the next page, ignoring the empty-string sentinel.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body for creating the feeder's identity document.
pub fn identity_create_body(owner_id: &str) -> String {
    json!({
        "fields": {
            "owner_uid": { "stringValue": owner_id },
            "online": { "booleanValue": true },
        }
    })
    .to_string()
}

/// Field name written on the owner document.
pub const OWNER_LINK_FIELD: &str = "feederId";

/// Body for linking the owner document to a new identity.
pub fn owner_link_body(identity: &str) -> String {
    json!({
        "fields": {
            OWNER_LINK_FIELD: { "stringValue": identity },
        }
    })
    .to_string()
}

/// Extract the new identity id from a create-document response.
pub fn created_identity(response: &str) -> Result<String, ParseError> {
    #[derive(Deserialize)]
    struct Created {
        name: Option<String>,
    }

    let created: Created = serde_json::from_str(response)?;
    let name = created.name.ok_or(ParseError::MissingField("name"))?;
    trailing_segment(&name)
        .map(str::to_owned)
        .ok_or(ParseError::InvalidField("name"))
}
