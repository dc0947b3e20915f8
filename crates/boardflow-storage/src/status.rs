//! Status cell values.
//!
//! Depending on the write path a status cell holds either a bare string or a
//! `{label, color}` option object. [`StatusValue`] models both shapes and
//! [`resolve_display_label`] is the single place that turns raw JSON into a
//! comparable label.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusValue {
    Plain(String),
    Labeled { label: String, color: Option<String> },
}

impl StatusValue {
    /// Decodes a raw cell value. Returns `None` for shapes that carry no
    /// label (numbers, arrays, objects without a string `label`).
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Plain(s.clone())),
            Value::Object(map) => match map.get("label") {
                Some(Value::String(label)) => Some(Self::Labeled {
                    label: label.clone(),
                    color: map.get("color").and_then(Value::as_str).map(String::from),
                }),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Labeled { label, .. } => label,
        }
    }
}

/// Display label of a raw status value, `None` when it is absent or not
/// comparable.
#[must_use]
pub fn resolve_display_label(value: Option<&Value>) -> Option<String> {
    value
        .and_then(StatusValue::from_json)
        .map(|s| s.label().to_string())
}

/// Whether a raw status value counts as cleared: absent, null, `""`, or an
/// option object whose label is `""`.
#[must_use]
pub fn is_empty_status(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(v) => matches!(StatusValue::from_json(v), Some(s) if s.label().is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_both_shapes() {
        assert_eq!(
            StatusValue::from_json(&json!("Done")),
            Some(StatusValue::Plain("Done".into()))
        );
        assert_eq!(
            StatusValue::from_json(&json!({"label": "Done", "color": "#00c875"})),
            Some(StatusValue::Labeled {
                label: "Done".into(),
                color: Some("#00c875".into())
            })
        );
        assert_eq!(StatusValue::from_json(&json!(42)), None);
        assert_eq!(StatusValue::from_json(&json!({"text": "Done"})), None);
    }

    #[test]
    fn empty_status_detection() {
        assert!(is_empty_status(None));
        assert!(is_empty_status(Some(&Value::Null)));
        assert!(is_empty_status(Some(&json!(""))));
        assert!(is_empty_status(Some(&json!({"label": ""}))));
        assert!(!is_empty_status(Some(&json!({"label": "Done"}))));
        assert!(!is_empty_status(Some(&json!({"color": "#fff"}))));
        assert!(!is_empty_status(Some(&json!(" "))));
    }

    #[test]
    fn resolves_label() {
        assert_eq!(
            resolve_display_label(Some(&json!({"label": "Stuck"}))).as_deref(),
            Some("Stuck")
        );
        assert_eq!(resolve_display_label(Some(&json!(true))), None);
        assert_eq!(resolve_display_label(None), None);
    }
}
