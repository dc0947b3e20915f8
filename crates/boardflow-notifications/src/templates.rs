//! `{{placeholder}}` resolution for email bodies, subjects, recipient lists
//! and webhook payloads.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::adapters::EmailMessage;
use crate::error::NotificationError;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#).expect("Invalid url regex")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid html tag regex"));

static SUBJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Subject:\s*(.+?)(?:\n\n|\n$)").expect("Invalid subject regex")
});

static RECIPIENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+").expect("Invalid recipient separator regex"));

pub const ITEM_NAME_KEY: &str = "{{item.name}}";
pub const BOARD_NAME_KEY: &str = "{{board.name}}";
pub const STATUS_VALUE_KEY: &str = "{{status.value}}";

/// Ordered placeholder → value map for one item.
///
/// Keys are complete `{{...}}` tokens. Setting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    replacements: Vec<(String, String)>,
}

impl TemplateContext {
    pub fn new(item_name: &str, board_name: &str) -> Self {
        let mut ctx = Self::default();
        ctx.set(ITEM_NAME_KEY, item_name);
        ctx.set(BOARD_NAME_KEY, board_name);
        ctx
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.replacements.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.replacements.push((key, value)),
        }
    }

    pub fn set_status(&mut self, value: &str) {
        self.set(STATUS_VALUE_KEY, value);
    }

    /// Registers a column value under every spelling template authors use
    /// for the column name.
    pub fn add_column(&mut self, column_name: &str, value: &str) {
        for key in column_keys(column_name) {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.replacements
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Literal find-and-replace of every known key. Unknown placeholders are
    /// left untouched.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (key, value) in &self.replacements {
            if out.contains(key.as_str()) {
                out = out.replace(key.as_str(), value);
            }
        }
        out
    }

    /// Applies [`substitute`](Self::substitute) to every string leaf.
    /// Object keys and non-string scalars are kept as they are.
    pub fn substitute_deep(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.substitute(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.substitute_deep(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_deep(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// The six `{{column.<name>}}` spellings registered for a column.
fn column_keys(column_name: &str) -> [String; 6] {
    let lower = column_name.to_lowercase();
    let underscored = WHITESPACE.replace_all(&lower, "_").into_owned();
    let no_hyphen = underscored.replace('-', "_");
    let hyphenated = WHITESPACE.replace_all(&lower, "-").into_owned();
    let stripped = no_hyphen.replace('_', "");
    [
        format!("{{{{column.{column_name}}}}}"),
        format!("{{{{column.{lower}}}}}"),
        format!("{{{{column.{underscored}}}}}"),
        format!("{{{{column.{no_hyphen}}}}}"),
        format!("{{{{column.{hyphenated}}}}}"),
        format!("{{{{column.{stripped}}}}}"),
    ]
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Display string of an arbitrary cell value: an object's `label`, else its
/// `text`, else its JSON encoding. Falsy scalars render as `""`.
pub fn cell_display_string(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        Value::Object(map) => {
            if let Some(label) = map.get("label").filter(|v| is_truthy(v)) {
                scalar_string(label)
            } else if let Some(text) = map.get("text").filter(|v| is_truthy(v)) {
                scalar_string(text)
            } else {
                value.to_string()
            }
        }
        Value::Array(_) => value.to_string(),
        v if is_truthy(v) => scalar_string(v),
        _ => String::new(),
    }
}

/// Wraps bare URLs in anchor tags. URLs already inside `<a ...>...</a>` are
/// kept as they are.
pub fn linkify_urls(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in URL.find_iter(html) {
        out.push_str(&html[last..m.start()]);
        let before = &html[..m.start()];
        let after = &html[m.end()..];
        let inside_anchor = match (before.rfind("<a"), before.rfind("</a>")) {
            (Some(open), Some(close)) => open > close,
            (Some(_), None) => true,
            _ => false,
        } && after.contains("</a>");

        let url = m.as_str();
        if inside_anchor {
            out.push_str(url);
        } else {
            out.push_str(&format!(
                r#"<a href="{url}" target="_blank" rel="noopener noreferrer">{url}</a>"#
            ));
        }
        last = m.end();
    }
    out.push_str(&html[last..]);
    out
}

pub fn strip_html(html: &str) -> String {
    HTML_TAG.replace_all(html, "").into_owned()
}

/// Splits a recipient field on commas and whitespace, dropping blanks.
pub fn split_recipients(field: &str) -> Vec<String> {
    RECIPIENT_SEPARATOR
        .split(field)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Pulls a leading `Subject: ...` line out of a body.
fn extract_subject(body: &str) -> Option<(String, String)> {
    let caps = SUBJECT_LINE.captures(body)?;
    let subject = caps.get(1)?.as_str().trim().to_string();
    let rest = SUBJECT_LINE.replacen(body, 1, "").trim().to_string();
    Some((subject, rest))
}

fn non_blank(field: Option<&str>) -> Option<&str> {
    field.filter(|s| !s.is_empty())
}

/// User-authored fields of a SEND_EMAIL action.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailSpec<'a> {
    pub template: &'a str,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub cc: Option<&'a str>,
    pub bcc: Option<&'a str>,
    pub subject: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct EmailDefaults {
    pub from: String,
    pub subject: String,
}

/// Resolves placeholders and builds the relay message.
///
/// `fallback_to` is used only when `spec.to` is blank. Fails with
/// [`NotificationError::RecipientNotFound`] when no address remains.
pub fn compose_email(
    ctx: &TemplateContext,
    spec: &EmailSpec<'_>,
    fallback_to: Option<&str>,
    defaults: &EmailDefaults,
) -> Result<EmailMessage, NotificationError> {
    let mut body = linkify_urls(&ctx.substitute(spec.template));

    let resolve = |field: Option<&str>| {
        non_blank(field)
            .map(|f| split_recipients(&ctx.substitute(f)))
            .unwrap_or_default()
    };

    let to = match non_blank(spec.to) {
        Some(_) => resolve(spec.to),
        None => fallback_to
            .filter(|s| !s.is_empty())
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
    };
    if to.is_empty() {
        return Err(NotificationError::RecipientNotFound);
    }

    let cc = resolve(spec.cc);
    let bcc = resolve(spec.bcc);

    let mut subject = defaults.subject.clone();
    if let Some(s) = non_blank(spec.subject) {
        subject = ctx.substitute(s);
    } else if let Some((found, rest)) = extract_subject(&body) {
        subject = found;
        body = rest;
    }
    if subject.trim().is_empty() {
        subject = defaults.subject.clone();
    }

    let mut from = non_blank(spec.from)
        .map(|f| ctx.substitute(f))
        .unwrap_or_else(|| defaults.from.clone());
    if from.trim().is_empty() {
        from = defaults.from.clone();
    }

    Ok(EmailMessage {
        from: from.trim().to_string(),
        to,
        subject: subject.trim().to_string(),
        text: strip_html(&body),
        html: body,
        cc,
        bcc,
    })
}
