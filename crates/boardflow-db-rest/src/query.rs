//! PostgREST query-string builder.

/// A table path plus its filter, select, order and limit parameters.
#[derive(Debug, Clone)]
pub struct Query {
    table: &'static str,
    params: Vec<(String, String)>,
}

impl Query {
    pub fn table(table: &'static str) -> Self {
        Self {
            table,
            params: Vec::new(),
        }
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.params.push((column.to_string(), format!("eq.{value}")));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.params.push((column.to_string(), "is.null".to_string()));
        self
    }

    /// `column=in.(a,b,c)`. Values are double-quoted so reserved characters
    /// inside ids do not split the list.
    pub fn in_list<S: AsRef<str>>(mut self, column: &str, values: &[S]) -> Self {
        let list = values
            .iter()
            .map(|v| quote_list_value(v.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        self.params.push((column.to_string(), format!("in.({list})")));
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn order(mut self, order: &str) -> Self {
        self.params.push(("order".to_string(), order.to_string()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    /// Relative path with a percent-encoded query string.
    pub fn to_path(&self) -> String {
        if self.params.is_empty() {
            return self.table.to_string();
        }
        let qs = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.table, qs)
    }
}

fn quote_list_value(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_pending_events_query() {
        let q = Query::table("automation_events")
            .is_null("processed_at")
            .eq("board_id", "b1")
            .select("*")
            .order("created_at.asc")
            .limit(100);
        assert_eq!(
            q.to_path(),
            "automation_events?processed_at=is.null&board_id=eq.b1&select=%2A&order=created_at.asc&limit=100"
        );
    }

    #[test]
    fn in_list_quotes_reserved_values() {
        let q = Query::table("automations").in_list("board_id", &["b1", "a,b"]);
        let decoded = urlencoding::decode(&q.to_path()).unwrap().into_owned();
        assert_eq!(decoded, r#"automations?board_id=in.(b1,"a,b")"#);
    }

    #[test]
    fn bare_table_has_no_query_string() {
        assert_eq!(Query::table("automation_logs").to_path(), "automation_logs");
    }
}
