//! [`BoardStore`] over a PostgREST-style relational REST API.
//!
//! Every request carries the service key both as `apikey` and as a bearer
//! token. Writes that need to know whether a row matched ask for
//! `Prefer: return=representation` and inspect the returned rows.

mod query;

use std::time::Duration;

use async_trait::async_trait;
use boardflow_storage::{
    AutomationLogEntry, AutomationRecord, Board, BoardStore, CellValue, ChangeEvent, Column, Item,
    NewAutomationLog, NewItem, StorageError,
};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub use query::Query;

const RETURN_REPRESENTATION: &str = "return=representation";
const RETURN_MINIMAL: &str = "return=minimal";

/// Oldest first, ties broken by id so a batch boundary is stable.
const PENDING_ORDER: &str = "created_at.asc,id.asc";

const ITEM_COLUMNS: &str = "id,board_id,name,position,group_id,archived_at";
const CELL_COLUMNS: &str = "item_id,column_id,value";
const LOG_WITH_RULE: &str =
    "id,automation_id,status,message,created_at,automations(name,board_id,is_active,trigger_config,action_config)";

/// Connection settings for [`RestBoardStore`].
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// REST root, e.g. `https://project.supabase.co/rest/v1`.
    pub base_url: String,
    pub service_key: String,
    pub timeout: Option<Duration>,
}

pub struct RestBoardStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestBoardStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StorageError> {
        url::Url::parse(&config.base_url).map_err(|e| {
            StorageError::invalid_data(format!("invalid REST base url '{}': {e}", config.base_url))
        })?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key,
        })
    }

    async fn send(
        &self,
        method: Method,
        query: &Query,
        body: Option<&Value>,
        prefer: Option<&str>,
    ) -> Result<Response, StorageError> {
        let url = format!("{}/{}", self.base_url, query.to_path());
        tracing::trace!(%method, %url, "storage request");

        let mut request = self
            .client
            .request(method, &url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key);
        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::http(status.as_u16(), text));
        }
        Ok(response)
    }

    async fn select<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>, StorageError> {
        let response = self.send(Method::GET, query, None, None).await?;
        decode(response).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        query: &Query,
    ) -> Result<Option<T>, StorageError> {
        Ok(self.select(query).await?.into_iter().next())
    }

    async fn patch_returning<T: DeserializeOwned>(
        &self,
        query: &Query,
        body: &Value,
    ) -> Result<Vec<T>, StorageError> {
        let response = self
            .send(Method::PATCH, query, Some(body), Some(RETURN_REPRESENTATION))
            .await?;
        decode(response).await
    }

    async fn write(
        &self,
        method: Method,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<(), StorageError> {
        self.send(method, query, body, Some(RETURN_MINIMAL)).await?;
        Ok(())
    }
}

fn map_transport(err: reqwest::Error) -> StorageError {
    if err.is_decode() {
        StorageError::invalid_data(err.to_string())
    } else {
        StorageError::connection(err.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StorageError> {
    let bytes = response.bytes().await.map_err(map_transport)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::invalid_data(format!("unexpected response shape: {e}")))
}

fn timestamp(at: OffsetDateTime) -> Result<String, StorageError> {
    at.format(&Rfc3339)
        .map_err(|e| StorageError::internal(format!("failed to format timestamp: {e}")))
}

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Deserialize)]
struct PositionRow {
    position: Option<i64>,
}

#[async_trait]
impl BoardStore for RestBoardStore {
    async fn fetch_pending_events(
        &self,
        board_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChangeEvent>, StorageError> {
        let mut q = Query::table("automation_events").is_null("processed_at");
        if let Some(board_id) = board_id {
            q = q.eq("board_id", board_id);
        }
        self.select(&q.select("*").order(PENDING_ORDER).limit(limit))
            .await
    }

    async fn claim_pending_events(
        &self,
        board_id: Option<&str>,
        limit: usize,
        claimed_at: OffsetDateTime,
    ) -> Result<Vec<ChangeEvent>, StorageError> {
        let mut q = Query::table("automation_events").is_null("processed_at");
        if let Some(board_id) = board_id {
            q = q.eq("board_id", board_id);
        }
        let candidates: Vec<IdRow> = self
            .select(&q.select("id").order(PENDING_ORDER).limit(limit))
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // The processed_at filter makes the PATCH a per-row compare-and-set:
        // rows another cycle claimed in between are neither updated nor returned.
        let ids: Vec<String> = candidates.into_iter().map(|row| row.id).collect();
        let q = Query::table("automation_events")
            .in_list("id", &ids)
            .is_null("processed_at")
            .select("*");
        let body = json!({ "processed_at": timestamp(claimed_at)? });
        let mut claimed: Vec<ChangeEvent> = self.patch_returning(&q, &body).await?;
        claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(claimed)
    }

    async fn mark_events_processed(
        &self,
        event_ids: &[String],
        processed_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let q = Query::table("automation_events")
            .in_list("id", event_ids)
            .is_null("processed_at");
        let body = json!({ "processed_at": timestamp(processed_at)? });
        self.write(Method::PATCH, &q, Some(&body)).await
    }

    async fn list_recent_events(&self, limit: usize) -> Result<Vec<ChangeEvent>, StorageError> {
        let q = Query::table("automation_events")
            .select("*")
            .order("created_at.desc")
            .limit(limit);
        self.select(&q).await
    }

    async fn list_active_automations(
        &self,
        board_ids: &[String],
    ) -> Result<Vec<AutomationRecord>, StorageError> {
        if board_ids.is_empty() {
            return Ok(Vec::new());
        }
        let q = Query::table("automations")
            .eq("is_active", "true")
            .in_list("board_id", board_ids)
            .select("*");
        self.select(&q).await
    }

    async fn list_automations_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<AutomationRecord>, StorageError> {
        let q = Query::table("automations")
            .eq("trigger_type", trigger_type)
            .select("*");
        self.select(&q).await
    }

    async fn get_automation(&self, id: &str) -> Result<Option<AutomationRecord>, StorageError> {
        self.select_one(&Query::table("automations").eq("id", id).select("*"))
            .await
    }

    async fn update_trigger_config(
        &self,
        id: &str,
        trigger_config: &Value,
    ) -> Result<(), StorageError> {
        let q = Query::table("automations").eq("id", id).select("id");
        let rows: Vec<Value> = self
            .patch_returning(&q, &json!({ "trigger_config": trigger_config }))
            .await?;
        if rows.is_empty() {
            return Err(StorageError::not_found("automation", id));
        }
        Ok(())
    }

    async fn append_log(&self, log: &NewAutomationLog) -> Result<(), StorageError> {
        let body = json!([log]);
        self.write(Method::POST, &Query::table("automation_logs"), Some(&body))
            .await
    }

    async fn list_recent_logs(
        &self,
        limit: usize,
    ) -> Result<Vec<AutomationLogEntry>, StorageError> {
        let q = Query::table("automation_logs")
            .select(LOG_WITH_RULE)
            .order("created_at.desc")
            .limit(limit);
        self.select(&q).await
    }

    async fn get_board(&self, id: &str) -> Result<Option<Board>, StorageError> {
        self.select_one(&Query::table("boards").eq("id", id).select("id,name"))
            .await
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StorageError> {
        self.select_one(&Query::table("items").eq("id", id).select(ITEM_COLUMNS))
            .await
    }

    async fn create_item(&self, item: &NewItem) -> Result<Item, StorageError> {
        let q = Query::table("items").select(ITEM_COLUMNS);
        let body = json!([item]);
        let response = self
            .send(Method::POST, &q, Some(&body), Some(RETURN_REPRESENTATION))
            .await?;
        let created: Vec<Item> = decode(response).await?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::invalid_data("insert into items returned no row"))
    }

    async fn archive_item(&self, id: &str, at: OffsetDateTime) -> Result<(), StorageError> {
        let body = json!({ "archived_at": timestamp(at)? });
        self.write(Method::PATCH, &Query::table("items").eq("id", id), Some(&body))
            .await
    }

    async fn delete_item(&self, id: &str) -> Result<(), StorageError> {
        self.write(Method::DELETE, &Query::table("items").eq("id", id), None)
            .await
    }

    async fn max_group_position(&self, group_id: &str) -> Result<Option<i64>, StorageError> {
        let q = Query::table("items")
            .eq("group_id", group_id)
            .select("position")
            .order("position.desc")
            .limit(1);
        let top: Option<PositionRow> = self.select_one(&q).await?;
        Ok(top.map(|row| row.position.unwrap_or(0)))
    }

    async fn move_item_to_group(
        &self,
        item_id: &str,
        group_id: &str,
        position: i64,
    ) -> Result<(), StorageError> {
        let q = Query::table("items").eq("id", item_id).select("id");
        let rows: Vec<Value> = self
            .patch_returning(&q, &json!({ "group_id": group_id, "position": position }))
            .await?;
        if rows.is_empty() {
            return Err(StorageError::not_found("item", item_id));
        }
        Ok(())
    }

    async fn list_columns(&self, board_id: &str) -> Result<Vec<Column>, StorageError> {
        self.select(&Query::table("columns").eq("board_id", board_id).select("*"))
            .await
    }

    async fn list_status_columns(&self) -> Result<Vec<Column>, StorageError> {
        self.select(&Query::table("columns").eq("type", "status").select("*"))
            .await
    }

    async fn list_cell_values(&self, item_id: &str) -> Result<Vec<CellValue>, StorageError> {
        self.select(
            &Query::table("cell_values")
                .eq("item_id", item_id)
                .select(CELL_COLUMNS),
        )
        .await
    }

    async fn get_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
    ) -> Result<Option<CellValue>, StorageError> {
        self.select_one(
            &Query::table("cell_values")
                .eq("item_id", item_id)
                .eq("column_id", column_id)
                .select(CELL_COLUMNS),
        )
        .await
    }

    async fn insert_cell_values(&self, cells: &[CellValue]) -> Result<(), StorageError> {
        if cells.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(cells)
            .map_err(|e| StorageError::invalid_data(e.to_string()))?;
        self.write(Method::POST, &Query::table("cell_values"), Some(&body))
            .await
    }

    async fn update_cell_value(
        &self,
        item_id: &str,
        column_id: &str,
        value: Option<&Value>,
    ) -> Result<(), StorageError> {
        let q = Query::table("cell_values")
            .eq("item_id", item_id)
            .eq("column_id", column_id);
        self.write(Method::PATCH, &q, Some(&json!({ "value": value })))
            .await
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_for(server: &MockServer) -> RestBoardStore {
        RestBoardStore::new(RestStoreConfig {
            base_url: format!("{}/rest/v1/", server.uri()),
            service_key: "service-key".into(),
            timeout: None,
        })
        .unwrap()
    }

    fn event_row(id: &str) -> Value {
        json!({
            "id": id,
            "board_id": "b1",
            "item_id": "i1",
            "column_id": "c1",
            "old_value": null,
            "new_value": "Done",
            "created_at": "2024-05-01T10:00:00+00:00",
            "processed_at": null
        })
    }

    #[tokio::test]
    async fn fetch_pending_sends_filters_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/automation_events"))
            .and(query_param("processed_at", "is.null"))
            .and(query_param("board_id", "eq.b1"))
            .and(query_param("order", "created_at.asc,id.asc"))
            .and(query_param("limit", "100"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([event_row("e1")])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let events = store.fetch_pending_events(Some("b1"), 100).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].new_value, Some(json!("Done")));
    }

    #[tokio::test]
    async fn claim_selects_batch_then_patches_only_pending_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/automation_events"))
            .and(query_param("processed_at", "is.null"))
            .and(query_param("board_id", "eq.b1"))
            .and(query_param("select", "id"))
            .and(query_param("order", "created_at.asc,id.asc"))
            .and(query_param("limit", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "e1"}, {"id": "e2"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        // e2 was taken by a concurrent cycle between the two requests
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/automation_events"))
            .and(query_param("id", "in.(e1,e2)"))
            .and(query_param("processed_at", "is.null"))
            .and(query_param("select", "*"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([event_row("e1")])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let claimed = store
            .claim_pending_events(Some("b1"), 2, OffsetDateTime::now_utc())
            .await
            .unwrap();
        let ids: Vec<_> = claimed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1"]);
    }

    #[tokio::test]
    async fn claim_with_nothing_pending_skips_patch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/automation_events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let claimed = store
            .claim_pending_events(None, 100, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_becomes_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/automations"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store
            .list_active_automations(&["b1".to_string()])
            .await
            .unwrap_err();
        match err {
            StorageError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn active_automations_for_no_boards_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert!(store.list_active_automations(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn move_item_reports_missing_row() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/items"))
            .and(query_param("id", "eq.i1"))
            .and(body_json(json!({"group_id": "g2", "position": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        let err = store.move_item_to_group("i1", "g2", 3).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn max_group_position_defaults_null_to_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/items"))
            .and(query_param("group_id", "eq.g1"))
            .and(query_param("order", "position.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"position": null}])))
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        assert_eq!(store.max_group_position("g1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn append_log_posts_row_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/automation_logs"))
            .and(body_json(json!([
                {"automation_id": "a1", "status": "error", "message": "No email address found"}
            ])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server).await;
        store
            .append_log(&NewAutomationLog::error("a1", "No email address found"))
            .await
            .unwrap();
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = RestBoardStore::new(RestStoreConfig {
            base_url: "not a url".into(),
            service_key: String::new(),
            timeout: None,
        })
        .err()
        .unwrap();
        assert!(matches!(err, StorageError::InvalidData { .. }));
    }
}
