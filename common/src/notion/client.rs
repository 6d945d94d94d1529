// Notion REST client

use super::properties::{
    extract_requirements, extract_value, find_best_url, property_text, PropertyValue, UNTITLED,
};
use super::{RawPage, Scholarship, ScholarshipField, ScholarshipSource};
use crate::config::NotionConfig;
use crate::errors::NotionError;
use crate::telemetry;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tracing::instrument;

const PAGE_SIZE: u32 = 100;

/// One page of a database query response
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

/// Queries a Notion database through the public API
#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    config: NotionConfig,
}

impl NotionClient {
    pub fn new(config: NotionConfig) -> Result<Self, NotionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| NotionError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Fetch every row of the database, following the pagination cursor
    #[instrument(skip(self))]
    pub async fn query_database(&self) -> Result<Vec<Value>, NotionError> {
        let (Some(token), Some(database_id)) = (
            self.config.token.as_deref().filter(|s| !s.is_empty()),
            self.config.database_id.as_deref().filter(|s| !s.is_empty()),
        ) else {
            tracing::warn!("Notion token or database id missing");
            return Err(NotionError::NotConfigured);
        };

        let url = format!(
            "{}/v1/databases/{}/query",
            self.config.api_base.trim_end_matches('/'),
            database_id
        );
        let started = Instant::now();
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(next) = &cursor {
                body["start_cursor"] = json!(next);
            }

            let page = match self.query_page(&url, token, &body).await {
                Ok(page) => page,
                Err(e) => {
                    telemetry::record_notion_fetch("error", started.elapsed().as_secs_f64());
                    return Err(e);
                }
            };
            rows.extend(page.results);

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        telemetry::record_notion_fetch("ok", started.elapsed().as_secs_f64());
        tracing::info!(rows = rows.len(), "Notion database fetched");
        Ok(rows)
    }

    async fn query_page(
        &self,
        url: &str,
        token: &str,
        body: &Value,
    ) -> Result<QueryResponse, NotionError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("Notion-Version", &self.config.version)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Notion request error");
                NotionError::Request(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "Notion response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            tracing::warn!(status = status.as_u16(), body = %preview, "Notion query failed");
            return Err(NotionError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| NotionError::Parse(e.to_string()))
    }
}

fn row_properties(row: &Value) -> Map<String, Value> {
    row.get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn row_id(row: &Value) -> String {
    row.get("id").and_then(Value::as_str).unwrap_or("").to_string()
}

fn or_untitled(title: String) -> String {
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// Reduce a row to its title, url, text blob and requirements
pub fn raw_page_from_row(row: &Value) -> RawPage {
    let props = row_properties(row);
    let mut title = String::new();
    let mut parts = Vec::with_capacity(props.len());

    for prop in props.values() {
        let text = property_text(prop);
        if title.is_empty() && prop.get("type").and_then(Value::as_str) == Some("title") {
            title = text.clone();
        }
        if !text.is_empty() {
            parts.push(text);
        }
    }

    RawPage {
        id: row_id(row),
        title: or_untitled(title),
        url: find_best_url(&props),
        blob: parts.join(" "),
        requirements: extract_requirements(&props),
    }
}

/// Prepare a row for display
///
/// The first title property becomes the title and is not repeated as a
/// field. Multi-select values become tags. The first non-empty url property
/// is the link and also stays in the field list.
pub fn scholarship_from_row(row: &Value) -> Scholarship {
    let props = row_properties(row);
    let mut title: Option<String> = None;
    let mut url = String::new();
    let mut tags = Vec::new();
    let mut fields = Vec::new();

    for (name, prop) in &props {
        let prop_type = prop.get("type").and_then(Value::as_str).unwrap_or("");
        let value = extract_value(prop);

        if title.is_none() && prop_type == "title" {
            title = Some(value.to_text());
            continue;
        }

        match value {
            PropertyValue::List(items) => {
                tags.extend(items.into_iter().filter(|tag| !tag.is_empty()));
            }
            PropertyValue::Text(text) => {
                if prop_type == "url" && url.is_empty() && !text.is_empty() {
                    url = text.clone();
                }
                if !text.is_empty() {
                    fields.push(ScholarshipField {
                        name: name.clone(),
                        value: text,
                    });
                }
            }
        }
    }

    Scholarship {
        id: row_id(row),
        title: or_untitled(title.unwrap_or_default()),
        url,
        tags,
        fields,
        requirements: extract_requirements(&props),
    }
}

#[async_trait]
impl ScholarshipSource for NotionClient {
    async fn fetch_pages_raw(&self) -> Result<Vec<RawPage>, NotionError> {
        let rows = self.query_database().await?;
        Ok(rows.iter().map(raw_page_from_row).collect())
    }

    async fn fetch_scholarships(&self) -> Result<Vec<Scholarship>, NotionError> {
        let rows = self.query_database().await?;
        Ok(rows.iter().map(scholarship_from_row).collect())
    }
}
