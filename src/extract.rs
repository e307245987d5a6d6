use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bronze::{self, RawTable};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// One brewery object as returned by the API.
pub type RawRecord = Map<String, Value>;

/// Result of a single page request. Failures here are values, not errors:
/// one bad page never stops the run.
#[derive(Debug)]
pub enum PageOutcome {
    Fetched(Vec<RawRecord>),
    Rejected { status: u16, body: String },
    Failed(String),
}

pub fn build_client(config: &PipelineConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Request one page, exactly once.
pub async fn fetch_page(client: &Client, config: &PipelineConfig, page: u32) -> PageOutcome {
    let url = config.page_url(page);
    debug!(%url, "requesting page");

    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => return PageOutcome::Failed(e.to_string()),
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(b) => b,
        Err(e) => return PageOutcome::Failed(e.to_string()),
    };

    if status != StatusCode::OK {
        return PageOutcome::Rejected {
            status: status.as_u16(),
            body,
        };
    }

    match serde_json::from_str::<Vec<RawRecord>>(&body) {
        Ok(records) => PageOutcome::Fetched(records),
        Err(e) => PageOutcome::Failed(format!("response is not a JSON array of objects: {e}")),
    }
}

/// Fetch every configured page in order and concatenate the records.
pub async fn fetch_all(config: &PipelineConfig) -> Result<Vec<RawRecord>> {
    let client = build_client(config)?;

    let pb = ProgressBar::new(u64::from(config.pages));
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} pages")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut all = Vec::new();
    for page in 1..=config.pages {
        let start = Instant::now();
        let outcome = fetch_page(&client, config, page).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            PageOutcome::Fetched(records) => {
                pb.suspend(|| println!("   -> Page {}: ok ({} records)", page, records.len()));
                info!(page, records = records.len(), elapsed_ms, "page fetched");
                all.extend(records);
            }
            PageOutcome::Rejected { status, body } => {
                pb.suspend(|| {
                    println!("   -> Page {}: status code {}", page, status);
                    println!("   -> Response: {}", body);
                });
                warn!(page, status, elapsed_ms, "page rejected, skipping");
            }
            PageOutcome::Failed(reason) => {
                pb.suspend(|| println!("   -> Page {}: error {}", page, reason));
                warn!(page, %reason, elapsed_ms, "page failed, skipping");
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(all)
}

/// Render every field as text so heterogeneous and nested values fit a
/// uniform string column. JSON null stays null.
pub fn flatten_records(records: &[RawRecord]) -> RawTable {
    let mut columns: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|col| record.get(col).and_then(cell_text))
                .collect()
        })
        .collect();

    RawTable { columns, rows }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Extract stage: fetch, guard against an empty pull, write bronze.
pub async fn run(config: &PipelineConfig) -> Result<PathBuf> {
    println!("[1/4] Extracting from {}...", config.base_url);

    let records = fetch_all(config).await?;
    if records.is_empty() {
        return Err(PipelineError::NoRecords {
            pages: config.pages,
        });
    }

    let table = flatten_records(&records);
    let path = config.raw_artifact();
    bronze::write_bronze(&table, &path)?;

    println!(
        " -> Raw data saved to {} ({} records)",
        path.display(),
        table.len()
    );
    info!(path = %path.display(), records = table.len(), columns = table.columns.len(), "bronze written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn flatten_keeps_record_order_and_unions_columns() {
        let records = vec![
            record(json!({"id": "a", "name": "first"})),
            record(json!({"id": "b", "city": "Austin"})),
        ];
        let table = flatten_records(&records);

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns.len(), 3);
        let id = table.column_index("id").unwrap();
        let city = table.column_index("city").unwrap();
        assert_eq!(table.rows[0][id].as_deref(), Some("a"));
        assert_eq!(table.rows[1][id].as_deref(), Some("b"));
        assert_eq!(table.rows[0][city], None);
        assert_eq!(table.rows[1][city].as_deref(), Some("Austin"));
    }

    #[test]
    fn flatten_renders_non_string_values_as_text() {
        let records = vec![record(json!({
            "longitude": -97.74,
            "open": true,
            "tags": ["ipa", "stout"],
            "meta": {"k": 1},
            "phone": null
        }))];
        let table = flatten_records(&records);
        let cell = |name: &str| table.rows[0][table.column_index(name).unwrap()].clone();

        assert_eq!(cell("longitude").as_deref(), Some("-97.74"));
        assert_eq!(cell("open").as_deref(), Some("true"));
        assert_eq!(cell("tags").as_deref(), Some(r#"["ipa","stout"]"#));
        assert_eq!(cell("meta").as_deref(), Some(r#"{"k":1}"#));
        assert_eq!(cell("phone"), None);
    }

    #[test]
    fn flatten_of_nothing_is_empty() {
        let table = flatten_records(&[]);
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }
}
