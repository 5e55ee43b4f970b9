//! List/edit state for CRM collections (leads, loans, partners, ...).
//!
//! Records stay as raw JSON objects; the only field the client relies on is
//! `id`. Writes are last-write-wins with no versioning.

use crate::errors::ClientError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Quiet period before a team-member edit is saved.
pub const AUTOSAVE_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn list(&self) -> Result<Vec<Value>, ClientError>;
    async fn create(&self, record: Value) -> Result<Value, ClientError>;
    async fn update(&self, id: &str, patch: Value) -> Result<Value, ClientError>;
    async fn delete(&self, id: &str) -> Result<(), ClientError>;
}

/// Numeric and string ids are both accepted and compared as text.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

pub struct ListPage {
    source: Arc<dyn RecordSource>,
    rows: Vec<Value>,
    error: Option<String>,
    loaded: bool,
}

impl ListPage {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            rows: Vec::new(),
            error: None,
            loaded: false,
        }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn find(&self, id: &str) -> Option<&Value> {
        self.rows.iter().find(|row| record_id(row).as_deref() == Some(id))
    }

    /// Replaces the rows with a fresh GET. On failure the previous rows are
    /// kept and the message is exposed through [`ListPage::error`].
    pub async fn load(&mut self) -> Result<(), ClientError> {
        let result = self.source.list().await;
        match self.record(result) {
            Ok(rows) => {
                debug!(count = rows.len(), "list loaded");
                self.rows = rows;
                self.loaded = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn create(&mut self, record: Value) -> Result<Value, ClientError> {
        let result = self.source.create(record).await;
        let created = self.record(result)?;
        self.load().await?;
        Ok(created)
    }

    pub async fn update(&mut self, id: &str, patch: Value) -> Result<Value, ClientError> {
        let result = self.source.update(id, patch).await;
        let updated = self.record(result)?;
        self.load().await?;
        Ok(updated)
    }

    /// Deletes remotely, then drops the row locally without a reload.
    pub async fn delete(&mut self, id: &str) -> Result<(), ClientError> {
        let result = self.source.delete(id).await;
        self.record(result)?;
        self.rows.retain(|row| record_id(row).as_deref() != Some(id));
        info!(id, "record deleted");
        Ok(())
    }

    fn record<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        match result {
            Ok(value) => {
                self.error = None;
                Ok(value)
            }
            Err(err) => {
                error!("crm request failed: {err}");
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutosaveStatus {
    pub saves: u64,
    pub last_error: Option<String>,
}

enum AutosaveCommand {
    Change(Map<String, Value>),
    Flush(oneshot::Sender<Result<(), String>>),
}

/// Debounced PATCH for one record: changes are merged and sent once the
/// record has been quiet for the configured delay.
pub struct Autosave {
    tx: mpsc::UnboundedSender<AutosaveCommand>,
    status: Arc<Mutex<AutosaveStatus>>,
    worker: JoinHandle<()>,
}

impl Autosave {
    pub fn new(source: Arc<dyn RecordSource>, id: impl Into<String>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(AutosaveStatus::default()));
        let worker = tokio::spawn(run_autosave(source, id.into(), delay, rx, Arc::clone(&status)));
        Self { tx, status, worker }
    }

    /// Merges `fields` into the pending patch and restarts the quiet period.
    pub fn schedule(&self, fields: Map<String, Value>) {
        if self.tx.send(AutosaveCommand::Change(fields)).is_err() {
            error!("autosave worker is gone; change dropped");
        }
    }

    /// Sends any pending patch now.
    pub async fn flush(&self) -> Result<(), String> {
        let (reply, wait) = oneshot::channel();
        self.tx
            .send(AutosaveCommand::Flush(reply))
            .map_err(|_| "autosave worker is gone".to_string())?;
        wait.await.map_err(|_| "autosave worker is gone".to_string())?
    }

    pub fn status(&self) -> AutosaveStatus {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stops the worker, sending whatever is still pending first.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(err) = self.worker.await {
            error!("autosave worker panicked: {err}");
        }
    }
}

async fn run_autosave(
    source: Arc<dyn RecordSource>,
    id: String,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<AutosaveCommand>,
    status: Arc<Mutex<AutosaveStatus>>,
) {
    let mut pending = Map::new();
    loop {
        let wake = if pending.is_empty() {
            Wake::Command(rx.recv().await)
        } else {
            tokio::select! {
                command = rx.recv() => Wake::Command(command),
                _ = tokio::time::sleep(delay) => Wake::Quiet,
            }
        };

        match wake {
            Wake::Quiet => {
                let _ = save_pending(source.as_ref(), &id, &mut pending, &status).await;
            }
            Wake::Command(Some(AutosaveCommand::Change(fields))) => pending.extend(fields),
            Wake::Command(Some(AutosaveCommand::Flush(reply))) => {
                let result = save_pending(source.as_ref(), &id, &mut pending, &status).await;
                let _ = reply.send(result);
            }
            Wake::Command(None) => {
                let _ = save_pending(source.as_ref(), &id, &mut pending, &status).await;
                break;
            }
        }
    }
}

enum Wake {
    Command(Option<AutosaveCommand>),
    Quiet,
}

async fn save_pending(
    source: &dyn RecordSource,
    id: &str,
    pending: &mut Map<String, Value>,
    status: &Mutex<AutosaveStatus>,
) -> Result<(), String> {
    if pending.is_empty() {
        return Ok(());
    }
    let patch = Value::Object(std::mem::take(pending));
    let result = source.update(id, patch).await.map(|_| ()).map_err(|err| err.to_string());

    let mut status = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match &result {
        Ok(()) => {
            status.saves += 1;
            status.last_error = None;
            debug!(id, "autosaved");
        }
        Err(err) => {
            error!(id, "autosave failed: {err}");
            status.last_error = Some(err.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct FakeSource {
        rows: Mutex<Vec<Value>>,
        updates: Mutex<Vec<(String, Value)>>,
        fail_list: Mutex<bool>,
        next_id: Mutex<i64>,
    }

    impl FakeSource {
        fn with_rows(rows: Vec<Value>) -> Arc<Self> {
            let source = Self::default();
            *source.next_id.lock().unwrap() = 100;
            *source.rows.lock().unwrap() = rows;
            Arc::new(source)
        }

        fn updates(&self) -> Vec<(String, Value)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordSource for FakeSource {
        async fn list(&self) -> Result<Vec<Value>, ClientError> {
            if *self.fail_list.lock().unwrap() {
                return Err(ClientError::Status {
                    status: 500,
                    body: "down".into(),
                });
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn create(&self, mut record: Value) -> Result<Value, ClientError> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            record["id"] = json!(*next);
            self.rows.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn update(&self, id: &str, patch: Value) -> Result<Value, ClientError> {
            self.updates.lock().unwrap().push((id.to_string(), patch.clone()));
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.iter_mut().find(|row| record_id(row).as_deref() == Some(id))
            else {
                return Ok(patch);
            };
            if let (Some(row), Value::Object(patch)) = (row.as_object_mut(), patch) {
                row.extend(patch);
            }
            Ok(row.clone())
        }

        async fn delete(&self, id: &str) -> Result<(), ClientError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|row| record_id(row).as_deref() != Some(id));
            if rows.len() == before {
                return Err(ClientError::Status {
                    status: 404,
                    body: "not found".into(),
                });
            }
            Ok(())
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn record_id_accepts_numbers_and_strings() {
        assert_eq!(record_id(&json!({"id": 4})).as_deref(), Some("4"));
        assert_eq!(record_id(&json!({"id": "ab"})).as_deref(), Some("ab"));
        assert_eq!(record_id(&json!({"name": "x"})), None);
    }

    #[tokio::test]
    async fn delete_removes_row_from_list() {
        let source =
            FakeSource::with_rows(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        let mut page = ListPage::new(source);
        page.load().await.unwrap();
        assert_eq!(page.rows().len(), 3);

        page.delete("2").await.unwrap();
        assert!(page.find("2").is_none());
        assert_eq!(page.rows().len(), 2);

        page.load().await.unwrap();
        assert!(page.find("2").is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_rows_and_reports() {
        let source = FakeSource::with_rows(vec![json!({"id": 1})]);
        let mut page = ListPage::new(source);
        page.load().await.unwrap();

        assert!(page.delete("9").await.is_err());
        assert_eq!(page.rows().len(), 1);
        assert!(page.error().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_rows() {
        let source = FakeSource::with_rows(vec![json!({"id": 1})]);
        let mut page = ListPage::new(source.clone());
        page.load().await.unwrap();

        *source.fail_list.lock().unwrap() = true;
        assert!(page.load().await.is_err());
        assert_eq!(page.rows().len(), 1);
        assert!(page.error().is_some());

        *source.fail_list.lock().unwrap() = false;
        page.load().await.unwrap();
        assert!(page.error().is_none());
    }

    #[tokio::test]
    async fn create_reloads_list() {
        let source = FakeSource::with_rows(vec![]);
        let mut page = ListPage::new(source);
        let created = page.create(json!({"name": "Partner"})).await.unwrap();
        let id = record_id(&created).unwrap();
        assert_eq!(page.find(&id).unwrap()["name"], "Partner");
    }

    #[tokio::test]
    async fn update_reloads_list() {
        let source = FakeSource::with_rows(vec![
            json!({"id": 1, "name": "Partner"}),
            json!({"id": 2, "name": "Other"}),
        ]);
        let mut page = ListPage::new(source.clone());
        page.load().await.unwrap();

        source.rows.lock().unwrap().push(json!({"id": 3, "name": "Added elsewhere"}));
        let updated = page.update("1", json!({"phone": "555"})).await.unwrap();

        assert_eq!(updated["phone"], "555");
        assert_eq!(source.updates(), vec![("1".to_string(), json!({"phone": "555"}))]);
        assert_eq!(page.rows().len(), 3);
        assert_eq!(page.find("1").unwrap()["phone"], "555");
        assert_eq!(page.find("1").unwrap()["name"], "Partner");
        assert!(page.find("3").is_some());
    }

    #[tokio::test]
    async fn failed_update_keeps_rows() {
        let source = FakeSource::with_rows(vec![json!({"id": 1, "name": "Partner"})]);
        let mut page = ListPage::new(source.clone());
        page.load().await.unwrap();

        *source.fail_list.lock().unwrap() = true;
        assert!(page.update("1", json!({"phone": "555"})).await.is_err());
        assert_eq!(page.rows().len(), 1);
        assert!(page.error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_waits_for_quiet_period_and_merges() {
        let source = FakeSource::with_rows(vec![]);
        let autosave = Autosave::new(source.clone(), "7", AUTOSAVE_DELAY);

        autosave.schedule(fields(json!({"first_name": "Ana"})));
        tokio::time::sleep(Duration::from_millis(1000)).await;
        autosave.schedule(fields(json!({"phone": "555"})));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(source.updates().is_empty());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(
            source.updates(),
            vec![("7".to_string(), json!({"first_name": "Ana", "phone": "555"}))]
        );
        assert_eq!(autosave.status().saves, 1);

        autosave.schedule(fields(json!({"phone": "556"})));
        autosave.schedule(fields(json!({"phone": "557"})));
        autosave.flush().await.unwrap();
        assert_eq!(source.updates().len(), 2);
        assert_eq!(source.updates()[1].1, json!({"phone": "557"}));
        autosave.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_sends_pending_changes() {
        let source = FakeSource::with_rows(vec![]);
        let autosave = Autosave::new(source.clone(), "3", AUTOSAVE_DELAY);
        autosave.schedule(fields(json!({"title": "Processor"})));
        autosave.close().await;
        assert_eq!(source.updates().len(), 1);
    }
}
