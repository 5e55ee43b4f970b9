use crate::calculator::{calculate, Calculated, GoalInputs};
use crate::errors::TrackerError;
use crate::export::export_csv;
use crate::storage::{
    get_json, set_json, KeyValueStore, GOAL_TRACKER_HISTORY, GOAL_TRACKER_INPUTS,
    GOAL_TRACKER_LAST_SAVED,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Most-recent-first history is truncated to this many snapshots.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: DateTime<Utc>,
    pub inputs: GoalInputs,
    pub calculated: Calculated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerView {
    pub inputs: GoalInputs,
    pub calculated: Calculated,
    pub last_saved: Option<DateTime<Utc>>,
    pub history_len: usize,
}

pub struct GoalTracker {
    store: Arc<dyn KeyValueStore>,
    inputs: GoalInputs,
    calculated: Calculated,
    history: Vec<Snapshot>,
    last_saved: Option<DateTime<Utc>>,
}

impl GoalTracker {
    /// Restores the tracker from `store`. Missing or unreadable keys fall
    /// back to defaults.
    pub async fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let inputs = match get_json::<GoalInputs>(store.as_ref(), GOAL_TRACKER_INPUTS).await {
            Ok(Some(inputs)) => inputs,
            Ok(None) => GoalInputs::default(),
            Err(err) => {
                warn!("discarding stored inputs: {err}");
                GoalInputs::default()
            }
        };
        let stored = get_json::<Vec<Snapshot>>(store.as_ref(), GOAL_TRACKER_HISTORY).await;
        let mut history = match stored {
            Ok(history) => history.unwrap_or_default(),
            Err(err) => {
                warn!("discarding stored history: {err}");
                Vec::new()
            }
        };
        history.truncate(HISTORY_LIMIT);
        let last_saved = get_json(store.as_ref(), GOAL_TRACKER_LAST_SAVED)
            .await
            .unwrap_or_else(|err| {
                warn!("discarding last-saved timestamp: {err}");
                None
            });

        Self {
            store,
            calculated: calculate(&inputs),
            inputs,
            history,
            last_saved,
        }
    }

    pub fn inputs(&self) -> &GoalInputs {
        &self.inputs
    }

    pub fn calculated(&self) -> &Calculated {
        &self.calculated
    }

    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn view(&self) -> TrackerView {
        TrackerView {
            inputs: self.inputs,
            calculated: self.calculated,
            last_saved: self.last_saved,
            history_len: self.history.len(),
        }
    }

    /// Replaces the inputs, recomputes every derived value and persists.
    /// Nothing in memory changes unless the store accepted the write.
    pub async fn update_inputs(
        &mut self,
        inputs: GoalInputs,
        now: DateTime<Utc>,
    ) -> Result<&Calculated, TrackerError> {
        self.apply_inputs(inputs, now).await?;
        Ok(&self.calculated)
    }

    pub async fn save_snapshot(&mut self, now: DateTime<Utc>) -> Result<&Snapshot, TrackerError> {
        let snapshot = Snapshot {
            date: now,
            inputs: self.inputs,
            calculated: self.calculated,
        };
        let mut history = Vec::with_capacity(HISTORY_LIMIT);
        history.push(snapshot);
        history.extend(self.history.iter().take(HISTORY_LIMIT - 1).cloned());
        set_json(self.store.as_ref(), GOAL_TRACKER_HISTORY, &history).await?;

        self.history = history;
        info!(history_len = self.history.len(), "saved goal snapshot");
        Ok(&self.history[0])
    }

    /// Swaps in a stored snapshot wholesale; current values are not merged.
    pub async fn load_snapshot(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        let inputs = self
            .history
            .get(index)
            .ok_or(TrackerError::SnapshotNotFound(index))?
            .inputs;
        self.apply_inputs(inputs, now).await
    }

    pub async fn clear_history(&mut self, confirmed: bool) -> Result<(), TrackerError> {
        if !confirmed {
            return Err(TrackerError::ConfirmationRequired);
        }
        set_json(self.store.as_ref(), GOAL_TRACKER_HISTORY, &Vec::<Snapshot>::new()).await?;
        self.history.clear();
        info!("cleared goal history");
        Ok(())
    }

    pub fn export_csv(&self) -> Result<String, TrackerError> {
        Ok(export_csv(&self.inputs, &self.calculated)?)
    }

    async fn apply_inputs(
        &mut self,
        inputs: GoalInputs,
        now: DateTime<Utc>,
    ) -> Result<(), TrackerError> {
        let calculated = calculate(&inputs);
        set_json(self.store.as_ref(), GOAL_TRACKER_INPUTS, &inputs).await?;
        set_json(self.store.as_ref(), GOAL_TRACKER_LAST_SAVED, &now).await?;

        self.inputs = inputs;
        self.calculated = calculated;
        self.last_saved = Some(now);
        Ok(())
    }
}
