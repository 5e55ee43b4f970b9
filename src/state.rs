use crate::client::CrmClient;
use crate::storage::KeyValueStore;
use crate::tracker::GoalTracker;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Mutex<GoalTracker>>,
    pub crm: Option<CrmClient>,
}

impl AppState {
    pub async fn open(store: Arc<dyn KeyValueStore>, crm: Option<CrmClient>) -> Self {
        let tracker = GoalTracker::open(store).await;
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            crm,
        }
    }
}
