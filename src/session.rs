//! Signed-in identity, passed explicitly to anything that talks to the CRM.
//!
//! Stored under the same keys the browser client used: while viewing as
//! another user, `user` holds the impersonated account and `originalUser`
//! holds the signed-in one.

use crate::errors::StoreError;
use crate::storage::{
    get_json, set_json, KeyValueStore, ORIGINAL_USER, TOKEN, USER, VIEW_AS_USER_ID,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    /// The account that signed in.
    pub user: User,
    /// Account whose data is shown instead, if any.
    pub view_as: Option<User>,
}

impl Session {
    pub fn new(token: impl Into<String>, user: User) -> Self {
        Self {
            token: token.into(),
            user,
            view_as: None,
        }
    }

    pub fn effective_user(&self) -> &User {
        self.view_as.as_ref().unwrap_or(&self.user)
    }

    pub fn effective_user_id(&self) -> i64 {
        self.effective_user().id
    }

    pub fn view_as_user_id(&self) -> Option<i64> {
        self.view_as.as_ref().map(|user| user.id)
    }

    pub fn start_view_as(&mut self, target: User) {
        info!(admin = self.user.id, target = target.id, "viewing as user");
        self.view_as = Some(target);
    }

    pub fn stop_view_as(&mut self) {
        self.view_as = None;
    }

    /// Restores a session; `Ok(None)` when no token or user is stored.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, StoreError> {
        let Some(token) = store.get(TOKEN).await? else {
            return Ok(None);
        };
        let Some(stored_user) = get_json::<User>(store, USER).await? else {
            return Ok(None);
        };

        let original = get_json::<User>(store, ORIGINAL_USER).await?;
        let view_as_id = store.get(VIEW_AS_USER_ID).await?;
        let session = match (original, view_as_id) {
            (Some(original), Some(_)) => Self {
                token,
                user: original,
                view_as: Some(stored_user),
            },
            _ => Self::new(token, stored_user),
        };
        Ok(Some(session))
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.set(TOKEN, self.token.clone()).await?;
        match &self.view_as {
            Some(target) => {
                set_json(store, USER, target).await?;
                set_json(store, ORIGINAL_USER, &self.user).await?;
                store.set(VIEW_AS_USER_ID, target.id.to_string()).await?;
            }
            None => {
                set_json(store, USER, &self.user).await?;
                store.remove(ORIGINAL_USER).await?;
                store.remove(VIEW_AS_USER_ID).await?;
            }
        }
        Ok(())
    }

    /// Forced logout: drops every identity key.
    pub async fn logout(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        for key in [TOKEN, USER, VIEW_AS_USER_ID, ORIGINAL_USER] {
            store.remove(key).await?;
        }
        info!("session cleared");
        Ok(())
    }
}
