use chrono::Utc;
use rand::RngExt;

use crate::domain::repository::{AndroidPushPort, GroupKeyProvider, GroupKeyRepository};
use crate::domain::types::{
    AndroidPush, GroupKeyOperation, GroupKeyOperationType, GroupKeyRecord, KEY_NAME_SUFFIX_LEN,
    PushTarget, notification_key_name,
};
use crate::error::DispatcherError;

const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// `user_<id>_<random suffix>`.
pub fn generate_key_name(user_id: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..KEY_NAME_SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();
    notification_key_name(user_id, &suffix)
}

/// Keeps a user's provider-side notification key in step with their Android
/// registrations.
///
/// State is inferred from the stored record: no record is `NONE`, a record
/// with a key is `EXISTS`. A record whose key is empty is treated as `NONE`.
/// Record updates are last-writer-wins.
pub struct GroupKeyManager<G, P, A>
where
    G: GroupKeyRepository,
    P: GroupKeyProvider,
    A: AndroidPushPort,
{
    pub records: G,
    pub provider: P,
    pub android: A,
}

impl<G, P, A> GroupKeyManager<G, P, A>
where
    G: GroupKeyRepository,
    P: GroupKeyProvider,
    A: AndroidPushPort,
{
    /// CREATE or ADD the registration id, persist the resulting key, and
    /// optionally deliver the key to the new device.
    pub async fn on_subscribe(
        &self,
        user_id: i64,
        registration_id: &str,
        send_key: bool,
    ) -> Result<String, DispatcherError> {
        let key = match self.records.find(user_id).await? {
            Some(record) if !record.notification_key.is_empty() => {
                let op = GroupKeyOperation {
                    operation_type: GroupKeyOperationType::Add,
                    notification_key_name: record.notification_key_name,
                    notification_key: Some(record.notification_key),
                    registration_ids: vec![registration_id.to_owned()],
                    recreate_key_if_missing: true,
                };
                let key = self.provider.perform(&op).await?;
                self.records.update_key(user_id, &key, Utc::now()).await?;
                key
            }
            // A keyless record keeps its name so the provider group is reused.
            other => {
                let name = other.map(|r| r.notification_key_name);
                self.create(user_id, registration_id, name).await?
            }
        };

        if send_key {
            self.send_key(registration_id, &key).await?;
        }
        Ok(key)
    }

    /// REMOVE the registration id from the user's group. A user without a
    /// record has nothing to remove and yields `None`.
    pub async fn on_unsubscribe(
        &self,
        user_id: i64,
        registration_id: &str,
    ) -> Result<Option<String>, DispatcherError> {
        let Some(record) = self
            .records
            .find(user_id)
            .await?
            .filter(|r| !r.notification_key.is_empty())
        else {
            tracing::debug!(user_id, "no notification key to remove from");
            return Ok(None);
        };

        let op = GroupKeyOperation {
            operation_type: GroupKeyOperationType::Remove,
            notification_key_name: record.notification_key_name,
            notification_key: Some(record.notification_key),
            registration_ids: vec![registration_id.to_owned()],
            recreate_key_if_missing: true,
        };
        let key = self.provider.perform(&op).await?;
        self.records.update_key(user_id, &key, Utc::now()).await?;
        Ok(Some(key))
    }

    pub async fn find(&self, user_id: i64) -> Result<Option<GroupKeyRecord>, DispatcherError> {
        self.records.find(user_id).await
    }

    async fn create(
        &self,
        user_id: i64,
        registration_id: &str,
        name: Option<String>,
    ) -> Result<String, DispatcherError> {
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| generate_key_name(user_id));
        let op = GroupKeyOperation {
            operation_type: GroupKeyOperationType::Create,
            notification_key_name: name.clone(),
            notification_key: None,
            registration_ids: vec![registration_id.to_owned()],
            recreate_key_if_missing: false,
        };
        let key = self.provider.perform(&op).await?;

        let now = Utc::now();
        self.records
            .upsert(&GroupKeyRecord {
                user_id,
                notification_key: key.clone(),
                notification_key_name: name,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tracing::info!(user_id, "notification key created");
        Ok(key)
    }

    async fn send_key(&self, registration_id: &str, key: &str) -> Result<(), DispatcherError> {
        self.android
            .send(&AndroidPush {
                target: PushTarget::Token(registration_id.to_owned()),
                data: serde_json::json!({ "notification_key": key }),
            })
            .await
    }
}
