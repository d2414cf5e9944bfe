use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, SqlErr,
    sea_query::{Expr, OnConflict},
    sqlx,
};

use yodel_dispatcher_schema::{devices, gcm_notification_users};

use crate::domain::repository::{DeviceRepository, GroupKeyRepository};
use crate::domain::types::{
    Device, DeviceKey, FeedbackEntry, GroupKeyRecord, InsertOutcome, Platform,
};
use crate::error::DispatcherError;

/// Lost or unreachable connections are transport failures; anything else
/// the database reports is internal.
fn db_err(what: &'static str) -> impl Fn(DbErr) -> DispatcherError {
    move |e| {
        let lost = is_connection_error(&e);
        let e = anyhow::Error::new(e).context(what);
        if lost {
            DispatcherError::Transport(e)
        } else {
            DispatcherError::Internal(e)
        }
    }
}

fn is_connection_error(e: &DbErr) -> bool {
    match e {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => matches!(
            e,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
        ),
        _ => false,
    }
}

// ── Device repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbDeviceRepository {
    pub db: DatabaseConnection,
}

impl DeviceRepository for DbDeviceRepository {
    async fn touch(
        &self,
        user_id: i64,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DispatcherError> {
        let result = devices::Entity::update_many()
            .col_expr(devices::Column::UpdatedAt, Expr::value(now))
            .filter(devices::Column::UserId.eq(user_id))
            .filter(devices::Column::Token.eq(token))
            .exec(&self.db)
            .await
            .map_err(db_err("touch device"))?;
        Ok(result.rows_affected)
    }

    async fn insert(
        &self,
        key: &DeviceKey,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome, DispatcherError> {
        let result = devices::ActiveModel {
            user_id: Set(key.user_id),
            token: Set(key.token.clone()),
            platform: Set(key.platform.code()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(model) => Ok(InsertOutcome::Created(device_from_model(model)?)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                tracing::debug!(user_id = key.user_id, "device inserted concurrently");
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(e) => Err(db_err("insert device")(e)),
        }
    }

    async fn delete(&self, user_id: i64, token: &str) -> Result<u64, DispatcherError> {
        let result = devices::Entity::delete_many()
            .filter(devices::Column::UserId.eq(user_id))
            .filter(devices::Column::Token.eq(token))
            .exec(&self.db)
            .await
            .map_err(db_err("delete device"))?;
        Ok(result.rows_affected)
    }

    async fn find(&self, user_id: i64, token: &str) -> Result<Option<Device>, DispatcherError> {
        let model = devices::Entity::find()
            .filter(devices::Column::UserId.eq(user_id))
            .filter(devices::Column::Token.eq(token))
            .one(&self.db)
            .await
            .map_err(db_err("find device"))?;
        model.map(device_from_model).transpose()
    }

    async fn find_for_user(&self, user_id: i64) -> Result<Vec<Device>, DispatcherError> {
        devices::Entity::find()
            .filter(devices::Column::UserId.eq(user_id))
            .order_by_asc(devices::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err("find devices for user"))?
            .into_iter()
            .map(device_from_model)
            .collect()
    }

    async fn find_stale(&self, entries: &[FeedbackEntry]) -> Result<Vec<Device>, DispatcherError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let stale = entries.iter().fold(Condition::any(), |cond, entry| {
            cond.add(
                Condition::all()
                    .add(devices::Column::Token.eq(entry.token.as_str()))
                    .add(devices::Column::UpdatedAt.lt(entry.failed_at)),
            )
        });
        devices::Entity::find()
            .filter(stale)
            .order_by_asc(devices::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err("find stale devices"))?
            .into_iter()
            .map(device_from_model)
            .collect()
    }

    async fn max_id(&self) -> Result<Option<i64>, DispatcherError> {
        let max: Option<Option<i64>> = devices::Entity::find()
            .select_only()
            .column_as(Expr::col(devices::Column::Id).max(), "max_id")
            .into_tuple()
            .one(&self.db)
            .await
            .map_err(db_err("max device id"))?;
        Ok(max.flatten())
    }
}

fn device_from_model(model: devices::Model) -> Result<Device, DispatcherError> {
    let platform = Platform::from_code(model.platform.into()).ok_or_else(|| {
        DispatcherError::Internal(anyhow::anyhow!(
            "device {} has unknown platform code {}",
            model.id,
            model.platform
        ))
    })?;
    Ok(Device {
        id: model.id,
        user_id: model.user_id,
        token: model.token,
        platform,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Group-key repository ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbGroupKeyRepository {
    pub db: DatabaseConnection,
}

impl GroupKeyRepository for DbGroupKeyRepository {
    async fn find(&self, user_id: i64) -> Result<Option<GroupKeyRecord>, DispatcherError> {
        let model = gcm_notification_users::Entity::find()
            .filter(gcm_notification_users::Column::UserId.eq(user_id))
            .one(&self.db)
            .await
            .map_err(db_err("find notification key"))?;
        Ok(model.map(group_key_from_model))
    }

    async fn upsert(&self, record: &GroupKeyRecord) -> Result<(), DispatcherError> {
        let model = gcm_notification_users::ActiveModel {
            user_id: Set(record.user_id),
            notification_key_name: Set(record.notification_key_name.clone()),
            notification_key: Set(record.notification_key.clone()),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
            ..Default::default()
        };
        gcm_notification_users::Entity::insert(model)
            .on_conflict(
                OnConflict::column(gcm_notification_users::Column::UserId)
                    .update_columns([
                        gcm_notification_users::Column::NotificationKeyName,
                        gcm_notification_users::Column::NotificationKey,
                        gcm_notification_users::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err("upsert notification key"))?;
        Ok(())
    }

    async fn update_key(
        &self,
        user_id: i64,
        notification_key: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DispatcherError> {
        let result = gcm_notification_users::Entity::update_many()
            .col_expr(
                gcm_notification_users::Column::NotificationKey,
                Expr::value(notification_key),
            )
            .col_expr(gcm_notification_users::Column::UpdatedAt, Expr::value(now))
            .filter(gcm_notification_users::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .map_err(db_err("update notification key"))?;
        Ok(result.rows_affected)
    }
}

fn group_key_from_model(model: gcm_notification_users::Model) -> GroupKeyRecord {
    GroupKeyRecord {
        user_id: model.user_id,
        notification_key: model.notification_key,
        notification_key_name: model.notification_key_name,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
