use sea_orm::DatabaseConnection;

use crate::domain::repository::CommandQueue;
use crate::gateway::Gateway;
use crate::infra::db::{DbDeviceRepository, DbGroupKeyRepository};
use crate::infra::events::EventPublisher;
use crate::infra::providers::{ApnsProvider, FcmProvider};
use crate::infra::queue::RedisCommandQueue;

/// The gateway as wired for a running worker.
pub type WorkerGateway = Gateway<
    DbDeviceRepository,
    DbGroupKeyRepository,
    FcmProvider,
    ApnsProvider,
    FcmProvider,
    EventPublisher,
>;

/// Process-wide connections, created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub queue: RedisCommandQueue,
    pub events: EventPublisher,
    pub apns: ApnsProvider,
    pub fcm: FcmProvider,
}

impl AppState {
    pub fn device_repo(&self) -> DbDeviceRepository {
        DbDeviceRepository {
            db: self.db.clone(),
        }
    }

    pub fn group_key_repo(&self) -> DbGroupKeyRepository {
        DbGroupKeyRepository {
            db: self.db.clone(),
        }
    }

    pub fn queue(&self) -> RedisCommandQueue {
        self.queue.clone()
    }

    pub fn gateway(&self) -> WorkerGateway {
        Gateway {
            devices: self.device_repo(),
            group_keys: self.group_key_repo(),
            group_key_provider: self.fcm.clone(),
            apns: self.apns.clone(),
            android: self.fcm.clone(),
            events: self.events.clone(),
        }
    }
}

/// State for the HTTP enqueue API: only the queue is needed.
#[derive(Clone)]
pub struct ApiState<Q: CommandQueue> {
    pub queue: Q,
}
