use crate::domain::repository::{
    AndroidPushPort, ApnsPort, CommandHandler, DeviceRepository, EventSink, GroupKeyProvider,
    GroupKeyRepository,
};
use crate::domain::types::Command;
use crate::error::DispatcherError;
use crate::usecase::device::{SubscribeUseCase, UnsubscribeUseCase};
use crate::usecase::feedback::FeedbackReconciler;
use crate::usecase::group_key::GroupKeyManager;
use crate::usecase::notify::NotifyUseCase;
use crate::usecase::registry::DeviceRegistry;

/// Every port a worker needs, wired once at startup.
///
/// Use cases are cheap views over clones of these ports. The gateway is the
/// [`CommandHandler`] the queue listener and the feedback reconciler drive.
#[derive(Clone)]
pub struct Gateway<D, G, P, S, A, E> {
    pub devices: D,
    pub group_keys: G,
    pub group_key_provider: P,
    pub apns: S,
    pub android: A,
    pub events: E,
}

impl<D, G, P, S, A, E> Gateway<D, G, P, S, A, E>
where
    D: DeviceRepository + Clone,
    G: GroupKeyRepository + Clone,
    P: GroupKeyProvider + Clone,
    S: ApnsPort + Clone,
    A: AndroidPushPort + Clone,
    E: EventSink + Clone,
{
    pub fn registry(&self) -> DeviceRegistry<D> {
        DeviceRegistry {
            devices: self.devices.clone(),
        }
    }

    pub fn group_key_manager(&self) -> GroupKeyManager<G, P, A> {
        GroupKeyManager {
            records: self.group_keys.clone(),
            provider: self.group_key_provider.clone(),
            android: self.android.clone(),
        }
    }

    pub fn subscribe(&self) -> SubscribeUseCase<D, G, P, A, E> {
        SubscribeUseCase {
            registry: self.registry(),
            group_keys: self.group_key_manager(),
            events: self.events.clone(),
        }
    }

    pub fn unsubscribe(&self) -> UnsubscribeUseCase<D, G, P, A, E> {
        UnsubscribeUseCase {
            registry: self.registry(),
            group_keys: self.group_key_manager(),
            events: self.events.clone(),
        }
    }

    pub fn notify(&self) -> NotifyUseCase<D, G, S, A, E> {
        NotifyUseCase {
            registry: self.registry(),
            group_keys: self.group_keys.clone(),
            apns: self.apns.clone(),
            android: self.android.clone(),
            events: self.events.clone(),
        }
    }

    pub fn feedback(&self) -> FeedbackReconciler<D, Self> {
        FeedbackReconciler {
            devices: self.devices.clone(),
            handler: self.clone(),
        }
    }
}

impl<D, G, P, S, A, E> CommandHandler for Gateway<D, G, P, S, A, E>
where
    D: DeviceRepository + Clone,
    G: GroupKeyRepository + Clone,
    P: GroupKeyProvider + Clone,
    S: ApnsPort + Clone,
    A: AndroidPushPort + Clone,
    E: EventSink + Clone,
{
    async fn handle(&self, command: Command) -> Result<(), DispatcherError> {
        match command {
            Command::Subscribe(cmd) => self.subscribe().execute(&cmd).await.map(|_| ()),
            Command::Unsubscribe(cmd) => self.unsubscribe().execute(&cmd).await.map(|_| ()),
            Command::Notify(cmd) => self.notify().execute(&cmd).await.map(|_| ()),
        }
    }
}
