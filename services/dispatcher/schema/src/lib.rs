//! sea-orm entities for the dispatcher's relational store.

pub mod devices;
pub mod gcm_notification_users;
