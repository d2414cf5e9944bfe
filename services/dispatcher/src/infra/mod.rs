pub mod apns;
pub mod db;
pub mod events;
pub mod fcm;
pub mod providers;
pub mod queue;
pub mod recording;
