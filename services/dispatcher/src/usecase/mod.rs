pub mod device;
pub mod enqueue;
pub mod feedback;
pub mod group_key;
pub mod notify;
pub mod registry;
