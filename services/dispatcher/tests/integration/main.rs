mod feedback_test;
mod group_key_test;
mod listener_test;
mod queue_test;
