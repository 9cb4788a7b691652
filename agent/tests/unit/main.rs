//! Unit test harness

mod test_executor;
mod test_heartbeat;
mod test_settings;
