pub mod activity_store;
pub mod activity_tracker;
pub mod cooldown;
pub mod detectors;
pub mod orchestrator;
pub mod recording;
pub mod screen_capture;
pub mod usage_tracker;
pub mod vision;
