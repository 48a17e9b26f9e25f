pub mod analytics;
pub mod core;
pub mod planner;
pub mod scores;
pub mod setup;
pub mod snapshot;
pub mod view;
