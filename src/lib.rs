// Library exports for testing
pub mod archive;
pub mod args;
pub mod cache;
pub mod chart;
pub mod commands;
pub mod format;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod timefmt;
pub mod window;
