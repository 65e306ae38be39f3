pub mod config;
pub mod control_panel;
pub mod perf_monitor;
pub mod platform;
pub mod render_app;
