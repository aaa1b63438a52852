pub mod calendar;
pub mod config;
pub mod detector;
pub mod error;
pub mod http;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod tracker;
