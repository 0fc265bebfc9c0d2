pub mod chart_feed;
pub mod classifier;
pub mod config;
pub mod forwarder;
pub mod models;
pub mod mqtt_service;
pub mod payload;
pub mod publisher;
pub mod serial_reader;
pub mod service_utils;
pub mod subscriber;
