pub mod bridge;
pub mod config;
pub mod db;
pub mod influxdb;
pub mod mqtt;
pub mod store;
pub mod telemetry;
