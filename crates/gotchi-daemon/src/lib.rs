pub mod activity;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod storage;
