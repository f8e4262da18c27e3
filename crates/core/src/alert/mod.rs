//! Alert evaluation and delivery.

pub mod config;
pub mod dispatch;
pub mod message;
pub mod webhook;
