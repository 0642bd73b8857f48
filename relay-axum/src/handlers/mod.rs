mod account;
mod admin;
mod health;
mod mail;

pub use account::get_config;
pub use admin::metrics;
pub use health::health;
pub use mail::{mark_read, read_messages, send_email};

use std::time::Instant;

use serde_json::{json, Value};

pub(crate) fn performance(started: Instant) -> Value {
    json!({ "responseTime": format!("{}ms", started.elapsed().as_millis()) })
}
