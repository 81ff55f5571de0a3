// lib.rs
#![warn(clippy::large_futures)]

pub use std::{
    net,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub use anyhow::bail;
pub use chrono::{DateTime, Utc};
#[cfg(target_os = "espidf")]
pub use esp_idf_hal::delay::FreeRtos;
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::{mpsc, Mutex, RwLock},
    time::{sleep, Duration},
};

mod thermistor;
pub use thermistor::*;

mod measure;
pub use measure::*;

mod gate;
pub use gate::*;

mod config;
pub use config::*;

mod state;
pub use state::*;

mod driver;
pub use driver::*;

mod mqtt;
pub use mqtt::*;

mod apiserver;
pub use apiserver::*;

#[cfg(target_os = "espidf")]
mod wifi;
#[cfg(target_os = "espidf")]
pub use wifi::*;

#[cfg(test)]
mod test_utils;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BUILD_TIMESTAMP");

#[derive(Clone, Debug, Serialize)]
pub struct TempReading {
    pub timestamp: i64,
    pub last_update: String,
    pub uptime: usize,
    pub event_type: String,
    pub value: f32,
    pub last_published: f32,
}

impl TempReading {
    pub fn new() -> Self {
        TempReading {
            timestamp: 0,
            last_update: "-".to_string(),
            uptime: 0,
            event_type: "-".to_string(),
            value: f32::NAN,
            last_published: f32::NAN,
        }
    }

    pub fn update(&mut self, value: f32, last_published: f32, event_type: &str) {
        let now = Utc::now();
        self.timestamp = now.timestamp();
        self.last_update = now.format("%Y-%m-%d %H:%M:%S %Z").to_string();
        self.event_type = event_type.to_string();
        self.value = value;
        self.last_published = last_published;
    }
}

impl Default for TempReading {
    fn default() -> Self {
        Self::new()
    }
}

// EOF
