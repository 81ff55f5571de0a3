// gate.rs

use serde::Serialize;

pub const EVENT_DIFF: f32 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub event_type: String,
    pub location: String,
    pub place: String,
    pub value: f32,
}

impl PublishedEvent {
    pub fn payload(&self) -> String {
        format!(
            "{t},location={l},place={p} {t}={v:.2}",
            t = self.event_type,
            l = self.location,
            p = self.place,
            v = self.value
        )
    }
}

pub fn check_bound(new_value: f32, prev_value: f32, max_diff: f32) -> bool {
    !new_value.is_nan()
        && (new_value < prev_value - max_diff || new_value > prev_value + max_diff)
}

#[derive(Clone, Debug)]
pub struct PublishGate {
    sum: f32,
    count: u32,
    last_publish_ms: u64,
    last_published: f32,
    max_diff: f32,
}

impl Default for PublishGate {
    fn default() -> Self {
        Self::new(EVENT_DIFF)
    }
}

impl PublishGate {
    pub fn new(max_diff: f32) -> Self {
        PublishGate {
            sum: 0.0,
            count: 0,
            last_publish_ms: 0,
            last_published: 0.0,
            max_diff,
        }
    }

    /// Feed one adjusted reading.
    pub fn tick(&mut self, adjusted: f32, now_ms: u64, interval_ms: u64) -> Option<f32> {
        self.sum += adjusted;
        self.count += 1;

        if now_ms.saturating_sub(self.last_publish_ms) < interval_ms {
            return None;
        }
        self.last_publish_ms = now_ms;

        let mean = self.sum / self.count as f32;
        self.sum = 0.0;
        self.count = 0;

        if check_bound(mean, self.last_published, self.max_diff) {
            self.last_published = mean;
            Some(mean)
        } else {
            None
        }
    }

    pub fn last_published(&self) -> f32 {
        self.last_published
    }

    pub fn pending(&self) -> u32 {
        self.count
    }
}


// EOF
