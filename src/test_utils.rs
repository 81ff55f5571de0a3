// test_utils.rs
//
// Fakes shared by the unit tests of several modules.

use embedded_hal::delay::DelayNs;

use crate::*;

pub struct FakeAdc {
    pub values: Vec<u16>,
    pub pos: usize,
    pub fail_at: Option<usize>,
}

impl FakeAdc {
    pub fn constant(v: u16) -> Self {
        FakeAdc {
            values: vec![v],
            pos: 0,
            fail_at: None,
        }
    }
}

impl AnalogSource for FakeAdc {
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        if self.fail_at == Some(self.pos) {
            bail!("conversion timeout");
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        Ok(v)
    }
}

#[derive(Default)]
pub struct CountingDelay {
    pub total_ns: u64,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Vec<(String, String, bool)>,
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        self.sent.push((topic.to_string(), payload.to_string(), retain));
    }
}

pub fn test_state(config: MyConfig) -> Arc<Pin<Box<MyState>>> {
    Arc::new(Box::pin(MyState::new(config, Box::new(MemStore::default()))))
}

// EOF
