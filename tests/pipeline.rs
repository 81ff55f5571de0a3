// tests/pipeline.rs

use std::{cell::Cell, rc::Rc};

use embedded_hal::delay::DelayNs;
use esp32ntc::*;

#[derive(Clone, Default)]
struct Divider {
    raw: Rc<Cell<u16>>,
    reads: Rc<Cell<usize>>,
}

impl AnalogSource for Divider {
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.raw.get())
    }
}

#[derive(Clone, Default)]
struct Clock {
    ns: Rc<Cell<u64>>,
}

impl DelayNs for Clock {
    fn delay_ns(&mut self, ns: u32) {
        self.ns.set(self.ns.get() + ns as u64);
    }
}

#[derive(Default)]
struct Broker {
    retained: Vec<(String, String)>,
}

impl Publisher for Broker {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        assert!(retain, "events are always retained");
        self.retained.push((topic.into(), payload.into()));
    }
}

fn setup(raw: u16, cal: &CalibrationConfig) -> (Divider, Clock, EventLoop<Divider, Clock, Broker>) {
    let adc = Divider::default();
    adc.raw.set(raw);
    let clock = Clock::default();
    let ev = EventLoop::new(
        Sampler::new(adc.clone(), clock.clone()),
        ThermistorModel::from_config(cal),
        Broker::default(),
    );
    (adc, clock, ev)
}

#[test]
fn midpoint_burst_is_published_once_per_interval() {
    let config = MyConfig::default();
    let (adc, clock, mut ev) = setup(512, &config.calibration);

    for now in (1000..=4000).step_by(1000) {
        assert_eq!(ev.run_tick(&config, now).event, None);
    }
    let tick = ev.run_tick(&config, 5000);
    assert!(tick.event.is_some());

    // five bursts of 25 reads, each followed by a 10 ms settle
    assert_eq!(adc.reads.get(), 5 * NUM_SAMPLES);
    assert_eq!(clock.ns.get(), 5 * 25 * 10 * 1_000_000);

    let sent = &ev.publisher().retained;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "home/livingroom/temperature");
    assert_eq!(
        sent[0].1,
        "temperature,location=home,place=livingroom temperature=24.91"
    );
}

#[test]
fn warming_up_is_reported_and_then_held() {
    let config = MyConfig::default();
    let (adc, _clock, mut ev) = setup(512, &config.calibration);

    ev.run_tick(&config, 5000);

    // lower count on the divider means a warmer thermistor
    adc.raw.set(480);
    for now in (6000..=10_000).step_by(1000) {
        ev.run_tick(&config, now);
    }
    for now in (11_000..=15_000).step_by(1000) {
        ev.run_tick(&config, now);
    }

    let payloads: Vec<&str> = ev
        .publisher()
        .retained
        .iter()
        .map(|(_, p)| p.as_str())
        .collect();
    assert_eq!(
        payloads,
        [
            "temperature,location=home,place=livingroom temperature=24.91",
            "temperature,location=home,place=livingroom temperature=27.76",
        ]
    );
    assert!((ev.last_published() - 27.756).abs() < 0.01);
}

#[test]
fn two_point_model_runs_the_same_pipeline() {
    let mut config = MyConfig::default();
    config.calibration.model = ThermistorKind::BetaRinf;
    let (_adc, _clock, mut ev) = setup(512, &config.calibration);

    let tick = ev.run_tick(&config, 5000);
    assert!((tick.reading - 24.0).abs() < 0.05, "reading {}", tick.reading);
    assert_eq!(ev.publisher().retained.len(), 1);
}

#[test]
fn saturated_divider_stays_quiet() {
    let config = MyConfig::default();
    let (adc, _clock, mut ev) = setup(1023, &config.calibration);

    for now in (5000..=20_000).step_by(5000) {
        assert!(ev.run_tick(&config, now).reading.is_nan());
    }
    assert!(ev.publisher().retained.is_empty());

    // a sane reading after the fault is published right away
    adc.raw.set(512);
    assert!(ev.run_tick(&config, 25_000).event.is_some());
}

// EOF
