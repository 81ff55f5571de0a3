// driver.rs

use std::time::Instant;

use embedded_hal::delay::DelayNs;

use crate::*;

pub const TICK_YIELD: Duration = Duration::from_millis(50);

/// Outbound side of the broker connection. Fire-and-forget: the caller
/// never learns whether the message left the device.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool);
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
    pub reading: f32,
    pub event: Option<PublishedEvent>,
}

pub struct EventLoop<A, D, P> {
    sampler: Sampler<A, D>,
    model: ThermistorModel,
    gate: PublishGate,
    publisher: P,
}

impl<A, D, P> EventLoop<A, D, P>
where
    A: AnalogSource,
    D: DelayNs,
    P: Publisher,
{
    pub fn new(sampler: Sampler<A, D>, model: ThermistorModel, publisher: P) -> Self {
        EventLoop {
            sampler,
            model,
            gate: PublishGate::default(),
            publisher,
        }
    }

    pub fn run_tick(&mut self, config: &MyConfig, now_ms: u64) -> Tick {
        let raw = self.sampler.sample();
        let reading = self.model.to_celsius(raw) + config.event_adjustment;

        let event = self
            .gate
            .tick(reading, now_ms, config.event_publish_interval)
            .map(|value| PublishedEvent {
                event_type: config.event_type.clone(),
                location: config.event_location.clone(),
                place: config.event_place.clone(),
                value,
            });

        if let Some(ev) = &event {
            info!("Publishing event: {} -> {:.2}", ev.event_type, ev.value);
            self.publisher
                .publish(&config.mqtt_topic, &ev.payload(), true);
        }

        Tick { reading, event }
    }

    pub fn last_published(&self) -> f32 {
        self.gate.last_published()
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

pub async fn poll_sensor<A, D, P>(
    state: Arc<Pin<Box<MyState>>>,
    mut event_loop: EventLoop<A, D, P>,
) -> anyhow::Result<()>
where
    A: AnalogSource,
    D: DelayNs,
    P: Publisher,
{
    let boot = Instant::now();
    loop {
        // web form changes land here, between ticks
        let config = state.config.read().await.clone();

        let now_ms = boot.elapsed().as_millis() as u64;
        let tick = event_loop.run_tick(&config, now_ms);
        state.reading.write().await.update(
            tick.reading,
            event_loop.last_published(),
            &config.event_type,
        );

        sleep(TICK_YIELD).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingDelay, FakeAdc, RecordingPublisher};

    fn event_loop(adc: FakeAdc) -> EventLoop<FakeAdc, CountingDelay, RecordingPublisher> {
        let model = ThermistorModel::from_config(&CalibrationConfig::default());
        EventLoop::new(
            Sampler::new(adc, CountingDelay::default()),
            model,
            RecordingPublisher::default(),
        )
    }

    #[test]
    fn midpoint_reading_is_published_retained() {
        let mut ev = event_loop(FakeAdc::constant(512));
        let config = MyConfig::default();

        let tick = ev.run_tick(&config, 5000);
        assert!((tick.reading - 24.911).abs() < 0.01);
        let event = tick.event.expect("first reading published");
        assert_eq!(event.value, tick.reading);

        let sent = &ev.publisher().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "home/livingroom/temperature");
        assert_eq!(
            sent[0].1,
            "temperature,location=home,place=livingroom temperature=24.91"
        );
        assert!(sent[0].2);
    }

    #[test]
    fn adjustment_is_added_after_the_model() {
        let mut ev = event_loop(FakeAdc::constant(512));
        let config = MyConfig {
            event_adjustment: -1.5,
            ..Default::default()
        };
        let tick = ev.run_tick(&config, 100);
        assert!((tick.reading - 23.411).abs() < 0.01);
        assert_eq!(tick.event, None);
    }

    #[test]
    fn steady_temperature_published_once() {
        let mut ev = event_loop(FakeAdc::constant(512));
        let config = MyConfig::default();
        for i in 1..=10 {
            ev.run_tick(&config, i * 5000);
        }
        assert_eq!(ev.publisher().sent.len(), 1);
    }

    #[test]
    fn live_adjustment_change_moves_the_next_mean() {
        let mut ev = event_loop(FakeAdc::constant(512));
        let mut config = MyConfig::default();
        ev.run_tick(&config, 5000);

        config.event_adjustment = 0.5;
        let tick = ev.run_tick(&config, 10_000);
        let event = tick.event.expect("shifted mean published");
        assert!((event.value - 25.411).abs() < 0.01);
        assert_eq!(ev.publisher().sent.len(), 2);
    }

    #[test]
    fn degenerate_adc_never_publishes() {
        let mut ev = event_loop(FakeAdc::constant(0));
        let config = MyConfig::default();
        for i in 1..=3 {
            let tick = ev.run_tick(&config, i * 5000);
            assert!(tick.reading.is_nan());
            assert_eq!(tick.event, None);
        }
        assert!(ev.publisher().sent.is_empty());
        assert_eq!(ev.last_published(), 0.0);
    }

    #[test]
    fn labels_follow_the_config() {
        let mut ev = event_loop(FakeAdc::constant(512));
        let config = MyConfig {
            mqtt_topic: "cabin/sauna".into(),
            event_location: "cabin".into(),
            event_place: "sauna".into(),
            ..Default::default()
        };
        ev.run_tick(&config, 5000);
        let (topic, payload, _) = &ev.publisher().sent[0];
        assert_eq!(topic, "cabin/sauna");
        assert!(payload.starts_with("temperature,location=cabin,place=sauna temperature="));
    }

    #[tokio::test]
    async fn poll_sensor_stores_the_reading() {
        let state = crate::test_utils::test_state(MyConfig::default());
        let ev = event_loop(FakeAdc::constant(512));

        let _ = tokio::time::timeout(
            Duration::from_millis(120),
            poll_sensor(state.clone(), ev),
        )
        .await;

        let reading = state.reading.read().await;
        assert!((reading.value - 24.911).abs() < 0.01);
        assert_eq!(reading.event_type, "temperature");
    }
}

// EOF
