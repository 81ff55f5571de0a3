// mqtt.rs

use crate::*;

/// Events waiting for the broker; older ones are kept, newer ones dropped.
pub const MQTT_QUEUE: usize = 8;
pub const MQTT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

pub struct ChannelPublisher {
    tx: mpsc::Sender<MqttMessage>,
}

pub fn mqtt_channel() -> (ChannelPublisher, mpsc::Receiver<MqttMessage>) {
    let (tx, rx) = mpsc::channel(MQTT_QUEUE);
    (ChannelPublisher { tx }, rx)
}

impl Publisher for ChannelPublisher {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        let msg = MqttMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        };
        if let Err(e) = self.tx.try_send(msg) {
            error!("MQTT message dropped: {e}");
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::run_mqtt;

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::mqtt::client::{
        EspAsyncMqttClient, EspAsyncMqttConnection, MqttClientConfiguration, QoS,
    };

    use super::*;

    pub async fn run_mqtt(
        state: Arc<Pin<Box<MyState>>>,
        mut rx: mpsc::Receiver<MqttMessage>,
    ) -> anyhow::Result<()> {
        let config = state.config.read().await.clone();
        if config.mqtt_server.is_empty() {
            info!("MQTT is disabled.");
            // we cannot return, otherwise tokio::select in main() will exit
            loop {
                if rx.recv().await.is_none() {
                    sleep(Duration::from_secs(3600)).await;
                }
            }
        }

        while !*state.wifi_up.read().await {
            sleep(Duration::from_secs(1)).await;
        }

        let myname = state.myid.read().await.clone();
        let url = format!("mqtt://{}:{}", config.mqtt_server, config.mqtt_port);
        let user = (!config.mqtt_user.is_empty()).then_some(config.mqtt_user.as_str());
        let pass = (!config.mqtt_password.is_empty()).then_some(config.mqtt_password.as_str());

        loop {
            info!("MQTT connecting to {url}...");
            let (client, conn) = match EspAsyncMqttClient::new(
                &url,
                &MqttClientConfiguration {
                    client_id: Some(&myname),
                    username: user,
                    password: pass,
                    keep_alive_interval: Some(Duration::from_secs(25)),
                    ..Default::default()
                },
            ) {
                Ok(c) => c,
                Err(e) => {
                    error!("MQTT connection failed: {e:?}, try again in 5 seconds");
                    sleep(MQTT_RETRY_DELAY).await;
                    continue;
                }
            };

            info!("MQTT connected.");
            tokio::select! {
                _ = Box::pin(event_loop(conn)) => {}
                _ = Box::pin(data_sender(client, &mut rx)) => {}
            }
            sleep(MQTT_RETRY_DELAY).await;
        }
    }

    async fn event_loop(mut conn: EspAsyncMqttConnection) {
        while let Ok(notification) = Box::pin(conn.next()).await {
            info!("MQTT received: {:?}", notification.payload());
        }
        error!("MQTT connection closed.");
    }

    async fn data_sender(mut client: EspAsyncMqttClient, rx: &mut mpsc::Receiver<MqttMessage>) {
        while let Some(msg) = rx.recv().await {
            info!("MQTT sending {}", msg.topic);
            // QoS 0, nobody waits for the broker to acknowledge
            if let Err(e) = client
                .publish(
                    &msg.topic,
                    QoS::AtMostOnce,
                    msg.retain,
                    msg.payload.as_bytes(),
                )
                .await
            {
                error!("MQTT send error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_over_retained_message() {
        let (mut publisher, mut rx) = mqtt_channel();
        publisher.publish("home/t", "temperature,location=a,place=b temperature=1.00", true);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.topic, "home/t");
        assert!(msg.retain);
    }

    #[test]
    fn full_queue_drops_newest() {
        let (mut publisher, mut rx) = mqtt_channel();
        for i in 0..MQTT_QUEUE + 3 {
            publisher.publish("t", &i.to_string(), true);
        }

        let mut got = Vec::new();
        while let Ok(m) = rx.try_recv() {
            got.push(m.payload);
        }
        assert_eq!(got.len(), MQTT_QUEUE);
        assert_eq!(got[0], "0");
    }

    #[test]
    fn closed_channel_is_silent() {
        let (mut publisher, rx) = mqtt_channel();
        drop(rx);
        publisher.publish("t", "x", true);
    }
}

// EOF
