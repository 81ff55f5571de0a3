// bin/esp32ntc.rs

#![warn(clippy::large_futures)]

#[cfg(target_os = "espidf")]
use esp32ntc::*;
#[cfg(target_os = "espidf")]
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
    },
    prelude::Peripherals,
};
#[cfg(target_os = "espidf")]
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs, timer::EspTaskTimerService, wifi::WifiDriver};
#[cfg(target_os = "espidf")]
use esp_idf_sys::{esp, esp_app_desc};

#[cfg(target_os = "espidf")]
esp_app_desc!();

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("esp32ntc runs on ESP32 targets only.");
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // eventfd is needed by our mio poll implementation.  Note you should set max_fds
    // higher if you have other code that may need eventfd.

    #[allow(clippy::needless_update)]
    let config = esp_idf_sys::esp_vfs_eventfd_config_t {
        max_fds: 1,
        ..Default::default()
    };
    esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

    info!("Hello.");
    info!("Starting up.");

    let sysloop = EspSystemEventLoop::take()?;
    let timer = EspTaskTimerService::new()?;
    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

    let ns = env!("CARGO_BIN_NAME");
    let mut store = match nvs::EspNvs::new(nvs_default_partition.clone(), ns, true) {
        Ok(nvs) => {
            info!("Got namespace {ns:?} from default partition");
            NvsStore(nvs)
        }
        Err(e) => bail!("Could not get namespace {ns}: {e:?}"),
    };

    #[cfg(feature = "reset_settings")]
    let config = {
        let c = MyConfig::default();
        c.to_store(&mut store)?;
        c
    };

    #[cfg(not(feature = "reset_settings"))]
    let config = match MyConfig::from_store(&mut store) {
        None => {
            error!("Could not read nvs config, using defaults");
            let c = MyConfig::default();
            c.to_store(&mut store)?;
            info!("Successfully saved default config to nvs.");
            c
        }

        // using settings saved on nvs if we could find them
        Some(c) => c,
    };
    info!("My config:\n{config:#?}");

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let adc = Arc::new(AdcDriver::new(peripherals.adc1)?);
    let chan_config = AdcChannelConfig {
        attenuation: DB_11,
        ..Default::default()
    };

    #[cfg(feature = "esp32c3")]
    let chan = AdcChannelDriver::new(adc.clone(), pins.gpio2, &chan_config)?;
    #[cfg(feature = "esp32s")]
    let chan = AdcChannelDriver::new(adc.clone(), pins.gpio34, &chan_config)?;

    let sampler = Sampler::new(EspAdc::new(adc, chan), FreeRtos);
    let model = ThermistorModel::from_config(&config.calibration);
    info!("Thermistor model: {:?}", config.calibration.model);

    let (publisher, mqtt_rx) = mqtt_channel();
    let event_loop = EventLoop::new(sampler, model, publisher);

    let wifidriver = WifiDriver::new(
        peripherals.modem,
        sysloop.clone(),
        Some(nvs_default_partition),
    )?;

    let state = Box::pin(MyState::new(config, Box::new(store)));
    let shared_state = Arc::new(state);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async move {
            let wifi_loop = WifiLoop {
                state: shared_state.clone(),
                wifi: None,
            };

            info!("Entering main loop...");
            tokio::select! {
                _ = Box::pin(poll_reset(shared_state.clone())) => { error!("poll_reset() ended."); }
                _ = Box::pin(poll_sensor(shared_state.clone(), event_loop)) => { error!("poll_sensor() ended."); }
                _ = Box::pin(run_mqtt(shared_state.clone(), mqtt_rx)) => { error!("run_mqtt() ended."); }
                _ = Box::pin(run_api_server(shared_state.clone())) => { error!("run_api_server() ended."); }
                _ = Box::pin(wifi_loop.run(wifidriver, sysloop, timer)) => { error!("wifi_loop.run() ended."); }
            };
        }));

    // not actually returning from main() but we reboot instead
    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

#[cfg(target_os = "espidf")]
async fn poll_reset(state: Arc<Pin<Box<MyState>>>) -> anyhow::Result<()> {
    let mut uptime: usize = 0;
    loop {
        sleep(Duration::from_secs(2)).await;

        uptime += 2;
        *(state.uptime.write().await) = uptime;

        if *state.reset.read().await {
            info!("Config changed, restarting.");
            sleep(Duration::from_millis(500)).await;
            esp_idf_hal::reset::restart();
        }
    }
}

// EOF
