// wifi.rs

use anyhow::anyhow;
use embedded_svc::wifi::{ClientConfiguration, Configuration};
use esp_idf_svc::{
    eventloop::{EspEventLoop, System},
    netif::{self, EspNetif},
    timer::{EspTimerService, Task},
    wifi::{AsyncWifi, EspWifi, WifiDriver},
};

use crate::*;

pub struct WifiLoop<'a> {
    pub state: Arc<std::pin::Pin<Box<MyState>>>,
    pub wifi: Option<AsyncWifi<EspWifi<'a>>>,
}

impl<'a> WifiLoop<'a> {
    pub async fn run(
        mut self,
        wifidriver: WifiDriver<'a>,
        sysloop: EspEventLoop<System>,
        timer: EspTimerService<Task>,
    ) -> anyhow::Result<()> {
        info!("Initializing Wi-Fi...");

        let net_if = EspNetif::new(netif::NetifStack::Sta)?;
        let mac = net_if.get_mac()?;
        let myid = client_id(&mac);
        info!("Client Id: {myid}");
        *self.state.myid.write().await = myid;

        let espwifi = EspWifi::wrap_all(wifidriver, net_if, EspNetif::new(netif::NetifStack::Ap)?)?;
        self.wifi = Some(AsyncWifi::wrap(espwifi, sysloop, timer)?);

        Box::pin(self.configure()).await?;

        if let Err(e) = Box::pin(self.initial_connect()).await {
            error!("WiFi connection failed: {e:?}");
            error!("Resetting...");
            sleep(Duration::from_secs(5)).await;
            esp_idf_hal::reset::restart();
        }

        let wifi = self.wifi.as_ref().ok_or_else(|| anyhow!("WiFi not initialized"))?;
        let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
        info!("IP address: {}", ip_info.ip);
        *self.state.wifi_up.write().await = true;

        self.stay_connected().await
    }

    pub async fn configure(&mut self) -> anyhow::Result<()> {
        info!("WiFi setting credentials...");
        let (ssid, pass) = {
            let config = self.state.config.read().await;
            (config.wifi_ssid.clone(), config.wifi_pass.clone())
        };
        let wifi = self.wifi.as_mut().ok_or_else(|| anyhow!("WiFi not initialized"))?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("WiFi SSID too long"))?,
            password: pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("WiFi password too long"))?,
            ..Default::default()
        }))?;

        info!("WiFi driver starting...");
        Ok(Box::pin(wifi.start()).await?)
    }

    pub async fn initial_connect(&mut self) -> anyhow::Result<()> {
        self.do_connect_loop(true).await
    }

    pub async fn stay_connected(mut self) -> anyhow::Result<()> {
        self.do_connect_loop(false).await
    }

    async fn do_connect_loop(&mut self, initial: bool) -> anyhow::Result<()> {
        let wifi = self.wifi.as_mut().ok_or_else(|| anyhow!("WiFi not initialized"))?;
        loop {
            // Wait for disconnect before trying to connect again.
            let timeout = if initial {
                Some(Duration::from_secs(30))
            } else {
                None
            };
            Box::pin(wifi.wifi_wait(|w| w.is_up(), timeout)).await.ok();

            *self.state.wifi_up.write().await = false;
            info!("WiFi connecting...");
            Box::pin(wifi.connect()).await.ok();

            info!("WiFi waiting for association...");
            match Box::pin(wifi.ip_wait_while(|w| w.is_up().map(|s| !s), None)).await {
                Ok(_) => {}
                Err(e) => {
                    error!("WiFi error: {e:?}");

                    // only exit here if this is initial connection
                    // otherwise, keep trying
                    if initial {
                        bail!(e);
                    }
                    sleep(Duration::from_secs(5)).await;
                    continue;
                }
            }

            info!("WiFi connected.");
            *self.state.wifi_up.write().await = true;
            if initial {
                return Ok(());
            }
        }
    }
}

// EOF
