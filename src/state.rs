// state.rs

use crate::*;

pub struct MyState {
    pub config: RwLock<MyConfig>,
    pub uptime: RwLock<usize>,
    pub api_cnt: AtomicU64,
    pub wifi_up: RwLock<bool>,
    pub myid: RwLock<String>,
    pub reading: RwLock<TempReading>,
    pub store: Mutex<Box<dyn ConfigStore>>,
    pub reset: RwLock<bool>,
}

impl MyState {
    pub fn new(config: MyConfig, store: Box<dyn ConfigStore>) -> Self {
        MyState {
            config: RwLock::new(config),
            uptime: RwLock::new(0),
            api_cnt: AtomicU64::new(0),
            wifi_up: RwLock::new(false),
            myid: RwLock::new("esp32ntc".into()),
            reading: RwLock::new(TempReading::new()),
            store: Mutex::new(store),
            reset: RwLock::new(false),
        }
    }
}

/// Client id announced to the broker and shown on the index page:
/// `IoT_` and the last three MAC octets in hex.
pub fn client_id(mac: &[u8; 6]) -> String {
    format!("IoT_{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5])
}


// EOF
