use serde::{Deserialize, Serialize};

pub const DEFAULT_SLAVE_ADDRESS: u8 = 0x08;

#[cfg(feature = "std")]
pub const DEFAULT_HOST: &str = "0.0.0.0";
#[cfg(feature = "std")]
pub const DEFAULT_PORT: u16 = 2526;
#[cfg(feature = "std")]
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 7-bit address the slave answers to.
    pub slave_address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            slave_address: DEFAULT_SLAVE_ADDRESS,
        }
    }
}

#[cfg(feature = "std")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    /// Lines longer than this are dropped as malformed.
    pub max_frame_bytes: usize,
}

#[cfg(feature = "std")]
impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[cfg(feature = "std")]
impl ChannelConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
