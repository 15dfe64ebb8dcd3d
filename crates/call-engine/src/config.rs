//! Engine configuration
//!
//! Everything the server needs is read from the environment once at
//! startup and injected from there; a bad value fails fast with a
//! configuration error before any call or job is touched.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use voxdial_agent_core::{LlmConfig, SttConfig, TtsConfig};
use voxdial_infra_common::{env_var, optional_env_var};

use crate::error::{EngineError, EngineResult};

/// Top-level engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// SQLite database URL
    pub database_url: String,
    /// HTTP bind address (webhooks, control, voice WebSocket)
    pub http_bind: SocketAddr,
    /// SIP signalling bind address
    pub sip_bind: SocketAddr,
    /// First local RTP media port
    pub rtp_port_base: u16,
    /// Number of concurrent RTP calls to allocate ports for
    pub rtp_port_capacity: u16,
    /// Directory recordings are written under
    pub recordings_dir: PathBuf,
    /// Per-second call cost when the campaign has no override
    pub cost_rate_per_second: f64,
    /// Per-turn latency budget; exceeding turns are flagged, not dropped
    pub latency_budget: Duration,
    /// End the call as failed after this long with no audio either way
    pub idle_timeout: Duration,
    /// Base URL the telephony provider calls back into
    pub public_base_url: String,
    /// Telephony provider REST endpoint for placing calls
    pub telephony_api_url: String,
    /// Telephony provider credential
    pub telephony_api_key: String,
    /// Caller id for outbound calls
    pub outbound_number: String,
    /// Speech-to-text provider settings
    pub stt: SttConfig,
    /// Language-model provider settings
    pub llm: LlmConfig,
    /// Text-to-speech provider settings
    pub tts: TtsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            http_bind: "0.0.0.0:8080".parse().unwrap(),
            sip_bind: "0.0.0.0:5060".parse().unwrap(),
            rtp_port_base: 10_000,
            rtp_port_capacity: 512,
            recordings_dir: PathBuf::from("recordings"),
            cost_rate_per_second: 0.001,
            latency_budget: Duration::from_millis(700),
            idle_timeout: Duration::from_secs(300),
            public_base_url: "http://localhost:8080".to_string(),
            telephony_api_url: "https://api.example-telephony.com/v1/calls".to_string(),
            telephony_api_key: String::new(),
            outbound_number: "+15550000000".to_string(),
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment.
    ///
    /// Provider keys are required; most operational knobs have defaults.
    pub fn from_env() -> EngineResult<Self> {
        let mut config = Self {
            database_url: env_var("VOXDIAL_DATABASE_URL").map_err(config_err)?,
            telephony_api_key: env_var("VOXDIAL_TELEPHONY_API_KEY").map_err(config_err)?,
            ..Default::default()
        };

        if let Some(bind) = optional_env_var("VOXDIAL_HTTP_BIND").map_err(config_err)? {
            config.http_bind = bind;
        }
        if let Some(bind) = optional_env_var("VOXDIAL_SIP_BIND").map_err(config_err)? {
            config.sip_bind = bind;
        }
        if let Some(base) = optional_env_var("VOXDIAL_RTP_PORT_BASE").map_err(config_err)? {
            config.rtp_port_base = base;
        }
        if let Some(dir) = optional_env_var::<String>("VOXDIAL_RECORDINGS_DIR").map_err(config_err)? {
            config.recordings_dir = PathBuf::from(dir);
        }
        if let Some(url) = optional_env_var("VOXDIAL_PUBLIC_BASE_URL").map_err(config_err)? {
            config.public_base_url = url;
        }
        if let Some(url) = optional_env_var("VOXDIAL_TELEPHONY_API_URL").map_err(config_err)? {
            config.telephony_api_url = url;
        }
        if let Some(number) = optional_env_var("VOXDIAL_OUTBOUND_NUMBER").map_err(config_err)? {
            config.outbound_number = number;
        }
        if let Some(rate) = optional_env_var("VOXDIAL_COST_RATE").map_err(config_err)? {
            config.cost_rate_per_second = rate;
        }

        config.stt.api_key = env_var("VOXDIAL_STT_API_KEY").map_err(config_err)?;
        if let Some(url) = optional_env_var("VOXDIAL_STT_WS_URL").map_err(config_err)? {
            config.stt.ws_url = url;
        }
        config.llm.api_key = env_var("VOXDIAL_LLM_API_KEY").map_err(config_err)?;
        if let Some(url) = optional_env_var("VOXDIAL_LLM_API_URL").map_err(config_err)? {
            config.llm.api_url = url;
        }
        if let Some(model) = optional_env_var("VOXDIAL_LLM_MODEL").map_err(config_err)? {
            config.llm.model = model;
        }
        config.tts.api_key = env_var("VOXDIAL_TTS_API_KEY").map_err(config_err)?;
        if let Some(url) = optional_env_var("VOXDIAL_TTS_API_URL").map_err(config_err)? {
            config.tts.api_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could only fail later.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database_url.is_empty() {
            return Err(EngineError::Config("database URL is empty".into()));
        }
        if self.rtp_port_capacity == 0 {
            return Err(EngineError::Config("rtp port capacity is zero".into()));
        }
        if self.cost_rate_per_second < 0.0 {
            return Err(EngineError::Config("cost rate is negative".into()));
        }
        if self.public_base_url.is_empty() {
            return Err(EngineError::Config("public base URL is empty".into()));
        }
        Ok(())
    }
}

fn config_err(e: voxdial_infra_common::EnvError) -> EngineError {
    EngineError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_values_fail_validation() {
        let config = EngineConfig {
            rtp_port_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            cost_rate_per_second: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
