use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{GateError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GateError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = toml::from_str(&txt)
        .map_err(|e| GateError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.upstream.parse::<http::uri::Authority>().is_err() {
        return Err(GateError::Config(format!(
            "Upstream is not a valid host:port authority: {}",
            cfg.upstream
        )));
    }

    if let Some(limit) = &cfg.limit {
        if limit.refill_every_ms == 0 {
            return Err(GateError::Config(
                "limit.refill_every_ms must be greater than zero".to_string(),
            ));
        }
    }

    Ok(())
}
