#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod key;
pub mod limit;

pub use config::{load_from_path, Config, ExtractBy, LimitConfig, LoggingConfig};
pub use error::{GateError, Result};
pub use gate::{Decision, Limiter, RateLimited};
pub use gateway::run;
pub use key::{hash_key, KeyExtractor, KeyHash, PeerAddr, XForwardedFor};
pub use limit::{Admission, BucketStore};
