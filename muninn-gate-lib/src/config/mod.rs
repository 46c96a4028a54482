mod limit;
mod loader;
mod root;

pub use limit::{ExtractBy, LimitConfig};
pub use loader::load_from_path;
pub use root::{Config, LoggingConfig};
