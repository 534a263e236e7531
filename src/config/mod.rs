pub use manager::{ConfigChangeListener, ConfigId, ConfigManager, Tier, TierFilter};
pub use value::{ConfigValue, DEFAULT_VALUE, INCLUDE, INCLUDE_EXT, ValueKind};

mod loader;
mod manager;
mod value;
