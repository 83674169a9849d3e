pub mod data;
pub mod io;

pub use data::{Config, GeneralConfig, HudConfig, SuggestionsConfig, TabsConfig, CONFIG_VERSION};
pub use io::ConfigError;
