pub mod data;
pub mod io;
pub mod printing;

pub use data::{path_display, Config, CONFIG_KEYS};
pub use io::ConfigError;
