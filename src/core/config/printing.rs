use crate::core::config::data::{path_display, Config};

fn show<T: ToString>(value: Option<T>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "(unset)".to_string())
}

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  model: {}", self.model());
        println!("  max-output-tokens: {}", show(self.max_output_tokens));
        println!("  user: {}", show(self.user.as_deref()));
        match self.data_dir() {
            Ok(dir) => println!("  data-dir: {}", path_display(dir)),
            Err(_) => println!("  data-dir: (unavailable)"),
        }
        match self.persistence_timeout() {
            Some(limit) => println!("  persistence-timeout-secs: {}", limit.as_secs()),
            None => println!("  persistence-timeout-secs: off"),
        }
        match self.stream_idle_timeout() {
            Some(limit) => println!("  stream-idle-timeout-secs: {}", limit.as_secs()),
            None => println!("  stream-idle-timeout-secs: off"),
        }
        println!("  conversation-limit: {}", self.conversation_limit());
        println!("  chunk-delay-ms: {}", self.chunk_delay().as_millis());
    }
}
