use log::*;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

pub fn init_logger() {
  init_logger_with(LevelFilter::Info);
}

/// Level can be overridden with SELTRA_LOG for noisy simulation runs.
pub fn init_logger_with(level: LevelFilter) {
  let level = match std::env::var("SELTRA_LOG") {
    Ok(s) => match s.to_lowercase().as_str() {
      "error" => LevelFilter::Error,
      "warn" => LevelFilter::Warn,
      "info" => LevelFilter::Info,
      "debug" => LevelFilter::Debug,
      "trace" => LevelFilter::Trace,
      _ => level,
    },
    Err(_) => level,
  };
  // tests init repeatedly, only the first call wins
  let _ = TermLogger::init(
    level,
    Config::default(),
    TerminalMode::Mixed,
    ColorChoice::Auto,
  );
}
