use std::io::{BufRead, Write};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use failure;
use failure::{Error, Fail};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use clipdeck_core::Engine;

mod config;
use crate::config::Config;

mod controller;
use crate::controller::{Controller, Reply};

mod driver;
use crate::driver::Driver;

mod realtime_thread;

const APP_NAME: &str = "clipdeck";

const FINISH_RECORDING_ATTEMPTS: usize = 100;

const CLIPDECK_CONFIG: &str = "CLIPDECK_CONFIG";
const DEFAULT_CLIPDECK_CONFIG: &str = "clipdeck.toml";

const CLIPDECK_LOG_CONFIG: &str = "CLIPDECK_LOG_CONFIG";
const DEFAULT_CLIPDECK_LOG_CONFIG: &str = "log4rs.yaml";

#[derive(Debug, Fail)]
enum MainError {
  #[fail(display = "Failed to init logging: {}", cause)]
  LoggingInit { cause: String },

  #[fail(display = "Failed to start the control input: {}", cause)]
  ControlInput { cause: String },
}

fn main() -> Result<(), Error> {
  init_logging()?;

  let config = init_config()?;

  let (engine, processor) = Engine::new(config.engine.clone())?;

  let mut controller = Controller::new(engine);
  preload_clips(&mut controller, &config);

  let driver = if config.driver.enabled {
    Some(Driver::new(
      processor,
      config.engine.audio.clone(),
      config.driver.promote_realtime,
    )?)
  } else {
    warn!("The audio driver is disabled, nothing will be rendered");
    drop(processor);
    None
  };

  let lines = init_control_input()?;

  run(&mut controller, &config, lines);

  if driver.is_some() {
    finish_recording(&mut controller, &config);
  }

  if let Some(driver) = driver {
    driver.stop()?;
  }

  controller.maintain();

  info!("Bye");

  Ok(())
}

fn init_logging() -> Result<(), Error> {
  let log_config_path =
    std::env::var(CLIPDECK_LOG_CONFIG).unwrap_or_else(|_| DEFAULT_CLIPDECK_LOG_CONFIG.to_string());

  log4rs::init_file(log_config_path.as_str(), Default::default()).map_err(|err| {
    MainError::LoggingInit {
      cause: err.to_string(),
    }
  })?;

  Ok(())
}

fn init_config() -> Result<Config, Error> {
  let config_path =
    std::env::var(CLIPDECK_CONFIG).unwrap_or_else(|_| DEFAULT_CLIPDECK_CONFIG.to_string());

  let config = if std::path::Path::new(&config_path).exists() {
    info!("Loading {} configuration from {} ...", APP_NAME, config_path);
    Config::from_file(config_path.as_str())?
  } else {
    warn!("{} not found, using the default configuration", config_path);
    Config::default()
  };
  debug!("{:#?}", config);

  Ok(config)
}

fn preload_clips(controller: &mut Controller, config: &Config) {
  for preload in config.clips.iter() {
    let engine = controller.engine_mut();
    let result = engine.create_clip(&preload.path).and_then(|id| {
      if !preload.play {
        return Ok(id);
      }
      let clip = engine.clip(id)?;
      match preload.channel {
        Some(channel) => clip.play_on_channel(preload.looping, channel)?,
        None => clip.play(preload.looping)?,
      }
      Ok(id)
    });
    match result {
      Ok(id) => info!("Preloaded {} as clip {}", preload.path, id),
      Err(err) => warn!("Failed to preload {}: {}", preload.path, err),
    }
  }
}

/// Stops a recording still running and waits for the audio thread to hand it back.
fn finish_recording(controller: &mut Controller, config: &Config) {
  if let Err(err) = controller.engine_mut().levels_mut().stop_recording() {
    warn!("Failed to stop the recording: {}", err);
    return;
  }
  let interval = Duration::from_millis(u64::from(config.engine.telemetry.interval_ms.max(1)));
  for _ in 0..FINISH_RECORDING_ATTEMPTS {
    controller.maintain();
    if !controller.engine().levels().is_finishing() {
      return;
    }
    thread::sleep(interval);
  }
  warn!("Gave up waiting for the recording to finish");
}

fn init_control_input() -> Result<Receiver<String>, Error> {
  let (lines_tx, lines_rx) = crossbeam_channel::unbounded();

  thread::Builder::new()
    .name("control-input".into())
    .spawn(move || {
      let stdin = std::io::stdin();
      for line in stdin.lock().lines() {
        match line {
          Ok(line) => {
            if lines_tx.send(line).is_err() {
              break;
            }
          }
          Err(err) => {
            warn!("Failed to read the control input: {}", err);
            break;
          }
        }
      }
      debug!("The control input is closed");
    })
    .map_err(|err| MainError::ControlInput {
      cause: err.to_string(),
    })?;

  Ok(lines_rx)
}

/// Executes commands until `quit` or the end of the input, maintaining the engine in between.
fn run(controller: &mut Controller, config: &Config, lines: Receiver<String>) {
  let interval = Duration::from_millis(u64::from(config.engine.telemetry.interval_ms.max(1)));
  let prompt = config.control.prompt.as_str();

  reply(&format!("{} ready", APP_NAME), prompt);

  loop {
    match lines.recv_timeout(interval) {
      Ok(line) => {
        controller.maintain();
        match controller.execute(&line) {
          Ok(Reply::Quit) => break,
          Ok(Reply::Output(output)) => reply(&output, prompt),
          Err(err) => {
            debug!("{:?} failed: {}", line, err);
            reply(&format!("error: {}", err), prompt)
          }
        }
      }
      Err(RecvTimeoutError::Timeout) => controller.maintain(),
      Err(RecvTimeoutError::Disconnected) => break,
    }
  }
}

fn reply(output: &str, prompt: &str) {
  let stdout = std::io::stdout();
  let mut stdout = stdout.lock();
  drop(write!(stdout, "{}{}", output, prompt));
  drop(stdout.flush());
}
