use std::fmt::Write;
use std::str::FromStr;

use failure::Fail;
use log::{debug, info};

use clipdeck_core::engine::ClipRef;
use clipdeck_core::mixer::CHANNEL_COUNT;
use clipdeck_core::{ClipId, Engine, EngineError};

const HELP: &str = "\
bpm [value]
start [interval_ms]
stop
clip list
clip load <path>
clip info <id>
clip play <id> [loop] [channel <n>]
clip note <id> <note> [channel <n>]
clip stop <id> [channel <n>]
clip queue <id> [channel <n>]
clip unqueue <id> [channel <n>]
clip set <id> <start|length|pan|speed|pitch|gain|gaindb|volume|fader|slices|keystart|keyend|root|muted> <value>
clip destroy <id>
stopclips <id>...
mixer <channel> [pan|dry|fx1|fx2|mix|muted <value>]
record [start|stop|status]
record global <on|off>
record channel <n> <on|off>
record ports <on|off>
record port <add|remove> <name> <file channel>
record port clear
record prefix <global|ports|channel <n>> <prefix>
levels
quit";

#[derive(Debug, Fail)]
pub enum ControlError {
  #[fail(display = "{}", cause)]
  Engine { cause: EngineError },

  #[fail(display = "Unknown command: {}", command)]
  UnknownCommand { command: String },

  #[fail(display = "Missing argument: {}", name)]
  MissingArgument { name: String },

  #[fail(display = "Invalid {}: {}", name, value)]
  InvalidArgument { name: String, value: String },
}

impl From<EngineError> for ControlError {
  fn from(cause: EngineError) -> ControlError {
    ControlError::Engine { cause }
  }
}

pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Debug, PartialEq)]
pub enum Reply {
  Output(String),
  Quit,
}

impl Reply {
  fn done() -> Result<Reply> {
    Ok(Reply::Output(String::new()))
  }
}

/// Arguments of a command line, consumed from left to right.
struct Args<'a> {
  tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
  fn new(line: &'a str) -> Args<'a> {
    Args {
      tokens: line.split_whitespace(),
    }
  }

  fn next(&mut self, name: &str) -> Result<&'a str> {
    self.tokens.next().ok_or_else(|| ControlError::MissingArgument {
      name: name.to_string(),
    })
  }

  fn parse<T: FromStr>(&mut self, name: &str) -> Result<T> {
    let value = self.next(name)?;
    parse(name, value)
  }

  fn optional<T: FromStr>(&mut self, name: &str) -> Result<Option<T>> {
    match self.tokens.next() {
      Some(value) => parse(name, value).map(Some),
      None => Ok(None),
    }
  }

  fn rest(&mut self) -> Vec<&'a str> {
    self.tokens.by_ref().collect()
  }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
  value.parse::<T>().map_err(|_| ControlError::InvalidArgument {
    name: name.to_string(),
    value: value.to_string(),
  })
}

fn parse_switch(value: &str) -> Result<bool> {
  match value {
    "on" | "true" | "1" => Ok(true),
    "off" | "false" | "0" => Ok(false),
    _ => Err(ControlError::InvalidArgument {
      name: "switch".to_string(),
      value: value.to_string(),
    }),
  }
}

/// Trailing `loop` and `channel <n>` options.
#[derive(Debug, Default, PartialEq)]
struct PlayOptions {
  looping: bool,
  channel: Option<usize>,
}

impl PlayOptions {
  fn parse(args: &mut Args) -> Result<PlayOptions> {
    let mut options = PlayOptions::default();
    while let Some(option) = args.tokens.next() {
      match option {
        "loop" => options.looping = true,
        "channel" => options.channel = Some(args.parse("channel")?),
        other => {
          return Err(ControlError::InvalidArgument {
            name: "option".to_string(),
            value: other.to_string(),
          })
        }
      }
    }
    Ok(options)
  }
}

/// Executes the host's command lines against the engine.
pub struct Controller {
  engine: Engine,
}

impl Controller {
  pub fn new(engine: Engine) -> Controller {
    Controller { engine }
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  pub fn engine_mut(&mut self) -> &mut Engine {
    &mut self.engine
  }

  pub fn maintain(&mut self) {
    self.engine.maintain();
  }

  pub fn execute(&mut self, line: &str) -> Result<Reply> {
    let mut args = Args::new(line);
    let command = match args.tokens.next() {
      Some(command) => command,
      None => return Reply::done(),
    };
    debug!("Executing {:?}", line.trim());

    match command {
      "help" => Ok(Reply::Output(HELP.to_string())),
      "quit" | "exit" => Ok(Reply::Quit),
      "bpm" => self.bpm(&mut args),
      "start" => {
        let interval = args.optional::<f64>("interval")?.unwrap_or(0.0);
        self.engine.timer().start(interval)?;
        Ok(Reply::Output(format!("started at {} bpm", self.engine.timer().bpm())))
      }
      "stop" => {
        self.engine.timer().stop()?;
        Ok(Reply::Output(format!("stopped at {}", self.engine.timer().tick())))
      }
      "clip" => self.clip(&mut args),
      "stopclips" => {
        let ids = args
          .rest()
          .into_iter()
          .map(|token| self.clip_id(token))
          .collect::<Result<Vec<ClipId>>>()?;
        self.engine.stop_clips(&ids)?;
        Reply::done()
      }
      "mixer" => self.mixer(&mut args),
      "record" => self.record(&mut args),
      "levels" => self.levels(),
      other => Err(ControlError::UnknownCommand {
        command: other.to_string(),
      }),
    }
  }

  fn bpm(&mut self, args: &mut Args) -> Result<Reply> {
    if let Some(bpm) = args.optional::<u16>("bpm")? {
      self.engine.timer().set_bpm(bpm);
    }
    Ok(Reply::Output(self.engine.timer().bpm().to_string()))
  }

  /// Accepts the full `3v1` form or a bare slot index of a live clip.
  fn clip_id(&self, token: &str) -> Result<ClipId> {
    let invalid = || ControlError::InvalidArgument {
      name: "clip".to_string(),
      value: token.to_string(),
    };
    let mut parts = token.splitn(2, 'v');
    let index = parts.next().and_then(|index| index.parse::<u32>().ok()).ok_or_else(invalid)?;
    match parts.next() {
      Some(generation) => {
        let generation = generation.parse::<u32>().map_err(|_| invalid())?;
        Ok(ClipId::new(index, generation))
      }
      None => self
        .engine
        .clip_ids()
        .into_iter()
        .find(|id| id.index() == index as usize)
        .ok_or_else(invalid),
    }
  }

  fn clip(&mut self, args: &mut Args) -> Result<Reply> {
    let action = args.next("action")?;
    if action == "list" {
      let mut output = String::new();
      for id in self.engine.clip_ids() {
        let clip = self.engine.clip(id)?;
        drop(writeln!(output, "{} {:?} {}", id, clip.state(), clip.file_name()));
      }
      return Ok(Reply::Output(output.trim_end().to_string()));
    }
    if action == "load" {
      let path = args.rest().join(" ");
      if path.is_empty() {
        return Err(ControlError::MissingArgument {
          name: "path".to_string(),
        });
      }
      let id = self.engine.create_clip(&path)?;
      info!("Loaded {} as clip {}", path, id);
      return Ok(Reply::Output(id.to_string()));
    }

    let id = self.clip_id(args.next("clip")?)?;
    match action {
      "info" => Ok(Reply::Output(clip_info(&self.engine.clip(id)?))),
      "play" => {
        let options = PlayOptions::parse(args)?;
        let clip = self.engine.clip(id)?;
        match options.channel {
          Some(channel) => clip.play_on_channel(options.looping, channel)?,
          None => clip.play(options.looping)?,
        }
        Reply::done()
      }
      "note" => {
        let note = args.parse::<i32>("note")?;
        let options = PlayOptions::parse(args)?;
        self.engine.clip(id)?.play_note(note, options.channel)?;
        Reply::done()
      }
      "stop" => {
        let options = PlayOptions::parse(args)?;
        let clip = self.engine.clip(id)?;
        match options.channel {
          Some(channel) => clip.stop_on_channel(channel)?,
          None => clip.stop()?,
        }
        Reply::done()
      }
      "queue" => {
        match PlayOptions::parse(args)?.channel {
          Some(channel) => self.engine.queue_clip_to_start_on_channel(id, channel)?,
          None => self.engine.queue_clip_to_start(id)?,
        }
        Reply::done()
      }
      "unqueue" => {
        match PlayOptions::parse(args)?.channel {
          Some(channel) => self.engine.queue_clip_to_stop_on_channel(id, channel)?,
          None => self.engine.queue_clip_to_stop(id)?,
        }
        Reply::done()
      }
      "set" => self.clip_set(id, args),
      "destroy" => {
        self.engine.destroy_clip(id)?;
        Reply::done()
      }
      other => Err(ControlError::UnknownCommand {
        command: format!("clip {}", other),
      }),
    }
  }

  fn clip_set(&mut self, id: ClipId, args: &mut Args) -> Result<Reply> {
    let param = args.next("parameter")?;
    let bpm = self.engine.timer().bpm();
    let clip = self.engine.clip(id)?;
    match param {
      "start" => clip.set_start_position(args.parse("start")?),
      "length" => clip.set_length(args.parse("length")?, bpm)?,
      "pan" => clip.set_pan(args.parse("pan")?),
      "speed" => clip.set_speed_ratio(args.parse("speed")?),
      "pitch" => clip.set_pitch(args.parse("pitch")?),
      "gain" => clip.set_gain(args.parse("gain")?),
      "gaindb" => clip.set_gain_db(args.parse("gaindb")?),
      "volume" => clip.set_volume(args.parse("volume")?),
      "fader" => clip.set_fader(args.parse("fader")?),
      "slices" => clip.set_slices(args.parse("slices")?),
      "keystart" => clip.set_key_zone_start(args.parse("keystart")?),
      "keyend" => clip.set_key_zone_end(args.parse("keyend")?),
      "root" => clip.set_root_note(args.parse("root")?),
      "muted" => clip.set_muted(parse_switch(args.next("muted")?)?),
      other => {
        return Err(ControlError::InvalidArgument {
          name: "parameter".to_string(),
          value: other.to_string(),
        })
      }
    }
    Reply::done()
  }

  fn mixer(&mut self, args: &mut Args) -> Result<Reply> {
    let channel = args.parse::<usize>("channel")?;
    let mixer = self.engine.mixer();
    if let Some(param) = args.tokens.next() {
      match param {
        "pan" => mixer.set_pan_amount(channel, args.parse("pan")?)?,
        "dry" => mixer.set_dry_amount(channel, args.parse("dry")?)?,
        "fx1" => mixer.set_wet_fx1_amount(channel, args.parse("fx1")?)?,
        "fx2" => mixer.set_wet_fx2_amount(channel, args.parse("fx2")?)?,
        "mix" => mixer.set_dry_wet_mix_amount(channel, args.parse("mix")?)?,
        "muted" => mixer.set_muted(channel, parse_switch(args.next("muted")?)?)?,
        other => {
          return Err(ControlError::InvalidArgument {
            name: "parameter".to_string(),
            value: other.to_string(),
          })
        }
      }
    }
    Ok(Reply::Output(format!(
      "pan {:.2} dry {:.2} fx1 {:.2} fx2 {:.2} mix {:.2} muted {}",
      mixer.pan_amount(channel)?,
      mixer.dry_amount(channel)?,
      mixer.wet_fx1_amount(channel)?,
      mixer.wet_fx2_amount(channel)?,
      mixer.dry_wet_mix_amount(channel)?,
      mixer.muted(channel)?
    )))
  }

  fn record(&mut self, args: &mut Args) -> Result<Reply> {
    let levels = self.engine.levels_mut();
    match args.tokens.next().unwrap_or("status") {
      "start" => {
        levels.start_recording()?;
        Ok(Reply::Output(levels.recording_filenames().join("\n")))
      }
      "stop" => {
        levels.stop_recording()?;
        Reply::done()
      }
      "status" => {
        let mut output = String::new();
        drop(writeln!(output, "recording {}", levels.is_recording()));
        for filename in levels.recording_filenames() {
          drop(writeln!(output, "file {}", filename));
        }
        for port in levels.active_ports() {
          drop(writeln!(output, "port {} -> {}", port.port, port.channel));
        }
        Ok(Reply::Output(output.trim_end().to_string()))
      }
      "global" => {
        levels.set_record_global_playback(parse_switch(args.next("switch")?)?);
        Reply::done()
      }
      "channel" => {
        let channel = args.parse::<usize>("channel")?;
        levels.set_channel_to_record(channel, parse_switch(args.next("switch")?)?)?;
        Reply::done()
      }
      "ports" => {
        levels.set_should_record_ports(parse_switch(args.next("switch")?)?);
        Reply::done()
      }
      "port" => {
        match args.next("action")? {
          "clear" => levels.clear_record_ports(),
          "add" => {
            let name = args.next("port")?;
            levels.add_record_port(name, args.parse("file channel")?)?
          }
          "remove" => {
            let name = args.next("port")?;
            levels.remove_record_port(name, args.parse("file channel")?)?
          }
          other => {
            return Err(ControlError::UnknownCommand {
              command: format!("record port {}", other),
            })
          }
        }
        Reply::done()
      }
      "prefix" => {
        match args.next("target")? {
          "global" => levels.set_global_playback_filename_prefix(args.next("prefix")?),
          "ports" => levels.set_ports_filename_prefix(args.next("prefix")?),
          "channel" => {
            let channel = args.parse::<usize>("channel")?;
            levels.set_channel_filename_prefix(channel, args.next("prefix")?)?
          }
          other => {
            return Err(ControlError::InvalidArgument {
              name: "target".to_string(),
              value: other.to_string(),
            })
          }
        }
        Reply::done()
      }
      other => Err(ControlError::UnknownCommand {
        command: format!("record {}", other),
      }),
    }
  }

  fn levels(&self) -> Result<Reply> {
    let levels = self.engine.levels();
    let mut output = String::new();
    let (left, right) = levels.master_peak_db();
    let (hold_left, hold_right) = levels.master_hold_db();
    drop(writeln!(
      output,
      "master {:.1} {:.1} hold {:.1} {:.1} sum {:.1}",
      left,
      right,
      hold_left,
      hold_right,
      levels.master_level_db()
    ));
    for channel in 0..CHANNEL_COUNT {
      let (left, right) = levels.channel_peak_db(channel)?;
      let (hold_left, hold_right) = levels.channel_hold_db(channel)?;
      drop(writeln!(
        output,
        "channel{} {:.1} {:.1} hold {:.1} {:.1}",
        channel, left, right, hold_left, hold_right
      ));
    }
    Ok(Reply::Output(output.trim_end().to_string()))
  }
}

fn clip_info(clip: &ClipRef) -> String {
  let mut output = String::new();
  drop(writeln!(output, "id {}", clip.id()));
  drop(writeln!(output, "file {}", clip.file_path().display()));
  drop(writeln!(output, "state {:?}", clip.state()));
  drop(writeln!(output, "duration {:.3}", clip.duration()));
  drop(writeln!(output, "start {:.3}", clip.start_position()));
  drop(writeln!(output, "length {:.3}", clip.length()));
  drop(writeln!(output, "pan {:.2}", clip.pan()));
  drop(writeln!(output, "speed {:.2}", clip.speed_ratio()));
  drop(writeln!(output, "pitch {:.2}", clip.pitch()));
  drop(writeln!(output, "gaindb {:.2}", clip.gain_db()));
  drop(writeln!(output, "volume {:.2}", clip.volume()));
  drop(writeln!(output, "slices {}", clip.slices()));
  drop(writeln!(output, "keyzone {} {}", clip.key_zone_start(), clip.key_zone_end()));
  drop(writeln!(output, "root {}", clip.root_note()));
  drop(writeln!(output, "muted {}", clip.is_muted()));
  drop(writeln!(output, "progress {:.3}", clip.progress()));
  drop(write!(output, "level {:.1}", clip.level_db()));
  output
}

#[cfg(test)]
mod test {

  use std::path::{Path, PathBuf};

  use clipdeck_core::config::Config;
  use clipdeck_core::{ClipState, Engine, EngineError, EngineProcessor};

  use super::{ControlError, Controller, Reply};

  fn write_wav(dir: &Path) -> PathBuf {
    let path = dir.join("clip.wav");
    let spec = hound::WavSpec {
      channels: 2,
      sample_rate: 48000,
      bits_per_sample: 32,
      sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..4800 * 2 {
      writer.write_sample(0.25f32).unwrap();
    }
    writer.finalize().unwrap();
    path
  }

  fn controller(dir: &Path) -> (Controller, EngineProcessor) {
    let mut config = Config::default();
    config.audio.sample_rate = 48000;
    config.recorder.directory = dir.to_string_lossy().into_owned();
    let (engine, processor) = Engine::new(config).unwrap();
    (Controller::new(engine), processor)
  }

  fn output(reply: Reply) -> String {
    match reply {
      Reply::Output(output) => output,
      Reply::Quit => panic!("unexpected quit"),
    }
  }

  #[test]
  pub fn bpm_is_read_and_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let (mut controller, _processor) = controller(dir.path());
    assert_eq!(output(controller.execute("bpm").unwrap()), "120");
    assert_eq!(output(controller.execute("bpm 90").unwrap()), "90");
    assert_eq!(output(controller.execute("bpm 400").unwrap()), "200");
    match controller.execute("bpm fast") {
      Err(ControlError::InvalidArgument { name, .. }) => assert_eq!(name, "bpm"),
      _ => panic!("expected an invalid argument"),
    }
  }

  #[test]
  pub fn clip_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());
    let (mut controller, _processor) = controller(dir.path());

    let id = output(controller.execute(&format!("clip load {}", path.display())).unwrap());
    assert_eq!(id, "0v1");
    controller.execute("clip set 0 pan -0.5").unwrap();
    controller.execute("clip set 0v1 muted on").unwrap();
    controller.execute("clip set 0 length 4").unwrap();
    controller.execute("clip set 0 fader 1").unwrap();
    let clip_id = controller.engine().clip_ids()[0];
    {
      let clip = controller.engine().clip(clip_id).unwrap();
      assert_eq!(clip.pan(), -0.5);
      assert!(clip.is_muted());
      assert_eq!(clip.length(), 2.0);
      assert_eq!(clip.volume(), 6.0);
      assert_eq!(clip.state(), ClipState::Created);
    }

    let info = output(controller.execute("clip info 0").unwrap());
    assert!(info.contains("muted true"));
    assert!(info.contains("duration 0.100"));

    controller.execute("clip play 0 loop channel 3").unwrap();
    controller.execute("clip queue 0 channel 3").unwrap();
    controller.execute("stopclips 0").unwrap();
    controller.execute("clip destroy 0").unwrap();
    match controller.execute("clip info 0v1") {
      Err(ControlError::Engine {
        cause: EngineError::InvalidClip { .. },
      }) => {}
      _ => panic!("expected an invalid clip"),
    }
    match controller.execute("clip info 0") {
      Err(ControlError::InvalidArgument { name, .. }) => assert_eq!(name, "clip"),
      _ => panic!("expected an unknown clip"),
    }
  }

  #[test]
  pub fn channels_are_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());
    let (mut controller, _processor) = controller(dir.path());
    controller.execute(&format!("clip load {}", path.display())).unwrap();
    match controller.execute("clip play 0 channel 10") {
      Err(ControlError::Engine {
        cause: EngineError::InvalidChannel { channel },
      }) => assert_eq!(channel, 10),
      _ => panic!("expected an invalid channel"),
    }
    match controller.execute("clip play 0 twice") {
      Err(ControlError::InvalidArgument { value, .. }) => assert_eq!(value, "twice"),
      _ => panic!("expected an invalid option"),
    }
  }

  #[test]
  pub fn mixer_settings() {
    let dir = tempfile::tempdir().unwrap();
    let (mut controller, _processor) = controller(dir.path());
    let reply = output(controller.execute("mixer 2 pan 0.25").unwrap());
    assert!(reply.starts_with("pan 0.25 dry 1.00"));
    controller.execute("mixer 2 muted on").unwrap();
    assert!(controller.engine().mixer().muted(2).unwrap());
    assert!(controller.execute("mixer 12").is_err());
  }

  #[test]
  pub fn recording_commands() {
    let dir = tempfile::tempdir().unwrap();
    let (mut controller, _processor) = controller(dir.path());
    controller.execute("record port add master:left 0").unwrap();
    controller.execute("record ports on").unwrap();
    let files = output(controller.execute("record start").unwrap());
    assert!(files.starts_with(&dir.path().join("ports").to_string_lossy().into_owned()));
    let status = output(controller.execute("record").unwrap());
    assert!(status.contains("recording true"));
    assert!(status.contains("port master:left -> 0"));
    controller.execute("record stop").unwrap();
    assert!(!controller.engine().levels().is_recording());
    match controller.execute("record port add nowhere:left 0") {
      Err(ControlError::Engine {
        cause: EngineError::UnknownPort { name },
      }) => assert_eq!(name, "nowhere:left"),
      _ => panic!("expected an unknown port"),
    }
  }

  #[test]
  pub fn levels_list_every_channel() {
    let dir = tempfile::tempdir().unwrap();
    let (mut controller, _processor) = controller(dir.path());
    let levels = output(controller.execute("levels").unwrap());
    assert_eq!(levels.lines().count(), 11);
    assert!(levels.starts_with("master"));
  }

  #[test]
  pub fn empty_unknown_and_quit() {
    let dir = tempfile::tempdir().unwrap();
    let (mut controller, _processor) = controller(dir.path());
    assert_eq!(controller.execute("   ").unwrap(), Reply::Output(String::new()));
    assert_eq!(controller.execute("quit").unwrap(), Reply::Quit);
    match controller.execute("dance") {
      Err(ControlError::UnknownCommand { command }) => assert_eq!(command, "dance"),
      _ => panic!("expected an unknown command"),
    }
  }
}
