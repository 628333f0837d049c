use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use log::debug;

use crate::engine::EngineError;

/// Decoded clip audio, planar stereo at the file's own sample rate.
#[derive(Debug)]
pub struct AudioData {
  path: PathBuf,
  file_name: String,
  sample_rate: u32,
  pub left: Vec<f32>,
  pub right: Vec<f32>,
}

impl AudioData {
  pub fn new(path: PathBuf, sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> AudioData {
    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    AudioData {
      path,
      file_name,
      sample_rate,
      left,
      right,
    }
  }

  pub fn decode<P: AsRef<Path>>(path: P) -> Result<AudioData, EngineError> {
    let path = path.as_ref();
    let decode_error = |cause: String| EngineError::Decode {
      path: path.display().to_string(),
      cause,
    };

    let reader = WavReader::open(path).map_err(|err| decode_error(err.to_string()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
      return Err(decode_error("no audio channels".to_string()));
    }

    let samples: Vec<f32> = match spec.sample_format {
      SampleFormat::Float => reader
        .into_samples::<f32>()
        .collect::<Result<_, _>>()
        .map_err(|err| decode_error(err.to_string()))?,
      SampleFormat::Int => {
        let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
        reader
          .into_samples::<i32>()
          .map(|sample| sample.map(|value| value as f32 * scale))
          .collect::<Result<_, _>>()
          .map_err(|err| decode_error(err.to_string()))?
      }
    };

    let channels = usize::from(spec.channels);
    let frames = samples.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(channels) {
      left.push(frame[0]);
      right.push(if channels > 1 { frame[1] } else { frame[0] });
    }

    debug!(
      "Decoded {} ({} frames, {} channels, {} Hz)",
      path.display(),
      frames,
      channels,
      spec.sample_rate
    );

    Ok(AudioData::new(
      path.to_path_buf(),
      spec.sample_rate,
      left,
      right,
    ))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn file_name(&self) -> &str {
    &self.file_name
  }

  pub fn sample_rate(&self) -> u32 {
    self.sample_rate
  }

  pub fn frames(&self) -> usize {
    self.left.len()
  }

  pub fn duration(&self) -> f64 {
    self.frames() as f64 / f64::from(self.sample_rate.max(1))
  }
}
