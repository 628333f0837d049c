use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, error};

use crate::audio::{Buffer, CHANNELS};
use crate::engine::EngineError;

pub enum WriterProtocol {
  Block(Box<Buffer>),
}

/// Background thread writing stereo blocks to a WAV file.
///
/// It stops and finalises the file once every sender is gone, block buffers are
/// returned through `release_tx`.
pub struct DiskWriter {
  filename: String,
  handle: JoinHandle<Result<u64, String>>,
}

impl DiskWriter {
  pub fn start(
    filename: &str,
    sample_rate: u32,
    bits_per_sample: u16,
    blocks_rx: Receiver<WriterProtocol>,
    release_tx: Sender<Box<Buffer>>,
  ) -> Result<DiskWriter, EngineError> {
    let recording_error = |cause: String| EngineError::Recording {
      cause: format!("{}: {}", filename, cause),
    };

    match bits_per_sample {
      16 | 24 | 32 => {}
      bits => return Err(recording_error(format!("{} bits per sample are not supported", bits))),
    }

    if let Some(parent) = Path::new(filename).parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).map_err(|err| recording_error(err.to_string()))?;
      }
    }

    let spec = WavSpec {
      channels: CHANNELS as u16,
      sample_rate,
      bits_per_sample,
      sample_format: if bits_per_sample == 32 {
        SampleFormat::Float
      } else {
        SampleFormat::Int
      },
    };
    let writer = WavWriter::create(filename, spec).map_err(|err| recording_error(err.to_string()))?;

    debug!("Recording into {}", filename);

    let name = filename.to_string();
    thread::Builder::new()
      .name("disk-writer".into())
      .spawn(move || Self::write_blocks(&name, writer, bits_per_sample, blocks_rx, release_tx))
      .map_err(|err| recording_error(err.to_string()))
      .map(|handle| DiskWriter {
        filename: filename.to_string(),
        handle,
      })
  }

  pub fn filename(&self) -> &str {
    &self.filename
  }

  /// Waits until the file is finalised and returns the number of frames written.
  pub fn join(self) -> Result<u64, EngineError> {
    let filename = self.filename;
    self
      .handle
      .join()
      .map_err(|_| "the writer thread panicked".to_string())
      .and_then(|result| result)
      .map_err(|cause| EngineError::Recording {
        cause: format!("{}: {}", filename, cause),
      })
  }

  fn write_blocks(
    filename: &str,
    mut writer: WavWriter<BufWriter<File>>,
    bits_per_sample: u16,
    blocks_rx: Receiver<WriterProtocol>,
    release_tx: Sender<Box<Buffer>>,
  ) -> Result<u64, String> {
    let mut frames = 0u64;
    let mut failure = None;

    for msg in blocks_rx.iter() {
      match msg {
        WriterProtocol::Block(buffer) => {
          if failure.is_none() {
            let samples = buffer.slice(buffer.frames() * CHANNELS);
            match write_samples(&mut writer, bits_per_sample, samples) {
              Ok(()) => frames += buffer.frames() as u64,
              Err(err) => {
                error!("Failed to write into {}: {}", filename, err);
                failure = Some(err.to_string());
              }
            }
          }
          drop(release_tx.send(buffer));
        }
      }
    }

    if let Some(cause) = failure {
      return Err(cause);
    }
    writer.finalize().map_err(|err| err.to_string())?;
    debug!("Finished {} ({} frames)", filename, frames);
    Ok(frames)
  }
}

fn write_samples(
  writer: &mut WavWriter<BufWriter<File>>,
  bits_per_sample: u16,
  samples: &[f32],
) -> Result<(), hound::Error> {
  match bits_per_sample {
    32 => {
      for sample in samples {
        writer.write_sample(*sample)?;
      }
    }
    16 => {
      for sample in samples {
        writer.write_sample((sample.max(-1.0).min(1.0) * 32767.0) as i16)?;
      }
    }
    _ => {
      let scale = ((1i64 << (bits_per_sample - 1)) - 1) as f32;
      for sample in samples {
        writer.write_sample((sample.max(-1.0).min(1.0) * scale) as i32)?;
      }
    }
  }
  Ok(())
}
