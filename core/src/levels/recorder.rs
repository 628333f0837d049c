use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio::{new_buffer_pool, Buffer, StereoBuffer, CHANNELS};
use crate::levels::ports::{PortSource, RecordPort, Side};
use crate::levels::writer::WriterProtocol;
use crate::pool::Pool;

/// Engine buses available for recording during one buffer.
pub struct Buses<'a> {
  pub master: &'a StereoBuffer,
  pub fx1: &'a StereoBuffer,
  pub fx2: &'a StereoBuffer,
  pub channels: &'a [StereoBuffer],
}

impl<'a> Buses<'a> {
  fn port(&self, source: PortSource, side: Side) -> Option<&'a [f32]> {
    let bus = match source {
      PortSource::Master => self.master,
      PortSource::Fx1 => self.fx1,
      PortSource::Fx2 => self.fx2,
      PortSource::Channel(channel) => self.channels.get(channel)?,
    };
    Some(match side {
      Side::Left => &bus.left[..],
      Side::Right => &bus.right[..],
    })
  }
}

pub enum TapSource {
  Master,
  Channel(usize),
  Ports(Vec<RecordPort>),
}

/// Feeds one disk writer with pooled blocks.
pub struct CaptureTap {
  source: TapSource,
  writer_tx: Sender<WriterProtocol>,
  release_rx: Receiver<Box<Buffer>>,
  pool: Pool<Buffer>,
  dropped: u64,
}

impl CaptureTap {
  pub fn new(
    source: TapSource,
    writer_tx: Sender<WriterProtocol>,
    release_rx: Receiver<Box<Buffer>>,
    pool_capacity: usize,
    block_frames: usize,
  ) -> CaptureTap {
    CaptureTap {
      source,
      writer_tx,
      release_rx,
      pool: new_buffer_pool(pool_capacity, block_frames * CHANNELS),
      dropped: 0,
    }
  }

  pub fn dropped(&self) -> u64 {
    self.dropped
  }

  fn capture(&mut self, buses: &Buses, frames: usize) {
    while let Ok(buffer) = self.release_rx.try_recv() {
      self.pool.release(buffer);
    }

    let mut buffer = match self.pool.get() {
      Some(buffer) => buffer,
      None => {
        self.dropped += 1;
        return;
      }
    };

    let frames = frames.min(buffer.len() / CHANNELS);
    match &self.source {
      TapSource::Master => interleave(buses.master, &mut buffer, frames),
      TapSource::Channel(channel) => match buses.channels.get(*channel) {
        Some(bus) => interleave(bus, &mut buffer, frames),
        None => buffer.slice_mut(frames * CHANNELS).iter_mut().for_each(|s| *s = 0.0),
      },
      TapSource::Ports(ports) => {
        let samples = buffer.slice_mut(frames * CHANNELS);
        samples.iter_mut().for_each(|s| *s = 0.0);
        for port in ports.iter() {
          if let Some(source) = buses.port(port.port.source, port.port.side) {
            for (frame, sample) in samples.chunks_exact_mut(CHANNELS).zip(source.iter()) {
              frame[port.channel] += *sample;
            }
          }
        }
      }
    }
    buffer.set_frames(frames);

    match self.writer_tx.try_send(WriterProtocol::Block(buffer)) {
      Ok(()) => {}
      Err(TrySendError::Full(WriterProtocol::Block(buffer)))
      | Err(TrySendError::Disconnected(WriterProtocol::Block(buffer))) => {
        self.dropped += 1;
        self.pool.release(buffer);
      }
    }
  }
}

fn interleave(bus: &StereoBuffer, buffer: &mut Buffer, frames: usize) {
  bus.write_interleaved(buffer.slice_mut(frames * CHANNELS), frames);
}

/// Everything recorded between a start and a stop, owned by the audio thread meanwhile.
pub struct CaptureSession {
  id: u64,
  taps: Vec<CaptureTap>,
}

impl CaptureSession {
  pub fn new(id: u64, taps: Vec<CaptureTap>) -> CaptureSession {
    CaptureSession { id, taps }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn dropped(&self) -> u64 {
    self.taps.iter().map(CaptureTap::dropped).sum()
  }

  pub fn capture(&mut self, buses: &Buses, frames: usize) {
    for tap in self.taps.iter_mut() {
      tap.capture(buses, frames);
    }
  }
}

#[cfg(test)]
mod test {

  use super::{Buses, CaptureSession, CaptureTap, TapSource};
  use crate::audio::StereoBuffer;
  use crate::levels::ports::RecordPort;
  use crate::levels::writer::WriterProtocol;

  fn bus(left: f32, right: f32) -> StereoBuffer {
    let mut bus = StereoBuffer::new(4);
    bus.left.iter_mut().for_each(|s| *s = left);
    bus.right.iter_mut().for_each(|s| *s = right);
    bus
  }

  #[test]
  pub fn ports_are_mixed_into_file_channels() {
    let master = bus(0.5, 0.25);
    let fx = bus(0.0, 0.0);
    let channels = vec![bus(0.1, 0.2), bus(0.3, 0.4)];
    let buses = Buses {
      master: &master,
      fx1: &fx,
      fx2: &fx,
      channels: &channels,
    };

    let ports = vec![
      RecordPort::new("channel1:right", 0).unwrap(),
      RecordPort::new("master:left", 1).unwrap(),
      RecordPort::new("master:right", 1).unwrap(),
    ];
    let (writer_tx, writer_rx) = crossbeam_channel::bounded(4);
    let (_release_tx, release_rx) = crossbeam_channel::bounded(4);
    let tap = CaptureTap::new(TapSource::Ports(ports), writer_tx, release_rx, 2, 4);
    let mut session = CaptureSession::new(7, vec![tap]);

    session.capture(&buses, 2);

    match writer_rx.try_recv() {
      Ok(WriterProtocol::Block(buffer)) => {
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.slice(4), &[0.4, 0.75, 0.4, 0.75]);
      }
      Err(_) => panic!("expected a block"),
    }
    assert_eq!(session.id(), 7);
    assert_eq!(session.dropped(), 0);
  }

  #[test]
  pub fn empty_pool_drops_blocks() {
    let master = bus(0.5, 0.25);
    let buses = Buses {
      master: &master,
      fx1: &master,
      fx2: &master,
      channels: &[],
    };
    let (writer_tx, writer_rx) = crossbeam_channel::bounded(4);
    let (release_tx, release_rx) = crossbeam_channel::bounded(4);
    let tap = CaptureTap::new(TapSource::Master, writer_tx, release_rx, 1, 4);
    let mut session = CaptureSession::new(1, vec![tap]);

    session.capture(&buses, 4);
    session.capture(&buses, 4);
    assert_eq!(session.dropped(), 1);

    match writer_rx.try_recv() {
      Ok(WriterProtocol::Block(buffer)) => {
        assert_eq!(buffer.slice(2), &[0.5, 0.25]);
        release_tx.send(buffer).unwrap();
      }
      Err(_) => panic!("expected a block"),
    }
    session.capture(&buses, 4);
    assert_eq!(session.dropped(), 1);
    assert!(writer_rx.try_recv().is_ok());
  }
}
