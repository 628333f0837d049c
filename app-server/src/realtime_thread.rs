use failure::Fail;

#[derive(Debug, Fail)]
#[fail(display = "The {} thread could not be promoted to real time", thread)]
pub struct RealTimePriorityError {
  thread: String,
}

/// Real-time scheduling for the thread that created it, given back on drop.
///
/// Only macOS and Windows are promoted, elsewhere the guard does nothing.
pub struct RealTimeAudioPriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  handle: Option<audio_thread_priority::RtPriorityHandle>,
}

impl RealTimeAudioPriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  pub fn promote(sample_rate: u32, frames: u32) -> Result<RealTimeAudioPriority, RealTimePriorityError> {
    audio_thread_priority::promote_current_thread_to_real_time(frames, sample_rate)
      .map(|handle| RealTimeAudioPriority {
        handle: Some(handle),
      })
      .map_err(|_| RealTimePriorityError {
        thread: current_thread_name(),
      })
  }

  // TODO promote through rtkit on linux
  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  pub fn promote(_sample_rate: u32, _frames: u32) -> Result<RealTimeAudioPriority, RealTimePriorityError> {
    log::trace!("No real-time promotion for {} on this platform", current_thread_name());
    Ok(RealTimeAudioPriority {})
  }
}

impl Drop for RealTimeAudioPriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  fn drop(&mut self) {
    if let Some(handle) = self.handle.take() {
      drop(audio_thread_priority::demote_current_thread_from_real_time(handle));
    }
  }

  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  fn drop(&mut self) {}
}

fn current_thread_name() -> String {
  std::thread::current().name().unwrap_or("unnamed").to_string()
}

#[cfg(test)]
mod test {

  use super::RealTimePriorityError;

  #[test]
  pub fn error_names_the_thread() {
    let err = RealTimePriorityError {
      thread: "audio-driver".to_string(),
    };
    assert_eq!(
      err.to_string(),
      "The audio-driver thread could not be promoted to real time"
    );
  }
}
