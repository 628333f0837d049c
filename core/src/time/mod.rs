pub mod clock;
pub mod drift_correction;
pub mod tempo;
pub mod ticks;

pub use self::clock::ClockTime;
pub use self::drift_correction::TicksDriftCorrection;
pub use self::tempo::Tempo;
pub use self::ticks::TicksTime;

pub type SampleRate = u32;
