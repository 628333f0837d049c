pub mod buffer;
pub mod decoder;
pub mod gain;
pub mod stereo;

pub use buffer::{new_buffer_pool, Buffer};
pub use decoder::AudioData;
pub use stereo::StereoBuffer;

pub const CHANNELS: usize = 2;
