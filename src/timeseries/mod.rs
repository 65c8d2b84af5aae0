//! Time series primitives: samples, the time-addressed ring buffer, the
//! resampler and the moving window that ties them together.
pub mod alignment;
pub mod moving_window;
pub mod resampling;
pub mod ring_buffer;
pub mod sample;

pub use moving_window::{Key, MovingWindow, MovingWindowBuilder, Selection};
pub use resampling::{Resampler, ResamplerConfig, ResamplingFunction, Sink};
pub use ring_buffer::OrderedRingBuffer;
pub use sample::{Sample, UNIX_EPOCH};
