pub mod buffer;
pub mod producer;

pub use buffer::{FrameReader, Published, SharedFrameBuffer, WaitOutcome};
pub use producer::{FrameProducer, ProducerConfig, ProducerHandle, ProducerStats, StopSignal};
