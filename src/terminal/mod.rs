pub mod buffer;
pub mod keys;
pub mod pipeline;

pub use buffer::{MAX_OUTPUT_BUFFER, OutputBuffer, TRIMMED_OUTPUT_BUFFER};
pub use keys::key_to_bytes;
pub use pipeline::{PipelineSink, TerminalPipeline};
