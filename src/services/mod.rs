//! Services separating I/O and format handling from the pipeline

pub mod format;
pub mod io;

pub use format::OutputFormatHandler;
pub use io::{ImageIOService, RequestDecoder, DEFAULT_IMAGE_ARGUMENT, MASKED_IMAGE_ARGUMENT};
