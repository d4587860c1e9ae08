mod array;
mod dtype;
mod element;
mod error;
mod logging;
mod shuffle;
mod source_data;

pub use array::Array;
pub use dtype::DType;
pub use element::Element;
pub use error::ArrayError;
pub use logging::{init_logging, LogOutput};
pub use shuffle::Shuffle;
pub use source_data::SourceData;
