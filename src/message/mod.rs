pub mod key_format;
pub mod materializer;
pub mod types;

pub use key_format::{DefaultKeyFormat, KeyFormatStrategy, PassThroughKeyFormat};
pub use materializer::{DefaultMessageMaterializer, MessageMaterializer};
pub use types::*;
