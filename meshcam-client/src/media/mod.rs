mod local_media;
mod media_source;
mod synthetic_source;

pub use local_media::*;
pub use media_source::*;
pub use synthetic_source::*;
