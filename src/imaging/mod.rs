// Image operations behind the HTTP API.
// `backend` wraps the `image` crate, `transform` implements one function
// per endpoint on top of it.

pub mod backend;
pub mod codec;
pub mod transform;
pub mod watermark;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("image library error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error while reading image: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("{width}x{height} output needs {required} bytes, limit is {limit}")]
    TooLarge {
        width: u32,
        height: u32,
        required: u64,
        limit: u64,
    },
}
