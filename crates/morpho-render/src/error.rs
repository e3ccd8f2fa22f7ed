use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Layer has no extent to map (no geometry, or zero-size canvas).
    #[error("nothing to draw: {0}")]
    Empty(&'static str),
}

pub type Result<T> = std::result::Result<T, RenderError>;
