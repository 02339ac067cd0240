//! Image-level processing: pyramid construction, bilinear sampling, patch
//! extraction and corner scoring over plain grayscale buffers.

pub mod interp;
pub mod pyramid;
pub mod score;

pub use interp::{bilinear, extract_patch};
pub use pyramid::ImagePyramid;
pub use score::shi_tomasi;
