pub mod mask;

pub use mask::{binarize, cutout};

/// Alpha of a pixel kept by the mask.
pub const OPAQUE: u8 = u8::MAX;
/// Alpha of a background pixel.
pub const TRANSPARENT: u8 = 0;
