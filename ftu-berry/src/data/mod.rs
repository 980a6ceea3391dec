//! 二维掩码与图像持久化.

pub mod mask;

pub use mask::{ImgWriteRaw, ImgWriteVis, MaskSlice, MaskSliceMut, OwnedMask};
