//! 二维掩码及其基础形态学操作.

mod core;
mod iter;
mod save;

pub use self::core::{MaskSlice, MaskSliceMut, OwnedMask};
pub use save::{ImgWriteRaw, ImgWriteVis};
