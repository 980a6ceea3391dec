//! 图像的持久化存储.

use super::{MaskSlice, MaskSliceMut, OwnedMask};
use crate::consts::gray::{is_foreground, BLACK, WHITE};
use image::ImageResult;
use ndarray::{Array3, ArrayView3};
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于掩码, 背景保存为黑色, 其余任何像素值都保存为白色.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

#[inline]
fn pretty(p: u8) -> u8 {
    if is_foreground(p) {
        WHITE
    } else {
        BLACK
    }
}

macro_rules! impl_mask_vis {
    ($($slice: ty),+) => {
        $(
            /// 前景白色, 背景黑色.
            impl ImgWriteVis for $slice {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    let (height, width) = self.shape();
                    let mut buf = image::GrayImage::new(width as u32, height as u32);
                    for ((h, w), &pix) in self.indexed_iter() {
                        buf.put_pixel(w as u32, h as u32, image::Luma([pretty(pix)]));
                    }
                    buf.save(path)
                }
            }
        )+
    };
}

impl_mask_vis!(MaskSlice<'_>, MaskSliceMut<'_>);

impl ImgWriteVis for OwnedMask {
    #[inline]
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        self.as_immut().save(path)
    }
}

/// 按原样存储 `(高, 宽, 3)` 的 RGB 图像.
impl ImgWriteRaw for ArrayView3<'_, u8> {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let &[height, width, c] = self.shape() else {
            unreachable!()
        };
        assert_eq!(c, 3, "只支持三通道图像");
        let mut buf = image::RgbImage::new(width as u32, height as u32);
        for (w, h, px) in buf.enumerate_pixels_mut() {
            let (h, w) = (h as usize, w as usize);
            *px = image::Rgb([self[(h, w, 0)], self[(h, w, 1)], self[(h, w, 2)]]);
        }
        buf.save(path)
    }
}

impl ImgWriteRaw for Array3<u8> {
    #[inline]
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        self.view().save_raw(path)
    }
}
