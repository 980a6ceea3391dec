//! 由 RGB 图像导出单通道特征.

use ndarray::{Array2, ArrayView3, Axis};

/// 反转亮度: `255 - (0.2125 R + 0.7154 G + 0.0721 B)`. 细胞核 (深色) 取值高.
pub fn inverted_luminance(crop: ArrayView3<u8>) -> Array2<f64> {
    crop.map_axis(Axis(2), |px| {
        let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
        255.0 - (0.2125 * r + 0.7154 * g + 0.0721 * b)
    })
}

/// HSV 饱和度, 缩放到 `[0, 255]`. 纯黑像素的饱和度为 0.
pub fn saturation(crop: ArrayView3<u8>) -> Array2<f64> {
    crop.map_axis(Axis(2), |px| {
        let max = px.iter().copied().max().unwrap_or(0) as f64;
        let min = px.iter().copied().min().unwrap_or(0) as f64;
        if max == 0.0 {
            0.0
        } else {
            (max - min) / max * 255.0
        }
    })
}
