//! 限制对比度的局部直方图均衡化, 只统计并输出掩码内的像素.

use crate::consts::gray::is_foreground;
use crate::consts::{CLAHE_CLIP_LIMIT, CLAHE_TILES};
use crate::data::MaskSlice;
use ndarray::{Array2, ArrayView2};

const BINS: usize = 256;

/// 单个分块的灰度映射表. 分块内没有掩码像素时为恒等映射.
fn tile_mapping(values: impl Iterator<Item = u8>, tile_pixels: usize) -> [f64; BINS] {
    let mut hist = [0usize; BINS];
    let mut n = 0usize;
    for v in values {
        hist[v as usize] += 1;
        n += 1;
    }
    let mut map = [0f64; BINS];
    if n == 0 {
        for (i, m) in map.iter_mut().enumerate() {
            *m = i as f64;
        }
        return map;
    }

    // 裁剪并均匀回填超出部分
    let clip = ((CLAHE_CLIP_LIMIT * tile_pixels as f64) as usize).max(1);
    let mut excess = 0usize;
    for h in hist.iter_mut() {
        if *h > clip {
            excess += *h - clip;
            *h = clip;
        }
    }
    let each = excess as f64 / BINS as f64;

    let scale = 255.0 / n as f64;
    let mut cdf = 0f64;
    for (h, m) in hist.iter().zip(map.iter_mut()) {
        cdf += *h as f64 + each;
        *m = (cdf * scale).min(255.0);
    }
    map
}

/// 沿一个维度求插值位置: `(下方分块, 上方分块, 上方权重)`.
#[inline]
fn interp_axis(pos: usize, tile: usize, tiles: usize) -> (usize, usize, f64) {
    let f = ((pos as f64 + 0.5) / tile as f64 - 0.5).clamp(0.0, (tiles - 1) as f64);
    let lo = f.floor() as usize;
    let hi = (lo + 1).min(tiles - 1);
    (lo, hi, f - lo as f64)
}

/// 对 `channel` (取值 `[0, 255]`) 做掩码内的局部直方图均衡化.
///
/// 图像被划分为 `CLAHE_TILES x CLAHE_TILES` 个分块, 每块只统计掩码内像素,
/// 相邻分块的映射之间做双线性插值. 掩码外像素输出 0.
pub fn equalize_masked(channel: ArrayView2<f64>, mask: &MaskSlice) -> Array2<u8> {
    let (h, w) = mask.shape();
    assert_eq!(channel.dim(), (h, w), "通道与掩码形状不符");
    let quant = channel.mapv(|v| v.round().clamp(0.0, 255.0) as u8);

    let ny = CLAHE_TILES.min(h).max(1);
    let nx = CLAHE_TILES.min(w).max(1);
    let th = (h + ny - 1) / ny;
    let tw = (w + nx - 1) / nx;

    let mut maps = vec![[0f64; BINS]; ny * nx];
    for ty in 0..ny {
        for tx in 0..nx {
            let (h0, h1) = (ty * th, ((ty + 1) * th).min(h));
            let (w0, w1) = (tx * tw, ((tx + 1) * tw).min(w));
            let values = (h0..h1)
                .flat_map(|r| (w0..w1).map(move |c| (r, c)))
                .filter(|p| is_foreground(mask[*p]))
                .map(|p| quant[p]);
            maps[ty * nx + tx] = tile_mapping(values, th * tw);
        }
    }

    let mut out = Array2::<u8>::zeros((h, w));
    for ((r, c), o) in out.indexed_iter_mut() {
        if !is_foreground(mask[(r, c)]) {
            continue;
        }
        let v = quant[(r, c)] as usize;
        let (y0, y1, ay) = interp_axis(r, th, ny);
        let (x0, x1, ax) = interp_axis(c, tw, nx);
        let top = maps[y0 * nx + x0][v] * (1.0 - ax) + maps[y0 * nx + x1][v] * ax;
        let bottom = maps[y1 * nx + x0][v] * (1.0 - ax) + maps[y1 * nx + x1][v] * ax;
        *o = (top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OwnedMask;
    use ndarray::Array2;

    /// 掩码外输出 0.
    #[test]
    fn test_outside_mask_is_zero() {
        let (h, w) = (16, 16);
        let channel = Array2::from_shape_fn((h, w), |(r, c)| ((r * w + c) % 200) as f64);
        let mask = OwnedMask::from_raw(Array2::from_shape_fn((h, w), |(_, c)| u8::from(c < 12)));
        let out = equalize_masked(channel.view(), &mask.as_immut());
        for r in 0..h {
            for c in 12..w {
                assert_eq!(out[(r, c)], 0);
            }
        }
        assert!(out.iter().any(|v| *v > 0));
    }

    /// 每个分块只有一个像素时, 掩码内像素都被拉伸到 255.
    #[test]
    fn test_single_pixel_tiles_saturate() {
        let channel = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f64);
        let mask = OwnedMask::from_raw(Array2::from_shape_fn((8, 8), |(r, _)| u8::from(r != 3)));
        let out = equalize_masked(channel.view(), &mask.as_immut());
        for ((r, _), v) in out.indexed_iter() {
            assert_eq!(*v, if r == 3 { 0 } else { 255 });
        }
    }

    #[test]
    fn test_tile_mapping_identity_on_empty() {
        let m = tile_mapping(std::iter::empty(), 16);
        assert_eq!(m[0], 0.0);
        assert_eq!(m[255], 255.0);
    }

    #[test]
    fn test_tile_mapping_full_range() {
        let m = tile_mapping([10u8, 20, 30, 40].into_iter(), 4);
        assert_eq!(m[255], 255.0);
        assert!(m[10] < m[40]);
    }
}
