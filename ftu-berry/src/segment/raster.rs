//! 将像素坐标下的结构轮廓栅格化为裁剪图上的掩码.

use crate::data::OwnedMask;
use crate::Idx2d;
use geo::Coord;
use ndarray::Array2;

/// 结构的裁剪窗口及其掩码.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureCrop {
    /// 裁剪窗口左上角在整张图像中的 `(行, 列)`.
    pub origin: Idx2d,

    /// 窗口内的二值掩码.
    pub mask: OwnedMask,
}

/// 偶奇规则: 像素中心 `(x, y)` 是否在环内.
fn contains_even_odd(ring: &[Coord<f64>], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        if (a.y > y) != (b.y > y) {
            let cross_x = a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x);
            if x < cross_x {
                inside = !inside;
            }
        }
    }
    inside
}

/// 栅格化像素坐标下的多边形 `ring`, 窗口为其外接矩形与图像 `(宽, 高)` 的交集.
///
/// 像素中心落在多边形内 (偶奇规则) 的像素为前景. 多边形与图像无交集时返回 `None`.
pub fn crop_structure_mask(ring: &[Coord<f64>], image_size: (usize, usize)) -> Option<StructureCrop> {
    if ring.len() < 3 {
        return None;
    }
    let (img_w, img_h) = image_size;
    let (min_x, max_x) = ring
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.x), hi.max(c.x)));
    let (min_y, max_y) = ring
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.y), hi.max(c.y)));
    if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
        return None;
    }

    let col0 = min_x.floor().max(0.0) as usize;
    let row0 = min_y.floor().max(0.0) as usize;
    let col1 = (max_x.ceil().max(0.0) as usize).min(img_w);
    let row1 = (max_y.ceil().max(0.0) as usize).min(img_h);
    if col0 >= col1 || row0 >= row1 {
        return None;
    }

    let data = Array2::from_shape_fn((row1 - row0, col1 - col0), |(r, c)| {
        let (x, y) = ((col0 + c) as f64 + 0.5, (row0 + r) as f64 + 0.5);
        u8::from(contains_even_odd(ring, x, y))
    });
    Some(StructureCrop {
        origin: (row0, col0),
        mask: OwnedMask::from_raw(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_square() {
        let ring = [
            coord! { x: 2.0, y: 3.0 },
            coord! { x: 6.0, y: 3.0 },
            coord! { x: 6.0, y: 5.0 },
            coord! { x: 2.0, y: 5.0 },
        ];
        let crop = crop_structure_mask(&ring, (100, 100)).unwrap();
        assert_eq!(crop.origin, (3, 2));
        let m = crop.mask.as_immut();
        assert_eq!(m.shape(), (2, 4));
        assert_eq!(m.foreground_len(), 8);
    }

    #[test]
    fn test_triangle_half() {
        let ring = [
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 0.0, y: 10.0 },
        ];
        let crop = crop_structure_mask(&ring, (100, 100)).unwrap();
        let m = crop.mask.as_immut();
        // 严格在对角线以下的像素中心: r + c < 9
        assert_eq!(m.foreground_len(), 45);
        assert_eq!(m[(0, 0)], 1);
        assert_eq!(m[(9, 9)], 0);
    }

    #[test]
    fn test_clamped_to_image() {
        let ring = [
            coord! { x: -5.0, y: -5.0 },
            coord! { x: 5.0, y: -5.0 },
            coord! { x: 5.0, y: 5.0 },
            coord! { x: -5.0, y: 5.0 },
        ];
        let crop = crop_structure_mask(&ring, (3, 4)).unwrap();
        assert_eq!(crop.origin, (0, 0));
        assert_eq!(crop.mask.as_immut().shape(), (4, 3));
        assert_eq!(crop.mask.as_immut().foreground_len(), 12);

        let outside = [
            coord! { x: 50.0, y: 50.0 },
            coord! { x: 60.0, y: 50.0 },
            coord! { x: 60.0, y: 60.0 },
        ];
        assert!(crop_structure_mask(&outside, (10, 10)).is_none());
    }
}
