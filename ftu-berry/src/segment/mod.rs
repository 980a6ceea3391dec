//! 结构内部的子区室分割 (细胞核, PAS 阳性区域, 管腔等).
//!
//! 按参数列表顺序依次认领像素: 每条规则只能在尚未被认领的 **剩余区域** 中取像素,
//! 取到的像素从剩余区域中移除. 全部规则执行后仍未被认领的像素归入最后一条规则.
//! 因此各子区室两两不相交, 且它们的并集恰为结构掩码.
//!
//! 名为 `nuclei` (不区分大小写) 的规则走细胞核流程:
//! 反转亮度 -> 掩码内局部直方图均衡化 -> 阈值 -> 填充小空洞 -> 距离变换
//! -> 局部极大值种子 -> 分水岭 -> 删除小对象.
//! 其余规则走饱和度阈值流程.

mod color;
mod equalize;
mod raster;
mod watershed;

pub use color::{inverted_luminance, saturation};
pub use equalize::equalize_masked;
pub use raster::{crop_structure_mask, StructureCrop};
pub use watershed::{distance_transform, find_peaks, remove_small_labels, watershed};

use crate::consts::gray::{is_foreground, MASK_FOREGROUND};
use crate::consts::{rgb, NUCLEI_HOLE_AREA, NUCLEI_RULE, PEAK_MIN_DISTANCE};
use crate::data::{MaskSlice, OwnedMask};
use log::debug;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Zip};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 一条子区室分割规则.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationParam {
    /// 子区室名称.
    pub name: String,

    /// 阈值, 特征值严格大于该值的像素被选中.
    pub threshold: u8,

    /// 小于该面积 (像素) 的对象被删除.
    pub min_object_size: usize,

    /// 绘制颜色.
    pub draw_color: [u8; 3],
}

impl SegmentationParam {
    /// 创建一条规则.
    pub fn new<S: Into<String>>(name: S, threshold: u8, min_object_size: usize, draw_color: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            threshold,
            min_object_size,
            draw_color,
        }
    }

    /// 是否走细胞核流程?
    #[inline]
    pub fn is_nuclei(&self) -> bool {
        self.name.eq_ignore_ascii_case(NUCLEI_RULE)
    }
}

/// 默认规则: 细胞核, PAS, 管腔 (兜底).
pub static DEFAULT_PARAMS: Lazy<Vec<SegmentationParam>> = Lazy::new(|| {
    vec![
        SegmentationParam::new("Nuclei", 120, 20, rgb::NUCLEI),
        SegmentationParam::new("PAS", 50, 20, rgb::PAS),
        SegmentationParam::new("Luminal Space", 0, 0, rgb::LUMINAL_SPACE),
    ]
});

/// 输出视图.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// 彩色掩码按透明度叠加在原图上.
    #[default]
    Overlaid,

    /// 原图与彩色掩码左右拼接, 宽度加倍.
    SideBySide,
}

/// 无法识别的视图名称.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown view mode `{0}`, expected `Overlaid` or `Side-by-side`")]
pub struct ParseViewModeError(String);

impl FromStr for ViewMode {
    type Err = ParseViewModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Overlaid" => Ok(Self::Overlaid),
            "Side-by-side" => Ok(Self::SideBySide),
            other => Err(ParseViewModeError(other.to_string())),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlaid => write!(f, "Overlaid"),
            Self::SideBySide => write!(f, "Side-by-side"),
        }
    }
}

/// 细胞核流程的开关.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmenterOptions {
    /// 阈值之前是否做掩码内局部直方图均衡化.
    pub equalize: bool,

    /// 是否用距离变换 + 分水岭拆分相互接触的细胞核.
    pub split_touching: bool,
}

impl Default for SegmenterOptions {
    fn default() -> Self {
        Self {
            equalize: true,
            split_touching: true,
        }
    }
}

/// 单条规则的统计信息.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    /// 规则名称.
    pub name: String,

    /// 认领的像素数. 最后一条规则包含兜底像素.
    pub pixels: usize,

    /// 规则自身检出的对象个数 (不含兜底像素).
    pub objects: usize,
}

/// 分割结果.
#[derive(Clone, Debug)]
pub struct SubCompartments {
    /// 0 为结构外, `i + 1` 为第 `i` 条规则.
    labels: Array2<u8>,
    stats: Vec<RuleStats>,
}

impl SubCompartments {
    /// 逐像素标签图.
    #[inline]
    pub fn labels(&self) -> ArrayView2<u8> {
        self.labels.view()
    }

    /// 每条规则的统计信息, 与参数顺序一致.
    #[inline]
    pub fn stats(&self) -> &[RuleStats] {
        &self.stats
    }

    /// 第 `i` 条规则认领的像素.
    pub fn mask_of(&self, i: usize) -> OwnedMask {
        let label = i as u8 + 1;
        OwnedMask::from_raw(self.labels.mapv(|l| u8::from(l == label)))
    }

    /// 彩色掩码 `(h, w, 3)`. 结构外为黑色.
    pub fn colorize(&self, params: &[SegmentationParam]) -> Array3<u8> {
        assert!(
            params.len() >= self.stats.len(),
            "绘制参数 ({} 条) 少于分割规则 ({} 条)",
            params.len(),
            self.stats.len()
        );
        let (h, w) = self.labels.dim();
        Array3::from_shape_fn((h, w, 3), |(r, c, ch)| match self.labels[(r, c)] {
            0 => rgb::BLACK[ch],
            l => params[l as usize - 1].draw_color[ch],
        })
    }

    /// 按 `mode` 渲染. `transparency` 为叠加视图中彩色掩码的不透明度.
    pub fn render(
        &self,
        crop: ArrayView3<u8>,
        params: &[SegmentationParam],
        mode: ViewMode,
        transparency: f64,
    ) -> Array3<u8> {
        assert!((0.0..=1.0).contains(&transparency), "透明度必须位于 [0, 1]");
        let (h, w, _) = crop.dim();
        assert_eq!(self.labels.dim(), (h, w), "裁剪图像与标签图形状不符");
        let colored = self.colorize(params);
        match mode {
            ViewMode::SideBySide => {
                let mut out = Array3::<u8>::zeros((h, w * 2, 3));
                out.slice_mut(s![.., ..w, ..]).assign(&crop);
                out.slice_mut(s![.., w.., ..]).assign(&colored);
                out
            }
            ViewMode::Overlaid => {
                let mut out = crop.to_owned();
                for r in 0..h {
                    for c in 0..w {
                        let color = [colored[(r, c, 0)], colored[(r, c, 1)], colored[(r, c, 2)]];
                        if color == rgb::BLACK {
                            continue;
                        }
                        for (ch, v) in color.into_iter().enumerate() {
                            let orig = f64::from(crop[(r, c, ch)]);
                            let mixed = (1.0 - transparency) * orig + transparency * f64::from(v);
                            out[(r, c, ch)] = mixed.round().clamp(0.0, 255.0) as u8;
                        }
                    }
                }
                out
            }
        }
    }
}

/// 子区室分割器. 无内部状态, 可在多个线程间共享.
#[derive(Clone, Debug)]
pub struct SubCompartmentSegmenter {
    params: Vec<SegmentationParam>,
    options: SegmenterOptions,
}

impl Default for SubCompartmentSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_PARAMS.clone())
    }
}

impl SubCompartmentSegmenter {
    /// 使用给定规则列表创建分割器.
    ///
    /// 规则列表为空或多于 255 条时, 程序 panic.
    pub fn new(params: Vec<SegmentationParam>) -> Self {
        assert!(!params.is_empty(), "规则列表为空");
        assert!(params.len() <= u8::MAX as usize, "规则过多");
        Self {
            params,
            options: SegmenterOptions::default(),
        }
    }

    /// 替换细胞核流程开关.
    pub fn with_options(mut self, options: SegmenterOptions) -> Self {
        self.options = options;
        self
    }

    /// 规则列表.
    #[inline]
    pub fn params(&self) -> &[SegmentationParam] {
        &self.params
    }

    /// 细胞核流程开关.
    #[inline]
    pub fn options(&self) -> SegmenterOptions {
        self.options
    }

    /// 分割 RGB 裁剪图 `crop` `(h, w, 3)` 中 `mask` 为 `true` 的部分.
    ///
    /// 裁剪图为空, 通道数不为 3, 形状不符或掩码为空时, 程序 panic.
    pub fn segment(&self, crop: ArrayView3<u8>, mask: ArrayView2<bool>) -> SubCompartments {
        let (h, w, ch) = crop.dim();
        assert!(h > 0 && w > 0, "裁剪图像为空");
        assert_eq!(ch, 3, "裁剪图像必须为 RGB");
        assert_eq!(mask.dim(), (h, w), "裁剪图像与掩码形状不符");

        let structure = OwnedMask::from_bool(mask);
        assert!(structure.as_immut().foreground_len() > 0, "结构掩码为空");
        let mut remainder = structure.clone();
        let mut labels = Array2::<u8>::zeros((h, w));
        let mut stats = Vec::with_capacity(self.params.len());

        for (i, p) in self.params.iter().enumerate() {
            let (claimed, objects) = if p.is_nuclei() {
                self.nuclei(crop, &structure.as_immut(), &remainder.as_immut(), p)
            } else {
                saturation_rule(crop, &remainder.as_immut(), p)
            };
            let label = i as u8 + 1;
            let mut pixels = 0;
            Zip::from(&mut labels)
                .and(claimed.as_immut().array_view())
                .for_each(|l, &c| {
                    if is_foreground(c) {
                        *l = label;
                        pixels += 1;
                    }
                });
            remainder.as_mutable().subtract(&claimed.as_immut());
            stats.push(RuleStats {
                name: p.name.clone(),
                pixels,
                objects,
            });
            debug!("rule `{}`: {} px, {} objects", p.name, pixels, objects);
        }

        // 剩余像素归入最后一条规则
        let last = self.params.len() as u8;
        let mut leftover = 0;
        Zip::from(&mut labels)
            .and(remainder.as_immut().array_view())
            .for_each(|l, &r| {
                if is_foreground(r) {
                    *l = last;
                    leftover += 1;
                }
            });
        if let Some(s) = stats.last_mut() {
            s.pixels += leftover;
        }
        debug!("{leftover} leftover px assigned to the last rule");

        SubCompartments { labels, stats }
    }

    /// 分割并渲染.
    pub fn sub_segment_image(
        &self,
        crop: ArrayView3<u8>,
        mask: ArrayView2<bool>,
        mode: ViewMode,
        transparency: f64,
    ) -> Array3<u8> {
        assert!((0.0..=1.0).contains(&transparency), "透明度必须位于 [0, 1]");
        self.segment(crop, mask)
            .render(crop, &self.params, mode, transparency)
    }

    /// 细胞核流程. 返回认领的像素与对象个数.
    fn nuclei(
        &self,
        crop: ArrayView3<u8>,
        structure: &MaskSlice,
        remainder: &MaskSlice,
        p: &SegmentationParam,
    ) -> (OwnedMask, usize) {
        let mut channel = inverted_luminance(crop);
        if self.options.equalize {
            channel = equalize_masked(channel.view(), structure).mapv(f64::from);
        }
        let thr = f64::from(p.threshold);
        let mut binary = OwnedMask::from_raw(Zip::from(&channel).and(remainder.array_view()).map_collect(
            |&v, &r| u8::from(v > thr && is_foreground(r)),
        ));
        binary
            .as_mutable()
            .fill_small_holes(NUCLEI_HOLE_AREA, MASK_FOREGROUND);
        // 填充的空洞可能已被其他规则认领
        binary.as_mutable().subtract(&complement(remainder).as_immut());

        if !self.options.split_touching {
            let mut m = binary.as_mutable();
            m.remove_small_areas(p.min_object_size);
            let objects = m.foreground_areas().len();
            return (binary, objects);
        }

        let b = binary.as_immut();
        let dist = distance_transform(&b);
        let peaks = find_peaks(&dist, PEAK_MIN_DISTANCE);
        let mut objects = watershed(&dist, &b, &peaks);
        let count = remove_small_labels(&mut objects, p.min_object_size);
        let claimed = OwnedMask::from_raw(objects.mapv(|l| u8::from(l != 0)));
        (claimed, count)
    }

    /// 逐个分割多个互相独立的结构. 启用 `rayon` 特性时并行执行.
    pub fn segment_batch(
        &self,
        items: &[(ArrayView3<u8>, ArrayView2<bool>)],
    ) -> Vec<SubCompartments> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::prelude::*;
                items
                    .par_iter()
                    .map(|(crop, mask)| self.segment(crop.view(), mask.view()))
                    .collect()
            } else {
                items
                    .iter()
                    .map(|(crop, mask)| self.segment(crop.view(), mask.view()))
                    .collect()
            }
        }
    }
}

/// 掩码取反.
fn complement(mask: &MaskSlice) -> OwnedMask {
    OwnedMask::from_raw(mask.array_view().mapv(|p| u8::from(!is_foreground(p))))
}

/// 饱和度阈值流程. 返回认领的像素与对象个数.
fn saturation_rule(
    crop: ArrayView3<u8>,
    remainder: &MaskSlice,
    p: &SegmentationParam,
) -> (OwnedMask, usize) {
    let sat = saturation(crop);
    let thr = f64::from(p.threshold);
    let mut binary = OwnedMask::from_raw(
        Zip::from(&sat)
            .and(remainder.array_view())
            .map_collect(|&v, &r| u8::from(v > thr && is_foreground(r))),
    );
    let mut m = binary.as_mutable();
    m.remove_small_areas(p.min_object_size);
    let objects = m.foreground_areas().len();
    (binary, objects)
}

/// 使用 `params` 分割并渲染一个结构.
///
/// 这是 [`SubCompartmentSegmenter`] 的便捷入口, 使用默认的 [`SegmenterOptions`].
pub fn sub_segment_image(
    crop: ArrayView3<u8>,
    mask: ArrayView2<bool>,
    params: &[SegmentationParam],
    mode: ViewMode,
    transparency: f64,
) -> Array3<u8> {
    SubCompartmentSegmenter::new(params.to_vec()).sub_segment_image(crop, mask, mode, transparency)
}
