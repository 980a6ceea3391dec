use crate::consts::gray::*;
use crate::{Area2d, Areas2d, Idx2d, Predicate};
use ndarray::iter::{Iter, IterMut};
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2};
use std::collections::{HashSet, VecDeque};
use std::ops::{Index, IndexMut};

/// 4-邻域偏移 `(dh, dw)`: 上, 下, 左, 右.
const N4_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// 不可变、借用的二维掩码.
///
/// 像素为 0 代表背景, 其余值的含义由使用者决定
/// (二值掩码中为 1, 标签图中为连通对象编号或规则编号).
pub struct MaskSlice<'a> {
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for MaskSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维掩码.
pub struct MaskSliceMut<'a> {
    data: ArrayViewMut2<'a, u8>,
}

/// 可变方法集合.
impl<'a> MaskSliceMut<'a> {
    /// 获取可以迭代并修改像素的迭代器.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, u8, Ix2> {
        self.data.iter_mut()
    }

    /// 获取给定位置 (高, 宽) 的像素值, 并可就地修改. 越界时返回 `None`.
    #[inline]
    pub fn get_mut(&mut self, pos: Idx2d) -> Option<&mut u8> {
        self.data.get_mut(pos)
    }

    /// 将 `it` 中的每个索引对应的像素改为 `new`.
    pub fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            self[pos] = new;
        }
    }

    /// 删除所有面积小于 `min_size` 的 4-连通前景区域 (涂为背景).
    ///
    /// 返回被删除的像素总数.
    pub fn remove_small_areas(&mut self, min_size: usize) -> usize {
        let mut removed = 0;
        for area in self.foreground_areas() {
            if area.len() < min_size {
                removed += area.len();
                self.fill_batch(area, MASK_BACKGROUND);
            }
        }
        removed
    }

    /// 将所有面积小于 `max_size` 且不接触图像边缘的 4-连通背景区域 (即空洞)
    /// 填充为 `fill_with`. 返回被填充的像素总数.
    pub fn fill_small_holes(&mut self, max_size: usize, fill_with: u8) -> usize {
        let mut filled = 0;
        for area in self.areas(is_background) {
            if area.len() < max_size && !area.iter().any(|p| self.is_at_border(*p)) {
                filled += area.len();
                self.fill_batch(area, fill_with);
            }
        }
        filled
    }

    /// 将 `other` 中为前景的位置在 `self` 中涂为背景 (集合差).
    ///
    /// 如果两者形状不同, 则程序 panic.
    pub fn subtract(&mut self, other: &MaskSlice) {
        assert_eq!(self.shape(), other.shape(), "掩码形状不符");
        for (w, r) in self.iter_mut().zip(other.iter()) {
            if is_foreground(*r) {
                *w = MASK_BACKGROUND;
            }
        }
    }
}

impl Index<Idx2d> for MaskSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for MaskSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// mask 不可变方法集合.
macro_rules! impl_mask_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得 **底层** 数据的一份不可变 shallow copy.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<u8> {
                self.data.view()
            }

            /// 获取可以迭代像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, u8, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&u8> {
                self.data.get(pos)
            }

            /// 该掩码是否为全背景?
            #[inline]
            pub fn is_background(&self) -> bool {
                self.data.iter().copied().all(is_background)
            }

            /// 掩码的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 掩码的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 统计值为 `label` 的像素总个数.
            #[inline]
            pub fn count(&self, label: u8) -> usize {
                self.data.iter().filter(|&p| *p == label).count()
            }

            /// 统计前景像素总个数.
            #[inline]
            pub fn foreground_len(&self) -> usize {
                self.data.iter().filter(|&p| is_foreground(*p)).count()
            }

            /// 获得高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 判断一个索引是否位于图像的边缘.
            #[inline]
            pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
                h == 0
                    || h.saturating_add(1) == self.height()
                    || w == 0
                    || w.saturating_add(1) == self.width()
            }

            /// 按上, 下, 左, 右的顺序迭代 `(h, w)` 的 4-邻域像素索引. 越界的邻居被跳过.
            pub fn n4_positions(&self, (h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
                let (h_len, w_len) = self.shape();
                N4_OFFSETS.into_iter().filter_map(move |(dh, dw)| {
                    let p = (h.checked_add_signed(dh)?, w.checked_add_signed(dw)?);
                    (p.0 < h_len && p.1 < w_len).then_some(p)
                })
            }

            /// 以行优先规则, 获取能迭代所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                super::iter::PosIter::new(self.shape())
            }

            /// 以行优先规则, 获取能迭代所有 `(索引, 像素值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
                self.data.indexed_iter()
            }

            /// 前景的包围盒 `(h_min, w_min, h_max, w_max)`, 上下界均包含.
            /// 全背景时返回 `None`.
            pub fn foreground_bounds(&self) -> Option<(usize, usize, usize, usize)> {
                self.indexed_iter()
                    .filter(|(_, p)| is_foreground(**p))
                    .fold(None, |acc, ((h, w), _)| match acc {
                        None => Some((h, w, h, w)),
                        Some((h0, w0, h1, w1)) => {
                            Some((h0.min(h), w0.min(w), h1.max(h), w1.max(w)))
                        }
                    })
            }

            /// 按照 4-相邻规则获取所有区域. 两个像素 `p1` 和 `p2` 属于同一个区域,
            /// 当且仅当存在一条从 `p1` 到 `p2` 的 4-相邻路径, 且路径上的所有像素
            /// (包括 `p1` 和 `p2`) 都满足谓词 `pred`.
            pub fn areas(&self, pred: Predicate) -> Areas2d {
                self.areas_from_local(self.pos_iter(), pred)
            }

            /// 按照 4-相邻原则获得所有前景区域.
            #[inline]
            pub fn foreground_areas(&self) -> Areas2d {
                self.areas(is_foreground)
            }

            /// 按照 4-相邻规则获取所有区域, 但区域起点范围由 `it` 指定.
            pub fn areas_from_local<I: IntoIterator<Item = Idx2d>>(
                &self,
                it: I,
                pred: Predicate,
            ) -> Areas2d {
                let mut ans = Areas2d::with_capacity(1);
                let mut bfs_q = VecDeque::with_capacity(4);
                let mut set = HashSet::with_capacity(16);

                for pos in it.into_iter() {
                    if set.contains(&pos) || !pred(self[pos]) {
                        continue;
                    }
                    bfs_q.push_back(pos);
                    let mut this_area = Area2d::with_capacity(1);
                    while let Some(cur_pos) = bfs_q.pop_front() {
                        if !set.insert(cur_pos) {
                            continue;
                        }
                        this_area.push(cur_pos);
                        for neigh in self.n4_positions(cur_pos) {
                            if pred(self[neigh]) && !set.contains(&neigh) {
                                bfs_q.push_back(neigh);
                            }
                        }
                    }
                    ans.push(this_area);
                }
                ans
            }

            /// 克隆自己, 获得一个拥有所有权的掩码.
            pub fn to_owned(&self) -> OwnedMask {
                OwnedMask {
                    data: self.data.to_owned(),
                }
            }
        }
    };
}
impl_mask_slice_immut!('a, MaskSlice<'a>, ArrayView2<'a, u8>);
impl_mask_slice_immut!('a, MaskSliceMut<'a>, ArrayViewMut2<'a, u8>);

/// 拥有所有权的二维掩码.
///
/// `OwnedMask` 仅提供到 `MaskSlice` 和 `MaskSliceMut`
/// 的轻量转换和底层数据移动, 以及和布尔数组之间的转换.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedMask {
    data: Array2<u8>,
}

impl OwnedMask {
    /// 创建形状为 `(h, w)` 的全背景掩码.
    #[inline]
    pub fn zeros(shape: Idx2d) -> Self {
        Self {
            data: Array2::zeros(shape),
        }
    }

    /// 直接包装底层数据.
    #[inline]
    pub fn from_raw(data: Array2<u8>) -> Self {
        Self { data }
    }

    /// 从布尔数组创建二值掩码. `true` 为前景.
    pub fn from_bool(mask: ArrayView2<bool>) -> Self {
        Self {
            data: mask.mapv(|b| if b { MASK_FOREGROUND } else { MASK_BACKGROUND }),
        }
    }

    /// 转换为布尔数组. 非零即前景.
    pub fn to_bool(&self) -> Array2<bool> {
        self.data.mapv(is_foreground)
    }

    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immut(&self) -> MaskSlice<'_> {
        MaskSlice::new(self.data.view())
    }

    /// 获得可变切片引用.
    #[inline]
    pub fn as_mutable(&mut self) -> MaskSliceMut<'_> {
        MaskSliceMut::new(self.data.view_mut())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<u8> {
        self.data
    }
}
