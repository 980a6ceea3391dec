//! 距离变换 + 局部极大值种子 + 分水岭, 用于拆分相互接触的细胞核.

use crate::consts::gray::is_foreground;
use crate::data::MaskSlice;
use crate::Idx2d;
use binary_heap_plus::BinaryHeap;
use itertools::Itertools;
use ndarray::Array2;
use ordered_float::OrderedFloat;
use std::collections::HashMap;

/// 一维平方距离变换 (Felzenszwalb & Huttenlocher). `f` 中 `INFINITY` 表示前景.
fn edt_1d(f: &[f64], out: &mut [f64]) {
    let n = f.len();
    let mut v = vec![0usize; n];
    let mut z = vec![0f64; n + 1];
    let mut k = 0usize;
    // 寻找第一个有限值作为下包络起点
    let Some(first) = f.iter().position(|x| x.is_finite()) else {
        out.iter_mut().for_each(|o| *o = f64::INFINITY);
        return;
    };
    v[0] = first;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in (first + 1)..n {
        if !f[q].is_finite() {
            continue;
        }
        let parabola_cross = |p: usize| {
            ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q as f64 - p as f64))
        };
        // z[0] 为 -inf, 循环必在 k == 0 处停止
        let mut s = parabola_cross(v[k]);
        while s <= z[k] {
            k -= 1;
            s = parabola_cross(v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let d = q as f64 - p as f64;
        *o = d * d + f[p];
    }
}

/// 前景像素到最近背景像素的欧氏距离. 图像外部视为背景.
pub fn distance_transform(mask: &MaskSlice) -> Array2<f64> {
    let (h, w) = mask.shape();
    // 四周各填充一圈背景
    let (ph, pw) = (h + 2, w + 2);
    let mut grid = Array2::<f64>::from_elem((ph, pw), 0.0);
    for ((r, c), &p) in mask.indexed_iter() {
        if is_foreground(p) {
            grid[(r + 1, c + 1)] = f64::INFINITY;
        }
    }

    let mut buf_in = vec![0f64; ph.max(pw)];
    let mut buf_out = vec![0f64; ph.max(pw)];
    for c in 0..pw {
        for r in 0..ph {
            buf_in[r] = grid[(r, c)];
        }
        edt_1d(&buf_in[..ph], &mut buf_out[..ph]);
        for r in 0..ph {
            grid[(r, c)] = buf_out[r];
        }
    }
    for r in 0..ph {
        for c in 0..pw {
            buf_in[c] = grid[(r, c)];
        }
        edt_1d(&buf_in[..pw], &mut buf_out[..pw]);
        for c in 0..pw {
            grid[(r, c)] = buf_out[c];
        }
    }

    Array2::from_shape_fn((h, w), |(r, c)| grid[(r + 1, c + 1)].sqrt())
}

/// 距离图上的局部极大值, 作为分水岭种子.
///
/// 候选点须为 `(2 * min_distance + 1)` 窗口内的最大值; 随后按距离从大到小贪心选取,
/// 与已选种子的切比雪夫距离不超过 `min_distance` 的候选点被舍弃.
pub fn find_peaks(dist: &Array2<f64>, min_distance: usize) -> Vec<Idx2d> {
    let (h, w) = dist.dim();
    let md = min_distance.max(1);
    let is_local_max = |(r, c): Idx2d| {
        let v = dist[(r, c)];
        let (r0, r1) = (r.saturating_sub(md), (r + md + 1).min(h));
        let (c0, c1) = (c.saturating_sub(md), (c + md + 1).min(w));
        (r0..r1).all(|rr| (c0..c1).all(|cc| dist[(rr, cc)] <= v))
    };
    let candidates = dist
        .indexed_iter()
        .filter(|(p, v)| **v > 0.0 && is_local_max(*p))
        .map(|(p, v)| (p, *v))
        .sorted_by_key(|(p, v)| (std::cmp::Reverse(OrderedFloat(*v)), *p));

    let mut peaks: Vec<Idx2d> = Vec::new();
    for (p, _) in candidates {
        let close = peaks
            .iter()
            .any(|q| p.0.abs_diff(q.0) <= md && p.1.abs_diff(q.1) <= md);
        if !close {
            peaks.push(p);
        }
    }
    peaks
}

/// 以 `markers` 为种子, 在 `mask` 内对 `-dist` 做优先级洪泛 (4-邻接).
///
/// 返回标签图: 0 为背景, 种子 `i` 的区域标签为 `i + 1`. 同一优先级按入堆先后处理.
/// 洪泛结束后仍未标记的前景连通区域各自获得新标签.
pub fn watershed(dist: &Array2<f64>, mask: &MaskSlice, markers: &[Idx2d]) -> Array2<u32> {
    let (h, w) = mask.shape();
    let mut labels = Array2::<u32>::zeros((h, w));

    // 堆顶为距离最大 (即 -dist 最小) 且最早入堆的元素
    type Item = (f64, u64, Idx2d);
    let mut heap: BinaryHeap<Item, _> =
        BinaryHeap::new_by(|a: &Item, b: &Item| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
    let mut age = 0u64;
    for (i, &m) in markers.iter().enumerate() {
        if labels[m] == 0 && is_foreground(mask[m]) {
            labels[m] = i as u32 + 1;
            heap.push((dist[m], age, m));
            age += 1;
        }
    }

    while let Some((_, _, pos)) = heap.pop() {
        let label = labels[pos];
        for n in mask.n4_positions(pos) {
            if labels[n] == 0 && is_foreground(mask[n]) {
                labels[n] = label;
                heap.push((dist[n], age, n));
                age += 1;
            }
        }
    }

    let mut next = markers.len() as u32 + 1;
    let unlabeled: Vec<Idx2d> = mask
        .indexed_iter()
        .filter(|(p, v)| is_foreground(**v) && labels[*p] == 0)
        .map(|(p, _)| p)
        .collect();
    for area in mask.areas_from_local(unlabeled, is_foreground) {
        for p in area {
            labels[p] = next;
        }
        next += 1;
    }
    labels
}

/// 删除面积小于 `min_size` 的标签 (置 0), 返回剩余对象个数.
pub fn remove_small_labels(labels: &mut Array2<u32>, min_size: usize) -> usize {
    let mut sizes: HashMap<u32, usize> = HashMap::new();
    for &l in labels.iter().filter(|l| **l != 0) {
        *sizes.entry(l).or_insert(0) += 1;
    }
    labels.mapv_inplace(|l| match sizes.get(&l) {
        Some(&n) if n < min_size => 0,
        _ => l,
    });
    sizes.values().filter(|n| **n >= min_size).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OwnedMask;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    /// 暴力计算距离变换, 用于对照.
    fn brute_force(mask: &OwnedMask) -> Array2<f64> {
        let m = mask.as_immut();
        let (h, w) = m.shape();
        Array2::from_shape_fn((h, w), |(r, c)| {
            if !is_foreground(m[(r, c)]) {
                return 0.0;
            }
            let (r, c) = (r as i64 + 1, c as i64 + 1);
            let mut best = f64::INFINITY;
            for rr in 0..(h as i64 + 2) {
                for cc in 0..(w as i64 + 2) {
                    let inside = (1..=h as i64).contains(&rr) && (1..=w as i64).contains(&cc);
                    let bg = !inside || !is_foreground(m[((rr - 1) as usize, (cc - 1) as usize)]);
                    if bg {
                        let d = (((rr - r).pow(2) + (cc - c).pow(2)) as f64).sqrt();
                        best = best.min(d);
                    }
                }
            }
            best
        })
    }

    #[test]
    fn test_distance_transform_matches_brute_force() {
        let raw = Array2::from_shape_fn((9, 11), |(r, c)| {
            u8::from((r as i64 - 4).pow(2) + (c as i64 - 5).pow(2) <= 12 || (r == 0 && c < 3))
        });
        let mask = OwnedMask::from_raw(raw);
        let fast = distance_transform(&mask.as_immut());
        let slow = brute_force(&mask);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert!(f64_eq(*a, *b), "{a} vs {b}");
        }
        // 图像边缘的前景像素距离为 1
        assert!(f64_eq(fast[(0, 0)], 1.0));
    }

    /// 两个相切的圆应被拆成两个对象.
    #[test]
    fn test_watershed_splits_touching_disks() {
        let (h, w) = (21, 40);
        let in_disk = |r: i64, c: i64, cr: i64, cc: i64| (r - cr).pow(2) + (c - cc).pow(2) <= 64;
        let raw = Array2::from_shape_fn((h, w), |(r, c)| {
            let (r, c) = (r as i64, c as i64);
            u8::from(in_disk(r, c, 10, 11) || in_disk(r, c, 10, 26))
        });
        let mask = OwnedMask::from_raw(raw);
        let m = mask.as_immut();
        assert_eq!(m.foreground_areas().len(), 1);

        let dist = distance_transform(&m);
        let peaks = find_peaks(&dist, 3);
        assert_eq!(peaks.len(), 2);
        let mut labels = watershed(&dist, &m, &peaks);
        assert_eq!(labels[(10, 11)], 1);
        assert_eq!(labels[(10, 26)], 2);
        for ((r, c), &p) in m.indexed_iter() {
            assert_eq!(labels[(r, c)] != 0, is_foreground(p));
        }
        assert_eq!(remove_small_labels(&mut labels, 10), 2);
        assert_eq!(remove_small_labels(&mut labels, 10_000), 0);
        assert!(labels.iter().all(|l| *l == 0));
    }

    /// 没有种子的连通区域也会获得标签.
    #[test]
    fn test_unseeded_components_labeled() {
        let raw = ndarray::array![[1, 1, 0, 0, 1], [1, 1, 0, 0, 1]];
        let mask = OwnedMask::from_raw(raw);
        let m = mask.as_immut();
        let dist = distance_transform(&m);
        let labels = watershed(&dist, &m, &[(0, 0)]);
        assert_eq!(labels[(1, 1)], 1);
        assert_eq!(labels[(0, 4)], 2);
        assert_eq!(labels[(1, 4)], 2);
        assert_eq!(labels[(0, 2)], 0);
    }
}
