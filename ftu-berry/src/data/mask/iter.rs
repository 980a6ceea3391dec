use crate::Idx2d;

/// 行优先索引迭代器, 按 `(行, 列)` 产出 `(h, w)` 网格内的全部位置.
///
/// 内部只保存一个线性游标, 在逐像素遍历掩码时使用.
#[derive(Clone, Debug)]
pub struct PosIter {
    front: usize,
    back: usize,
    width: usize,
}

impl PosIter {
    #[inline]
    pub fn new((h, w): Idx2d) -> Self {
        Self {
            front: 0,
            back: h * w,
            width: w,
        }
    }

    #[inline]
    fn unflatten(&self, i: usize) -> Idx2d {
        (i / self.width, i % self.width)
    }
}

impl Iterator for PosIter {
    type Item = Idx2d;

    fn next(&mut self) -> Option<Self::Item> {
        (self.front < self.back).then(|| {
            self.front += 1;
            self.unflatten(self.front - 1)
        })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.back - self.front;
        (left, Some(left))
    }
}

impl DoubleEndedIterator for PosIter {
    fn next_back(&mut self) -> Option<Self::Item> {
        (self.front < self.back).then(|| {
            self.back -= 1;
            self.unflatten(self.back)
        })
    }
}

impl ExactSizeIterator for PosIter {}

#[cfg(test)]
mod tests {
    use super::PosIter;

    #[test]
    fn test_row_major_order() {
        for h in 0..=4 {
            for w in 0..=4 {
                let expected: Vec<_> = (0..h).flat_map(|r| (0..w).map(move |c| (r, c))).collect();
                assert_eq!(PosIter::new((h, w)).collect::<Vec<_>>(), expected);
                assert_eq!(PosIter::new((h, w)).len(), h * w);
            }
        }
    }

    #[test]
    fn test_both_ends() {
        let mut it = PosIter::new((2, 3));
        assert_eq!(it.next(), Some((0, 0)));
        assert_eq!(it.next_back(), Some((1, 2)));
        assert_eq!(it.len(), 4);
        assert_eq!(it.rev().collect::<Vec<_>>(), [(1, 1), (1, 0), (0, 2), (0, 1)]);
    }
}
