//! 算法运行统计.

use ftu_berry::segment::RuleStats;
use std::time::{Duration, Instant};

/// ablation/benchmark 计时器.
///
/// 该计时器支持 "中途中断" 与 "结束中断, 继续开始计时".
#[derive(Clone, Debug)]
struct AccTimer {
    consumed: Duration,
    since: Instant,
}

impl AccTimer {
    /// 初始化计时器. 初始化时会视为已经开始计时 (`self.start()`).
    #[inline]
    pub fn new() -> Self {
        Self {
            consumed: Duration::from_secs(0),
            since: Instant::now(),
        }
    }

    /// 开始计时.
    #[inline]
    pub fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时, 并将这一区间的时间累加. 返回本轮计时时长.
    ///
    /// # 注意
    ///
    /// 上一次调用必须是 `self.start()`, 否则计算时间值无意义.
    #[inline]
    pub fn elapsed(&mut self) -> Duration {
        let d = self.since.elapsed();
        self.consumed += d;
        d
    }

    /// 获得总共累计下来的时间综合 (以微秒为单位).
    #[inline]
    pub fn get_total_us(&self) -> u64 {
        self.consumed.as_micros() as u64
    }
}

impl Default for AccTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// 单条规则的累计量.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleTotal {
    /// 规则名称.
    pub name: String,

    /// 累计像素数.
    pub pixels: u64,

    /// 累计对象数.
    pub objects: u64,
}

/// ablation/benchmark 数据统计.
#[derive(Clone, Debug)]
pub struct Profile {
    /// 无法加载的结构个数.
    skipped: u64,

    /// 成功分割的结构个数.
    target: u64,

    /// 分割结构花费的总时间 (不含加载).
    target_time: AccTimer,

    /// 整个任务花费的总时间 (含加载).
    real_time: AccTimer,

    /// 最耗时的一次分割.
    most: Option<Duration>,

    /// 结构掩码像素总数.
    mask_pixels: u64,

    /// 各规则累计量, 顺序与参数一致.
    rules: Vec<RuleTotal>,
}

impl Profile {
    /// 初始化.
    #[inline]
    pub fn new() -> Self {
        Self {
            skipped: 0,
            target: 0,
            target_time: AccTimer::default(),
            real_time: AccTimer::default(),
            most: None,
            mask_pixels: 0,
            rules: Vec::new(),
        }
    }

    /// 记录一个无法加载的结构.
    #[inline]
    pub fn count_skipped(&mut self) {
        self.skipped += 1;
    }

    /// 开始一次分割计时.
    #[inline]
    pub fn target_start(&mut self) {
        self.target_time.start();
    }

    /// 结束一次分割计时, 并累加本次分割的统计.
    pub fn target_elapsed(&mut self, mask_pixels: usize, stats: &[RuleStats]) {
        let d = self.target_time.elapsed();
        self.most = Some(self.most.map_or(d, |m| m.max(d)));
        self.target += 1;
        self.mask_pixels += mask_pixels as u64;
        if self.rules.is_empty() {
            self.rules = stats
                .iter()
                .map(|s| RuleTotal {
                    name: s.name.clone(),
                    ..RuleTotal::default()
                })
                .collect();
        }
        for (total, s) in self.rules.iter_mut().zip(stats) {
            total.pixels += s.pixels as u64;
            total.objects += s.objects as u64;
        }
    }

    /// 结束全部计时.
    #[inline]
    pub fn finish(mut self) -> Self {
        self.real_time.elapsed();
        self
    }

    /// 获得无法加载的结构个数.
    #[inline]
    pub fn get_skipped(&self) -> u64 {
        self.skipped
    }

    /// 获得成功分割的结构个数.
    #[inline]
    pub fn get_target(&self) -> u64 {
        self.target
    }

    /// 以微秒为单位获得分割的总花费自然时间.
    #[inline]
    pub fn get_target_time_us(&self) -> u64 {
        self.target_time.get_total_us()
    }

    /// 以微秒为单位获得任务运行到目前的总自然时间.
    #[inline]
    pub fn get_real_time_us(&self) -> u64 {
        self.real_time.get_total_us()
    }

    /// 以微秒为单位获得单个结构的平均分割时间.
    #[inline]
    pub fn get_avg_target_time_us(&self) -> Option<f64> {
        match self.target {
            0 => None,
            target => Some(self.get_target_time_us() as f64 / target as f64),
        }
    }

    /// 获取最耗时的一次分割所消耗的时间. 如果不存在任务, 则返回 `None`.
    #[inline]
    pub fn get_most_time_consuming(&self) -> Option<Duration> {
        self.most
    }

    /// 各规则累计量.
    #[inline]
    pub fn rules(&self) -> &[RuleTotal] {
        &self.rules
    }

    /// 规则 `i` 认领的像素占结构掩码像素的比例.
    pub fn get_pixel_ratio(&self, i: usize) -> Option<f64> {
        match (self.rules.get(i), self.mask_pixels) {
            (Some(r), total) if total > 0 => Some(r.pixels as f64 / total as f64),
            _ => None,
        }
    }

    /// 规则 `i` 平均每个结构检出的对象个数.
    pub fn get_avg_objects(&self, i: usize) -> Option<f64> {
        match (self.rules.get(i), self.target) {
            (Some(r), n) if n > 0 => Some(r.objects as f64 / n as f64),
            _ => None,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pixels: [usize; 2], objects: [usize; 2]) -> Vec<RuleStats> {
        ["Nuclei", "Rest"]
            .into_iter()
            .zip(pixels.into_iter().zip(objects))
            .map(|(name, (pixels, objects))| RuleStats {
                name: name.to_string(),
                pixels,
                objects,
            })
            .collect()
    }

    #[test]
    fn test_accumulate() {
        let mut p = Profile::new();
        assert_eq!(p.get_avg_objects(0), None);
        p.count_skipped();
        p.target_start();
        p.target_elapsed(10, &stats([4, 6], [2, 0]));
        p.target_start();
        p.target_elapsed(30, &stats([6, 24], [4, 0]));
        let p = p.finish();
        assert_eq!(p.get_skipped(), 1);
        assert_eq!(p.get_target(), 2);
        assert_eq!(p.rules()[0].pixels, 10);
        assert_eq!(p.get_pixel_ratio(0), Some(0.25));
        assert_eq!(p.get_avg_objects(0), Some(3.0));
        assert!(p.get_most_time_consuming().is_some());
    }
}
