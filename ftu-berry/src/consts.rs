//! 通用常量.

/// 单通道掩码像素.
pub mod gray {
    /// 掩码中, 背景的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// 掩码中, 前景 (结构内部) 的像素值.
    pub const MASK_FOREGROUND: u8 = 1;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }

    /// 像素是否是前景? 任何非零像素都被视为前景.
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        !is_background(p)
    }
}

/// 三通道颜色.
pub mod rgb {
    /// 黑色. 在叠加视图中被视为完全透明.
    pub const BLACK: [u8; 3] = [0, 0, 0];

    /// 白色.
    pub const WHITE: [u8; 3] = [255, 255, 255];

    /// 管腔默认颜色.
    pub const LUMINAL_SPACE: [u8; 3] = [0, 255, 0];

    /// PAS 阳性区域默认颜色.
    pub const PAS: [u8; 3] = [255, 0, 0];

    /// 细胞核默认颜色.
    pub const NUCLEI: [u8; 3] = [0, 0, 255];
}

/// 特殊图层名.
pub mod layer {
    /// 空间转录组 spot 图层.
    pub const SPOTS: &str = "Spots";

    /// 用户手绘区域图层.
    pub const MANUAL_ROI: &str = "ManualROI";

    /// 用户标记点图层.
    pub const MARKER: &str = "Marker";
}

/// 常用属性键.
pub mod keys {
    /// 主要细胞类型分布.
    pub const MAIN_CELL_TYPES: &str = "Main_Cell_Types";

    /// 细胞类型 -> 细胞状态 二级分布.
    pub const CELL_STATES: &str = "Cell_States";

    /// 聚类标签.
    pub const CLUSTER: &str = "Cluster";
}

/// 嵌套属性名的分隔符, 如 `"Cell_States --> PT"`.
pub const HIER_SEP: &str = " --> ";

/// 归一化分布输出的小数位数.
pub const DECIMAL_PRECISION: usize = 19;

/// 每个图层中, 每多少个连续结构共享一个分组包围盒.
pub const GROUP_SIZE: usize = 50;

/// 细胞核规则的名称 (不区分大小写).
pub const NUCLEI_RULE: &str = "nuclei";

/// 细胞核二值图中, 小于该面积的空洞会被填充.
pub const NUCLEI_HOLE_AREA: usize = 64;

/// 分水岭种子点之间的最小距离 (像素).
pub const PEAK_MIN_DISTANCE: usize = 3;

/// 局部直方图均衡化时, 每个维度上的分块个数.
pub const CLAHE_TILES: usize = 8;

/// 局部直方图均衡化的裁剪阈值 (相对于分块像素数).
pub const CLAHE_CLIP_LIMIT: f64 = 0.01;
