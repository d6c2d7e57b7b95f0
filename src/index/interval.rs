/// 后缀数组区间 `[lo, hi]`（闭区间）。`lo > hi` 时为空。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lo: u64,
    pub hi: u64,
}

impl Interval {
    /// 规范的空区间。
    pub const EMPTY: Interval = Interval { lo: 1, hi: 0 };

    #[inline]
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    /// 覆盖的 SA 行数。
    #[inline]
    pub const fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.hi - self.lo + 1
        }
    }

    /// 按升序遍历覆盖的行。
    pub fn slots(&self) -> std::ops::RangeInclusive<u64> {
        if self.is_empty() {
            // 1..=0 为空范围
            1..=0
        } else {
            self.lo..=self.hi
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "[]")
        } else {
            write!(f, "[{}, {}]", self.lo, self.hi)
        }
    }
}
