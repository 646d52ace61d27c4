//! 时间戳类型.
//!
//! 数据包使用 `i64` 显示时间戳 (未定义时为 [`NOPTS_VALUE`]);
//! 抖动缓冲使用按采样计数, 32 位回绕的 RTP 时间戳.

use std::fmt;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// RTP 时间戳 (以采样为单位, 32 位回绕)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RtpTimestamp(pub u32);

impl RtpTimestamp {
    /// 前进指定采样数
    pub fn advance(self, samples: u32) -> Self {
        Self(self.0.wrapping_add(samples))
    }

    /// 与另一个时间戳的有符号差值 (self - other), 正确处理回绕
    pub fn diff(self, other: Self) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// 是否比另一个时间戳更新
    pub fn is_newer_than(self, other: Self) -> bool {
        self.diff(other) > 0
    }
}

impl fmt::Display for RtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
