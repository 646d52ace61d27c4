//! 编解码器标识符.
//!
//! 为每种语音编解码算法分配唯一标识.

use std::fmt;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与传输方式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,
    /// iLBC (Internet Low Bitrate Codec, RFC 3951)
    Ilbc,
}

impl CodecId {
    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ilbc => "ilbc",
        }
    }

    /// 固定采样率 (Hz), 可变时返回 None
    pub const fn fixed_sample_rate(&self) -> Option<u32> {
        match self {
            Self::Ilbc => Some(8000),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
