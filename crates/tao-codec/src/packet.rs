//! 压缩数据包 (Packet).
//!
//! 表示一帧 (或连续数帧) 压缩语音数据, 也可以表示一次丢包.

use bytes::Bytes;
use tao_core::Rational;

/// 压缩数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 数据包时长 (以 time_base 为单位)
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 序号 (传输层给出, 仅用于日志)
    pub sequence: u64,
    /// 丢包占位: 数据未到达, 解码器应输出隐藏帧
    pub is_lost: bool,
}

impl Packet {
    /// 创建空数据包 (flush)
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: tao_core::timestamp::NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            sequence: 0,
            is_lost: false,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 创建丢包占位
    pub fn lost() -> Self {
        Self {
            is_lost: true,
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包 (flush packet), 丢包占位不是空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && !self.is_lost
    }
}
