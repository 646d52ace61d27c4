//! iLBC (Internet Low Bitrate Codec) 定点实现.
//!
//! 8 kHz 窄带语音编解码器, 支持两种帧模式:
//!
//! | 模式 | 帧长 | 每帧字节 | 子帧数 | LSF 组数 |
//! |------|------|----------|--------|----------|
//! | 20 ms | 160 采样 | 38 | 4 | 1 |
//! | 30 ms | 240 采样 | 50 | 6 | 2 |
//!
//! 编码流程: 输入高通 -> LPC 分析与 LSF 量化 -> 残差计算 -> 帧分类选出起始状态位置
//! -> 起始状态标量量化 -> 以起始状态为记忆向前/向后做 3 级自适应码本搜索 -> 打包.
//!
//! 解码流程与之对称, 另有两个只在解码端存在的环节:
//! - 丢包隐藏 ([`plc`]): 基音重复与随机激励混合, 按连续丢包时长逐级衰减
//! - 增强器 ([`enhancer`]): 对相邻基音周期做对齐与平滑, 引入 40/80 采样的延迟
//!
//! 全部运算为整数 Q 格式, 中间值用 `i64`/`i128` 计算, 编码端内部重建与解码端
//! 输出逐位一致.

mod cb;
mod classify;
mod decode;
mod encode;
mod enhancer;
mod hp_filter;
mod lpc_analysis;
mod lsf;
mod pack;
mod plc;
mod residual;
mod state;
pub mod tables;

pub use decode::IlbcDecoder;
pub use encode::IlbcEncoder;
pub use pack::FrameBits;

use std::fmt;

/// 子帧长度
pub const SUBL: usize = 40;
/// 起始状态所在的两个子帧的总长度
pub const STATE_LEN: usize = 80;
/// LPC 阶数
pub const LPC_FILTERORDER: usize = 10;
/// LPC 分析的回看长度
pub const LPC_LOOKBACK: usize = 60;
/// 最大帧长
pub const BLOCKL_MAX: usize = 240;
/// 最大子帧数
pub const NSUB_MAX: usize = 6;
/// 最大自适应码本子帧数
pub const NASUB_MAX: usize = 4;
/// 码本搜索级数
pub const CB_NSTAGES: usize = 3;
/// 子帧码本记忆长度
pub const CB_MEML: usize = 147;
/// 起始状态扩展块的码本记忆长度
pub const ST_MEM_L: usize = 85;
/// 码本索引总数 (扩展块 + 最多 4 个自适应子帧, 每块 3 级)
pub const CB_INDEX_LEN: usize = (NASUB_MAX + 1) * CB_NSTAGES;
/// 每个子帧的 LPC 系数个数 (含 a0)
pub const LPC_COEF_LEN: usize = LPC_FILTERORDER + 1;

/// iLBC 帧模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IlbcMode {
    /// 20 ms 帧 (15.2 kbit/s)
    Ms20,
    /// 30 ms 帧 (13.33 kbit/s)
    Ms30,
}

impl IlbcMode {
    /// 由帧时长 (毫秒) 选择模式
    pub fn from_frame_size(ms: u32) -> Option<Self> {
        match ms {
            20 => Some(Self::Ms20),
            30 => Some(Self::Ms30),
            _ => None,
        }
    }

    /// 由单帧字节数选择模式
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            38 => Some(Self::Ms20),
            50 => Some(Self::Ms30),
            _ => None,
        }
    }

    /// 由每帧采样数选择模式
    pub fn from_block_len(samples: usize) -> Option<Self> {
        match samples {
            160 => Some(Self::Ms20),
            240 => Some(Self::Ms30),
            _ => None,
        }
    }

    /// 由数据包长度推断模式, 数据包可含 1~3 个连续帧
    pub fn detect(len: usize) -> Option<Self> {
        [Self::Ms20, Self::Ms30]
            .into_iter()
            .find(|m| len > 0 && len % m.bytes() == 0 && len / m.bytes() <= 3)
    }

    /// 帧时长 (毫秒)
    pub const fn frame_ms(self) -> u32 {
        match self {
            Self::Ms20 => 20,
            Self::Ms30 => 30,
        }
    }

    /// 每帧采样数
    pub const fn block_len(self) -> usize {
        match self {
            Self::Ms20 => 160,
            Self::Ms30 => 240,
        }
    }

    /// 每帧字节数
    pub const fn bytes(self) -> usize {
        match self {
            Self::Ms20 => 38,
            Self::Ms30 => 50,
        }
    }

    /// 每帧比特数
    pub const fn bits(self) -> usize {
        self.bytes() * 8
    }

    /// 子帧数
    pub const fn nsub(self) -> usize {
        self.block_len() / SUBL
    }

    /// 自适应码本子帧数 (不含起始状态所在的两个子帧)
    pub const fn nasub(self) -> usize {
        self.nsub() - 2
    }

    /// 每帧 LSF 组数
    pub const fn lpc_n(self) -> usize {
        match self {
            Self::Ms20 => 1,
            Self::Ms30 => 2,
        }
    }

    /// 标量量化的起始状态长度
    pub const fn state_short_len(self) -> usize {
        match self {
            Self::Ms20 => 57,
            Self::Ms30 => 58,
        }
    }

    /// 起始状态位置索引 (从 1 开始) 的最大合法值
    pub const fn max_start_idx(self) -> usize {
        self.nsub() - 1
    }

    /// 起始状态位置索引的位宽
    pub const fn start_idx_bits(self) -> u32 {
        match self {
            Self::Ms20 => 2,
            Self::Ms30 => 3,
        }
    }
}

impl fmt::Display for IlbcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.frame_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_geometry() {
        let m = IlbcMode::Ms20;
        assert_eq!(
            (m.block_len(), m.nsub(), m.nasub(), m.lpc_n(), m.bits()),
            (160, 4, 2, 1, 304)
        );
        let m = IlbcMode::Ms30;
        assert_eq!(
            (m.block_len(), m.nsub(), m.nasub(), m.lpc_n(), m.bits()),
            (240, 6, 4, 2, 400)
        );
        assert_eq!(IlbcMode::Ms20.max_start_idx(), 3);
        assert_eq!(IlbcMode::Ms30.max_start_idx(), 5);
    }

    #[test]
    fn test_mode_lookup() {
        assert_eq!(IlbcMode::from_frame_size(20), Some(IlbcMode::Ms20));
        assert_eq!(IlbcMode::from_frame_size(25), None);
        assert_eq!(IlbcMode::from_bytes(50), Some(IlbcMode::Ms30));
        assert_eq!(IlbcMode::from_block_len(160), Some(IlbcMode::Ms20));
        assert_eq!(IlbcMode::from_block_len(80), None);
        assert_eq!(IlbcMode::detect(76), Some(IlbcMode::Ms20));
        assert_eq!(IlbcMode::detect(150), Some(IlbcMode::Ms30));
        assert_eq!(IlbcMode::detect(200), None);
        assert_eq!(IlbcMode::detect(0), None);
        assert_eq!(IlbcMode::Ms30.to_string(), "30ms");
    }
}
