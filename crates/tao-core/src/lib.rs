//! # tao-core
//!
//! Tao 语音处理框架核心库, 提供基础类型定义、错误处理和定点运算工具.
//!
//! 编解码器 (tao-codec) 与抖动缓冲 DSP (tao-neteq) 共用本 crate 的
//! 比特流读写器与 [`spl`] 定点信号处理内核.

pub mod bitreader;
pub mod bitwriter;
pub mod channel_layout;
pub mod error;
pub mod rational;
pub mod sample_format;
pub mod spl;
pub mod timestamp;

// 重导出常用类型
pub use channel_layout::ChannelLayout;
pub use error::{TaoError, TaoResult};
pub use rational::Rational;
pub use sample_format::SampleFormat;
pub use timestamp::RtpTimestamp;
