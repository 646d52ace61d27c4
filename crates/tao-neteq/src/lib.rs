//! # tao-neteq
//!
//! Tao 语音框架 NetEq DSP 库.
//!
//! 位于抖动缓冲与音频解码器之间, 对解码后的 PCM 做以下处理:
//! - 丢包隐藏 ([`Expand`]): 基音周期重复与 LPC 噪声激励混合, 按连续隐藏次数逐步静音
//! - 隐藏结束后的衔接 ([`Merge`], [`Normal`]): 与隐藏信号做相关对齐, 交叉淡化
//! - 变速 ([`Accelerate`], [`PreemptiveExpand`]): 按基音周期删除或插入一个周期
//! - 背景噪声建模 ([`BackgroundNoise`]) 与 DTMF 音生成 ([`DtmfToneGenerator`])
//!
//! 所有运算为 Q 格式整数, 复用 [`tao_core::spl`] 的内核.
//! [`DspOperations`] 把各组件按 NetEq 的调用约定组合起来, 并通过
//! [`ExpandFactory`]/[`AccelerateFactory`]/[`PreemptiveExpandFactory`] 允许替换组件.
//!
//! 支持的采样率: 8000, 16000, 32000, 48000 Hz.

mod audio_multi_vector;
mod audio_vector;
mod background_noise;
mod cross_correlation;
pub mod dsp_helper;
mod dsp_operations;
mod dtmf_tone_generator;
mod expand;
mod merge;
mod normal;
mod random_vector;
mod sync_buffer;
mod time_stretch;

pub use audio_multi_vector::AudioMultiVector;
pub use audio_vector::AudioVector;
pub use background_noise::{BackgroundNoise, BgnMode, VadDecision};
pub use cross_correlation::cross_correlation_with_auto_shift;
pub use dsp_operations::{DspOperations, Mode, SpeechType};
pub use dtmf_tone_generator::DtmfToneGenerator;
pub use expand::{DefaultExpandFactory, Expand, ExpandContext, ExpandFactory, Expander};
pub use merge::Merge;
pub use normal::Normal;
pub use random_vector::RandomVector;
pub use sync_buffer::SyncBuffer;
pub use time_stretch::{
    Accelerate, AccelerateFactory, Accelerator, DefaultAccelerateFactory,
    DefaultPreemptiveExpandFactory, PreemptiveExpand, PreemptiveExpandFactory,
    PreemptiveExpander, ReturnCode, StretchAnalysis, TimeStretch,
};

use tao_core::{TaoError, TaoResult};

/// 支持的最高采样率
pub const MAX_SAMPLE_RATE: u32 = 48000;

/// 检查采样率是否受支持, 返回 `fs_hz / 8000`
pub fn fs_mult_for(fs_hz: u32) -> TaoResult<usize> {
    match fs_hz {
        8000 | 16000 | 32000 | 48000 => Ok((fs_hz / 8000) as usize),
        _ => Err(TaoError::InvalidArgument(format!(
            "NetEq 不支持采样率 {} Hz (仅支持 8000/16000/32000/48000)",
            fs_hz
        ))),
    }
}
