//! # Tao Voice
//!
//! 纯 Rust 实现的实时语音处理框架: 定点 iLBC 编解码器与 NetEq 丢包隐藏/变速 DSP.
//!
//! - **编解码**: iLBC (RFC 3951), 20/30 ms 帧, 含 PLC 与增强器
//! - **NetEq DSP**: Expand / Merge / Normal / Accelerate / PreemptiveExpand,
//!   背景噪声建模与 DTMF 生成
//!
//! # 快速开始
//!
//! ```rust
//! use tao_voice::codec::ilbc::{IlbcDecoder, IlbcEncoder, IlbcMode};
//! use tao_voice::neteq::{DspOperations, SpeechType, VadDecision};
//!
//! let mut enc = IlbcEncoder::new(IlbcMode::Ms30);
//! let mut dec = IlbcDecoder::new(None, true);
//! let pcm = dec.decode(&enc.encode(&[0i16; 240]).unwrap()).unwrap();
//!
//! let mut dsp = DspOperations::new(8000, 1).unwrap();
//! let mut out = [0i16; 80];
//! dsp.do_normal(&pcm[..80], SpeechType::Speech).unwrap();
//! dsp.get_audio(VadDecision::NotRunning, &mut out).unwrap();
//! // 下一个包丢失
//! dsp.do_expand().unwrap();
//! dsp.get_audio(VadDecision::NotRunning, &mut out).unwrap();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 错误类型, 位读写, 定点运算内核 |
//! | `tao-codec` | 编解码器框架与 iLBC |
//! | `tao-neteq` | NetEq DSP |

pub mod logging;

/// 核心类型与定点运算内核
pub use tao_core as core;

/// 编解码器框架与 iLBC
pub use tao_codec as codec;

/// NetEq 丢包隐藏与变速 DSP
pub use tao_neteq as neteq;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置编解码器的注册表
pub fn default_codec_registry() -> tao_codec::CodecRegistry {
    let mut registry = tao_codec::CodecRegistry::new();
    tao_codec::register_all(&mut registry);
    registry
}
