//! # tao-codec
//!
//! Tao 语音框架编解码器库, 提供编解码器框架与 Packet/Frame 抽象,
//! 以及完全定点实现的 iLBC (RFC 3951) 语音编解码器.
//!
//! ## 支持的编解码器
//!
//! - **iLBC**: 20 ms / 30 ms 两种帧模式, 含丢包隐藏 (PLC) 与解码后增强器
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::{CodecRegistry, CodecId};
//!
//! let mut reg = CodecRegistry::new();
//! tao_codec::register_all(&mut reg);
//!
//! // 按 CodecId 创建编解码器实例
//! let decoder = reg.create_decoder(CodecId::Ilbc).unwrap();
//! let encoder = reg.create_encoder(CodecId::Ilbc).unwrap();
//! ```
//!
//! 也可以绕过框架直接使用 [`ilbc::IlbcEncoder`] / [`ilbc::IlbcDecoder`]:
//!
//! ```rust
//! use tao_codec::ilbc::{IlbcDecoder, IlbcEncoder, IlbcMode};
//!
//! let mut enc = IlbcEncoder::new(IlbcMode::Ms20);
//! let mut dec = IlbcDecoder::new(Some(IlbcMode::Ms20), true);
//! let bytes = enc.encode(&[0i16; 160]).unwrap();
//! assert_eq!(bytes.len(), 38);
//! let pcm = dec.decode(&bytes).unwrap();
//! assert_eq!(pcm.len(), 160);
//! ```

pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod encoder;
pub mod encoders;
pub mod frame;
pub mod ilbc;
pub mod packet;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{AudioCodecParams, CodecParameters, CodecParamsType};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use frame::{AudioFrame, Frame};
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置编解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
    encoders::register_all_encoders(registry);
}
