//! 编解码器注册表.
//!
//! 按 CodecId 查找并实例化编解码器, 同一 CodecId 可注册多个实现.

use std::collections::HashMap;

use tao_core::TaoResult;

use crate::codec_id::CodecId;
use crate::decoder::Decoder;
use crate::encoder::Encoder;

/// 解码器工厂函数类型
pub type DecoderFactory = fn() -> TaoResult<Box<dyn Decoder>>;

/// 编码器工厂函数类型
pub type EncoderFactory = fn() -> TaoResult<Box<dyn Encoder>>;

/// 编解码器注册表
///
/// 管理所有已注册的编解码器, 支持按 CodecId 查找并创建实例.
pub struct CodecRegistry {
    /// 解码器工厂映射
    decoders: HashMap<CodecId, Vec<DecoderEntry>>,
    /// 编码器工厂映射
    encoders: HashMap<CodecId, Vec<EncoderEntry>>,
}

/// 解码器注册条目
struct DecoderEntry {
    /// 解码器名称
    name: String,
    /// 工厂函数
    factory: DecoderFactory,
}

/// 编码器注册条目
struct EncoderEntry {
    /// 编码器名称
    name: String,
    /// 工厂函数
    factory: EncoderFactory,
}

impl CodecRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            encoders: HashMap::new(),
        }
    }

    /// 注册一个解码器
    pub fn register_decoder(
        &mut self,
        codec_id: CodecId,
        name: impl Into<String>,
        factory: DecoderFactory,
    ) {
        self.decoders
            .entry(codec_id)
            .or_default()
            .push(DecoderEntry {
                name: name.into(),
                factory,
            });
    }

    /// 注册一个编码器
    pub fn register_encoder(
        &mut self,
        codec_id: CodecId,
        name: impl Into<String>,
        factory: EncoderFactory,
    ) {
        self.encoders
            .entry(codec_id)
            .or_default()
            .push(EncoderEntry {
                name: name.into(),
                factory,
            });
    }

    /// 创建指定编解码器 ID 的解码器实例
    pub fn create_decoder(&self, codec_id: CodecId) -> TaoResult<Box<dyn Decoder>> {
        let entries = self.decoders.get(&codec_id).ok_or_else(|| {
            tao_core::TaoError::CodecNotFound(format!("未找到 {} 的解码器", codec_id))
        })?;
        // 使用第一个注册的解码器 (优先级最高)
        let entry = &entries[0];
        (entry.factory)()
    }

    /// 创建指定编解码器 ID 的编码器实例
    pub fn create_encoder(&self, codec_id: CodecId) -> TaoResult<Box<dyn Encoder>> {
        let entries = self.encoders.get(&codec_id).ok_or_else(|| {
            tao_core::TaoError::CodecNotFound(format!("未找到 {} 的编码器", codec_id))
        })?;
        let entry = &entries[0];
        (entry.factory)()
    }

    /// 获取所有已注册的解码器名称
    pub fn list_decoders(&self) -> Vec<(CodecId, &str)> {
        let mut result = Vec::new();
        for (id, entries) in &self.decoders {
            for entry in entries {
                result.push((*id, entry.name.as_str()));
            }
        }
        result
    }

    /// 获取所有已注册的编码器名称
    pub fn list_encoders(&self) -> Vec<(CodecId, &str)> {
        let mut result = Vec::new();
        for (id, entries) in &self.encoders {
            for entry in entries {
                result.push((*id, entry.name.as_str()));
            }
        }
        result
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec_parameters::CodecParameters;

    #[test]
    fn test_register_all_codecs() {
        let mut registry = CodecRegistry::new();
        crate::register_all(&mut registry);

        let decoders = registry.list_decoders();
        let encoders = registry.list_encoders();
        assert_eq!(decoders, vec![(CodecId::Ilbc, "ilbc")]);
        assert_eq!(encoders, vec![(CodecId::Ilbc, "ilbc")]);
    }

    #[test]
    fn test_create_ilbc_pair() {
        let mut registry = CodecRegistry::new();
        crate::register_all(&mut registry);

        let mut enc = registry.create_encoder(CodecId::Ilbc).unwrap();
        let mut dec = registry.create_decoder(CodecId::Ilbc).unwrap();
        assert_eq!(enc.codec_id(), CodecId::Ilbc);
        assert_eq!(dec.name(), "ilbc");

        let params = CodecParameters::mono_s16(CodecId::Ilbc, 8000, 240);
        enc.open(&params).unwrap();
        dec.open(&params).unwrap();
    }

    #[test]
    fn test_unknown_codec() {
        let registry = CodecRegistry::new();
        assert!(matches!(
            registry.create_decoder(CodecId::Ilbc),
            Err(tao_core::TaoError::CodecNotFound(_))
        ));
    }
}
