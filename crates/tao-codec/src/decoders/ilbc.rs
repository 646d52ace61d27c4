//! iLBC 解码器适配.
//!
//! 每个数据包含 1~3 个连续帧, 输出一个音频帧; 丢包占位输出一帧隐藏音频.
//! `frame_size` 为 0 时由第一个数据包的长度推断帧模式.

use log::debug;
use tao_core::{TaoError, TaoResult, timestamp::NOPTS_VALUE};

use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, CodecParamsType};
use crate::decoder::Decoder;
use crate::frame::{AudioFrame, Frame};
use crate::ilbc::{IlbcDecoder, IlbcMode};
use crate::packet::Packet;

/// iLBC 解码器 (框架接口)
pub struct IlbcPacketDecoder {
    /// 核心解码器, open 之后才存在
    inner: Option<IlbcDecoder>,
    /// open 时给定的模式 (`None` 表示自动检测)
    mode: Option<IlbcMode>,
    /// 是否启用增强器
    use_enhancer: bool,
    /// 已解码帧缓冲
    output_frame: Option<Frame>,
    /// 下一帧的 PTS (采样), 用于丢包占位
    next_pts: i64,
    /// 是否已收到刷新信号
    flushing: bool,
}

impl IlbcPacketDecoder {
    /// 工厂函数 (启用增强器)
    pub fn create() -> TaoResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new(true)))
    }

    /// 创建解码器, 可选择关闭增强器
    pub fn new(use_enhancer: bool) -> Self {
        Self {
            inner: None,
            mode: None,
            use_enhancer,
            output_frame: None,
            next_pts: NOPTS_VALUE,
            flushing: false,
        }
    }

    fn make_frame(&mut self, samples: &[i16], pts: i64) -> Frame {
        let mut frame = AudioFrame::from_mono_s16(samples, 8000);
        frame.pts = pts;
        if pts != NOPTS_VALUE {
            self.next_pts = pts + samples.len() as i64;
        }
        Frame::Audio(frame)
    }
}

impl Decoder for IlbcPacketDecoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Ilbc
    }

    fn name(&self) -> &str {
        "ilbc"
    }

    fn open(&mut self, params: &CodecParameters) -> TaoResult<()> {
        let audio = match &params.params {
            CodecParamsType::Audio(a) => a,
            CodecParamsType::None => {
                return Err(TaoError::InvalidArgument("iLBC 解码器需要音频参数".into()));
            }
        };
        if audio.sample_rate != 8000 {
            return Err(TaoError::InvalidArgument(format!(
                "iLBC 只支持 8000 Hz, 实际 {} Hz",
                audio.sample_rate
            )));
        }
        if !audio.channel_layout.is_mono() {
            return Err(TaoError::InvalidArgument("iLBC 只支持单声道".into()));
        }
        self.mode = match audio.frame_size {
            0 => None,
            n => Some(IlbcMode::from_block_len(n as usize).ok_or_else(|| {
                TaoError::InvalidArgument(format!("iLBC 帧长必须为 160 或 240, 实际 {}", n))
            })?),
        };

        self.inner = Some(IlbcDecoder::new(self.mode, self.use_enhancer));
        self.output_frame = None;
        self.next_pts = NOPTS_VALUE;
        self.flushing = false;
        debug!(
            "打开 iLBC 解码器: 模式 {}, 增强器 {}",
            self.mode.map_or_else(|| "自动".to_string(), |m| m.to_string()),
            if self.use_enhancer { "开" } else { "关" },
        );
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> TaoResult<()> {
        let Some(dec) = self.inner.as_mut() else {
            return Err(TaoError::Codec("解码器未打开, 请先调用 open()".into()));
        };
        if self.output_frame.is_some() {
            return Err(TaoError::NeedMoreData);
        }

        if packet.is_lost {
            debug!("iLBC 数据包 #{} 丢失, 输出隐藏帧", packet.sequence);
            let samples = dec.decode_plc(1);
            let pts = if packet.pts != NOPTS_VALUE {
                packet.pts
            } else {
                self.next_pts
            };
            self.output_frame = Some(self.make_frame(&samples, pts));
            return Ok(());
        }

        // 空包 = flush
        if packet.is_empty() {
            self.flushing = true;
            return Ok(());
        }

        let samples = dec.decode(&packet.data)?;
        let Frame::Audio(mut af) = self.make_frame(&samples, packet.pts);
        if packet.time_base.is_valid() {
            af.time_base = packet.time_base;
        }
        self.output_frame = Some(Frame::Audio(af));
        Ok(())
    }

    fn receive_frame(&mut self) -> TaoResult<Frame> {
        if let Some(frame) = self.output_frame.take() {
            return Ok(frame);
        }
        if self.flushing {
            return Err(TaoError::Eof);
        }
        Err(TaoError::NeedMoreData)
    }

    fn flush(&mut self) {
        if self.inner.is_some() {
            self.inner = Some(IlbcDecoder::new(self.mode, self.use_enhancer));
        }
        self.output_frame = None;
        self.next_pts = NOPTS_VALUE;
        self.flushing = false;
    }
}
