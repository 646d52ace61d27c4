//! iLBC 编码器适配.
//!
//! 把任意长度的 S16 单声道音频帧累积成 20/30 ms 的块, 每块输出一个数据包.
//! 刷新时不足一块的尾部补零后编码.

use std::collections::VecDeque;

use bytes::Bytes;
use log::debug;
use tao_core::{Rational, SampleFormat, TaoError, TaoResult, timestamp::NOPTS_VALUE};

use crate::codec_id::CodecId;
use crate::codec_parameters::{CodecParameters, CodecParamsType};
use crate::encoder::Encoder;
use crate::frame::Frame;
use crate::ilbc::{IlbcEncoder, IlbcMode};
use crate::packet::Packet;

/// iLBC 编码器 (框架接口)
pub struct IlbcPacketEncoder {
    /// 核心编码器, open 之后才存在
    inner: Option<IlbcEncoder>,
    /// 尚未凑满一块的输入采样
    pending: Vec<i16>,
    /// 已编码待取出的数据包
    output: VecDeque<Packet>,
    /// 下一个数据包的 PTS (采样)
    next_pts: i64,
    /// 是否已收到刷新信号
    flushing: bool,
}

impl IlbcPacketEncoder {
    /// 工厂函数
    pub fn create() -> TaoResult<Box<dyn Encoder>> {
        Ok(Box::new(Self {
            inner: None,
            pending: Vec::new(),
            output: VecDeque::new(),
            next_pts: NOPTS_VALUE,
            flushing: false,
        }))
    }

    fn encode_block(&mut self, block: &[i16]) -> TaoResult<()> {
        let enc = self
            .inner
            .as_mut()
            .ok_or_else(|| TaoError::Codec("编码器未打开, 请先调用 open()".into()))?;
        let mut pkt = Packet::from_data(Bytes::from(enc.encode(block)?));
        pkt.pts = self.next_pts;
        pkt.duration = block.len() as i64;
        pkt.time_base = Rational::for_sample_rate(8000);
        if self.next_pts != NOPTS_VALUE {
            self.next_pts += block.len() as i64;
        }
        self.output.push_back(pkt);
        Ok(())
    }

    /// 把累积满的整块全部编码
    fn drain_blocks(&mut self, blockl: usize) -> TaoResult<()> {
        let full = self.pending.len() / blockl * blockl;
        if full == 0 {
            return Ok(());
        }
        let ready: Vec<i16> = self.pending.drain(..full).collect();
        for block in ready.chunks_exact(blockl) {
            self.encode_block(block)?;
        }
        Ok(())
    }
}

impl Encoder for IlbcPacketEncoder {
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
                return Err(TaoError::InvalidArgument("iLBC 编码器需要音频参数".into()));
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
        let frame_size = if audio.frame_size == 0 {
            240
        } else {
            audio.frame_size
        };
        let mode = IlbcMode::from_block_len(frame_size as usize).ok_or_else(|| {
            TaoError::InvalidArgument(format!("iLBC 帧长必须为 160 或 240, 实际 {}", frame_size))
        })?;

        self.inner = Some(IlbcEncoder::new(mode));
        self.pending.clear();
        self.output.clear();
        self.next_pts = NOPTS_VALUE;
        self.flushing = false;
        debug!("打开 iLBC 编码器: 模式 {}, {} 字节/帧", mode, mode.bytes());
        Ok(())
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> TaoResult<()> {
        let blockl = match &self.inner {
            Some(enc) => enc.mode().block_len(),
            None => return Err(TaoError::Codec("编码器未打开, 请先调用 open()".into())),
        };
        if !self.output.is_empty() {
            return Err(TaoError::NeedMoreData);
        }

        let Some(Frame::Audio(audio)) = frame else {
            self.flushing = true;
            if !self.pending.is_empty() {
                let mut tail = std::mem::take(&mut self.pending);
                tail.resize(blockl, 0);
                self.encode_block(&tail)?;
            }
            return Ok(());
        };

        if audio.sample_format != SampleFormat::S16 {
            return Err(TaoError::InvalidArgument(format!(
                "期望采样格式 s16, 实际为 {}",
                audio.sample_format
            )));
        }
        if self.next_pts == NOPTS_VALUE && audio.pts != NOPTS_VALUE {
            self.next_pts = audio.pts - self.pending.len() as i64;
        }
        self.pending.extend(audio.samples_s16());
        self.drain_blocks(blockl)
    }

    fn receive_packet(&mut self) -> TaoResult<Packet> {
        if let Some(pkt) = self.output.pop_front() {
            return Ok(pkt);
        }
        if self.flushing {
            return Err(TaoError::Eof);
        }
        Err(TaoError::NeedMoreData)
    }

    fn flush(&mut self) {
        if let Some(enc) = &self.inner {
            self.inner = Some(IlbcEncoder::new(enc.mode()));
        }
        self.pending.clear();
        self.output.clear();
        self.next_pts = NOPTS_VALUE;
        self.flushing = false;
    }
}
