//! NetEq 对 DSP 组件的调用约定.
//!
//! [`DspOperations`] 持有同步缓冲, 背景噪声, 随机向量与各算法组件. 抖动缓冲的
//! 决策逻辑每 10 ms 选择一种操作 (`do_*`), 操作结果先写入算法缓冲, 再由
//! [`DspOperations::get_audio`] 追加到同步缓冲并取出 10 ms 输出.

use log::{debug, trace, warn};
use tao_core::{TaoError, TaoResult};

use crate::audio_multi_vector::AudioMultiVector;
use crate::background_noise::{BackgroundNoise, VadDecision};
use crate::dtmf_tone_generator::DtmfToneGenerator;
use crate::expand::{DefaultExpandFactory, ExpandContext, ExpandFactory, Expander};
use crate::merge::Merge;
use crate::normal::Normal;
use crate::random_vector::RandomVector;
use crate::sync_buffer::SyncBuffer;
use crate::time_stretch::{
    AccelerateFactory, Accelerator, DefaultAccelerateFactory, DefaultPreemptiveExpandFactory,
    PreemptiveExpandFactory, PreemptiveExpander, ReturnCode,
};
use crate::fs_mult_for;

/// 同步缓冲长度 (8 kHz 采样数), 两个 60 ms 最大帧
const SYNC_BUFFER_SIZE: usize = 2 * 2880;
/// 变速操作需要的数据长度 (8 kHz 采样数, 30 ms)
const STRETCH_REQUIRED_SAMPLES: usize = 240;

/// 最近一次执行的 DSP 操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Expand,
    Merge,
    AccelerateSuccess,
    AccelerateLowEnergy,
    AccelerateFail,
    PreemptiveExpandSuccess,
    PreemptiveExpandLowEnergy,
    PreemptiveExpandFail,
    Rfc3389Cng,
    CodecInternalCng,
    Dtmf,
    Undefined,
}

/// 解码器给出的帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechType {
    #[default]
    Speech,
    /// 解码器内部生成的舒适噪声
    ComfortNoise,
}

/// NetEq DSP 操作的执行器
pub struct DspOperations {
    fs_hz: u32,
    fs_mult: usize,
    num_channels: usize,
    output_size_samples: usize,
    sync_buffer: SyncBuffer,
    background_noise: BackgroundNoise,
    random_vector: RandomVector,
    expand: Box<dyn Expander>,
    merge: Merge,
    normal: Normal,
    accelerate: Box<dyn Accelerator>,
    preemptive_expand: Box<dyn PreemptiveExpander>,
    dtmf_tone_generator: DtmfToneGenerator,
    algorithm_buffer: AudioMultiVector,
    mute_factors: Vec<i16>,
    last_mode: Mode,
}

/// 在不与 `expand` 冲突的字段借用上构造隐藏上下文
macro_rules! expand_context {
    ($self:ident) => {
        ExpandContext {
            sync_buffer: &mut $self.sync_buffer,
            background_noise: &mut $self.background_noise,
            random_vector: &mut $self.random_vector,
        }
    };
}

impl DspOperations {
    /// 使用默认组件创建
    pub fn new(fs_hz: u32, num_channels: usize) -> TaoResult<Self> {
        Self::with_factories(
            fs_hz,
            num_channels,
            &DefaultExpandFactory,
            &DefaultAccelerateFactory,
            &DefaultPreemptiveExpandFactory,
        )
    }

    /// 通过工厂创建可替换的组件
    pub fn with_factories(
        fs_hz: u32,
        num_channels: usize,
        expand_factory: &dyn ExpandFactory,
        accelerate_factory: &dyn AccelerateFactory,
        preemptive_expand_factory: &dyn PreemptiveExpandFactory,
    ) -> TaoResult<Self> {
        let fs_mult = fs_mult_for(fs_hz)?;
        if num_channels == 0 {
            return Err(TaoError::InvalidArgument("声道数不能为 0".into()));
        }
        let expand = expand_factory.create(fs_hz, num_channels)?;
        let overlap_length = expand.overlap_length();

        let mut sync_buffer = SyncBuffer::new(num_channels, SYNC_BUFFER_SIZE * fs_mult);
        // 开头留出重叠长度的零作为未来采样
        sync_buffer.set_next_index(sync_buffer.next_index() - overlap_length);

        debug!(
            "NetEq DSP 初始化: {} Hz, {} 声道, 同步缓冲 {} 采样",
            fs_hz,
            num_channels,
            sync_buffer.size()
        );
        Ok(Self {
            fs_hz,
            fs_mult,
            num_channels,
            output_size_samples: fs_hz as usize / 100,
            sync_buffer,
            background_noise: BackgroundNoise::new(fs_hz, num_channels),
            random_vector: RandomVector::new(),
            expand,
            merge: Merge::new(fs_hz, num_channels)?,
            normal: Normal::new(fs_hz, num_channels)?,
            accelerate: accelerate_factory.create(fs_hz, num_channels)?,
            preemptive_expand: preemptive_expand_factory.create(
                fs_hz,
                num_channels,
                overlap_length,
            )?,
            dtmf_tone_generator: DtmfToneGenerator::new(),
            algorithm_buffer: AudioMultiVector::new(num_channels),
            mute_factors: vec![16384; num_channels],
            last_mode: Mode::Normal,
        })
    }

    /// 正常播放解码数据 (交错)
    pub fn do_normal(&mut self, decoded: &[i16], speech_type: SpeechType) -> TaoResult<()> {
        let mut ctx = expand_context!(self);
        self.normal.process(
            decoded,
            self.last_mode,
            &mut self.mute_factors,
            self.expand.as_mut(),
            &mut ctx,
            &mut self.algorithm_buffer,
        )?;
        if !decoded.is_empty() {
            self.last_mode = Mode::Normal;
        }
        if speech_type == SpeechType::ComfortNoise {
            self.last_mode = Mode::CodecInternalCng;
        }
        Ok(())
    }

    /// 隐藏之后衔接新的解码数据 (交错)
    pub fn do_merge(&mut self, decoded: &[i16], speech_type: SpeechType) -> TaoResult<()> {
        let mut ctx = expand_context!(self);
        let new_length = self.merge.process(
            decoded,
            &mut self.mute_factors,
            self.expand.as_mut(),
            &mut ctx,
            &mut self.algorithm_buffer,
        )?;
        trace!("衔接新增 {} 个采样", new_length);
        self.last_mode = if speech_type == SpeechType::ComfortNoise {
            Mode::CodecInternalCng
        } else {
            Mode::Merge
        };
        self.expand.reset();
        Ok(())
    }

    /// 丢包隐藏, 直到同步缓冲有一帧可播放的数据
    pub fn do_expand(&mut self) -> TaoResult<()> {
        while self
            .sync_buffer
            .future_length()
            .saturating_sub(self.expand.overlap_length())
            < self.output_size_samples
        {
            self.algorithm_buffer.clear();
            let mut ctx = expand_context!(self);
            let result = self.expand.process(&mut ctx, &mut self.algorithm_buffer);
            self.last_mode = Mode::Expand;
            result?;
            if self.algorithm_buffer.is_empty() {
                return Err(TaoError::Codec("隐藏器没有输出".into()));
            }
            self.sync_buffer.push_back(&self.algorithm_buffer);
            self.algorithm_buffer.clear();
        }
        self.dtmf_tone_generator.reset();
        Ok(())
    }

    /// 加速: 从解码数据 (不足 30 ms 时借用同步缓冲末尾) 中删除一个基音周期
    pub fn do_accelerate(&mut self, decoded: &[i16], fast_accelerate: bool) -> TaoResult<()> {
        let (input, borrowed) = self.borrow_from_sync_buffer(decoded);
        let (code, removed) = self.accelerate.process(
            &input,
            fast_accelerate,
            &self.background_noise,
            &mut self.algorithm_buffer,
        );
        self.last_mode = match code {
            ReturnCode::Success => Mode::AccelerateSuccess,
            ReturnCode::SuccessLowEnergy => Mode::AccelerateLowEnergy,
            ReturnCode::NoStretch => Mode::AccelerateFail,
            ReturnCode::Error => {
                self.last_mode = Mode::AccelerateFail;
                return Err(TaoError::InvalidArgument(format!(
                    "加速输入过短: {} 个采样",
                    input.len() / self.num_channels
                )));
            }
        };
        trace!("加速: {:?}, 删除 {} 个采样", code, removed);

        if borrowed > 0 {
            // 借用的采样写回同步缓冲
            let length = self.algorithm_buffer.size();
            let position = self.sync_buffer.size() - borrowed;
            if length < borrowed {
                self.sync_buffer
                    .replace_at_index(&self.algorithm_buffer, length, position);
                self.sync_buffer.push_front_zeros(borrowed - length);
                self.algorithm_buffer.pop_front(length);
            } else {
                self.sync_buffer
                    .replace_at_index(&self.algorithm_buffer, borrowed, position);
                self.algorithm_buffer.pop_front(borrowed);
            }
        }
        self.expand.reset();
        Ok(())
    }

    /// 预扩展: 在解码数据 (不足 30 ms 时借用同步缓冲末尾) 中插入一个基音周期
    pub fn do_preemptive_expand(&mut self, decoded: &[i16]) -> TaoResult<()> {
        let (input, borrowed) = self.borrow_from_sync_buffer(decoded);
        // 借用部分中已经播放的采样不能再修改
        let old_borrowed = borrowed.saturating_sub(self.sync_buffer.future_length());
        let (code, added) = self.preemptive_expand.process(
            &input,
            old_borrowed,
            &self.background_noise,
            &mut self.algorithm_buffer,
        );
        self.last_mode = match code {
            ReturnCode::Success => Mode::PreemptiveExpandSuccess,
            ReturnCode::SuccessLowEnergy => Mode::PreemptiveExpandLowEnergy,
            ReturnCode::NoStretch => Mode::PreemptiveExpandFail,
            ReturnCode::Error => {
                self.last_mode = Mode::PreemptiveExpandFail;
                return Err(TaoError::InvalidArgument(format!(
                    "预扩展输入不足: {} 个采样, 旧数据 {}",
                    input.len() / self.num_channels,
                    old_borrowed
                )));
            }
        };
        trace!("预扩展: {:?}, 插入 {} 个采样", code, added);

        if borrowed > 0 {
            let position = self.sync_buffer.size() - borrowed;
            self.sync_buffer
                .replace_at_index(&self.algorithm_buffer, borrowed, position);
            self.algorithm_buffer.pop_front(borrowed);
        }
        self.expand.reset();
        Ok(())
    }

    /// 用背景噪声模型生成一帧舒适噪声
    pub fn do_comfort_noise(&mut self) -> TaoResult<()> {
        let n = self.output_size_samples;
        self.algorithm_buffer = AudioMultiVector::with_size(self.num_channels, n);
        let mut random = vec![0i16; n];
        let mut noise = vec![0i16; n];
        for ch in 0..self.num_channels {
            self.random_vector.generate(&mut random);
            self.background_noise.set_mute_factor(ch, 16384);
            self.background_noise
                .generate_background_noise(&random, ch, 0, false, true, &mut noise);
            self.algorithm_buffer[ch].overwrite_at(&noise, 0);
        }
        self.last_mode = Mode::Rfc3389Cng;
        self.expand.reset();
        Ok(())
    }

    /// 生成一帧 DTMF 音
    ///
    /// 生成器未初始化时先按 `event`/`attenuation` 初始化, 之后的调用延续相位.
    pub fn do_dtmf(&mut self, event: u8, attenuation: u8) -> TaoResult<()> {
        if !self.dtmf_tone_generator.initialized() {
            self.dtmf_tone_generator
                .init(self.fs_hz, event, attenuation)?;
        }
        self.algorithm_buffer.clear();
        self.dtmf_tone_generator
            .generate(self.output_size_samples, &mut self.algorithm_buffer)?;
        self.sync_buffer
            .increase_end_timestamp(self.output_size_samples as u32);
        self.expand.reset();
        self.last_mode = Mode::Dtmf;
        Ok(())
    }

    /// 最近一次操作直接输出了解码数据时, 用同步缓冲更新背景噪声估计
    ///
    /// 修改过信号的操作 (隐藏, 衔接, 变速成功) 之后不更新. 返回是否更新.
    pub fn do_background_noise_update(&mut self, vad: VadDecision) -> bool {
        let update = matches!(
            self.last_mode,
            Mode::Normal
                | Mode::AccelerateFail
                | Mode::PreemptiveExpandFail
                | Mode::Rfc3389Cng
                | Mode::CodecInternalCng
        );
        if update {
            self.background_noise.update(&self.sync_buffer, vad);
        }
        update
    }

    /// 把算法缓冲追加到同步缓冲, 取出一帧 (10 ms) 交错输出
    ///
    /// `output` 至少容纳 `output_size_samples * 声道数` 个采样. 返回每声道
    /// 输出的采样数; 未来数据不足时其余部分补零.
    pub fn get_audio(&mut self, vad: VadDecision, output: &mut [i16]) -> TaoResult<usize> {
        let required = self.output_size_samples * self.num_channels;
        if output.len() < required {
            return Err(TaoError::InvalidArgument(format!(
                "输出缓冲过小: {} < {}",
                output.len(),
                required
            )));
        }
        self.sync_buffer.push_back(&self.algorithm_buffer);
        self.algorithm_buffer.clear();
        if self.last_mode == Mode::Dtmf {
            let size = self.sync_buffer.size();
            self.sync_buffer.set_dtmf_index(size);
        }

        let read = self
            .sync_buffer
            .get_next_audio_interleaved(self.output_size_samples, output);
        if read < self.output_size_samples {
            warn!(
                "可播放数据不足: 需要 {} 个采样, 只有 {}",
                self.output_size_samples, read
            );
            output[read * self.num_channels..required].fill(0);
        }
        self.do_background_noise_update(vad);
        Ok(self.output_size_samples)
    }

    /// 清空所有状态, 回到刚创建时的样子
    pub fn flush(&mut self) {
        self.sync_buffer.flush();
        let next = self.sync_buffer.next_index();
        self.sync_buffer
            .set_next_index(next - self.expand.overlap_length());
        self.background_noise.reset();
        self.random_vector.reset();
        self.expand.reset();
        self.dtmf_tone_generator.reset();
        self.algorithm_buffer.clear();
        self.mute_factors.fill(16384);
        self.last_mode = Mode::Normal;
    }

    /// 拼出 30 ms 的变速输入, 返回 (交错输入, 每声道借用的采样数)
    fn borrow_from_sync_buffer(&self, decoded: &[i16]) -> (Vec<i16>, usize) {
        let required = STRETCH_REQUIRED_SAMPLES * self.fs_mult;
        let decoded_per_channel = decoded.len() / self.num_channels;
        if decoded_per_channel >= required {
            return (decoded.to_vec(), 0);
        }
        let borrowed = (required - decoded_per_channel).min(self.sync_buffer.size());
        let mut input = vec![0i16; borrowed * self.num_channels + decoded.len()];
        self.sync_buffer
            .read_interleaved_from_end(borrowed, &mut input[..borrowed * self.num_channels]);
        input[borrowed * self.num_channels..].copy_from_slice(decoded);
        (input, borrowed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.fs_hz
    }

    pub fn channels(&self) -> usize {
        self.num_channels
    }

    /// 每帧每声道的输出采样数 (10 ms)
    pub fn output_size_samples(&self) -> usize {
        self.output_size_samples
    }

    pub fn last_mode(&self) -> Mode {
        self.last_mode
    }

    pub fn mute_factor(&self, ch: usize) -> i16 {
        self.mute_factors[ch]
    }

    pub fn sync_buffer(&self) -> &SyncBuffer {
        &self.sync_buffer
    }

    pub fn background_noise(&self) -> &BackgroundNoise {
        &self.background_noise
    }

    pub fn background_noise_mut(&mut self) -> &mut BackgroundNoise {
        &mut self.background_noise
    }

    pub fn expand(&self) -> &dyn Expander {
        self.expand.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tao_core::spl::rand_u;

    fn sine(len: usize, period: f64, amplitude: f64) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * i as f64 / period).sin()) as i16)
            .collect()
    }

    fn noise(len: usize, amplitude: i32, seed: u32) -> Vec<i16> {
        let mut seed = seed;
        (0..len)
            .map(|_| ((rand_u(&mut seed) as i32 - 16384) * amplitude / 16384) as i16)
            .collect()
    }

    /// 每次输出 40 个常数采样并记录调用次数的隐藏器
    struct MockExpander {
        calls: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
        overlap_length: usize,
    }

    impl Expander for MockExpander {
        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn process(
            &mut self,
            _ctx: &mut ExpandContext<'_>,
            output: &mut AudioMultiVector,
        ) -> TaoResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *output = AudioMultiVector::with_size(output.channels(), 40);
            for ch in 0..output.channels() {
                output[ch].as_mut_slice().fill(1000);
            }
            Ok(())
        }

        fn set_parameters_for_normal_after_expand(&mut self) {}

        fn set_parameters_for_merge_after_expand(&mut self) {}

        fn muted(&self) -> bool {
            false
        }

        fn mute_factor(&self, _channel: usize) -> i16 {
            16384
        }

        fn overlap_length(&self) -> usize {
            self.overlap_length
        }

        fn max_lag(&self) -> usize {
            40
        }

        fn too_many_expands(&self) -> bool {
            false
        }

        fn expand_duration_samples(&self) -> usize {
            0
        }
    }

    #[derive(Default)]
    struct MockExpandFactory {
        calls: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl ExpandFactory for MockExpandFactory {
        fn create(&self, fs_hz: u32, _num_channels: usize) -> TaoResult<Box<dyn Expander>> {
            Ok(Box::new(MockExpander {
                calls: Arc::clone(&self.calls),
                resets: Arc::clone(&self.resets),
                overlap_length: 5 * fs_hz as usize / 8000,
            }))
        }
    }

    fn with_mock(fs_hz: u32, factory: &MockExpandFactory) -> DspOperations {
        DspOperations::with_factories(
            fs_hz,
            1,
            factory,
            &DefaultAccelerateFactory,
            &DefaultPreemptiveExpandFactory,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_configuration() {
        assert!(DspOperations::new(22050, 1).is_err());
        assert!(DspOperations::new(16000, 0).is_err());
        let ops = DspOperations::new(16000, 2).unwrap();
        assert_eq!(ops.output_size_samples(), 160);
        assert_eq!(ops.sync_buffer().size(), 5760 * 2);
        assert_eq!(ops.sync_buffer().future_length(), ops.expand().overlap_length());
        assert_eq!(ops.last_mode(), Mode::Normal);
    }

    #[test]
    fn test_normal_output_is_delayed_by_overlap() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let overlap = ops.expand().overlap_length();
        let decoded = sine(80, 40.0, 6000.0);
        ops.do_normal(&decoded, SpeechType::Speech).unwrap();
        let mut out = [0i16; 80];
        assert_eq!(ops.get_audio(VadDecision::Active, &mut out).unwrap(), 80);
        assert!(out[..overlap].iter().all(|&s| s == 0));
        assert_eq!(&out[overlap..], &decoded[..80 - overlap]);
        assert_eq!(ops.sync_buffer().future_length(), overlap);
    }

    #[test]
    fn test_expand_uses_injected_expander() {
        let factory = MockExpandFactory::default();
        let mut ops = with_mock(8000, &factory);
        ops.do_expand().unwrap();
        // 未来长度 5 -> 45 -> 85
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ops.last_mode(), Mode::Expand);

        let mut out = [0i16; 80];
        ops.get_audio(VadDecision::Passive, &mut out).unwrap();
        assert!(out[..5].iter().all(|&s| s == 0));
        assert!(out[5..].iter().all(|&s| s == 1000));
    }

    #[test]
    fn test_merge_resets_expander() {
        let factory = MockExpandFactory::default();
        let mut ops = with_mock(8000, &factory);
        ops.do_expand().unwrap();
        let mut out = [0i16; 80];
        ops.get_audio(VadDecision::Passive, &mut out).unwrap();

        let resets_before = factory.resets.load(Ordering::SeqCst);
        ops.do_merge(&sine(80, 40.0, 1000.0), SpeechType::Speech)
            .unwrap();
        assert_eq!(ops.last_mode(), Mode::Merge);
        assert_eq!(factory.resets.load(Ordering::SeqCst), resets_before + 1);
        ops.get_audio(VadDecision::Active, &mut out).unwrap();
    }

    #[test]
    fn test_real_expand_then_normal_recovers() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let mut out = [0i16; 80];
        for i in 0..20 {
            let frame = sine(80, 40.0, 8000.0);
            ops.do_normal(&frame, SpeechType::Speech).unwrap();
            ops.get_audio(VadDecision::Active, &mut out).unwrap();
            assert_eq!(ops.last_mode(), Mode::Normal, "frame {}", i);
        }
        for _ in 0..3 {
            ops.do_expand().unwrap();
            ops.get_audio(VadDecision::Active, &mut out).unwrap();
            assert!(out.iter().any(|&s| s != 0));
        }
        ops.do_normal(&sine(80, 40.0, 8000.0), SpeechType::Speech)
            .unwrap();
        assert_eq!(ops.last_mode(), Mode::Normal);
        ops.get_audio(VadDecision::Active, &mut out).unwrap();
        assert!(ops.mute_factor(0) > 0);
    }

    #[test]
    fn test_accelerate_shortens_playout() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let decoded = sine(240, 50.0, 10000.0);
        let future_before = ops.sync_buffer().future_length();
        ops.do_accelerate(&decoded, false).unwrap();
        assert_eq!(ops.last_mode(), Mode::AccelerateSuccess);
        let mut out = [0i16; 80];
        ops.get_audio(VadDecision::Active, &mut out).unwrap();
        let added = ops.sync_buffer().future_length() + 80 - future_before;
        assert!(added < 240, "added = {}", added);
    }

    #[test]
    fn test_preemptive_expand_borrows_from_sync_buffer() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let mut out = [0i16; 80];
        for _ in 0..4 {
            ops.do_normal(&sine(80, 50.0, 10000.0), SpeechType::Speech)
                .unwrap();
            ops.get_audio(VadDecision::Active, &mut out).unwrap();
        }
        // 只有 20 ms 新数据, 需要借用 10 ms 历史
        let decoded = sine(160, 50.0, 10000.0);
        let result = ops.do_preemptive_expand(&decoded);
        assert!(result.is_ok(), "{:?}", result);
        assert!(matches!(
            ops.last_mode(),
            Mode::PreemptiveExpandSuccess | Mode::PreemptiveExpandFail
        ));
    }

    #[test]
    fn test_short_frame_borrows_history_for_accelerate() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let size = ops.sync_buffer().size();
        ops.do_accelerate(&[0i16; 80], false).unwrap();
        // 静音按低能量处理, 借用的 160 个采样写回后同步缓冲长度不变
        assert_eq!(ops.last_mode(), Mode::AccelerateLowEnergy);
        assert_eq!(ops.sync_buffer().size(), size);
    }

    #[test]
    fn test_get_audio_rejects_small_buffer() {
        let mut ops = DspOperations::new(8000, 2).unwrap();
        let mut out = vec![0i16; 100];
        assert!(matches!(
            ops.get_audio(VadDecision::Active, &mut out),
            Err(TaoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dtmf_frame() {
        let mut ops = DspOperations::new(16000, 1).unwrap();
        ops.do_dtmf(5, 10).unwrap();
        assert_eq!(ops.last_mode(), Mode::Dtmf);
        assert_eq!(ops.sync_buffer().end_timestamp().0, 160);
        let mut out = [0i16; 160];
        ops.get_audio(VadDecision::Active, &mut out).unwrap();
        assert!(out.iter().any(|&s| s != 0));
        assert_eq!(ops.sync_buffer().dtmf_index(), ops.sync_buffer().size());
        assert!(ops.do_dtmf(16, 0).is_ok(), "已初始化时不再检查事件编号");
    }

    #[test]
    fn test_background_noise_updates_only_after_plain_decoding() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let mut out = [0i16; 80];
        for i in 0..4 {
            ops.do_normal(&noise(80, 300, i + 1), SpeechType::Speech)
                .unwrap();
            ops.get_audio(VadDecision::Passive, &mut out).unwrap();
        }
        assert!(ops.background_noise().initialized());

        ops.do_expand().unwrap();
        assert!(!ops.do_background_noise_update(VadDecision::Passive));
    }

    #[test]
    fn test_comfort_noise_then_normal() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        let mut out = [0i16; 80];
        for i in 0..4 {
            ops.do_normal(&noise(80, 300, i + 7), SpeechType::Speech)
                .unwrap();
            ops.get_audio(VadDecision::Passive, &mut out).unwrap();
        }
        ops.do_comfort_noise().unwrap();
        assert_eq!(ops.last_mode(), Mode::Rfc3389Cng);
        ops.get_audio(VadDecision::Passive, &mut out).unwrap();
        assert!(out.iter().any(|&s| s != 0));

        ops.do_normal(&noise(80, 300, 99), SpeechType::Speech)
            .unwrap();
        assert_eq!(ops.mute_factor(0), 16384);
    }

    #[test]
    fn test_flush_restores_initial_state() {
        let mut ops = DspOperations::new(8000, 1).unwrap();
        ops.do_expand().unwrap();
        ops.flush();
        assert_eq!(ops.last_mode(), Mode::Normal);
        assert_eq!(
            ops.sync_buffer().future_length(),
            ops.expand().overlap_length()
        );
        assert!(!ops.background_noise().initialized());
    }
}
