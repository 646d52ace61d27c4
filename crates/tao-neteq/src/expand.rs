//! 丢包隐藏 (Expand).
//!
//! 首次调用时分析同步缓冲末尾的历史: 在 4 kHz 降采样域找出基音候选, 在原采样率
//! 用最小失真细化, 提取两段一个周期长的"扩展向量"并估计 6 阶 AR 清音滤波器.
//! 之后每次调用输出一个周期:
//! - 浊音部分在两个扩展向量间按 100/0, 75/25, 50/50 往返混合, 避免完全重复
//! - 清音部分为随机激励经 AR 滤波
//! - 两者按相关系数决定的比例交叉淡化, 再叠加背景噪声
//!
//! 连续隐藏第 3 次和第 7 次时提高静音斜率, 长时间丢包最终衰减到只剩背景噪声.

use log::{debug, trace};
use tao_core::spl::{
    affine_transform_vector, cross_correlation, div_w32_w16, dot_product_with_scale,
    downsample_fast, filter_ar_fast_q12, filter_ma_fast_q12, get_size_in_bits, levinson_durbin,
    max_abs_w16, max_abs_w32, max_index_w32, norm_w32, sat_w16, scale_and_add_vectors_with_round,
    shift_w32, sqrt_floor, vector_bit_shift_w16, vector_bit_shift_w32_to_w16,
};
use tao_core::{TaoError, TaoResult};

use crate::audio_multi_vector::AudioMultiVector;
use crate::audio_vector::AudioVector;
use crate::background_noise::BackgroundNoise;
use crate::cross_correlation::cross_correlation_with_auto_shift;
use crate::dsp_helper::{self, cross_fade, min_distortion, mute_signal, peak_detection};
use crate::fs_mult_for;
use crate::random_vector::{RANDOM_TABLE, RANDOM_TABLE_SIZE, RandomVector};
use crate::sync_buffer::SyncBuffer;

/// 清音 AR 滤波器阶数
const UNVOICED_LPC_ORDER: usize = 6;
/// 基音候选个数
const NUM_CORRELATION_CANDIDATES: usize = 3;
/// 最小失真搜索的比较长度 (8 kHz 采样数)
const DISTORTION_LENGTH: usize = 20;
/// LPC 分析窗长度 (8 kHz 采样数)
const LPC_ANALYSIS_LENGTH: usize = 160;
/// 连续隐藏计数上限
const MAX_CONSECUTIVE_EXPANDS: usize = 200;
const NUM_LAGS: usize = 3;

/// 4 kHz 域的相关搜索: 从延迟 10 开始共 54 个延迟, 相关长度 60
const CORRELATION_START_LAG: usize = 10;
const NUM_CORRELATION_LAGS: usize = 54;
const CORRELATION_LENGTH: usize = 60;
const DOWNSAMPLED_LENGTH: usize = CORRELATION_START_LAG + NUM_CORRELATION_LAGS + CORRELATION_LENGTH;

/// 隐藏过程需要访问的共享状态
///
/// 这些对象由 [`DspOperations`](crate::DspOperations) 持有, 每次调用时借给隐藏器.
pub struct ExpandContext<'a> {
    /// 已播放历史, 分析与衔接都在其尾部进行
    pub sync_buffer: &'a mut SyncBuffer,
    pub background_noise: &'a mut BackgroundNoise,
    pub random_vector: &'a mut RandomVector,
}

/// 丢包隐藏器接口
///
/// 默认实现为 [`Expand`]. 通过 [`ExpandFactory`] 可以替换为其它实现 (例如测试用的桩).
pub trait Expander: Send {
    /// 回到"下一次调用需要重新分析"的状态
    fn reset(&mut self);

    /// 生成一段隐藏信号写入 `output` (长度为当前基音周期)
    fn process(&mut self, ctx: &mut ExpandContext<'_>, output: &mut AudioMultiVector)
    -> TaoResult<()>;

    /// 隐藏结束后由 Normal 调用: 固定使用第一个延迟且不再静音
    fn set_parameters_for_normal_after_expand(&mut self);

    /// 隐藏结束后由 Merge 调用: 下一次输出使用最优延迟且不再静音
    fn set_parameters_for_merge_after_expand(&mut self);

    /// 所有声道是否已完全静音
    fn muted(&self) -> bool;

    /// 声道 `channel` 的 Q14 静音系数
    fn mute_factor(&self, channel: usize) -> i16;

    /// 与历史尾部做重叠相加的长度
    fn overlap_length(&self) -> usize;

    /// 最大基音延迟
    fn max_lag(&self) -> usize;

    /// 连续隐藏次数是否达到上限
    fn too_many_expands(&self) -> bool;

    /// 当前隐藏期累计输出的采样数 (上限 2 秒)
    fn expand_duration_samples(&self) -> usize;
}

/// 隐藏器工厂
pub trait ExpandFactory: Send {
    fn create(&self, fs_hz: u32, num_channels: usize) -> TaoResult<Box<dyn Expander>>;
}

/// 创建 [`Expand`] 的默认工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExpandFactory;

impl ExpandFactory for DefaultExpandFactory {
    fn create(&self, fs_hz: u32, num_channels: usize) -> TaoResult<Box<dyn Expander>> {
        Ok(Box::new(Expand::new(fs_hz, num_channels)?))
    }
}

#[derive(Debug, Clone)]
struct ChannelParameters {
    mute_factor: i16,
    ar_filter: [i16; UNVOICED_LPC_ORDER + 1],
    ar_filter_state: [i16; UNVOICED_LPC_ORDER],
    ar_gain: i16,
    ar_gain_scale: i16,
    voice_mix_factor: i16,
    current_voice_mix_factor: i16,
    expand_vector0: AudioVector,
    expand_vector1: AudioVector,
    onset: bool,
    /// Q20
    mute_slope: i32,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        let mut ar_filter = [0i16; UNVOICED_LPC_ORDER + 1];
        ar_filter[0] = 4096;
        Self {
            mute_factor: 16384,
            ar_filter,
            ar_filter_state: [0; UNVOICED_LPC_ORDER],
            ar_gain: 0,
            ar_gain_scale: 0,
            voice_mix_factor: 0,
            current_voice_mix_factor: 0,
            expand_vector0: AudioVector::new(),
            expand_vector1: AudioVector::new(),
            onset: false,
            mute_slope: 0,
        }
    }
}

/// 基音重复 + LPC 噪声的丢包隐藏器
#[derive(Debug, Clone)]
pub struct Expand {
    fs_hz: u32,
    fs_mult: usize,
    num_channels: usize,
    first_expand: bool,
    consecutive_expands: usize,
    overlap_length: usize,
    max_lag: usize,
    expand_lags: [usize; NUM_LAGS],
    lag_index_direction: i32,
    current_lag_index: i32,
    stop_muting: bool,
    expand_duration_samples: usize,
    channel_parameters: Vec<ChannelParameters>,
}

impl Expand {
    /// 创建隐藏器, 仅支持 8/16/32/48 kHz
    pub fn new(fs_hz: u32, num_channels: usize) -> TaoResult<Self> {
        let fs_mult = fs_mult_for(fs_hz)?;
        if num_channels == 0 {
            return Err(TaoError::InvalidArgument("声道数不能为 0".into()));
        }
        let mut expand = Self {
            fs_hz,
            fs_mult,
            num_channels,
            first_expand: true,
            consecutive_expands: 0,
            overlap_length: 5 * fs_mult,
            max_lag: 0,
            expand_lags: [0; NUM_LAGS],
            lag_index_direction: 0,
            current_lag_index: 0,
            stop_muting: false,
            expand_duration_samples: 0,
            channel_parameters: vec![ChannelParameters::default(); num_channels],
        };
        Expander::reset(&mut expand);
        Ok(expand)
    }

    /// 连续第几次隐藏 (从 0 开始, 上限 200)
    pub fn consecutive_expands(&self) -> usize {
        self.consecutive_expands
    }

    fn initialize_for_an_expand_period(&mut self, ctx: &mut ExpandContext<'_>) {
        self.lag_index_direction = 1;
        self.current_lag_index = -1;
        self.stop_muting = false;
        ctx.random_vector.set_seed_increment(1);
        self.consecutive_expands = 0;
        for (ch, p) in self.channel_parameters.iter_mut().enumerate() {
            p.current_voice_mix_factor = 16384;
            p.mute_factor = 16384;
            // 背景噪声从零增益开始渐入
            if ch < ctx.background_noise.num_channels() {
                ctx.background_noise.set_mute_factor(ch, 0);
            }
        }
    }

    fn update_lag_index(&mut self) {
        self.current_lag_index += self.lag_index_direction;
        if self.current_lag_index <= 0 {
            self.lag_index_direction = 1;
        }
        if self.current_lag_index >= NUM_LAGS as i32 - 1 {
            self.lag_index_direction = -1;
        }
    }

    /// 每块不超过随机表长度, 每块之前步长加 `seed_increment`
    fn generate_random_vector(random: &mut RandomVector, seed_increment: usize, output: &mut [i16]) {
        for chunk in output.chunks_mut(RANDOM_TABLE_SIZE) {
            random.increase_seed_increment(seed_increment);
            random.generate(chunk);
        }
    }

    fn tapering_window(&self) -> (i16, i16, i16, i16) {
        match self.fs_hz {
            8000 => (
                dsp_helper::MUTE_FACTOR_START_8KHZ,
                dsp_helper::MUTE_FACTOR_INCREMENT_8KHZ,
                dsp_helper::UNMUTE_FACTOR_START_8KHZ,
                dsp_helper::UNMUTE_FACTOR_INCREMENT_8KHZ,
            ),
            16000 => (
                dsp_helper::MUTE_FACTOR_START_16KHZ,
                dsp_helper::MUTE_FACTOR_INCREMENT_16KHZ,
                dsp_helper::UNMUTE_FACTOR_START_16KHZ,
                dsp_helper::UNMUTE_FACTOR_INCREMENT_16KHZ,
            ),
            32000 => (
                dsp_helper::MUTE_FACTOR_START_32KHZ,
                dsp_helper::MUTE_FACTOR_INCREMENT_32KHZ,
                dsp_helper::UNMUTE_FACTOR_START_32KHZ,
                dsp_helper::UNMUTE_FACTOR_INCREMENT_32KHZ,
            ),
            _ => (
                dsp_helper::MUTE_FACTOR_START_48KHZ,
                dsp_helper::MUTE_FACTOR_INCREMENT_48KHZ,
                dsp_helper::UNMUTE_FACTOR_START_48KHZ,
                dsp_helper::UNMUTE_FACTOR_INCREMENT_48KHZ,
            ),
        }
    }

    /// 在 4 kHz 域计算归一化到 16 位的自相关, 对应原采样率的延迟 20..120 (8 kHz 下)
    fn correlation(&self, input: &[i16]) -> TaoResult<[i16; NUM_CORRELATION_LAGS]> {
        let (coef, factor, _) = dsp_helper::downsample_filter(self.fs_hz)
            .ok_or_else(|| TaoError::InvalidArgument(format!("不支持的采样率 {}", self.fs_hz)))?;
        let mut downsampled = [0i16; DOWNSAMPLED_LENGTH];
        let start = input.len() - DOWNSAMPLED_LENGTH * factor;
        downsample_fast(input, start, &mut downsampled, coef, factor, 0)?;

        // 放大到占满 16 位
        let max_value = max_abs_w16(&downsampled);
        let norm_shift = 16 - norm_w32(max_value as i32) as i32;
        let unscaled = downsampled;
        vector_bit_shift_w16(&mut downsampled, &unscaled, norm_shift);

        let mut correlation = [0i32; NUM_CORRELATION_LAGS];
        cross_correlation_with_auto_shift(
            &downsampled[DOWNSAMPLED_LENGTH - CORRELATION_LENGTH..],
            &downsampled,
            DOWNSAMPLED_LENGTH - CORRELATION_LENGTH - CORRELATION_START_LAG,
            CORRELATION_LENGTH,
            -1,
            &mut correlation,
        );

        let max_correlation = max_abs_w32(&correlation);
        let norm_shift2 = (18 - norm_w32(max_correlation) as i32).max(0);
        let mut output = [0i16; NUM_CORRELATION_LAGS];
        vector_bit_shift_w32_to_w16(&mut output, &correlation, norm_shift2);
        Ok(output)
    }

    /// 分析同步缓冲尾部, 估计所有隐藏参数, 返回第一次输出使用的随机激励
    fn analyze_signal(&mut self, ctx: &mut ExpandContext<'_>) -> TaoResult<Vec<i16>> {
        let fs_mult = self.fs_mult;
        let fs_mult_4 = 4 * fs_mult;
        let fs_mult_20 = 20 * fs_mult;
        let fs_mult_120 = 120 * fs_mult;
        let dist_len = DISTORTION_LENGTH * fs_mult;
        let lpc_len = LPC_ANALYSIS_LENGTH * fs_mult;
        let signal_length = 256 * fs_mult;

        let sync_len = ctx.sync_buffer.size();
        if sync_len < signal_length || ctx.sync_buffer.channels() < self.num_channels {
            return Err(TaoError::InvalidArgument(format!(
                "同步缓冲过短: 需要 {} 个采样, 实际 {}",
                signal_length, sync_len
            )));
        }
        let history_position = sync_len - signal_length;
        let histories: Vec<Vec<i16>> = (0..self.num_channels)
            .map(|ch| ctx.sync_buffer[ch].as_slice()[history_position..].to_vec())
            .collect();

        self.initialize_for_an_expand_period(ctx);

        // 基音候选由第一个声道决定
        let mut correlation_vector = self.correlation(&histories[0])?;
        let peaks = peak_detection(
            &mut correlation_vector,
            51,
            NUM_CORRELATION_CANDIDATES,
            fs_mult,
        );
        let mut best_correlation_index = [0usize; NUM_CORRELATION_CANDIDATES];
        let mut best_correlation = [0i16; NUM_CORRELATION_CANDIDATES];
        for (i, &(index, value)) in peaks.iter().take(NUM_CORRELATION_CANDIDATES).enumerate() {
            // 相关延迟从 2.5 ms 起算
            best_correlation_index[i] = index + fs_mult_20;
            best_correlation[i] = value;
        }

        let mut best_distortion_index = [0usize; NUM_CORRELATION_CANDIDATES];
        let mut best_distortion_w32 = [0i32; NUM_CORRELATION_CANDIDATES];
        let mut distortion_scale = 0i32;
        for i in 0..NUM_CORRELATION_CANDIDATES {
            let min_index = fs_mult_20.max(best_correlation_index[i].saturating_sub(fs_mult_4));
            let max_index = (fs_mult_120 - 1).min(best_correlation_index[i] + fs_mult_4);
            let (index, distortion) = min_distortion(
                &histories[0],
                signal_length - dist_len,
                min_index,
                max_index.max(min_index),
                dist_len,
            );
            best_distortion_index[i] = index;
            best_distortion_w32[i] = distortion;
            distortion_scale = distortion_scale.max(16 - norm_w32(distortion) as i32);
        }
        let mut best_distortion = [0i16; NUM_CORRELATION_CANDIDATES];
        vector_bit_shift_w32_to_w16(&mut best_distortion, &best_distortion_w32, distortion_scale);

        // 最大化 correlation / distortion
        let mut best_ratio = i32::MIN;
        let mut best_index = 0;
        for i in 0..NUM_CORRELATION_CANDIDATES {
            let ratio = if best_distortion[i] > 0 {
                ((best_correlation[i] as i32) << 16) / best_distortion[i] as i32
            } else if best_correlation[i] == 0 {
                0
            } else {
                i32::MAX
            };
            if ratio > best_ratio {
                best_index = i;
                best_ratio = ratio;
            }
        }

        let distortion_lag = best_distortion_index[best_index];
        let correlation_lag = best_correlation_index[best_index];
        self.max_lag = distortion_lag.max(correlation_lag);

        let correlation_length = (distortion_lag + 10).min(fs_mult_120).max(60 * fs_mult);
        let start_index = distortion_lag.min(correlation_lag);
        let correlation_lags = distortion_lag.abs_diff(correlation_lag) + 1;

        self.expand_lags = if distortion_lag == correlation_lag {
            [distortion_lag; NUM_LAGS]
        } else {
            let third = if distortion_lag > correlation_lag {
                (distortion_lag + correlation_lag - 1) / 2
            } else {
                (distortion_lag + correlation_lag + 1) / 2
            };
            [distortion_lag, (distortion_lag + correlation_lag) / 2, third]
        };

        let expansion_length = self.max_lag + self.overlap_length;
        for (ch, history) in histories.iter().enumerate() {
            let params = &mut self.channel_parameters[ch];

            let max_region_start = signal_length - correlation_length - start_index - correlation_lags;
            let signal_max = max_abs_w16(
                &history[max_region_start
                    ..max_region_start + correlation_length + start_index + correlation_lags - 1],
            ) as i32;
            let correlation_scale = ((31 - norm_w32(signal_max * signal_max) as i32)
                + (31 - norm_w32(correlation_length as i32) as i32)
                - 31)
                .max(0) as u32;

            let mut correlation_vector2 = vec![0i32; correlation_lags];
            cross_correlation(
                &mut correlation_vector2,
                &history[signal_length - correlation_length..],
                history,
                signal_length - correlation_length - start_index,
                correlation_length,
                correlation_scale,
                -1,
            );
            let index = max_index_w32(&correlation_vector2);
            let mut max_correlation = correlation_vector2[index];
            let lag = index + start_index;

            let current = &history[signal_length - correlation_length..];
            let delayed = &history[signal_length - correlation_length - lag..][..correlation_length];
            let energy1 = dot_product_with_scale(current, current, correlation_scale);
            let energy2 = dot_product_with_scale(delayed, delayed, correlation_scale);

            // max_correlation / sqrt(energy1 * energy2), Q14
            let corr_coefficient = if energy1 > 0 && energy2 > 0 {
                let mut energy1_scale = (16 - norm_w32(energy1) as i32).max(0);
                let energy2_scale = (16 - norm_w32(energy2) as i32).max(0);
                // 总移位取偶数便于开方
                if (energy1_scale + energy2_scale) & 1 != 0 {
                    energy1_scale += 1;
                }
                let product = (energy1 >> energy1_scale) as i64 * (energy2 >> energy2_scale) as i64;
                let sqrt_energy_product = sqrt_floor(product.min(i32::MAX as i64) as i32) as i16;
                let cc_shift = 14 - (energy1_scale + energy2_scale) / 2;
                max_correlation = shift_w32(max_correlation, cc_shift);
                div_w32_w16(max_correlation, sqrt_energy_product).min(16384)
            } else {
                0
            };

            // 两个扩展向量: 最近一段与其前一个 distortion_lag 的一段
            let vector1 = &history[signal_length - expansion_length..];
            let vector2 = &history[signal_length - expansion_length - distortion_lag..][..expansion_length];
            let energy1 = dot_product_with_scale(vector1, vector1, correlation_scale);
            let energy2 = dot_product_with_scale(vector2, vector2, correlation_scale);
            params.expand_vector0 = AudioVector::from_slice(vector1);
            // 能量比在 0.25..4 之内时按幅度比对齐第二个向量
            let amplitude_ratio: i16 = if energy1 / 4 < energy2 && energy1 > energy2 / 4 {
                let scaled_energy2 = (16 - norm_w32(energy2) as i32).max(0);
                let scaled_energy1 = scaled_energy2 - 13;
                let energy_ratio = div_w32_w16(
                    shift_w32(energy1, -scaled_energy1),
                    (energy2 >> scaled_energy2) as i16,
                );
                let amplitude_ratio = sqrt_floor(shift_w32(energy_ratio, 13)) as i16;
                let mut scaled = vec![0i16; expansion_length];
                affine_transform_vector(&mut scaled, vector2, amplitude_ratio, 4096, 13);
                params.expand_vector1 = AudioVector::from_slice(&scaled);
                amplitude_ratio
            } else {
                params.expand_vector1 = params.expand_vector0.clone();
                if energy1 / 4 < energy2 || energy2 == 0 {
                    4096
                } else {
                    16384
                }
            };

            // LPC: 前补零后做 6 阶自相关
            let mut temp_signal = vec![0i16; lpc_len + UNVOICED_LPC_ORDER];
            temp_signal[UNVOICED_LPC_ORDER..].copy_from_slice(&history[signal_length - lpc_len..]);
            let mut auto_correlation = [0i32; UNVOICED_LPC_ORDER + 1];
            cross_correlation_with_auto_shift(
                &temp_signal[UNVOICED_LPC_ORDER..],
                &temp_signal,
                UNVOICED_LPC_ORDER,
                lpc_len,
                -1,
                &mut auto_correlation,
            );
            if auto_correlation[0] > 0 {
                match levinson_durbin(&auto_correlation, UNVOICED_LPC_ORDER) {
                    Some((lpc, _)) => params.ar_filter.copy_from_slice(&lpc),
                    None => {
                        params.ar_filter = [0; UNVOICED_LPC_ORDER + 1];
                        params.ar_filter[0] = 4096;
                    }
                }
            }

            // 清音滤波状态与增益
            params
                .ar_filter_state
                .copy_from_slice(&history[signal_length - UNVOICED_LPC_ORDER..]);
            let mut unvoiced = [0i16; 128];
            filter_ma_fast_q12(
                &history[signal_length - 128 - UNVOICED_LPC_ORDER..],
                &mut unvoiced,
                &params.ar_filter,
            );
            let unvoiced_prescale: i32 = if max_abs_w16(&unvoiced) > 4000 { 4 } else { 0 };
            let unvoiced_energy =
                dot_product_with_scale(&unvoiced, &unvoiced, unvoiced_prescale as u32);
            // 归一化到 28 或 29 位, 加上除以 128 的 7 位后总移位为偶数
            let mut unvoiced_scale = norm_w32(unvoiced_energy) as i32 - 3;
            unvoiced_scale += (unvoiced_scale & 1) ^ 1;
            let unvoiced_energy = shift_w32(unvoiced_energy, unvoiced_scale);
            params.ar_gain = sqrt_floor(unvoiced_energy) as i16;
            params.ar_gain_scale = (13 + (unvoiced_scale + 7 - unvoiced_prescale) / 2) as i16;

            // 浊音比例: x > 0.48 时为 (-5179 + 19931x - 16422x^2 + 5776x^3) / 4096
            params.voice_mix_factor = if corr_coefficient > 7875 {
                let x1 = corr_coefficient;
                let x2 = (x1 * x1) >> 14;
                let x3 = (x1 * x2) >> 14;
                let sum = (-5179 << 14) + 19931 * x1 - 16422 * x2 + 5776 * x3;
                (sum / 4096).clamp(0, 16384) as i16
            } else {
                0
            };

            // 静音斜率 (Q20)
            let slope = amplitude_ratio as i32;
            if slope > 12288 {
                // (slope - 1) / (distortion_lag * slope)
                let temp_ratio = div_w32_w16(
                    (slope - 8192) << 12,
                    sat_w16(((distortion_lag as i64 * slope as i64) >> 8) as i32),
                );
                params.mute_slope = if slope > 14746 {
                    (temp_ratio + 1) / 2
                } else {
                    (temp_ratio + 4) / 8
                };
                params.onset = true;
            } else {
                params.mute_slope =
                    div_w32_w16((8192 - slope) << 7, sat_w16(distortion_lag as i32));
                if params.voice_mix_factor <= 13107 {
                    // 6.25 ms 内至少从 1.0 降到 0.9
                    params.mute_slope = params.mute_slope.max(5243 / fs_mult as i32);
                } else if slope > 8028 {
                    params.mute_slope = 0;
                }
                params.onset = false;
            }
        }

        // 清音激励: 先取随机表开头, 超出表长的部分按步长 2 生成
        let noise_length = if distortion_lag < 40 {
            2 * distortion_lag + 30
        } else {
            distortion_lag + 30
        };
        let mut random_vector = vec![0i16; noise_length.max(self.max_lag)];
        if noise_length <= RANDOM_TABLE_SIZE {
            random_vector[..noise_length].copy_from_slice(&RANDOM_TABLE[..noise_length]);
        } else {
            random_vector[..RANDOM_TABLE_SIZE].copy_from_slice(&RANDOM_TABLE);
            ctx.random_vector.increase_seed_increment(2);
            ctx.random_vector
                .generate(&mut random_vector[RANDOM_TABLE_SIZE..noise_length]);
        }

        debug!(
            "丢包隐藏分析: 延迟 {:?}, 最大延迟 {}, 浊音比例 {}",
            self.expand_lags, self.max_lag, self.channel_parameters[0].voice_mix_factor
        );
        Ok(random_vector)
    }
}

impl Expander for Expand {
    fn reset(&mut self) {
        self.first_expand = true;
        self.consecutive_expands = 0;
        self.max_lag = 0;
        for p in &mut self.channel_parameters {
            p.expand_vector0.clear();
            p.expand_vector1.clear();
        }
    }

    fn process(
        &mut self,
        ctx: &mut ExpandContext<'_>,
        output: &mut AudioMultiVector,
    ) -> TaoResult<()> {
        if output.channels() < self.num_channels {
            return Err(TaoError::InvalidArgument(format!(
                "输出声道数 {} 少于隐藏器声道数 {}",
                output.channels(),
                self.num_channels
            )));
        }
        let mut random_vector = if self.first_expand {
            let random_vector = self.analyze_signal(ctx)?;
            self.first_expand = false;
            self.expand_duration_samples = 0;
            random_vector
        } else {
            let mut random_vector = vec![0i16; self.max_lag];
            Self::generate_random_vector(ctx.random_vector, 2, &mut random_vector);
            random_vector
        };

        self.update_lag_index();

        let overlap = self.overlap_length;
        let lag_index = self.current_lag_index.clamp(0, NUM_LAGS as i32 - 1) as usize;
        let current_lag = self.expand_lags[lag_index];
        if random_vector.len() < current_lag {
            random_vector.resize(current_lag, 0);
        }
        let expansion_vector_length = self.max_lag + overlap;
        let position = expansion_vector_length - current_lag - overlap;
        let temp_length = current_lag + overlap;
        let (mute_start, mute_increment, unmute_start, unmute_increment) = self.tapering_window();

        // 延迟越长交叉淡化越慢: <=31, 32..63, >=64 (8 kHz) 分别约 8, 16, 32 ms
        let temp_shift = (get_size_in_bits(self.max_lag as u32) as i32 - 5).clamp(0, 8);
        let mix_factor_increment: i16 = if self.stop_muting { 0 } else { 256 >> temp_shift };
        let fade_shift = 8 - temp_shift;
        let too_many_expands = self.too_many_expands();
        let consecutive = self.consecutive_expands;
        let fs_mult = self.fs_mult as i32;
        let stop_muting = self.stop_muting;

        for ch in 0..self.num_channels {
            let params = &mut self.channel_parameters[ch];

            // 浊音: 前 overlap 个采样用于与历史尾部重叠相加
            let mut voiced = vec![0i16; temp_length];
            if lag_index == 0 {
                params.expand_vector0.copy_to(temp_length, position, &mut voiced);
            } else {
                let mut temp0 = vec![0i16; temp_length];
                let mut temp1 = vec![0i16; temp_length];
                params.expand_vector0.copy_to(temp_length, position, &mut temp0);
                params.expand_vector1.copy_to(temp_length, position, &mut temp1);
                if lag_index == 1 {
                    scale_and_add_vectors_with_round(&temp0, 3, &temp1, 1, 2, &mut voiced);
                } else {
                    scale_and_add_vectors_with_round(&temp0, 1, &temp1, 1, 1, &mut voiced);
                }
            }

            if params.mute_factor > 819 && params.current_voice_mix_factor > 8192 {
                let start = ctx.sync_buffer.size() - overlap;
                let history = ctx.sync_buffer[ch].as_mut_slice();
                let mut muting = mute_start as i32;
                let mut unmuting = unmute_start as i32;
                for i in 0..overlap {
                    let old = history[start + i] as i32;
                    let new = (params.mute_factor as i32 * voiced[i] as i32) >> 14;
                    history[start + i] = ((old * muting + new * unmuting + 16384) >> 15) as i16;
                    muting += mute_increment as i32;
                    unmuting += unmute_increment as i32;
                }
            }

            // 清音: 随机激励经 AR 滤波
            let mut unvoiced = vec![0i16; UNVOICED_LPC_ORDER + current_lag];
            unvoiced[..UNVOICED_LPC_ORDER].copy_from_slice(&params.ar_filter_state);
            let add_constant = if params.ar_gain_scale > 0 {
                1i32 << (params.ar_gain_scale - 1)
            } else {
                0
            };
            let mut scaled_random = vec![0i16; current_lag];
            affine_transform_vector(
                &mut scaled_random,
                &random_vector[..current_lag],
                params.ar_gain,
                add_constant,
                params.ar_gain_scale.max(0) as u32,
            );
            filter_ar_fast_q12(&scaled_random, &mut unvoiced, &params.ar_filter);
            params
                .ar_filter_state
                .copy_from_slice(&unvoiced[current_lag..]);

            let voiced = &voiced[overlap..];
            let unvoiced = &unvoiced[UNVOICED_LPC_ORDER..];
            let mut combined = vec![0i16; current_lag];
            let fade_length = (((params.current_voice_mix_factor as i32
                - params.voice_mix_factor as i32)
                .max(0)
                >> fade_shift) as usize)
                .min(current_lag);
            cross_fade(
                &voiced[..fade_length],
                &unvoiced[..fade_length],
                &mut params.current_voice_mix_factor,
                mix_factor_increment,
                &mut combined[..fade_length],
            );
            if fade_length < current_lag {
                if mix_factor_increment != 0 {
                    params.current_voice_mix_factor = params.voice_mix_factor;
                }
                let unvoiced_scale = 16384 - params.current_voice_mix_factor;
                scale_and_add_vectors_with_round(
                    &voiced[fade_length..],
                    params.current_voice_mix_factor,
                    &unvoiced[fade_length..],
                    unvoiced_scale,
                    14,
                    &mut combined[fade_length..],
                );
            }

            // 第 3 次与第 7 次连续隐藏时加快静音
            if consecutive == 3 {
                params.mute_slope = params.mute_slope.max(1049 / fs_mult);
            }
            if consecutive == 7 {
                params.mute_slope = params.mute_slope.max(2097 / fs_mult);
            }

            if consecutive != 0 || !params.onset {
                let unmuted = combined.clone();
                affine_transform_vector(&mut combined, &unmuted, params.mute_factor, 8192, 14);
                if !stop_muting {
                    mute_signal(&mut combined, params.mute_slope);
                    let gain = (16384 - ((current_lag as i32 * params.mute_slope + 8192) >> 6)).max(0);
                    let gain = ((gain * params.mute_factor as i32 + 8192) >> 14) as i16;
                    // 防止停在很小但仍可闻的增益上
                    params.mute_factor = if consecutive > 3 && gain >= params.mute_factor {
                        0
                    } else {
                        gain
                    };
                }
            }

            let mut noise = vec![0i16; current_lag];
            ctx.background_noise.generate_background_noise(
                &random_vector[..current_lag],
                ch,
                params.mute_slope,
                too_many_expands,
                stop_muting,
                &mut noise,
            );
            for (c, &n) in combined.iter_mut().zip(&noise) {
                *c = c.saturating_add(n);
            }

            if ch == 0 {
                output.ensure_size(current_lag);
            }
            output[ch].overwrite_at(&combined, 0);
        }

        self.consecutive_expands = (self.consecutive_expands + 1).min(MAX_CONSECUTIVE_EXPANDS);
        self.expand_duration_samples =
            (self.expand_duration_samples + output.size()).min(2 * self.fs_hz as usize);
        trace!(
            "丢包隐藏: 第 {} 次, 延迟 {}, 静音系数 {}",
            self.consecutive_expands, current_lag, self.channel_parameters[0].mute_factor
        );
        Ok(())
    }

    fn set_parameters_for_normal_after_expand(&mut self) {
        self.current_lag_index = 0;
        self.lag_index_direction = 0;
        self.stop_muting = true;
        debug!(
            "丢包隐藏结束, 持续 {} ms",
            self.expand_duration_samples / (self.fs_hz as usize / 1000)
        );
    }

    fn set_parameters_for_merge_after_expand(&mut self) {
        self.current_lag_index = -1;
        self.lag_index_direction = 1;
        self.stop_muting = true;
    }

    fn muted(&self) -> bool {
        if self.first_expand || self.stop_muting {
            return false;
        }
        self.channel_parameters.iter().all(|p| p.mute_factor == 0)
    }

    fn mute_factor(&self, channel: usize) -> i16 {
        self.channel_parameters[channel].mute_factor
    }

    fn overlap_length(&self) -> usize {
        self.overlap_length
    }

    fn max_lag(&self) -> usize {
        self.max_lag
    }

    fn too_many_expands(&self) -> bool {
        self.consecutive_expands >= MAX_CONSECUTIVE_EXPANDS
    }

    fn expand_duration_samples(&self) -> usize {
        self.expand_duration_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        sync_buffer: SyncBuffer,
        background_noise: BackgroundNoise,
        random_vector: RandomVector,
    }

    impl Fixture {
        fn new(fs_hz: u32, history: &[i16]) -> Self {
            let mut sync_buffer = SyncBuffer::new(1, history.len());
            let mut block = AudioMultiVector::new(1);
            block.push_back_interleaved(history);
            sync_buffer.push_back(&block);
            Self {
                sync_buffer,
                background_noise: BackgroundNoise::new(fs_hz, 1),
                random_vector: RandomVector::new(),
            }
        }

        fn ctx(&mut self) -> ExpandContext<'_> {
            ExpandContext {
                sync_buffer: &mut self.sync_buffer,
                background_noise: &mut self.background_noise,
                random_vector: &mut self.random_vector,
            }
        }
    }

    fn sine(len: usize, period: f64, amplitude: f64) -> Vec<i16> {
        (0..len)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * i as f64 / period).sin()) as i16)
            .collect()
    }

    #[test]
    fn test_factory_rejects_unsupported_rate() {
        assert!(DefaultExpandFactory.create(44100, 1).is_err());
        let expand = DefaultExpandFactory.create(16000, 2).unwrap();
        assert_eq!(expand.overlap_length(), 10);
        assert!(!expand.muted());
    }

    #[test]
    fn test_output_is_one_pitch_period() {
        let mut fixture = Fixture::new(8000, &sine(480, 40.0, 8000.0));
        let mut expand = Expand::new(8000, 1).unwrap();
        let mut output = AudioMultiVector::new(1);
        expand.process(&mut fixture.ctx(), &mut output).unwrap();

        assert!((20..=120).contains(&output.size()), "len = {}", output.size());
        assert!((20..=120).contains(&expand.max_lag()));
        let peak = max_abs_w16(output[0].as_slice());
        assert!(peak > 2000, "peak = {}", peak);
        assert_eq!(expand.consecutive_expands(), 1);
        assert_eq!(expand.expand_duration_samples(), output.size());
    }

    #[test]
    fn test_mute_factor_decreases_over_consecutive_calls() {
        let mut fixture = Fixture::new(8000, &sine(480, 40.0, 8000.0));
        let mut expand = Expand::new(8000, 1).unwrap();
        let mut factors = Vec::new();
        for _ in 0..8 {
            let mut output = AudioMultiVector::new(1);
            expand.process(&mut fixture.ctx(), &mut output).unwrap();
            factors.push(expand.mute_factor(0));
        }
        assert!(factors[7] < factors[2], "factors = {:?}", factors);
        assert!(factors.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_silence_mutes_completely() {
        let mut fixture = Fixture::new(8000, &[0i16; 480]);
        let mut expand = Expand::new(8000, 1).unwrap();
        let mut muted_at = None;
        for call in 0..30 {
            let mut output = AudioMultiVector::new(1);
            expand.process(&mut fixture.ctx(), &mut output).unwrap();
            assert!(output[0].as_slice().iter().all(|&s| s == 0));
            if expand.muted() {
                muted_at = Some(call);
                break;
            }
        }
        assert!(muted_at.is_some());
    }

    #[test]
    fn test_merge_parameters_stop_muting() {
        let mut fixture = Fixture::new(16000, &sine(1024, 80.0, 6000.0));
        let mut expand = Expand::new(16000, 1).unwrap();
        let mut output = AudioMultiVector::new(1);
        expand.process(&mut fixture.ctx(), &mut output).unwrap();
        expand.set_parameters_for_merge_after_expand();
        let before = expand.mute_factor(0);
        expand.process(&mut fixture.ctx(), &mut output).unwrap();
        assert_eq!(expand.mute_factor(0), before);
        assert!(!expand.muted());

        expand.reset();
        assert_eq!(expand.max_lag(), 0);
        assert_eq!(expand.consecutive_expands(), 0);
    }

    #[test]
    fn test_short_history_is_rejected() {
        let mut fixture = Fixture::new(8000, &[0i16; 100]);
        let mut expand = Expand::new(8000, 1).unwrap();
        let mut output = AudioMultiVector::new(1);
        assert!(expand.process(&mut fixture.ctx(), &mut output).is_err());
    }
}
