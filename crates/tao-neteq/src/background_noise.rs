//! 背景噪声估计与生成.
//!
//! 在非语音段上估计 8 阶 LPC 滤波器与残差能量, 长时间隐藏时用随机激励通过
//! 该滤波器生成舒适噪声.

use log::trace;
use tao_core::spl::{
    affine_transform_vector, dot_product_with_scale, filter_ar_fast_q12, filter_ma_fast_q12,
    levinson_durbin, norm_w32, shift_w32, sqrt_floor,
};

use crate::audio_multi_vector::AudioMultiVector;
use crate::cross_correlation::cross_correlation_with_auto_shift;
use crate::dsp_helper::unmute_signal;

/// 背景噪声 LPC 阶数
pub const MAX_LPC_ORDER: usize = 8;
/// 能量阈值的增长步长 (Q16, 约 0.0035)
const THRESHOLD_INCREMENT: i32 = 229;
/// 分析窗长度
const VEC_LEN: usize = 256;
const LOG_VEC_LEN: u32 = 8;
/// 计算残差能量的长度
const RESIDUAL_LENGTH: usize = 64;
const LOG_RESIDUAL_LENGTH: i32 = 6;

/// 长时间隐藏时背景噪声的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BgnMode {
    /// 持续输出背景噪声
    #[default]
    On,
    /// 不输出背景噪声
    Off,
    /// 隐藏次数过多后逐渐淡出
    Fade,
}

/// 解码后语音活动检测的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// 未启用检测, 仅凭能量阈值判断
    NotRunning,
    /// 检测到语音, 不更新
    Active,
    /// 检测为非语音
    Passive,
}

#[derive(Debug, Clone)]
struct ChannelParameters {
    energy: i32,
    max_energy: i32,
    energy_update_threshold: i32,
    low_energy_update_threshold: i32,
    filter_state: [i16; MAX_LPC_ORDER],
    filter: [i16; MAX_LPC_ORDER + 1],
    mute_factor: i16,
    scale: i16,
    scale_shift: i16,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        let mut filter = [0i16; MAX_LPC_ORDER + 1];
        filter[0] = 4096;
        Self {
            energy: 2500,
            max_energy: 0,
            energy_update_threshold: 500_000,
            low_energy_update_threshold: 0,
            filter_state: [0; MAX_LPC_ORDER],
            filter,
            mute_factor: 0,
            scale: 20000,
            scale_shift: 24,
        }
    }
}

/// 多声道背景噪声模型
#[derive(Debug, Clone)]
pub struct BackgroundNoise {
    fs_hz: u32,
    channels: Vec<ChannelParameters>,
    initialized: bool,
    mode: BgnMode,
}

impl BackgroundNoise {
    pub fn new(fs_hz: u32, num_channels: usize) -> Self {
        Self {
            fs_hz,
            channels: vec![ChannelParameters::default(); num_channels.max(1)],
            initialized: false,
            mode: BgnMode::On,
        }
    }

    /// 清除估计结果, 保留模式
    pub fn reset(&mut self) {
        self.initialized = false;
        self.channels
            .iter_mut()
            .for_each(|p| *p = ChannelParameters::default());
    }

    /// 用 `input` 末尾 256 个采样更新估计
    ///
    /// 只有能量低于自适应阈值 (或 VAD 判定为非语音) 且频谱足够平坦时才保存
    /// 新的滤波器; 否则逐步抬高阈值, 使持续的平稳噪声最终也能被采纳.
    pub fn update(&mut self, input: &AudioMultiVector, vad: VadDecision) {
        if vad == VadDecision::Active || input.size() < VEC_LEN {
            return;
        }
        for ch in 0..self.channels.len().min(input.channels()) {
            // 前 MAX_LPC_ORDER 个零供负延迟相关使用
            let mut temp = [0i16; VEC_LEN + MAX_LPC_ORDER];
            input[ch].copy_to(VEC_LEN, input.size() - VEC_LEN, &mut temp[MAX_LPC_ORDER..]);
            let (auto_correlation, sample_energy) = Self::auto_correlation(&temp);

            let params = &mut self.channels[ch];
            let low_energy = sample_energy < params.energy_update_threshold;
            if (vad == VadDecision::NotRunning && low_energy) || vad == VadDecision::Passive {
                if auto_correlation[0] <= 0 {
                    return;
                }
                if low_energy {
                    params.energy_update_threshold = sample_energy.max(1);
                    params.low_energy_update_threshold = 0;
                }
                let Some((lpc, _)) = levinson_durbin(&auto_correlation, MAX_LPC_ORDER) else {
                    return;
                };

                let mut residual = [0i16; RESIDUAL_LENGTH];
                let start = MAX_LPC_ORDER + VEC_LEN - RESIDUAL_LENGTH - MAX_LPC_ORDER;
                filter_ma_fast_q12(&temp[start..], &mut residual, &lpc);
                let residual_energy = dot_product_with_scale(&residual, &residual, 0);

                // 残差能量与信号能量之比足够大说明频谱平坦
                if sample_energy > 0 && 5 * residual_energy as i64 >= 16 * sample_energy as i64 {
                    let mut filter = [0i16; MAX_LPC_ORDER + 1];
                    filter.copy_from_slice(&lpc);
                    let mut state = [0i16; MAX_LPC_ORDER];
                    state.copy_from_slice(&temp[VEC_LEN..]);
                    self.save_parameters(ch, filter, state, sample_energy, residual_energy);
                }
            } else {
                self.increment_energy_threshold(ch, sample_energy);
            }
        }
    }

    /// 8 阶自相关 (带自动移位), 以及归一化到每采样的能量
    fn auto_correlation(temp: &[i16; VEC_LEN + MAX_LPC_ORDER]) -> ([i32; MAX_LPC_ORDER + 1], i32) {
        let mut ac = [0i32; MAX_LPC_ORDER + 1];
        let scale = cross_correlation_with_auto_shift(
            &temp[MAX_LPC_ORDER..],
            temp,
            MAX_LPC_ORDER,
            VEC_LEN,
            -1,
            &mut ac,
        );
        let energy = shift_w32(ac[0], scale as i32 - LOG_VEC_LEN as i32);
        (ac, energy)
    }

    fn increment_energy_threshold(&mut self, ch: usize, sample_energy: i32) {
        let p = &mut self.channels[ch];
        let mut temp = (THRESHOLD_INCREMENT * p.low_energy_update_threshold) >> 16;
        temp += THRESHOLD_INCREMENT * (p.energy_update_threshold & 0xFF);
        temp += (THRESHOLD_INCREMENT * ((p.energy_update_threshold >> 8) & 0xFF)) << 8;
        p.low_energy_update_threshold += temp;

        p.energy_update_threshold = p
            .energy_update_threshold
            .saturating_add(THRESHOLD_INCREMENT * (p.energy_update_threshold >> 16))
            .saturating_add(p.low_energy_update_threshold >> 16);
        p.low_energy_update_threshold &= 0xFFFF;

        // 最大能量每次衰减 1/1024
        p.max_energy -= p.max_energy >> 10;
        if sample_energy > p.max_energy {
            p.max_energy = sample_energy;
        }
        // 阈值不低于最大能量下方 60 dB
        let floor = ((p.max_energy as i64 + 524_288) >> 20) as i32;
        if floor > p.energy_update_threshold {
            p.energy_update_threshold = floor;
        }
    }

    fn save_parameters(
        &mut self,
        ch: usize,
        filter: [i16; MAX_LPC_ORDER + 1],
        filter_state: [i16; MAX_LPC_ORDER],
        sample_energy: i32,
        residual_energy: i32,
    ) {
        let p = &mut self.channels[ch];
        p.filter = filter;
        p.filter_state = filter_state;
        p.energy = sample_energy.max(1);
        p.energy_update_threshold = p.energy;
        p.low_energy_update_threshold = 0;

        // 开方前归一化到 29 或 30 位, 移位数取偶数
        let mut norm_shift = norm_w32(residual_energy) as i32 - 1;
        if norm_shift & 1 != 0 {
            norm_shift -= 1;
        }
        let residual = shift_w32(residual_energy, norm_shift);
        p.scale = sqrt_floor(residual) as i16;
        // 噪声表为 Q13
        p.scale_shift = (13 + (LOG_RESIDUAL_LENGTH + norm_shift) / 2) as i16;
        self.initialized = true;
        trace!(
            "背景噪声更新: 声道 {}, 能量 {}, scale {} >> {}",
            ch, p.energy, p.scale, p.scale_shift
        );
    }

    /// 用随机激励生成 `output.len()` 个背景噪声采样, 并按静音系数渐变
    ///
    /// `mute_slope` (Q20) 为未淡出模式下的渐强斜率. 未完成估计时输出静音.
    pub fn generate_background_noise(
        &mut self,
        random_vector: &[i16],
        ch: usize,
        mute_slope: i32,
        too_many_expands: bool,
        stop_muting: bool,
        output: &mut [i16],
    ) {
        let num = output.len().min(random_vector.len());
        if !self.initialized {
            output.fill(0);
            return;
        }
        let mode = self.mode;
        let fade_slope = match self.fs_hz {
            8000 => -32,
            16000 => -16,
            32000 => -8,
            _ => -5,
        };
        let p = &mut self.channels[ch];

        let dc_offset = if p.scale_shift > 1 {
            1i32 << (p.scale_shift - 1)
        } else {
            0
        };
        let mut scaled = vec![0i16; num];
        affine_transform_vector(
            &mut scaled,
            &random_vector[..num],
            p.scale,
            dc_offset,
            p.scale_shift.max(0) as u32,
        );
        let mut buf = vec![0i16; MAX_LPC_ORDER + num];
        buf[..MAX_LPC_ORDER].copy_from_slice(&p.filter_state);
        filter_ar_fast_q12(&scaled, &mut buf, &p.filter);
        p.filter_state.copy_from_slice(&buf[num..]);
        let noise = &buf[MAX_LPC_ORDER..];

        let mut mute = p.mute_factor;
        if mode == BgnMode::Fade && too_many_expands && mute > 0 {
            // 约 -2^18 / fs_hz 的斜率淡出到零
            unmute_signal(noise, &mut mute, fade_slope, output);
        } else if mute < 16384 {
            if !stop_muting && mode != BgnMode::Off && !(mode == BgnMode::Fade && too_many_expands)
            {
                unmute_signal(noise, &mut mute, mute_slope, output);
            } else {
                affine_transform_vector(output, noise, mute, 8192, 14);
            }
        } else {
            output[..num].copy_from_slice(noise);
        }
        p.mute_factor = mute;
        output[num..].fill(0);
    }

    /// 每采样平均能量
    pub fn energy(&self, ch: usize) -> i32 {
        self.channels[ch].energy
    }

    pub fn filter(&self, ch: usize) -> &[i16] {
        &self.channels[ch].filter
    }

    pub fn filter_state(&self, ch: usize) -> &[i16] {
        &self.channels[ch].filter_state
    }

    pub fn set_filter_state(&mut self, ch: usize, state: &[i16]) {
        let n = state.len().min(MAX_LPC_ORDER);
        self.channels[ch].filter_state[..n].copy_from_slice(&state[..n]);
    }

    pub fn scale(&self, ch: usize) -> i16 {
        self.channels[ch].scale
    }

    pub fn scale_shift(&self, ch: usize) -> i16 {
        self.channels[ch].scale_shift
    }

    /// Q14 静音系数
    pub fn mute_factor(&self, ch: usize) -> i16 {
        self.channels[ch].mute_factor
    }

    pub fn set_mute_factor(&mut self, ch: usize, value: i16) {
        self.channels[ch].mute_factor = value;
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn mode(&self) -> BgnMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BgnMode) {
        self.mode = mode;
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}
