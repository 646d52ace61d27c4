//! 正常解码数据的后处理 (Normal).
//!
//! 上一次操作是丢包隐藏或舒适噪声时, 新解码数据的开头要与隐藏器 (或背景噪声)
//! 额外生成的一段信号插值, 避免衔接处的突变. 外部静音系数尚未恢复到 1.0 时,
//! 按固定斜率逐步拉回.

use log::{debug, warn};
use tao_core::spl::{div_w32_w16, dot_product_with_scale, max_abs_w16, norm_w32, shift_w32, sqrt_floor};
use tao_core::{TaoError, TaoResult};

use crate::audio_multi_vector::AudioMultiVector;
use crate::dsp_helper::ramp_signal_in_place;
use crate::dsp_operations::Mode;
use crate::expand::{ExpandContext, Expander};
use crate::fs_mult_for;

/// 解码数据的后处理器
#[derive(Debug, Clone)]
pub struct Normal {
    fs_hz: u32,
    fs_mult: usize,
    num_channels: usize,
}

impl Normal {
    pub fn new(fs_hz: u32, num_channels: usize) -> TaoResult<Self> {
        let fs_mult = fs_mult_for(fs_hz)?;
        Ok(Self {
            fs_hz,
            fs_mult,
            num_channels: num_channels.max(1),
        })
    }

    /// 处理交错的解码数据 `input`, 结果写入 `output`
    ///
    /// `last_mode` 是上一次的 DSP 操作, `external_mute_factors` 为每声道的 Q14
    /// 静音系数, 处理后被更新. 返回每声道的输出采样数.
    pub fn process(
        &mut self,
        input: &[i16],
        last_mode: Mode,
        external_mute_factors: &mut [i16],
        expand: &mut dyn Expander,
        ctx: &mut ExpandContext<'_>,
        output: &mut AudioMultiVector,
    ) -> TaoResult<usize> {
        output.clear();
        if input.is_empty() {
            return Ok(0);
        }
        if external_mute_factors.len() < self.num_channels {
            return Err(TaoError::InvalidArgument(format!(
                "静音系数个数 {} 少于声道数 {}",
                external_mute_factors.len(),
                self.num_channels
            )));
        }
        if input.len() % self.num_channels != 0 {
            warn!(
                "解码数据长度 {} 不是声道数 {} 的整数倍, 丢弃",
                input.len(),
                self.num_channels
            );
            return Ok(0);
        }

        *output = AudioMultiVector::new(self.num_channels);
        output.push_back_interleaved(input);
        let length = output.size();
        // 8/16/32/48 kHz 分别为 0/1/2/2
        let fs_shift = 30 - norm_w32(self.fs_mult as i32) as i32;

        match last_mode {
            Mode::Expand => {
                self.after_expand(fs_shift, external_mute_factors, expand, ctx, output)?;
            }
            Mode::Rfc3389Cng | Mode::CodecInternalCng => {
                self.after_comfort_noise(fs_shift, external_mute_factors, ctx, output);
            }
            _ => {
                if external_mute_factors[0] < 16384 {
                    let increment = 64 / self.fs_mult as i32;
                    for ch in 0..self.num_channels {
                        external_mute_factors[ch] = ramp_signal_in_place(
                            output[ch].as_mut_slice(),
                            external_mute_factors[ch],
                            increment,
                        );
                    }
                }
            }
        }
        Ok(length)
    }

    /// 隐藏之后: 再生成一个周期的隐藏信号, 与新数据开头插值
    fn after_expand(
        &self,
        fs_shift: i32,
        external_mute_factors: &mut [i16],
        expand: &mut dyn Expander,
        ctx: &mut ExpandContext<'_>,
        output: &mut AudioMultiVector,
    ) -> TaoResult<()> {
        expand.set_parameters_for_normal_after_expand();
        let mut expanded = AudioMultiVector::new(self.num_channels);
        expand.process(ctx, &mut expanded)?;
        expand.reset();

        let length = output.size();
        for ch in 0..self.num_channels {
            let external = &mut external_mute_factors[ch];
            *external = ((*external as i32 * expand.mute_factor(ch) as i32) >> 14) as i16;

            let signal = output[ch].as_mut_slice();
            let energy_length = (self.fs_mult * 64).min(length);
            let head = &signal[..energy_length];
            let max_abs = max_abs_w16(head) as i32;
            let scaling = (6 + fs_shift - norm_w32(max_abs * max_abs) as i32).max(0);
            let energy = if energy_length >> scaling > 0 {
                dot_product_with_scale(head, head, scaling as u32)
                    / (energy_length >> scaling) as i32
            } else {
                0
            };

            // 新数据比背景噪声响时, 按能量比压低到背景噪声的水平再恢复
            let mute_factor = if energy != 0 && energy > ctx.background_noise.energy(ch) {
                let scaling = norm_w32(energy) as i32 - 16;
                let bgn_energy = shift_w32(ctx.background_noise.energy(ch), scaling + 14);
                let energy = shift_w32(energy, scaling) as i16;
                let ratio = div_w32_w16(bgn_energy, energy);
                sqrt_floor(ratio << 14).min(16384) as i16
            } else {
                16384
            };
            if mute_factor > *external {
                *external = mute_factor.min(16384);
            }

            // 约每采样 0.004 / fs_mult 的速度恢复
            let increment = 64 / self.fs_mult as i32;
            for s in signal.iter_mut() {
                let scaled = (*s as i32 * *external as i32 + 8192) >> 14;
                *s = scaled as i16;
                *external = (*external as i32 + increment).min(16384) as i16;
            }

            let expanded_channel = expanded[ch].as_slice();
            self.interpolate(fs_shift, expanded_channel, signal);
        }
        debug!(
            "隐藏后恢复正常解码: {} Hz, 静音系数 {}",
            self.fs_hz, external_mute_factors[0]
        );
        Ok(())
    }

    /// 舒适噪声之后: 新数据开头与一段背景噪声插值
    ///
    /// 尚未估计出背景噪声时与解码数据自身插值, 即不改变信号.
    fn after_comfort_noise(
        &self,
        fs_shift: i32,
        external_mute_factors: &mut [i16],
        ctx: &mut ExpandContext<'_>,
        output: &mut AudioMultiVector,
    ) {
        let cng_length = 8 * self.fs_mult;
        for ch in 0..self.num_channels {
            external_mute_factors[ch] = 16384;
            let signal = output[ch].as_mut_slice();
            let mut cng = vec![0i16; cng_length];
            if ctx.background_noise.initialized() {
                let mut random = vec![0i16; cng_length];
                ctx.random_vector.generate(&mut random);
                ctx.background_noise.set_mute_factor(ch, 16384);
                ctx.background_noise
                    .generate_background_noise(&random, ch, 0, false, true, &mut cng);
            } else {
                let n = cng_length.min(signal.len());
                cng[..n].copy_from_slice(&signal[..n]);
            }
            self.interpolate(fs_shift, &cng, signal);
        }
    }

    /// 前 8 ms·fs_mult 个采样从 `previous` 线性过渡到 `signal` (Q5 权重)
    fn interpolate(&self, fs_shift: i32, previous: &[i16], signal: &mut [i16]) {
        let increment = 4 >> fs_shift;
        let mut fraction = increment;
        let n = (8 * self.fs_mult).min(signal.len()).min(previous.len());
        for (s, &p) in signal[..n].iter_mut().zip(previous) {
            let mixed = (fraction * *s as i32 + (32 - fraction) * p as i32 + 8) >> 5;
            *s = mixed as i16;
            fraction = (fraction + increment).min(32);
        }
    }
}
