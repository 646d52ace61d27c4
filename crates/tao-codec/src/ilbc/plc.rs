//! 丢包隐藏.
//!
//! 好帧只记录残差与 LPC 系数; 丢帧时在上一帧残差中搜索基音周期,
//! 按周期性把基音重复与随机延迟的噪声激励混合, 再按连续丢包时长逐级衰减.

use log::debug;

use super::tables::{PLC_PER_SQR_Q15, PLC_PITCH_FACT_Q14};
use super::{LPC_COEF_LEN, STATE_LEN};

/// 相关计算的窗口长度
const CORR_RANGE: usize = 60;
/// 低于该平均能量 (30²) 时只用噪声激励
const NOISE_ONLY_ENERGY: i64 = 900;
/// 初始基音周期
const INITIAL_LAG: usize = 120;
/// 随机数种子初值
const INITIAL_SEED: u32 = 777;

/// 连续丢包的整体增益 (Q15), 按累计丢失采样数分档
fn loss_gain_q15(lost_samples: usize) -> i64 {
    match lost_samples {
        n if n > 1280 => 0,
        n if n > 960 => 16384,
        n if n > 640 => 22938,
        n if n > 320 => 29491,
        _ => 32767,
    }
}

/// 帧内逐样本衰减 (Q15): 前 80 个采样不衰减, 之后 0.95, 再之后 0.9
fn in_frame_gain_q15(i: usize) -> i64 {
    if i < STATE_LEN {
        32767
    } else if i < 2 * STATE_LEN {
        31130
    } else {
        29491
    }
}

/// 周期性 (相关系数平方, Q15) 映射为基音激励的比例 (Q14)
fn pitch_fact_q14(per_sq_q15: i32) -> i64 {
    let last = PLC_PER_SQR_Q15.len() - 1;
    if per_sq_q15 >= PLC_PER_SQR_Q15[last] {
        return PLC_PITCH_FACT_Q14[last] as i64;
    }
    if per_sq_q15 < PLC_PER_SQR_Q15[0] {
        return 0;
    }
    let k = PLC_PER_SQR_Q15.partition_point(|&p| p <= per_sq_q15) - 1;
    let (p0, p1) = (PLC_PER_SQR_Q15[k] as i64, PLC_PER_SQR_Q15[k + 1] as i64);
    let (f0, f1) = (PLC_PITCH_FACT_Q14[k] as i64, PLC_PITCH_FACT_Q14[k + 1] as i64);
    f0 + (f1 - f0) * (per_sq_q15 as i64 - p0) / (p1 - p0)
}

fn frame_energy(x: &[i16]) -> i64 {
    x.iter().map(|&v| v as i64 * v as i64).sum()
}

/// 把帧能量压到不超过 `max_energy`, 返回处理后的能量
///
/// 缩放因子取 `sqrt(max_energy / energy)` 的 Q15 下取整, 样本向零截断,
/// 因此结果一定不超过上限.
pub(super) fn limit_energy(frame: &mut [i16], max_energy: i64) -> i64 {
    let energy = frame_energy(frame);
    if energy <= max_energy {
        return energy;
    }
    let ratio_q30 = ((max_energy.max(0) as i128) << 30) / energy as i128;
    let scale = (ratio_q30 as u64).isqrt() as i64;
    for v in frame.iter_mut() {
        *v = (*v as i64 * scale / 32768) as i16;
    }
    frame_energy(frame)
}

/// 延迟 `lag` 处的相关量: (互相关, 延迟段能量, 周期性 Q15)
fn comp_corr(buffer: &[i16], lag: usize) -> (i64, i64, i32) {
    let len = buffer.len();
    let range = CORR_RANGE.min(len.saturating_sub(lag));
    if range == 0 {
        return (0, 0, 0);
    }
    let target = &buffer[len - range..];
    let lagged = &buffer[len - range - lag..len - lag];
    let mut corr = 0i64;
    let mut energy = 0i64;
    let mut target_energy = 0i64;
    for (&t, &l) in target.iter().zip(lagged) {
        corr += t as i64 * l as i64;
        energy += l as i64 * l as i64;
        target_energy += t as i64 * t as i64;
    }
    let per = if energy > 0 && target_energy > 0 {
        let num = (corr as i128 * corr as i128) << 15;
        (num / (energy as i128 * target_energy as i128)).min(32767) as i32
    } else {
        0
    };
    (corr, energy, per)
}

/// 丢包隐藏状态
#[derive(Debug, Clone)]
pub struct Plc {
    /// 连续丢帧数
    consec_lost: usize,
    /// 上一帧是否丢失
    prev_lost: bool,
    /// 上次隐藏使用的基音周期
    prev_lag: usize,
    /// 上次隐藏的周期性 (Q15)
    per_sq_q15: i32,
    /// 上一个隐藏帧的能量, 连续丢包时作为上限
    prev_energy: i64,
    seed: u32,
    prev_residual: Vec<i16>,
    prev_lpc: [i16; LPC_COEF_LEN],
}

impl Plc {
    pub fn new(block_len: usize) -> Self {
        let mut prev_lpc = [0i16; LPC_COEF_LEN];
        prev_lpc[0] = 4096;
        Self {
            consec_lost: 0,
            prev_lost: false,
            prev_lag: INITIAL_LAG,
            per_sq_q15: 0,
            prev_energy: 0,
            seed: INITIAL_SEED,
            prev_residual: vec![0; block_len],
            prev_lpc,
        }
    }

    /// 连续丢帧数
    pub fn consecutive_lost(&self) -> usize {
        self.consec_lost
    }

    /// 好帧: 记录残差与最后一个子帧的 LPC 系数
    pub fn update(&mut self, residual: &[i16], lpc: &[i16]) {
        self.consec_lost = 0;
        self.prev_lost = false;
        self.prev_residual.copy_from_slice(residual);
        self.prev_lpc.copy_from_slice(&lpc[..LPC_COEF_LEN]);
    }

    fn next_rand_lag(&mut self) -> usize {
        self.seed = self.seed.wrapping_mul(69069).wrapping_add(1) & 0x7FFF_FFFF;
        53 + (self.seed & 63) as usize
    }

    /// 丢帧: 生成隐藏残差, 返回 (残差, 用于全部子帧的 LPC 系数)
    ///
    /// `inlag` 为解码端最近估计的基音周期.
    pub fn conceal(&mut self, inlag: usize) -> (Vec<i16>, [i16; LPC_COEF_LEN]) {
        let blockl = self.prev_residual.len();
        self.consec_lost += 1;

        let (lag, per_sq) = if self.prev_lost {
            (self.prev_lag, self.per_sq_q15)
        } else {
            let lo = inlag.saturating_sub(3).max(1);
            let mut best = (lo, 0i64, 0i64, 0i32);
            for lag in lo..=inlag + 3 {
                let (c, e, per) = comp_corr(&self.prev_residual, lag);
                // corr² / energy 更大者, 交叉相乘比较
                let better = best.2 == 0
                    || (c as i128 * c as i128 * best.2 as i128)
                        > (best.1 as i128 * best.1 as i128 * e as i128);
                if e > 0 && better {
                    best = (lag, c, e, per);
                }
            }
            (best.0, best.3)
        };
        debug!(
            "iLBC 丢包隐藏: 第 {} 帧, 基音周期 {}, 周期性 {}",
            self.consec_lost, lag, per_sq
        );

        let use_gain = loss_gain_q15(self.consec_lost * blockl);
        let pitch_fact = pitch_fact_q14(per_sq);
        let use_lag = if lag < STATE_LEN { 2 * lag } else { lag };

        let mut out = vec![0i16; blockl];
        let mut noise = vec![0i16; blockl];
        let mut energy = 0i64;
        for i in 0..blockl {
            let rand_lag = self.next_rand_lag();
            noise[i] = if i < rand_lag {
                self.prev_residual[blockl + i - rand_lag]
            } else {
                noise[i - rand_lag]
            };
            let pitch = if i < use_lag {
                self.prev_residual[(blockl + i).saturating_sub(use_lag).min(blockl - 1)]
            } else {
                out[i - use_lag]
            };
            let mixed =
                (pitch_fact * pitch as i64 + (16384 - pitch_fact) * noise[i] as i64 + 8192) >> 14;
            let gain = (use_gain * in_frame_gain_q15(i) + 16384) >> 15;
            let v = ((gain * mixed + 16384) >> 15) as i16;
            out[i] = v;
            energy += v as i64 * v as i64;
        }

        if energy < NOISE_ONLY_ENERGY * blockl as i64 {
            // 能量过低时基音重复已无意义, 只保留衰减后的噪声
            for (i, (o, &n)) in out.iter_mut().zip(&noise).enumerate() {
                let gain = (use_gain * in_frame_gain_q15(i) + 16384) >> 15;
                *o = ((gain * n as i64 + 16384) >> 15) as i16;
            }
        }

        // 基音与噪声的混合比例逐帧重算, 能量可能回升, 连续丢包时以上一帧为上限
        self.prev_energy = if self.prev_lost {
            limit_energy(&mut out, self.prev_energy)
        } else {
            frame_energy(&out)
        };
        self.prev_lag = lag;
        self.per_sq_q15 = per_sq;
        self.prev_lost = true;
        self.prev_residual.copy_from_slice(&out);
        (out, self.prev_lpc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tao_core::spl::rand_u;

    fn pulse_train(len: usize, period: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % period == 0 { 8000 } else { ((i * 31) % 41) as i16 - 20 })
            .collect()
    }

    fn energy(x: &[i16]) -> i64 {
        x.iter().map(|&v| v as i64 * v as i64).sum()
    }

    #[test]
    fn test_pitch_fact_table() {
        assert_eq!(pitch_fact_q14(32767), 16384);
        assert_eq!(pitch_fact_q14(1000), 0);
        let mid = pitch_fact_q14((PLC_PER_SQR_Q15[2] + PLC_PER_SQR_Q15[3]) / 2);
        assert!(mid > PLC_PITCH_FACT_Q14[2] as i64 && mid < PLC_PITCH_FACT_Q14[3] as i64);
    }

    #[test]
    fn test_finds_pitch_near_hint() {
        let mut plc = Plc::new(240);
        plc.update(&pulse_train(240, 50), &[4096, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let (out, lpc) = plc.conceal(48);
        assert_eq!(plc.prev_lag, 50);
        assert!(plc.per_sq_q15 > 16000);
        assert_eq!(lpc[0], 4096);
        // 周期 50 < 80, 按 100 重复, 第 80 个采样之后衰减到 0.95
        assert!(out[10] > 7900, "{}", out[10]);
        assert!(out[110] < out[10] && out[110] > 7500, "{}", out[110]);
    }

    /// 幅度 `amp` 的白噪声历史
    fn noise_history(len: usize, amp: i32, seed: &mut u32) -> Vec<i16> {
        (0..len)
            .map(|_| ((rand_u(seed) as i32 - 16384) * amp / 16384) as i16)
            .collect()
    }

    #[test]
    fn test_attenuates_over_consecutive_losses() {
        let lpc = [4096, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut seed = 12345u32;
        for blockl in [160usize, 240] {
            let mut histories: Vec<(Vec<i16>, usize)> = Vec::new();
            for period in (20..=120).step_by(7) {
                histories.push((pulse_train(blockl, period), period));
            }
            for amp in [40, 300, 3000, 20000] {
                for hint in [25usize, 32, 57, 90, 117] {
                    histories.push((noise_history(blockl, amp, &mut seed), hint));
                }
            }
            // 浊音与噪声交替的历史
            for period in [33usize, 64, 101] {
                let mut h = pulse_train(blockl, period);
                for (i, v) in noise_history(blockl, 6000, &mut seed).into_iter().enumerate() {
                    if (i / 40) % 2 == 1 {
                        h[i] = v;
                    }
                }
                histories.push((h, period));
            }

            for (history, hint) in &histories {
                let mut plc = Plc::new(blockl);
                plc.update(history, &lpc);
                let energies: Vec<i64> = (0..10).map(|_| energy(&plc.conceal(*hint).0)).collect();
                for w in energies.windows(2) {
                    assert!(w[1] <= w[0], "blockl {blockl} hint {hint}: {energies:?}");
                }
                assert_eq!(energies[9], 0, "{energies:?}");
                assert_eq!(plc.consecutive_lost(), 10);
            }
        }
    }

    #[test]
    fn test_limit_energy_never_exceeds_bound() {
        let mut seed = 99u32;
        for max in [0i64, 1, 1000, 123_456, 50_000_000] {
            let mut frame = noise_history(240, 12000, &mut seed);
            let before = energy(&frame);
            let after = limit_energy(&mut frame, max);
            assert!(after <= max, "{max}: {after}");
            assert_eq!(after, energy(&frame));
            assert!(after <= before);
        }
        let mut quiet = vec![3i16; 160];
        assert_eq!(limit_energy(&mut quiet, i64::MAX), 9 * 160);
        assert!(quiet.iter().all(|&v| v == 3));
    }

    #[test]
    fn test_good_frame_resets_counter() {
        let mut plc = Plc::new(160);
        plc.conceal(40);
        plc.conceal(40);
        plc.update(&[0; 160], &[4096, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(plc.consecutive_lost(), 0);
        let (out, _) = plc.conceal(40);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_random_lag_range() {
        let mut plc = Plc::new(160);
        for _ in 0..1000 {
            let lag = plc.next_rand_lag();
            assert!((53..=116).contains(&lag));
        }
    }
}
