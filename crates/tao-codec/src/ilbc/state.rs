//! 起始状态的编码 (StateSearch) 与重建 (StateConstruct).
//!
//! 起始状态是帧内唯一不依赖历史的部分: 残差先经全通滤波器 `Ã(z)/A(z)` 做循环卷积
//! 以分散能量, 再按最大幅度的对数量化值归一化, 最后用带噪声整形的 3 bit 标量量化.
//! 解码端在时间反转域内用同一个全通滤波器做循环卷积, 即得到其转置, 近似逆变换.

use tao_core::spl::{get_size_in_bits, sat_w16_wide};

use super::tables::{STATE_FRGQ_AMP, STATE_FRGQ_THRESHOLD, STATE_SQ3_Q11, STATE_UNIT_Q11};
use super::{LPC_FILTERORDER, SUBL};

/// 起始状态的量化结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateIndices {
    /// 最大幅度的量化索引 (6 bit)
    pub idx_for_max: usize,
    /// 各采样的 3 bit 量化索引
    pub idx_vec: Vec<u8>,
}

/// 带符号的舍入除法
fn div_round(num: i64, den: i64) -> i64 {
    if (num >= 0) == (den > 0) {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}

/// 循环卷积全通滤波
///
/// 输入补零到两倍长度后经 `Ã(z)/A(z)` (分子为倒序的 LPC 系数) 滤波,
/// 再把后半段折叠加到前半段.
fn circular_all_pass(input: &[i64], synt: &[i16]) -> Vec<i64> {
    let n = input.len();
    let mut y = vec![0i64; 2 * n];
    for t in 0..2 * n {
        // MA: 分子 num[k] = synt[order - k]
        let mut acc = 0i64;
        for k in 0..=LPC_FILTERORDER {
            if t >= k && t - k < n {
                acc += synt[LPC_FILTERORDER - k] as i64 * input[t - k];
            }
        }
        // AR: 分母 synt
        for k in 1..=LPC_FILTERORDER.min(t) {
            acc -= synt[k] as i64 * y[t - k];
        }
        y[t] = div_round(acc, 4096);
    }
    (0..n).map(|k| y[k] + y[k + n]).collect()
}

/// 把 Q11 值映射到最近的量化电平
fn quantize_sq3(value: i64) -> usize {
    let mut idx = 0;
    for (i, pair) in STATE_SQ3_Q11.windows(2).enumerate() {
        let mid = (pair[0] as i64 + pair[1] as i64) / 2;
        if value >= mid {
            idx = i + 1;
        }
    }
    idx
}

/// 对起始状态残差编码
///
/// - `residual`: 起始状态残差 (57/58 个采样)
/// - `synt`: 起始状态第一个子帧的合成滤波器系数
/// - `weight`: 两个子帧各自的感知加权滤波器系数
/// - `state_first`: 起始状态位于两个子帧的前部
pub fn state_search(
    residual: &[i16],
    synt: &[i16],
    weight: [&[i16]; 2],
    state_first: bool,
) -> StateIndices {
    // 循环卷积前缩放到 12 bit 以内
    let max = residual
        .iter()
        .map(|&x| (x as i32).unsigned_abs())
        .max()
        .unwrap_or(0);
    let scale_res = get_size_in_bits(max).saturating_sub(12);
    let scaled: Vec<i64> = residual.iter().map(|&x| (x >> scale_res) as i64).collect();
    let shaped = circular_all_pass(&scaled, synt);

    let max_val = shaped
        .iter()
        .map(|&v| v.abs() << scale_res)
        .max()
        .unwrap_or(0);
    let idx_for_max = STATE_FRGQ_THRESHOLD.partition_point(|&t| t as i64 <= max_val);
    let qmax = STATE_FRGQ_AMP[idx_for_max] as i64;

    // 归一化: 最大幅度 qmax 映射为 4.5 (Q11)
    let normalized: Vec<i64> = shaped
        .iter()
        .map(|&v| div_round((v << scale_res) * STATE_UNIT_Q11, qmax))
        .collect();

    let idx_vec = abs_quant(&normalized, weight, state_first);
    StateIndices {
        idx_for_max,
        idx_vec,
    }
}

/// 带噪声整形的标量量化
///
/// 在加权域中以已量化值的滤波输出作预测, 量化预测误差.
/// 加权滤波器在子帧边界处切换.
fn abs_quant(input: &[i64], weight: [&[i16]; 2], state_first: bool) -> Vec<u8> {
    let len = input.len();
    let switch_at = if state_first { SUBL } else { len - SUBL };
    let order = LPC_FILTERORDER;

    let mut weighted = vec![0i64; order + len];
    let mut synt_out = vec![0i64; order + len];
    let mut out = Vec::with_capacity(len);
    for n in 0..len {
        let w = if n < switch_at { weight[0] } else { weight[1] };
        let pos = order + n;

        let mut acc = input[n] << 12;
        let mut pred = 0i64;
        for k in 1..=order {
            acc -= w[k] as i64 * weighted[pos - k];
            pred -= w[k] as i64 * synt_out[pos - k];
        }
        weighted[pos] = div_round(acc, 4096);
        let pred = div_round(pred, 4096);

        let idx = quantize_sq3(weighted[pos] - pred);
        out.push(idx as u8);
        synt_out[pos] = STATE_SQ3_Q11[idx] as i64 + pred;
    }
    out
}

/// 由量化索引重建起始状态残差
pub fn state_construct(idx_for_max: usize, idx_vec: &[u8], synt: &[i16]) -> Vec<i16> {
    let len = idx_vec.len();
    let qmax = STATE_FRGQ_AMP[idx_for_max.min(STATE_FRGQ_AMP.len() - 1)] as i64;

    // 时间反转后做同一个循环卷积, 再反转回来
    let reversed: Vec<i64> = (0..len)
        .map(|k| {
            let level = STATE_SQ3_Q11[(idx_vec[len - 1 - k] & 7) as usize] as i64;
            div_round(qmax * level, STATE_UNIT_Q11)
        })
        .collect();
    let folded = circular_all_pass(&reversed, synt);
    (0..len).map(|k| sat_w16_wide(folded[len - 1 - k])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilbc::lsf::{lsf_to_lpc, mean_lsf};
    use crate::ilbc::tables::CHIRP_WEIGHT_DENUM;
    use tao_core::spl::bw_expand;

    fn filters() -> ([i16; 11], [i16; 11]) {
        let synt = lsf_to_lpc(&mean_lsf());
        let mut weight = [0i16; 11];
        bw_expand(&mut weight, &synt, &CHIRP_WEIGHT_DENUM);
        (synt, weight)
    }

    fn test_residual(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let pulse = if i % 19 == 3 { 4000 } else { 0 };
                pulse + ((i * 7919) % 601) as i16 - 300
            })
            .collect()
    }

    #[test]
    fn test_all_pass_preserves_energy() {
        let (synt, _) = filters();
        let mut x = vec![0i64; 58];
        x[10] = 1000;
        let y = circular_all_pass(&x, &synt);
        let ex: i64 = x.iter().map(|v| v * v).sum();
        let ey: i64 = y.iter().map(|v| v * v).sum();
        assert!(ey > ex / 2 && ey < ex * 2, "{ex} vs {ey}");
    }

    #[test]
    fn test_search_then_construct_tracks_residual() {
        let (synt, weight) = filters();
        for &(len, first) in &[(57usize, true), (58, false)] {
            let res = test_residual(len);
            let q = state_search(&res, &synt, [&weight, &weight], first);
            assert_eq!(q.idx_vec.len(), len);
            assert!(q.idx_vec.iter().all(|&i| i < 8));
            assert!(q.idx_for_max < 64);

            let rec = state_construct(q.idx_for_max, &q.idx_vec, &synt);
            let signal: i64 = res.iter().map(|&v| v as i64 * v as i64).sum();
            let noise: i64 = res
                .iter()
                .zip(&rec)
                .map(|(&a, &b)| {
                    let d = a as i64 - b as i64;
                    d * d
                })
                .sum();
            assert!(noise < signal, "SNR <= 0 dB: {signal} vs {noise}");
        }
    }

    #[test]
    fn test_silent_state() {
        let (synt, weight) = filters();
        let q = state_search(&[0; 57], &synt, [&weight, &weight], true);
        assert_eq!(q.idx_for_max, 0);
        let rec = state_construct(q.idx_for_max, &q.idx_vec, &synt);
        assert!(rec.iter().all(|&v| v.abs() <= 16), "{rec:?}");
    }

    #[test]
    fn test_max_index_is_monotonic() {
        let (synt, weight) = filters();
        let quiet: Vec<i16> = test_residual(57).iter().map(|&v| v / 16).collect();
        let loud = test_residual(57);
        let a = state_search(&quiet, &synt, [&weight, &weight], true);
        let b = state_search(&loud, &synt, [&weight, &weight], true);
        assert!(b.idx_for_max > a.idx_for_max);
    }
}
