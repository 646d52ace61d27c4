//! 把周围周期的加权和与当前块混合, 并限制与原信号的偏离.

use tao_core::spl::sat_w16_wide;

use super::{ENH_BLOCKL, ENH_HL};
use crate::ilbc::tables::ENH_WT_Q15;

/// 周围段权重, 当前段不参与
fn surround_weight(q: usize) -> i64 {
    match q.cmp(&ENH_HL) {
        std::cmp::Ordering::Less => ENH_WT_Q15[q] as i64,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => ENH_WT_Q15[2 * ENH_HL - q] as i64,
    }
}

/// 平滑当前块
///
/// 先按能量匹配系数 `C = sqrt(w00 / w11)` 缩放周围和; 若与原信号的误差能量超过
/// 原信号能量的 5%, 改用满足该约束的线性组合 `A * surround + B * current`.
pub fn smooth(seqs: &[Vec<i16>]) -> Vec<i16> {
    let current = &seqs[ENH_HL];
    let surround: Vec<i64> = (0..ENH_BLOCKL)
        .map(|i| {
            let acc: i64 = seqs
                .iter()
                .enumerate()
                .map(|(q, s)| surround_weight(q) * s[i] as i64)
                .sum();
            (acc + 16384) >> 15
        })
        .collect();

    let mut w00 = 0i128;
    let mut w10 = 0i128;
    let mut w11 = 0i128;
    for (&c, &s) in current.iter().zip(&surround) {
        let c = c as i128;
        let s = s as i128;
        w00 += c * c;
        w10 += s * c;
        w11 += s * s;
    }
    let w11 = w11.max(1);

    let c_q14 = ((w00 << 28) / w11).max(0) as u128;
    let c_q14 = c_q14.isqrt() as i64;
    let first: Vec<i16> = surround
        .iter()
        .map(|&s| sat_w16_wide((c_q14 * s + 8192) >> 14))
        .collect();
    let errs: i128 = first
        .iter()
        .zip(current)
        .map(|(&o, &c)| {
            let d = c as i128 - o as i128;
            d * d
        })
        .sum();
    if 20 * errs <= w00 {
        return first;
    }

    let w00 = w00.max(1);
    let denom = w11 * w00 - w10 * w10;
    let (a_q14, b_q14) = if denom * 10000 > w00 * w00 {
        // (α - α²/4) / denom, α = 0.05
        let a = (((809 * w00 * w00) << 14) / denom).max(0) as u128;
        let a = a.isqrt() as i128;
        let b = 16384 - 410 - a * w10 / w00;
        (a as i64, b as i64)
    } else {
        (0, 16384)
    };
    surround
        .iter()
        .zip(current)
        .map(|(&s, &c)| sat_w16_wide((a_q14 * s + b_q14 * c as i64 + 8192) >> 14))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(scale: i16, phase: usize) -> Vec<i16> {
        (0..ENH_BLOCKL)
            .map(|i| scale * (((i + phase) * 17 % 31) as i16 - 15))
            .collect()
    }

    #[test]
    fn test_identical_periods_pass_through() {
        let seqs = vec![block(100, 0); 2 * ENH_HL + 1];
        let out = smooth(&seqs);
        for (&o, &c) in out.iter().zip(&seqs[ENH_HL]) {
            assert!((o as i32 - c as i32).abs() <= 2, "{o} vs {c}");
        }
    }

    #[test]
    fn test_constraint_limits_deviation() {
        let mut seqs = vec![block(100, 7); 2 * ENH_HL + 1];
        seqs[ENH_HL] = block(100, 0);
        let out = smooth(&seqs);
        let cur = &seqs[ENH_HL];
        let w00: i64 = cur.iter().map(|&v| v as i64 * v as i64).sum();
        let err: i64 = out
            .iter()
            .zip(cur)
            .map(|(&o, &c)| (o as i64 - c as i64).pow(2))
            .sum();
        // 约束解的误差约为 5% 的原能量
        assert!(err * 100 <= w00 * 8, "err {err} w00 {w00}");
        assert!(out != *cur);
    }

    #[test]
    fn test_silent_surround_keeps_current() {
        let mut seqs = vec![vec![0i16; ENH_BLOCKL]; 2 * ENH_HL + 1];
        seqs[ENH_HL] = block(50, 3);
        let out = smooth(&seqs);
        // 周围全零时退化为 B = 1
        assert_eq!(out, seqs[ENH_HL]);
    }
}
