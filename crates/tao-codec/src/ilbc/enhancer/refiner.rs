//! 分数精度的周期段对齐.

use tao_core::spl::sat_w16_wide;

use super::{ENH_BLOCKL, ENH_FL0, ENH_SLOP, ENH_UPS0};
use crate::ilbc::tables::ENH_POLYPHASE_Q14;

/// 在整数位置 `pos` 之后 `frac/4` 处插值, 越界采样按 0 处理
fn interpolate_at(data: &[i64], pos: isize, frac: usize) -> i64 {
    let taps = &ENH_POLYPHASE_Q14[frac];
    let mut acc = 0i64;
    for (k, &h) in taps.iter().enumerate() {
        let idx = pos + ENH_FL0 as isize - k as isize;
        if idx >= 0 && (idx as usize) < data.len() {
            acc += h as i64 * data[idx as usize];
        }
    }
    acc
}

/// 4 倍上采样: `out[4m + j]` 对应位置 `m + j/4`, 结果为 Q14
///
/// 两端按边界值延拓, 避免截断的滤波器在边缘抬高插值结果.
pub fn enh_upsample(input: &[i64]) -> Vec<i64> {
    let (Some(&first), Some(&last)) = (input.first(), input.last()) else {
        return Vec::new();
    };
    let mut padded = vec![first; ENH_FL0];
    padded.extend_from_slice(input);
    padded.extend(std::iter::repeat_n(last, ENH_FL0));

    let mut out = Vec::with_capacity(ENH_UPS0 * input.len());
    for m in 0..input.len() {
        for j in 0..ENH_UPS0 {
            out.push(interpolate_at(&padded, (m + ENH_FL0) as isize, j));
        }
    }
    out
}

/// 在估计位置附近 ±2 采样内寻找与中心块最相关的段
///
/// 位置均以 1/4 采样为单位. 返回 (对齐后的段, 更新后的位置).
/// 搜索区间为空时返回全零段与原位置.
pub fn refiner(data: &[i16], center_start: usize, est_pos4: i32) -> (Vec<i16>, i32) {
    let len = data.len() as i32;
    let block = ENH_BLOCKL as i32;
    let est = (est_pos4 + 2) >> 2;
    let search_start = (est - ENH_SLOP as i32).max(0);
    let search_end = (est + ENH_SLOP as i32).min(len - block - 1);
    if search_end < search_start {
        return (vec![0; ENH_BLOCKL], est_pos4);
    }

    let center = &data[center_start..center_start + ENH_BLOCKL];
    let corr: Vec<i64> = (search_start..=search_end)
        .map(|s| {
            let seg = &data[s as usize..s as usize + ENH_BLOCKL];
            seg.iter().zip(center).map(|(&a, &b)| a as i64 * b as i64).sum()
        })
        .collect();
    let ups = enh_upsample(&corr);
    let mut tloc = 0usize;
    for (i, &v) in ups.iter().enumerate().skip(1) {
        if v > ups[tloc] {
            tloc = i;
        }
    }

    let pos = search_start as isize + (tloc / ENH_UPS0) as isize;
    let frac = tloc % ENH_UPS0;
    let wide: Vec<i64> = data.iter().map(|&v| v as i64).collect();
    let seg = (0..ENH_BLOCKL as isize)
        .map(|n| sat_w16_wide((interpolate_at(&wide, pos + n, frac) + 8192) >> 14))
        .collect();
    (seg, 4 * search_start + tloc as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsample_integer_phase_is_identity() {
        let x = [10i64, 20, 30, 40, 50, 60, 70, 80];
        let up = enh_upsample(&x);
        assert_eq!(up.len(), 32);
        for (m, &v) in x.iter().enumerate() {
            assert_eq!(up[4 * m], v << 14);
        }
        // 半采样位置介于两侧之间
        let half = up[4 * 2 + 2] >> 14;
        assert!(half > 30 && half < 40, "{half}");
    }

    #[test]
    fn test_refiner_locks_onto_shifted_copy() {
        let period = 53;
        let data: Vec<i16> = (0..400)
            .map(|i| {
                let p = i % period;
                if p < 3 { 6000 - 2000 * p as i16 } else { (p as i16 * 13) % 50 }
            })
            .collect();
        let center = 300;
        let (seg, pos4) = refiner(&data, center, 4 * (center as i32 - period as i32 + 1));
        assert_eq!(pos4, 4 * (center as i32 - period as i32));
        assert_eq!(&seg[..], &data[center..center + 80]);
    }

    #[test]
    fn test_refiner_empty_range() {
        let data = vec![1i16; 100];
        let (seg, pos4) = refiner(&data, 0, 4 * 90);
        assert!(seg.iter().all(|&v| v == 0));
        assert_eq!(pos4, 360);
    }
}
