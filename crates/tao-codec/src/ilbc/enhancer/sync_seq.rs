//! 收集与当前块基音同步的前后周期段.

use super::refiner::refiner;
use super::{ENH_BLOCKL, ENH_HL, ENH_OVERHANG};
use crate::ilbc::tables::ENH_PLOCS;

/// 距离 `value4` (1/4 采样单位) 最近的位置下标
fn nearest_neighbor(locs4: &[i32], value4: i32) -> usize {
    let mut best = 0;
    for (i, &l) in locs4.iter().enumerate() {
        if (l - value4).abs() < (locs4[best] - value4).abs() {
            best = i;
        }
    }
    best
}

/// 取以 `center_start` 开始的块为中心的 `2 * ENH_HL + 1` 个同步段
///
/// `period` 为增强缓冲中各 80 采样块的基音周期. 前后超出缓冲的段置零.
pub fn get_sync_seq(data: &[i16], center_start: usize, period: &[i32]) -> Vec<Vec<i16>> {
    let plocs4: Vec<i32> = ENH_PLOCS.iter().map(|&p| 4 * p).collect();
    let plocs2_4: Vec<i32> = ENH_PLOCS
        .iter()
        .zip(period)
        .map(|(&p, &t)| 4 * (p - t))
        .collect();
    let half4 = 4 * (ENH_BLOCKL as i32) / 2;
    let overhang4 = 4 * ENH_OVERHANG as i32;
    let len4 = 4 * data.len() as i32;

    let mut seqs = vec![vec![0i16; ENH_BLOCKL]; 2 * ENH_HL + 1];
    let mut lag_block = [0usize; 2 * ENH_HL + 1];
    let mut start4 = [0i32; 2 * ENH_HL + 1];

    // 当前块
    let center4 = 4 * center_start as i32;
    lag_block[ENH_HL] = nearest_neighbor(&plocs4, center4 + 4 * ENH_BLOCKL as i32 / 2 - 2);
    start4[ENH_HL] = center4;
    seqs[ENH_HL].copy_from_slice(&data[center_start..center_start + ENH_BLOCKL]);

    // 过去
    for q in (0..ENH_HL).rev() {
        let p4 = 4 * period[lag_block[q + 1]];
        start4[q] = start4[q + 1] - p4;
        lag_block[q] = nearest_neighbor(&plocs4, start4[q] + half4 - p4);
        if start4[q] - overhang4 >= 0 {
            let (seg, pos4) = refiner(data, center_start, start4[q]);
            seqs[q] = seg;
            start4[q] = pos4;
        }
    }

    // 未来
    for q in ENH_HL + 1..=2 * ENH_HL {
        lag_block[q] = nearest_neighbor(&plocs2_4, start4[q - 1] + half4);
        start4[q] = start4[q - 1] + 4 * period[lag_block[q]];
        if start4[q] + 4 * ENH_BLOCKL as i32 + overhang4 < len4 {
            let (seg, pos4) = refiner(data, center_start, start4[q]);
            seqs[q] = seg;
            start4[q] = pos4;
        }
    }
    seqs
}
