//! 由码本索引与增益索引重建残差块.

use log::debug;
use tao_core::spl::sat_w16_wide;

use super::{CbMemory, gain_dequant};
use crate::ilbc::CB_NSTAGES;

/// 码本重建: `out = Σ gain[s] * cbvec[s]`, 增益在 Q14 下累加后舍入
///
/// 索引超出码本的级不产生贡献.
pub fn cb_construct(
    index: &[usize],
    gain_index: &[usize],
    mem: &[i16],
    cbveclen: usize,
) -> Vec<i16> {
    let cb = CbMemory::new(mem, cbveclen);
    let mut acc = vec![0i64; cbveclen];
    let mut prev_gain = 0i32;
    for stage in 0..CB_NSTAGES {
        let gain = gain_dequant(gain_index[stage], prev_gain, stage);
        prev_gain = gain;
        match cb.get_cb_vec(index[stage]) {
            Some(v) => {
                for (a, &x) in acc.iter_mut().zip(&v) {
                    *a += gain as i64 * x as i64;
                }
            }
            None => debug!(
                "码本索引 {} 超出范围 (码本大小 {}), 忽略该级",
                index[stage],
                cb.layout().total()
            ),
        }
    }
    acc.iter().map(|&a| sat_w16_wide((a + 8192) >> 14)).collect()
}
