//! 解码端增强器.
//!
//! 残差先进入 640 采样的环形缓冲, 按 80 采样分块估计基音周期 (在 2 倍降采样域中),
//! 再对输出块收集前后各 3 个基音同步段, 以加权平均平滑当前块.
//! 输出相对输入延迟 40 (20 ms) 或 80 (30 ms) 个采样.
//!
//! 上一帧为丢包隐藏帧时, 还会用新帧反向预测替换上一帧末尾的隐藏残差并交叉淡化.

mod refiner;
mod smooth;
mod sync_seq;

use log::trace;
use tao_core::spl::downsample_fast;

use self::smooth::smooth;
use self::sync_seq::get_sync_seq;
use super::IlbcMode;
use super::tables::ENH_LP_FILT_Q12;

/// 增强块长度
pub(crate) const ENH_BLOCKL: usize = 80;
/// 前后同步段数
pub(crate) const ENH_HL: usize = 3;
/// 对齐搜索的半宽 (采样)
pub(crate) const ENH_SLOP: usize = 2;
/// 上采样滤波器半长
pub(crate) const ENH_FL0: usize = 3;
/// 上采样倍数
pub(crate) const ENH_UPS0: usize = 4;
/// 段两端的安全余量
pub(crate) const ENH_OVERHANG: usize = 2;
/// 增强缓冲长度
pub(crate) const ENH_BUFL: usize = 640;
/// 缓冲中的块数
const ENH_NBLOCKS_TOT: usize = ENH_BUFL / ENH_BLOCKL;
/// 当前帧之前的块数 (30 ms 模式)
const ENH_NBLOCKS_EXTRA: usize = 5;
/// 降采样滤波器的状态长度
const DS_STATE: usize = ENH_LP_FILT_Q12.len() - 1;
/// 降采样域中的最小/最大基音周期
const DS_LAG_MIN: usize = 10;
const DS_LAG_MAX: usize = 60;
/// 周期估计前在降采样域中保留的历史长度
const DS_HISTORY: usize = 60;

/// 正相关时的 `corr² / energy`, 以 (分子, 分母) 返回
fn xcorr_coef(target: &[i16], regressor: &[i16]) -> (i128, i128) {
    let mut corr = 0i64;
    let mut energy = 0i64;
    for (&t, &r) in target.iter().zip(regressor) {
        corr += t as i64 * r as i64;
        energy += r as i64 * r as i64;
    }
    if corr > 0 && energy > 0 {
        (corr as i128 * corr as i128, energy as i128)
    } else {
        (0, 1)
    }
}

/// `a` 是否严格优于 `b`
fn coef_beats(a: (i128, i128), b: (i128, i128)) -> bool {
    a.0 * b.1 > b.0 * a.1
}

/// 增强器状态
#[derive(Debug, Clone)]
pub struct Enhancer {
    mode: IlbcMode,
    buf: Vec<i16>,
    period: [i32; ENH_NBLOCKS_TOT],
}

impl Enhancer {
    pub fn new(mode: IlbcMode) -> Self {
        Self {
            mode,
            buf: vec![0; ENH_BUFL],
            period: [40; ENH_NBLOCKS_TOT],
        }
    }

    /// 当前帧在缓冲中的块偏移: 20 ms 帧只有 2 个新块
    fn ioffset(&self) -> usize {
        match self.mode {
            IlbcMode::Ms20 => 1,
            IlbcMode::Ms30 => 0,
        }
    }

    /// 增强一帧残差
    ///
    /// 返回 (延迟后的增强残差, 最近一块的基音周期估计).
    /// `prev_was_plc` 表示上一帧由丢包隐藏生成.
    pub fn process(&mut self, residual: &[i16], prev_was_plc: bool) -> (Vec<i16>, usize) {
        let blockl = self.mode.block_len();
        debug_assert_eq!(residual.len(), blockl);
        let ioffset = self.ioffset();

        self.buf.copy_within(blockl.., 0);
        self.buf[ENH_BUFL - blockl..].copy_from_slice(residual);
        self.period.copy_within(3 - ioffset.., 0);

        self.estimate_periods();
        if prev_was_plc {
            self.blend_concealed(residual);
        }

        let mut out = Vec::with_capacity(blockl);
        let centers: Vec<usize> = match self.mode {
            IlbcMode::Ms20 => (0..2).map(|i| (5 + i) * ENH_BLOCKL + ENH_BLOCKL / 2).collect(),
            IlbcMode::Ms30 => (0..3).map(|i| (4 + i) * ENH_BLOCKL).collect(),
        };
        for center in centers {
            let seqs = get_sync_seq(&self.buf, center, &self.period);
            out.extend(smooth(&seqs));
        }
        (out, self.period[ENH_NBLOCKS_TOT - 1].max(0) as usize)
    }

    /// 在 2 倍降采样域中估计各新块的基音周期
    fn estimate_periods(&mut self) {
        let ioffset = self.ioffset();
        let ds_start = (ENH_NBLOCKS_EXTRA + ioffset) * ENH_BLOCKL - 2 * DS_HISTORY;
        let mut input = self.buf[ds_start - DS_STATE..].to_vec();
        input.extend(std::iter::repeat_n(0, ENH_FL0));
        let mut ds = vec![0i16; (ENH_BUFL - ds_start) / 2];
        if let Err(e) = downsample_fast(&input, DS_STATE, &mut ds, &ENH_LP_FILT_Q12, 2, 3) {
            trace!("增强器降采样失败: {}", e);
            return;
        }

        let half = ENH_BLOCKL / 2;
        for iblock in 0..3 - ioffset {
            let pos = DS_HISTORY + iblock * half;
            let target = &ds[pos..pos + half];
            let mut lag = DS_LAG_MIN;
            let mut best = xcorr_coef(target, &ds[pos - lag..pos - lag + half]);
            for l in DS_LAG_MIN + 1..DS_LAG_MAX {
                let cc = xcorr_coef(target, &ds[pos - l..pos - l + half]);
                if coef_beats(cc, best) {
                    best = cc;
                    lag = l;
                }
            }
            self.period[iblock + ENH_NBLOCKS_EXTRA + ioffset] = 2 * lag as i32;
        }
    }

    /// 上一帧是隐藏帧: 用新帧的周期延拓反向预测其末尾, 限制能量后交叉淡化
    fn blend_concealed(&mut self, input: &[i16]) {
        let ioffset = self.ioffset();
        let blockl = self.mode.block_len();
        let plc_blockl = match self.mode {
            IlbcMode::Ms20 => ENH_BLOCKL / 2,
            IlbcMode::Ms30 => ENH_BLOCKL,
        };

        let inlag = self.period[ENH_NBLOCKS_EXTRA + ioffset].max(2) as usize;
        let mut lag = inlag - 1;
        let mut best = (0i128, 1i128);
        for l in inlag - 1..=inlag + 1 {
            if l + plc_blockl > input.len() {
                break;
            }
            let cc = xcorr_coef(&input[..plc_blockl], &input[l..l + plc_blockl]);
            if l == inlag - 1 || coef_beats(cc, best) {
                best = cc;
                lag = l;
            }
        }
        self.period[ENH_NBLOCKS_EXTRA + ioffset - 1] = lag as i32;

        // 反向预测: 最近 lag 个采样取新帧开头, 更早的保留原隐藏残差
        let old_end = ENH_BUFL - blockl;
        let mut pred = vec![0i64; plc_blockl];
        let from_new = lag.min(plc_blockl);
        for k in 0..from_new {
            pred[plc_blockl - 1 - k] = input[lag - 1 - k] as i64;
        }
        for j in 0..plc_blockl - from_new {
            pred[j] = self.buf[old_end - (plc_blockl - from_new) + j] as i64;
        }

        let old = &self.buf[old_end - plc_blockl..old_end];
        let e_old: i64 = old.iter().map(|&v| v as i64 * v as i64).sum();
        let e_pred: i64 = pred.iter().map(|&v| v * v).sum();
        if e_pred > 4 * e_old && e_pred > 0 {
            // 2 * sqrt(e_old / e_pred), Q14
            let scale = ((((4 * e_old) as u128) << 28) / e_pred as u128).isqrt() as i64;
            for (i, p) in pred.iter_mut().enumerate() {
                let g = if i + 10 < plc_blockl {
                    scale
                } else {
                    let ramp = (i + 10 - plc_blockl) as i64;
                    scale + ramp * (16384 - scale) / 10
                };
                *p = (*p * g + 8192) >> 14;
            }
        }

        let n = plc_blockl as i64 + 1;
        for i in 0..plc_blockl {
            let pos = old_end - 1 - i;
            let f = ((i as i64 + 1) << 14) / n;
            let mixed = f * self.buf[pos] as i64 + (16384 - f) * pred[plc_blockl - 1 - i];
            self.buf[pos] = ((mixed + 8192) >> 14) as i16;
        }
    }
}
