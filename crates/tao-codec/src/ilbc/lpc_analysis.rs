//! 编码端 LPC 分析: 加窗, 自相关, 滞后窗, Levinson-Durbin, 带宽扩展, 转换为 LSF.

use log::trace;
use tao_core::spl::{auto_correlation, bw_expand, elementwise_vector_mult, levinson_durbin};

use super::lsf::{Lsf, identity_lsf, lpc_to_lsf, mean_lsf};
use super::tables::{CHIRP_SYNT_DENUM, LPC_ASYM_WIN_Q15, LPC_LAG_WIN_Q15, LPC_WIN_Q15};
use super::{BLOCKL_MAX, IlbcMode, LPC_COEF_LEN, LPC_FILTERORDER, LPC_LOOKBACK};

const LPC_BUF_LEN: usize = LPC_LOOKBACK + BLOCKL_MAX;

/// LPC 分析器, 保存跨帧的分析缓冲
pub struct LpcAnalyzer {
    mode: IlbcMode,
    /// 分析缓冲: 回看采样 + 当前帧
    buffer: [i16; LPC_BUF_LEN],
    /// 上一次成功分析得到的 LSF
    last_lsf: Lsf,
}

impl LpcAnalyzer {
    pub fn new(mode: IlbcMode) -> Self {
        Self {
            mode,
            buffer: [0; LPC_BUF_LEN],
            last_lsf: mean_lsf(),
        }
    }

    /// 分析一帧 (已高通) 语音, 输出 `lpc_n` 组未量化 LSF
    ///
    /// 静音窗口输出 LSF 均值; Levinson-Durbin 不稳定时退回单位滤波器,
    /// 求根失败时沿用上一组 LSF.
    pub fn analyze(&mut self, block: &[i16], lsf_out: &mut [i16]) {
        let blockl = self.mode.block_len();
        let lpc_n = self.mode.lpc_n();
        debug_assert_eq!(block.len(), blockl);
        debug_assert_eq!(lsf_out.len(), lpc_n * LPC_FILTERORDER);

        let is = LPC_BUF_LEN - blockl;
        self.buffer[is..].copy_from_slice(block);

        let mut windowed = [0i16; BLOCKL_MAX];
        for k in 0..lpc_n {
            if k + 1 < lpc_n {
                elementwise_vector_mult(
                    &mut windowed,
                    &self.buffer[..BLOCKL_MAX],
                    &LPC_WIN_Q15,
                    15,
                );
            } else {
                elementwise_vector_mult(
                    &mut windowed,
                    &self.buffer[LPC_LOOKBACK..],
                    &LPC_ASYM_WIN_Q15,
                    15,
                );
            }
            let lsf = self.analyze_window(&windowed);
            lsf_out[k * LPC_FILTERORDER..(k + 1) * LPC_FILTERORDER].copy_from_slice(&lsf);
        }

        self.buffer.copy_within(blockl.., 0);
    }

    fn analyze_window(&mut self, windowed: &[i16]) -> Lsf {
        let (mut r, _scale) = auto_correlation(windowed, LPC_FILTERORDER);
        if r[0] <= 0 {
            return mean_lsf();
        }
        self.lsf_from_autocorrelation(&mut r)
    }

    fn lsf_from_autocorrelation(&mut self, r: &mut [i32]) -> Lsf {
        // 白噪声修正 (约 1.0001) 与滞后窗
        r[0] = r[0].saturating_add(r[0] >> 13);
        for (v, &w) in r.iter_mut().zip(&LPC_LAG_WIN_Q15).skip(1) {
            *v = ((*v as i64 * w as i64) >> 15) as i32;
        }

        let Some((a, _k)) = levinson_durbin(r, LPC_FILTERORDER) else {
            trace!("LPC 分析不稳定, 改用单位滤波器");
            return identity_lsf();
        };
        let mut expanded = [0i16; LPC_COEF_LEN];
        bw_expand(&mut expanded, &a, &CHIRP_SYNT_DENUM);
        match lpc_to_lsf(&expanded) {
            Some(lsf) => {
                self.last_lsf = lsf;
                lsf
            }
            None => {
                trace!("LSF 求根失败, 沿用上一组 LSF");
                self.last_lsf
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilbc::tables::PI_Q13;

    fn sine(freq: f64, amp: f64, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| (amp * (2.0 * std::f64::consts::PI * freq * i as f64 / 8000.0).sin()) as i16)
            .collect()
    }

    #[test]
    fn test_silence_gives_mean_lsf() {
        let mut ana = LpcAnalyzer::new(IlbcMode::Ms30);
        let mut lsf = [0i16; 20];
        ana.analyze(&[0; 240], &mut lsf);
        assert_eq!(&lsf[..10], &mean_lsf());
        assert_eq!(&lsf[10..], &mean_lsf());
    }

    #[test]
    fn test_unstable_autocorrelation_falls_back_to_identity_filter() {
        let mut ana = LpcAnalyzer::new(IlbcMode::Ms20);
        // |r1| > r0 不是合法的自相关, 第一个反射系数即越界
        let mut r = [0i32; LPC_COEF_LEN];
        r[0] = 1000;
        r[1] = 2000;
        assert!(levinson_durbin(&r, LPC_FILTERORDER).is_none());
        let lsf = ana.lsf_from_autocorrelation(&mut r);
        assert_eq!(lsf, identity_lsf());
        // 不影响下一次求根失败时沿用的 LSF
        assert_eq!(ana.last_lsf, mean_lsf());
    }

    #[test]
    fn test_sine_produces_ordered_lsf_near_tone() {
        let mut ana = LpcAnalyzer::new(IlbcMode::Ms20);
        let mut lsf = [0i16; 10];
        let x = sine(1000.0, 8000.0, 320);
        // 第二帧的分析窗完全落在正弦内
        ana.analyze(&x[..160], &mut lsf);
        ana.analyze(&x[160..], &mut lsf);
        for k in 0..9 {
            assert!(lsf[k + 1] > lsf[k], "{lsf:?}");
        }
        // 1 kHz 对应 π/4, 必有一对 LSF 夹住它
        let tone = PI_Q13 / 4;
        assert!(
            lsf.windows(2)
                .any(|w| (w[0] as i32) <= tone + 600 && (w[1] as i32) >= tone - 600),
            "{lsf:?}"
        );
    }
}
