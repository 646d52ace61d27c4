//! iLBC 解码器.
//!
//! 每帧三种情形:
//! - 正常帧: 解包, 重建残差, 刷新丢包隐藏的历史
//! - 损坏帧: 解包校验失败 (空帧标志, 起始状态位置越界, LSF 索引非法), 改走丢包隐藏
//! - 丢失帧: 直接丢包隐藏
//!
//! 之后可选地经过增强器, 再做合成滤波与输出高通.

use log::{debug, trace};
use tao_core::spl::ar_filter;
use tao_core::{TaoError, TaoResult};

use super::cb::index_conv_dec;
use super::enhancer::Enhancer;
use super::hp_filter::HpFilter;
use super::lsf::{Lsf, interpolate_to_lpc, lsf_check, mean_lsf, split_vq_dequant};
use super::pack::FrameBits;
use super::plc::{Plc, limit_energy};
use super::residual::{ConstructCoder, walk_residual};
use super::state::state_construct;
use super::{BLOCKL_MAX, IlbcMode, LPC_COEF_LEN, LPC_FILTERORDER, SUBL};

/// 关闭增强器时基音搜索的窗口与范围
const LAG_SEARCH_LEN: usize = 80;
const LAG_MIN: usize = 20;
const LAG_MAX: usize = 120;

/// 已确定模式后的解码状态
struct DecoderState {
    mode: IlbcMode,
    lsfdeq_old: Lsf,
    /// 合成滤波器记忆
    synt_mem: [i16; LPC_FILTERORDER],
    /// 上一帧各子帧的合成滤波器系数
    old_synt: Vec<i16>,
    hp: HpFilter,
    plc: Plc,
    enhancer: Enhancer,
    /// 上一帧是否为隐藏帧
    prev_enh_pl: bool,
    /// 最近的基音周期估计
    last_lag: usize,
    /// 最近 240 个残差采样
    res_history: Vec<i16>,
    /// 上一个隐藏输出帧的能量, 正常帧后清空
    plc_out_energy: Option<i64>,
}

impl DecoderState {
    fn new(mode: IlbcMode) -> Self {
        let nsub = mode.nsub();
        let mut old_synt = vec![0i16; nsub * LPC_COEF_LEN];
        for sub in old_synt.chunks_mut(LPC_COEF_LEN) {
            sub[0] = 4096;
        }
        Self {
            mode,
            lsfdeq_old: mean_lsf(),
            synt_mem: [0; LPC_FILTERORDER],
            old_synt,
            hp: HpFilter::output(),
            plc: Plc::new(mode.block_len()),
            enhancer: Enhancer::new(mode),
            prev_enh_pl: false,
            last_lag: LAG_MIN,
            res_history: vec![0; BLOCKL_MAX],
            plc_out_energy: None,
        }
    }

    /// 由帧参数重建残差与各子帧合成滤波器系数
    ///
    /// LSF 索引非法时返回 `None`.
    fn reconstruct(&mut self, frame: &FrameBits) -> Option<(Vec<i16>, Vec<i16>)> {
        let mode = self.mode;
        let nsub = mode.nsub();

        let mut lsfdeq = Vec::with_capacity(mode.lpc_n() * LPC_FILTERORDER);
        for set in frame.lsf.chunks(3) {
            lsfdeq.extend(split_vq_dequant(set)?);
        }
        lsf_check(&mut lsfdeq);
        let mut synt = vec![0i16; nsub * LPC_COEF_LEN];
        interpolate_to_lpc(mode, &lsfdeq, &mut self.lsfdeq_old, &mut synt);

        let mut cb_index = frame.cb_index;
        index_conv_dec(&mut cb_index);

        let start = frame.start_idx;
        let synt_state = &synt[(start - 1) * LPC_COEF_LEN..start * LPC_COEF_LEN];
        let state = state_construct(frame.idx_for_max, &frame.idx_vec, synt_state);

        let mut coder = ConstructCoder {
            cb_index: &cb_index,
            gain_index: &frame.gain_index,
        };
        // 解码端没有原始残差, 也不使用加权滤波器
        let target = vec![0i16; mode.block_len()];
        let residual = walk_residual(
            mode,
            &mut coder,
            start,
            frame.state_first,
            &state,
            &target,
            &synt,
        );
        Some((residual, synt))
    }

    /// 在最近的残差中搜索基音周期 (关闭增强器时使用)
    fn search_lag(&self) -> usize {
        let len = self.res_history.len();
        let target = &self.res_history[len - LAG_SEARCH_LEN..];
        let mut best_lag = LAG_MIN;
        let mut best = (0i128, 1i128);
        for lag in LAG_MIN..LAG_MAX {
            let lagged = &self.res_history[len - LAG_SEARCH_LEN - lag..len - lag];
            let mut corr = 0i64;
            let mut energy = 0i64;
            for (&t, &l) in target.iter().zip(lagged) {
                corr += t as i64 * l as i64;
                energy += l as i64 * l as i64;
            }
            let cc = if corr > 0 && energy > 0 {
                (corr as i128 * corr as i128, energy as i128)
            } else {
                (0, 1)
            };
            if lag == LAG_MIN || cc.0 * best.1 > best.0 * cc.1 {
                best = cc;
                best_lag = lag;
            }
        }
        best_lag
    }

    /// 解码一帧, `frame` 为 `None` 表示丢帧
    fn decode_frame(&mut self, frame: Option<&FrameBits>, use_enhancer: bool) -> Vec<i16> {
        let mode = self.mode;
        let nsub = mode.nsub();
        let blockl = mode.block_len();

        let decoded = frame.and_then(|f| {
            let r = self.reconstruct(f);
            if r.is_none() {
                debug!("iLBC LSF 索引非法, 改用丢包隐藏");
            }
            r
        });
        let good = decoded.is_some();
        let (residual, synt) = match decoded {
            Some((residual, synt)) => {
                self.plc
                    .update(&residual, &synt[(nsub - 1) * LPC_COEF_LEN..]);
                (residual, synt)
            }
            None => {
                let (residual, lpc) = self.plc.conceal(self.last_lag);
                let synt: Vec<i16> = lpc.iter().copied().cycle().take(nsub * LPC_COEF_LEN).collect();
                (residual, synt)
            }
        };

        self.res_history.copy_within(blockl.., 0);
        let hist_len = self.res_history.len();
        self.res_history[hist_len - blockl..].copy_from_slice(&residual);

        let mut out = vec![0i16; blockl];
        let coef = |k: usize, table: &[i16]| -> Vec<i16> {
            table[k * LPC_COEF_LEN..(k + 1) * LPC_COEF_LEN].to_vec()
        };
        if use_enhancer {
            let (enhanced, lag) = self.enhancer.process(&residual, self.prev_enh_pl);
            self.last_lag = lag;
            // 增强器引入延迟, 开头的子帧仍使用上一帧的滤波器
            let delay_subs = match mode {
                IlbcMode::Ms20 => 1,
                IlbcMode::Ms30 => 2,
            };
            for i in 0..nsub {
                let a = if i < delay_subs {
                    coef(nsub - delay_subs + i, &self.old_synt)
                } else {
                    coef(i - delay_subs, &synt)
                };
                let range = i * SUBL..(i + 1) * SUBL;
                ar_filter(&a, &enhanced[range.clone()], &mut self.synt_mem, &mut out[range]);
            }
        } else {
            self.last_lag = self.search_lag();
            for i in 0..nsub {
                let a = coef(i, &synt);
                let range = i * SUBL..(i + 1) * SUBL;
                ar_filter(&a, &residual[range.clone()], &mut self.synt_mem, &mut out[range]);
            }
        }
        trace!(
            "iLBC 解码一帧: 正常={}, 连续丢帧={}, 基音周期={}",
            good,
            self.plc.consecutive_lost(),
            self.last_lag
        );

        self.hp.process(&mut out);
        // 合成滤波器的记忆会让输出能量回升, 连续丢帧的输出同样不超过上一帧
        self.plc_out_energy = if good {
            None
        } else {
            Some(limit_energy(&mut out, self.plc_out_energy.unwrap_or(i64::MAX)))
        };
        self.old_synt = synt;
        self.prev_enh_pl = !good;
        out
    }
}

/// iLBC 解码器
///
/// # 示例
/// ```
/// use tao_codec::ilbc::{IlbcDecoder, IlbcEncoder, IlbcMode};
///
/// let mut enc = IlbcEncoder::new(IlbcMode::Ms20);
/// let bytes = enc.encode(&[0i16; 160]).unwrap();
/// // 不指定模式时由数据包长度推断
/// let mut dec = IlbcDecoder::new(None, true);
/// assert_eq!(dec.decode(&bytes).unwrap().len(), 160);
/// assert_eq!(dec.decode_plc(2).len(), 320);
/// ```
pub struct IlbcDecoder {
    requested: Option<IlbcMode>,
    use_enhancer: bool,
    state: Option<DecoderState>,
}

impl IlbcDecoder {
    /// 创建解码器, `mode` 为 `None` 时由第一个数据包的长度确定
    pub fn new(mode: Option<IlbcMode>, use_enhancer: bool) -> Self {
        Self {
            requested: mode,
            use_enhancer,
            state: mode.map(DecoderState::new),
        }
    }

    /// 当前模式 (尚未确定时为 `None`)
    pub fn mode(&self) -> Option<IlbcMode> {
        self.state.as_ref().map(|s| s.mode)
    }

    /// 解码一个数据包 (1~3 个连续帧)
    ///
    /// 长度与模式不符时返回 `InvalidArgument`; 单帧损坏不产生错误, 而是输出隐藏帧.
    pub fn decode(&mut self, data: &[u8]) -> TaoResult<Vec<i16>> {
        let mode = match (self.mode(), self.requested) {
            (Some(m), _) => m,
            (None, Some(m)) => m,
            (None, None) => IlbcMode::detect(data.len()).ok_or_else(|| {
                TaoError::InvalidArgument(format!("无法由 {} 字节推断 iLBC 帧模式", data.len()))
            })?,
        };
        let bytes = mode.bytes();
        if data.is_empty() || data.len() % bytes != 0 || data.len() / bytes > 3 {
            return Err(TaoError::InvalidArgument(format!(
                "iLBC {} 数据包长度 {} 无效, 应为 {} 字节的 1~3 倍",
                mode,
                data.len(),
                bytes
            )));
        }
        let use_enhancer = self.use_enhancer;
        let state = self.state.get_or_insert_with(|| {
            debug!("iLBC 解码器模式确定为 {}", mode);
            DecoderState::new(mode)
        });

        let mut out = Vec::with_capacity(data.len() / bytes * mode.block_len());
        for chunk in data.chunks_exact(bytes) {
            let frame = match FrameBits::unpack(mode, chunk) {
                Ok(f) => Some(f),
                Err(e) => {
                    debug!("iLBC 码流损坏, 改用丢包隐藏: {}", e);
                    None
                }
            };
            out.extend(state.decode_frame(frame.as_ref(), use_enhancer));
        }
        Ok(out)
    }

    /// 为 `frames` 个丢失帧生成隐藏输出
    ///
    /// 模式尚未确定时按 30 ms 处理.
    pub fn decode_plc(&mut self, frames: usize) -> Vec<i16> {
        let use_enhancer = self.use_enhancer;
        let mode = self.requested.unwrap_or(IlbcMode::Ms30);
        let state = self.state.get_or_insert_with(|| DecoderState::new(mode));
        let mut out = Vec::with_capacity(frames * state.mode.block_len());
        for _ in 0..frames {
            out.extend(state.decode_frame(None, use_enhancer));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ilbc::IlbcEncoder;

    fn voiced(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 8000.0;
                let v = 5000.0 * (2.0 * std::f64::consts::PI * 200.0 * t).sin()
                    + 2000.0 * (2.0 * std::f64::consts::PI * 400.0 * t).sin()
                    + 800.0 * (2.0 * std::f64::consts::PI * 600.0 * t).sin();
                v as i16
            })
            .collect()
    }

    fn energy(x: &[i16]) -> i64 {
        x.iter().map(|&v| v as i64 * v as i64).sum()
    }

    #[test]
    fn test_mode_detection_is_sticky() {
        let mut dec = IlbcDecoder::new(None, true);
        assert!(dec.mode().is_none());
        let bytes = IlbcEncoder::new(IlbcMode::Ms30).encode(&[0; 480]).unwrap();
        assert_eq!(dec.decode(&bytes).unwrap().len(), 480);
        assert_eq!(dec.mode(), Some(IlbcMode::Ms30));
        assert!(matches!(dec.decode(&[0u8; 38]), Err(TaoError::InvalidArgument(_))));
        assert!(IlbcDecoder::new(None, false).decode(&[0u8; 37]).is_err());
    }

    #[test]
    fn test_bad_start_index_falls_back_to_plc() {
        let mode = IlbcMode::Ms20;
        let mut enc = IlbcEncoder::new(mode);
        let mut dec = IlbcDecoder::new(Some(mode), true);
        let x = voiced(160 * 3);
        let bytes = enc.encode(&x).unwrap();
        dec.decode(&bytes[..76]).unwrap();

        let mut frame = FrameBits::unpack(mode, &bytes[76..]).unwrap();
        frame.start_idx = 0;
        let corrupt = frame.pack(mode);
        let out = dec.decode(&corrupt).unwrap();
        assert_eq!(out.len(), 160);
        assert_eq!(dec.state.as_ref().map(|s| s.prev_enh_pl), Some(true));
        assert_eq!(dec.state.as_ref().map(|s| s.plc.consecutive_lost()), Some(1));
    }

    fn tone(len: usize, pitch_hz: f64, amp: f64) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 8000.0;
                let v = amp * (2.0 * std::f64::consts::PI * pitch_hz * t).sin()
                    + amp * 0.3 * (2.0 * std::f64::consts::PI * 3.0 * pitch_hz * t).sin();
                v as i16
            })
            .collect()
    }

    #[test]
    fn test_plc_output_decays() {
        for mode in [IlbcMode::Ms20, IlbcMode::Ms30] {
            for use_enhancer in [true, false] {
                for (pitch, amp) in [(200.0, 5000.0), (95.0, 8000.0), (310.0, 1500.0)] {
                    let mut enc = IlbcEncoder::new(mode);
                    let mut dec = IlbcDecoder::new(Some(mode), use_enhancer);
                    let x = tone(mode.block_len() * 25, pitch, amp);
                    dec.decode_all(&enc.encode(&x).unwrap());
                    let losses: Vec<i64> = (0..8).map(|_| energy(&dec.decode_plc(1))).collect();
                    for w in losses.windows(2) {
                        assert!(w[1] <= w[0], "{mode} {use_enhancer} {pitch}: {losses:?}");
                    }
                }
            }
        }
        // 再来一个好帧后重新计数
        let mode = IlbcMode::Ms20;
        let mut enc = IlbcEncoder::new(mode);
        let mut dec = IlbcDecoder::new(Some(mode), true);
        let bytes = enc.encode(&voiced(160 * 4)).unwrap();
        dec.decode_all(&bytes[..38 * 3]);
        dec.decode_plc(2);
        dec.decode(&bytes[38 * 3..]).unwrap();
        assert_eq!(dec.state.as_ref().and_then(|s| s.plc_out_energy), None);
    }

    #[test]
    fn test_round_trip_snr_without_enhancer() {
        for mode in [IlbcMode::Ms20, IlbcMode::Ms30] {
            let mut enc = IlbcEncoder::new(mode);
            let mut dec = IlbcDecoder::new(Some(mode), false);
            let x = voiced(mode.block_len() * 20);
            let y = dec.decode_all(&enc.encode(&x).unwrap());
            assert_eq!(y.len(), x.len());
            // 跳过起始段, 比较稳态的能量量级
            let ex = energy(&x[2000..]);
            let ey = energy(&y[2000..]);
            assert!(ey > ex / 10 && ey < ex * 10, "{mode}: {ex} vs {ey}");
        }
    }

    impl IlbcDecoder {
        fn decode_all(&mut self, bytes: &[u8]) -> Vec<i16> {
            let n = self.mode().map_or(38, |m| m.bytes());
            bytes
                .chunks(n)
                .flat_map(|c| self.decode(c).unwrap_or_default())
                .collect()
        }
    }
}
