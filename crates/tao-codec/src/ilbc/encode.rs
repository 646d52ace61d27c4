//! iLBC 编码器.

use log::trace;
use tao_core::spl::filter_ma_fast_q12;
use tao_core::{TaoError, TaoResult};

use super::cb::index_conv_enc;
use super::classify::frame_classify;
use super::hp_filter::HpFilter;
use super::lpc_analysis::LpcAnalyzer;
use super::lsf::{Lsf, interpolate_to_lpc, lsf_check, mean_lsf, split_vq, weighting_from_lpc};
use super::pack::FrameBits;
use super::residual::{SearchCoder, walk_residual};
use super::state::{state_construct, state_search};
use super::{CB_INDEX_LEN, IlbcMode, LPC_COEF_LEN, LPC_FILTERORDER, STATE_LEN, SUBL};

/// iLBC 编码器
///
/// # 示例
/// ```
/// use tao_codec::ilbc::{IlbcEncoder, IlbcMode};
///
/// let mut enc = IlbcEncoder::new(IlbcMode::Ms30);
/// let bytes = enc.encode(&[0i16; 480]).unwrap();
/// assert_eq!(bytes.len(), 100);
/// ```
pub struct IlbcEncoder {
    mode: IlbcMode,
    hp: HpFilter,
    analyzer: LpcAnalyzer,
    /// 上一帧最后一组未量化 LSF (用于加权滤波器插值)
    lsf_old: Lsf,
    /// 上一帧最后一组量化 LSF
    lsfdeq_old: Lsf,
    /// 残差计算的输入历史
    ana_mem: [i16; LPC_FILTERORDER],
}

impl IlbcEncoder {
    pub fn new(mode: IlbcMode) -> Self {
        Self {
            mode,
            hp: HpFilter::input(),
            analyzer: LpcAnalyzer::new(mode),
            lsf_old: mean_lsf(),
            lsfdeq_old: mean_lsf(),
            ana_mem: [0; LPC_FILTERORDER],
        }
    }

    pub fn mode(&self) -> IlbcMode {
        self.mode
    }

    /// 编码任意整数个帧
    pub fn encode(&mut self, pcm: &[i16]) -> TaoResult<Vec<u8>> {
        let blockl = self.mode.block_len();
        if pcm.is_empty() || pcm.len() % blockl != 0 {
            return Err(TaoError::InvalidArgument(format!(
                "iLBC {} 输入长度 {} 不是 {} 的整数倍",
                self.mode,
                pcm.len(),
                blockl
            )));
        }
        let mut out = Vec::with_capacity(pcm.len() / blockl * self.mode.bytes());
        for block in pcm.chunks_exact(blockl) {
            out.extend(self.encode_frame(block).pack(self.mode));
        }
        Ok(out)
    }

    /// 编码一帧, 返回量化参数
    pub fn encode_frame(&mut self, block: &[i16]) -> FrameBits {
        let mode = self.mode;
        let blockl = mode.block_len();
        let nsub = mode.nsub();
        let lpc_n = mode.lpc_n();
        debug_assert_eq!(block.len(), blockl);

        let mut data = block.to_vec();
        self.hp.process(&mut data);

        // LPC 分析与 LSF 量化
        let mut lsf = vec![0i16; lpc_n * LPC_FILTERORDER];
        self.analyzer.analyze(&data, &mut lsf);
        let mut lsfdeq = vec![0i16; lpc_n * LPC_FILTERORDER];
        let mut lsf_index = Vec::with_capacity(3 * lpc_n);
        for (set, deq) in lsf
            .chunks(LPC_FILTERORDER)
            .zip(lsfdeq.chunks_mut(LPC_FILTERORDER))
        {
            lsf_index.extend(split_vq(set, deq));
        }
        if lsf_check(&mut lsfdeq) {
            trace!("量化 LSF 已做稳定性修正");
        }

        let mut synt = vec![0i16; nsub * LPC_COEF_LEN];
        interpolate_to_lpc(mode, &lsfdeq, &mut self.lsfdeq_old, &mut synt);
        let mut weight_lpc = vec![0i16; nsub * LPC_COEF_LEN];
        interpolate_to_lpc(mode, &lsf, &mut self.lsf_old, &mut weight_lpc);
        let mut weight = vec![0i16; nsub * LPC_COEF_LEN];
        weighting_from_lpc(&weight_lpc, &mut weight);

        // 逐子帧逆滤波得到残差
        let mut input = Vec::with_capacity(LPC_FILTERORDER + blockl);
        input.extend_from_slice(&self.ana_mem);
        input.extend_from_slice(&data);
        let mut residual = vec![0i16; blockl];
        for (n, out) in residual.chunks_mut(SUBL).enumerate() {
            filter_ma_fast_q12(
                &input[n * SUBL..(n + 1) * SUBL + LPC_FILTERORDER],
                out,
                &synt[n * LPC_COEF_LEN..(n + 1) * LPC_COEF_LEN],
            );
        }
        self.ana_mem.copy_from_slice(&data[blockl - LPC_FILTERORDER..]);

        // 起始状态
        let start_idx = frame_classify(mode, &residual);
        let short = mode.state_short_len();
        let diff = STATE_LEN - short;
        let state_begin = (start_idx - 1) * SUBL;
        let sq_energy = |r: &[i16]| -> i64 { r.iter().map(|&v| v as i64 * v as i64).sum() };
        let en1 = sq_energy(&residual[state_begin..state_begin + short]);
        let en2 = sq_energy(&residual[state_begin + diff..state_begin + STATE_LEN]);
        let state_first = en1 > en2;
        let start_pos = state_begin + if state_first { 0 } else { diff };

        let sub = |k: usize| k * LPC_COEF_LEN..(k + 1) * LPC_COEF_LEN;
        let synt_state = &synt[sub(start_idx - 1)];
        let quant = state_search(
            &residual[start_pos..start_pos + short],
            synt_state,
            [&weight[sub(start_idx - 1)], &weight[sub(start_idx)]],
            state_first,
        );
        let state = state_construct(quant.idx_for_max, &quant.idx_vec, synt_state);

        // 自适应码本
        let mut cb_index = [0usize; CB_INDEX_LEN];
        let mut gain_index = [0usize; CB_INDEX_LEN];
        let mut coder = SearchCoder {
            cb_index: &mut cb_index,
            gain_index: &mut gain_index,
        };
        walk_residual(
            mode,
            &mut coder,
            start_idx,
            state_first,
            &state,
            &residual,
            &weight,
        );
        index_conv_enc(&mut cb_index);

        FrameBits {
            lsf: lsf_index,
            start_idx,
            state_first,
            idx_for_max: quant.idx_for_max,
            idx_vec: quant.idx_vec,
            cb_index,
            gain_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech_like(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 8000.0;
                let env = 0.6 + 0.4 * (2.0 * std::f64::consts::PI * 3.0 * t).sin();
                let v = 4000.0 * (2.0 * std::f64::consts::PI * 180.0 * t).sin()
                    + 1500.0 * (2.0 * std::f64::consts::PI * 720.0 * t).sin()
                    + 600.0 * (2.0 * std::f64::consts::PI * 1900.0 * t).sin();
                (env * v) as i16
            })
            .collect()
    }

    #[test]
    fn test_encode_sizes() {
        let mut enc = IlbcEncoder::new(IlbcMode::Ms20);
        assert_eq!(enc.encode(&[0; 160]).unwrap().len(), 38);
        assert_eq!(enc.encode(&speech_like(480)).unwrap().len(), 114);
        let mut enc = IlbcEncoder::new(IlbcMode::Ms30);
        assert_eq!(enc.encode(&speech_like(720)).unwrap().len(), 150);
    }

    #[test]
    fn test_rejects_partial_frames() {
        let mut enc = IlbcEncoder::new(IlbcMode::Ms30);
        assert!(matches!(enc.encode(&[0; 100]), Err(TaoError::InvalidArgument(_))));
        assert!(enc.encode(&[]).is_err());
    }

    #[test]
    fn test_frame_parameters_are_in_range() {
        for mode in [IlbcMode::Ms20, IlbcMode::Ms30] {
            let mut enc = IlbcEncoder::new(mode);
            for block in speech_like(mode.block_len() * 5).chunks(mode.block_len()) {
                let f = enc.encode_frame(block);
                assert!((1..=mode.max_start_idx()).contains(&f.start_idx));
                assert_eq!(f.idx_vec.len(), mode.state_short_len());
                // 第一个自适应子帧后两级已压缩到 7 bit
                assert!(f.cb_index[4] < 128 && f.cb_index[5] < 128);
                assert!(f.cb_index[..3].iter().all(|&i| i < 128));
                let bytes = f.pack(mode);
                assert_eq!(FrameBits::unpack(mode, &bytes).unwrap(), f);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let x = speech_like(480);
        let a = IlbcEncoder::new(IlbcMode::Ms20).encode(&x).unwrap();
        let b = IlbcEncoder::new(IlbcMode::Ms20).encode(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_silent_frame_encodes_to_mean_lsf_and_decodes_near_zero() {
        use crate::ilbc::IlbcDecoder;
        use crate::ilbc::cb::gain_dequant;
        use crate::ilbc::lsf::split_vq_dequant;

        let mode = IlbcMode::Ms30;
        let mut enc = IlbcEncoder::new(mode);
        let f = enc.encode_frame(&[0; 240]);

        // 两组 LSF 都落在均值码字上
        assert_eq!(f.lsf, vec![0; 6]);
        for set in f.lsf.chunks(3) {
            assert_eq!(split_vq_dequant(set), Some(mean_lsf()));
        }

        // 每块第一级无正相关候选, 取索引 0 与最小增益, 后两级增益为 0
        for (block, (cb, gains)) in f.cb_index.chunks(3).zip(f.gain_index.chunks(3)).enumerate() {
            assert_eq!(cb[0], 0, "block {block}: {cb:?}");
            let g0 = gain_dequant(gains[0], 0, 0);
            let g1 = gain_dequant(gains[1], g0, 1);
            let g2 = gain_dequant(gains[2], g1, 2);
            assert_eq!((g0, g1, g2), (614, 0, 0), "block {block}: {gains:?}");
        }

        let mut dec = IlbcDecoder::new(Some(mode), true);
        let out = dec.decode(&f.pack(mode)).unwrap();
        assert_eq!(out.len(), 240);
        let peak = out.iter().map(|&v| v.unsigned_abs()).max().unwrap_or(0);
        let energy: i64 = out.iter().map(|&v| v as i64 * v as i64).sum();
        assert!(peak <= 48, "{out:?}");
        assert!(energy < 240 * 64, "{out:?}");
    }
}
