//! DTMF 双音生成.
//!
//! 每个音用二阶递归振荡器 `y[n] = 2cos(w)·y[n-1] - y[n-2]` 生成, 低频组与高频组
//! 按 -3 dB 的比例混合后乘以衰减表中的幅度. 事件编号与 RFC 4733 一致:
//! 0-9 为数字, 10 为 `*`, 11 为 `#`, 12-15 为 A-D.

use log::debug;
use tao_core::{TaoError, TaoResult};

use crate::audio_multi_vector::AudioMultiVector;

/// 低频组系数 `cos(w)` (Q14), 按采样率 8/16/32/48 kHz 与事件编号索引
const COEFF1: [[i32; 16]; 4] = [
    [
        24219, 27980, 27980, 27980, 26956, 26956, 26956, 25701, 25701, 25701, 24219, 24219, 27980,
        26956, 25701, 24219,
    ],
    [
        30556, 31548, 31548, 31548, 31281, 31281, 31281, 30951, 30951, 30951, 30556, 30556, 31548,
        31281, 30951, 30556,
    ],
    [
        32210, 32462, 32462, 32462, 32394, 32394, 32394, 32311, 32311, 32311, 32210, 32210, 32462,
        32394, 32311, 32210,
    ],
    [
        32520, 32632, 32632, 32632, 32602, 32602, 32602, 32564, 32564, 32564, 32520, 32520, 32632,
        32602, 32564, 32520,
    ],
];

/// 高频组系数 `cos(w)` (Q14)
const COEFF2: [[i32; 16]; 4] = [
    [
        16325, 19073, 16325, 13085, 19073, 16325, 13085, 19073, 16325, 13085, 19073, 13085, 9315,
        9315, 9315, 9315,
    ],
    [
        28361, 29144, 28361, 27409, 29144, 28361, 27409, 29144, 28361, 27409, 29144, 27409, 26258,
        26258, 26258, 26258,
    ],
    [
        31647, 31849, 31647, 31400, 31849, 31647, 31400, 31849, 31647, 31400, 31849, 31400, 31098,
        31098, 31098, 31098,
    ],
    [
        32268, 32359, 32268, 32157, 32359, 32268, 32157, 32359, 32268, 32157, 32359, 32157, 32022,
        32022, 32022, 32022,
    ],
];

/// 低频组振荡器初值 `sin(w)` (Q14)
const INIT_TERM1: [[i32; 16]; 4] = [
    [
        11036, 8528, 8528, 8528, 9315, 9315, 9315, 10163, 10163, 10163, 11036, 11036, 8528, 9315,
        10163, 11036,
    ],
    [
        5918, 4429, 4429, 4429, 4879, 4879, 4879, 5380, 5380, 5380, 5918, 5918, 4429, 4879, 5380,
        5918,
    ],
    [
        3010, 2235, 2235, 2235, 2468, 2468, 2468, 2728, 2728, 2728, 3010, 3010, 2235, 2468, 2728,
        3010,
    ],
    [
        2013, 1493, 1493, 1493, 1649, 1649, 1649, 1823, 1823, 1823, 2013, 2013, 1493, 1649, 1823,
        2013,
    ],
];

/// 高频组振荡器初值 `sin(w)` (Q14)
const INIT_TERM2: [[i32; 16]; 4] = [
    [
        14206, 13323, 14206, 15021, 13323, 14206, 15021, 13323, 14206, 15021, 13323, 15021, 15708,
        15708, 15708, 15708,
    ],
    [
        8207, 7490, 8207, 8979, 7490, 8207, 8979, 7490, 8207, 8979, 7490, 8979, 9801, 9801, 9801,
        9801,
    ],
    [
        4249, 3853, 4249, 4685, 3853, 4249, 4685, 3853, 4249, 4685, 3853, 4685, 5164, 5164, 5164,
        5164,
    ],
    [
        2851, 2582, 2851, 3148, 2582, 2851, 3148, 2582, 2851, 3148, 2582, 3148, 3476, 3476, 3476,
        3476,
    ],
];

/// 按 dB 衰减的幅度 (Q14), 0 dB 到 -63 dB
const AMPLITUDE: [i32; 64] = [
    16141, 14386, 12821, 11427, 10184, 9077, 8090, 7210, 6426, 5727, 5104, 4549, 4054, 3614, 3221,
    2870, 2558, 2280, 2032, 1811, 1614, 1439, 1282, 1143, 1018, 908, 809, 721, 643, 573, 510, 455,
    405, 361, 322, 287, 256, 228, 203, 181, 161, 144, 128, 114, 102, 91, 81, 72, 64, 57, 51, 45,
    41, 36, 32, 29, 26, 23, 20, 18, 16, 14, 13, 11,
];

/// 最大事件编号
pub const MAX_EVENT: u8 = 15;
/// 最大衰减 (dB)
pub const MAX_ATTENUATION: u8 = 63;

/// 双音生成器
#[derive(Debug, Clone, Default)]
pub struct DtmfToneGenerator {
    initialized: bool,
    coeff1: i32,
    coeff2: i32,
    amplitude: i32,
    /// 低频组最近两个输出, `[n-2, n-1]`
    sample_history1: [i32; 2],
    /// 高频组最近两个输出
    sample_history2: [i32; 2],
}

impl DtmfToneGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为事件 `event` 准备振荡器, `attenuation` 为衰减 dB 数
    pub fn init(&mut self, fs_hz: u32, event: u8, attenuation: u8) -> TaoResult<()> {
        self.initialized = false;
        let fs_index = match fs_hz {
            8000 => 0,
            16000 => 1,
            32000 => 2,
            48000 => 3,
            _ => {
                return Err(TaoError::InvalidArgument(format!(
                    "DTMF 不支持采样率 {} Hz",
                    fs_hz
                )));
            }
        };
        if event > MAX_EVENT {
            return Err(TaoError::InvalidArgument(format!(
                "DTMF 事件编号 {} 超出范围 0..={}",
                event, MAX_EVENT
            )));
        }
        if attenuation > MAX_ATTENUATION {
            return Err(TaoError::InvalidArgument(format!(
                "DTMF 衰减 {} dB 超出范围 0..={}",
                attenuation, MAX_ATTENUATION
            )));
        }

        let event = event as usize;
        self.coeff1 = COEFF1[fs_index][event];
        self.coeff2 = COEFF2[fs_index][event];
        self.amplitude = AMPLITUDE[attenuation as usize];
        self.sample_history1 = [INIT_TERM1[fs_index][event], 0];
        self.sample_history2 = [INIT_TERM2[fs_index][event], 0];
        self.initialized = true;
        debug!(
            "DTMF 初始化: 事件 {}, 衰减 {} dB, {} Hz",
            event, attenuation, fs_hz
        );
        Ok(())
    }

    pub fn reset(&mut self) {
        self.initialized = false;
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// 生成 `num_samples` 个采样, 写入 `output` 的所有声道
    ///
    /// `output` 被扩展到至少 `num_samples` 长, 返回生成的采样数.
    pub fn generate(
        &mut self,
        num_samples: usize,
        output: &mut AudioMultiVector,
    ) -> TaoResult<usize> {
        if !self.initialized {
            return Err(TaoError::Codec("DTMF 生成器未初始化".into()));
        }
        output.ensure_size(num_samples);
        let channel = output[0].as_mut_slice();
        for sample in channel[..num_samples].iter_mut() {
            let low = ((self.coeff1 * self.sample_history1[1] + 8192) >> 14)
                - self.sample_history1[0];
            let high = ((self.coeff2 * self.sample_history2[1] + 8192) >> 14)
                - self.sample_history2[0];
            self.sample_history1 = [self.sample_history1[1], low];
            self.sample_history2 = [self.sample_history2[1], high];

            // 低频组比高频组低 3 dB
            let mixed = (23171 * low + high * 32768 + 16384) >> 15;
            *sample = ((mixed * self.amplitude + 8192) >> 14) as i16;
        }
        for ch in 1..output.channels() {
            output.copy_channel(0, ch);
        }
        Ok(num_samples)
    }
}
