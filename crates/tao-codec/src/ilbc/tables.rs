//! iLBC 常量表.
//!
//! 除特别说明外, 均为定点值: LSF 为 Q13 弧度, 增益为 Q14, 窗函数为 Q15.

// ============================================================
// LSF 量化
// ============================================================

/// LSF 均值 (Q13 弧度)
pub const LSF_MEAN_Q13: [i16; 10] = [
    2308, 3652, 5434, 7885, 10255, 12559, 15160, 17513, 20328, 22752,
];

/// 分裂矢量量化的各段维数
pub const LSF_DIM_CB: [usize; 3] = [3, 3, 4];

/// 分裂矢量量化的各段码本大小
pub const LSF_SIZE_CB: [usize; 3] = [32, 32, 16];

/// 各段索引位宽
pub const LSF_BITS_CB: [u32; 3] = [5, 5, 4];

/// LSF 码本 (按段依次展开, 每段首项为均值)
pub const LSF_CB_Q13: [i16; 256] = [
    2308, 3652, 5434, 1905, 3652, 5434, 2711, 3652, 5434, 3114, 3652, 5434,
    2308, 3249, 5434, 1905, 3249, 5434, 2711, 3249, 5434, 3114, 3249, 5434,
    2308, 4055, 5434, 1905, 4055, 5434, 2711, 4055, 5434, 3114, 4055, 5434,
    2308, 4458, 5434, 1905, 4458, 5434, 2711, 4458, 5434, 3114, 4458, 5434,
    2308, 3652, 4900, 1905, 3652, 4900, 2711, 3652, 4900, 3114, 3652, 4900,
    2308, 3249, 4900, 1905, 3249, 4900, 2711, 3249, 4900, 3114, 3249, 4900,
    2308, 4055, 4900, 1905, 4055, 4900, 2711, 4055, 4900, 3114, 4055, 4900,
    2308, 4458, 4900, 1905, 4458, 4900, 2711, 4458, 4900, 3114, 4458, 4900,
    7885, 10255, 12559, 7174, 10255, 12559, 8596, 10255, 12559, 9307, 10255, 12559,
    7885, 9564, 12559, 7174, 9564, 12559, 8596, 9564, 12559, 9307, 9564, 12559,
    7885, 10946, 12559, 7174, 10946, 12559, 8596, 10946, 12559, 9307, 10946, 12559,
    7885, 11637, 12559, 7174, 11637, 12559, 8596, 11637, 12559, 9307, 11637, 12559,
    7885, 10255, 11868, 7174, 10255, 11868, 8596, 10255, 11868, 9307, 10255, 11868,
    7885, 9564, 11868, 7174, 9564, 11868, 8596, 9564, 11868, 9307, 9564, 11868,
    7885, 10946, 11868, 7174, 10946, 11868, 8596, 10946, 11868, 9307, 10946, 11868,
    7885, 11637, 11868, 7174, 11637, 11868, 8596, 11637, 11868, 9307, 11637, 11868,
    15160, 17513, 20328, 22752, 14455, 17513, 20328, 22752, 15160, 18218, 20328, 22752,
    14455, 18218, 20328, 22752, 15160, 17513, 19601, 22752, 14455, 17513, 19601, 22752,
    15160, 18218, 19601, 22752, 14455, 18218, 19601, 22752, 15160, 17513, 20328, 23479,
    14455, 17513, 20328, 23479, 15160, 18218, 20328, 23479, 14455, 18218, 20328, 23479,
    15160, 17513, 19601, 23479, 14455, 17513, 19601, 23479, 15160, 18218, 19601, 23479,
    14455, 18218, 19601, 23479,
];

/// 20 ms 模式的子帧 LSF 插值权重 (Q14, 旧 LSF 所占比例)
pub const LSF_WEIGHT_20MS: [i16; 4] = [12288, 8192, 4096, 0];

/// 30 ms 模式的子帧 LSF 插值权重 (Q14)
pub const LSF_WEIGHT_30MS: [i16; 6] = [8192, 16384, 10923, 5461, 0, 0];

/// LSF 最小间距 (Q13, 约 0.039 rad)
pub const LSF_MIN_DIST_Q13: i16 = 319;
/// LSF 修正步长 (Q13, 约 0.0195 rad)
pub const LSF_HALF_DIST_Q13: i16 = 160;
/// LSF 下界 (Q13, 约 0.01 rad)
pub const LSF_MIN_Q13: i16 = 82;
/// LSF 上界 (Q13, 约 3.14 rad)
pub const LSF_MAX_Q13: i16 = 25723;
/// π (Q13)
pub const PI_Q13: i32 = 25736;

// ============================================================
// LPC 分析
// ============================================================

/// cos(πk/256), k = 0..=256 (Q15)
pub const COS_Q15: [i16; 257] = [
    32767, 32766, 32758, 32746, 32729, 32706, 32679, 32647, 32610, 32568, 32522, 32470,
    32413, 32352, 32286, 32214, 32138, 32058, 31972, 31881, 31786, 31686, 31581, 31471,
    31357, 31238, 31114, 30986, 30853, 30715, 30572, 30425, 30274, 30118, 29957, 29792,
    29622, 29448, 29269, 29086, 28899, 28707, 28511, 28311, 28106, 27897, 27684, 27467,
    27246, 27020, 26791, 26557, 26320, 26078, 25833, 25583, 25330, 25073, 24812, 24548,
    24279, 24008, 23732, 23453, 23170, 22884, 22595, 22302, 22006, 21706, 21403, 21097,
    20788, 20475, 20160, 19841, 19520, 19195, 18868, 18538, 18205, 17869, 17531, 17190,
    16846, 16500, 16151, 15800, 15447, 15091, 14733, 14373, 14010, 13646, 13279, 12910,
    12540, 12167, 11793, 11417, 11039, 10660, 10279, 9896, 9512, 9127, 8740, 8351,
    7962, 7571, 7180, 6787, 6393, 5998, 5602, 5205, 4808, 4410, 4011, 3612,
    3212, 2811, 2411, 2009, 1608, 1206, 804, 402, 0, -402, -804, -1206,
    -1608, -2009, -2411, -2811, -3212, -3612, -4011, -4410, -4808, -5205, -5602, -5998,
    -6393, -6787, -7180, -7571, -7962, -8351, -8740, -9127, -9512, -9896, -10279, -10660,
    -11039, -11417, -11793, -12167, -12540, -12910, -13279, -13646, -14010, -14373, -14733, -15091,
    -15447, -15800, -16151, -16500, -16846, -17190, -17531, -17869, -18205, -18538, -18868, -19195,
    -19520, -19841, -20160, -20475, -20788, -21097, -21403, -21706, -22006, -22302, -22595, -22884,
    -23170, -23453, -23732, -24008, -24279, -24548, -24812, -25073, -25330, -25583, -25833, -26078,
    -26320, -26557, -26791, -27020, -27246, -27467, -27684, -27897, -28106, -28311, -28511, -28707,
    -28899, -29086, -29269, -29448, -29622, -29792, -29957, -30118, -30274, -30425, -30572, -30715,
    -30853, -30986, -31114, -31238, -31357, -31471, -31581, -31686, -31786, -31881, -31972, -32058,
    -32138, -32214, -32286, -32352, -32413, -32470, -32522, -32568, -32610, -32647, -32679, -32706,
    -32729, -32746, -32758, -32766, -32768,
];

/// 对称 LPC 分析窗 (Hann, Q15)
pub const LPC_WIN_Q15: [i16; 240] = [
    6, 22, 50, 89, 139, 200, 272, 355, 449, 554, 669, 795,
    932, 1079, 1237, 1405, 1583, 1771, 1969, 2177, 2395, 2622, 2858, 3104,
    3359, 3622, 3894, 4175, 4464, 4761, 5066, 5379, 5699, 6026, 6361, 6702,
    7050, 7404, 7764, 8130, 8502, 8879, 9262, 9649, 10040, 10436, 10836, 11240,
    11647, 12058, 12471, 12887, 13306, 13726, 14148, 14572, 14997, 15423, 15850, 16277,
    16704, 17131, 17558, 17983, 18408, 18831, 19252, 19672, 20089, 20504, 20916, 21325,
    21730, 22132, 22530, 22924, 23314, 23698, 24078, 24452, 24821, 25185, 25542, 25893,
    26238, 26575, 26906, 27230, 27547, 27855, 28156, 28450, 28734, 29011, 29279, 29538,
    29788, 30029, 30261, 30483, 30696, 30899, 31092, 31275, 31448, 31611, 31764, 31906,
    32037, 32158, 32268, 32367, 32456, 32533, 32600, 32655, 32700, 32733, 32755, 32767,
    32767, 32755, 32733, 32700, 32655, 32600, 32533, 32456, 32367, 32268, 32158, 32037,
    31906, 31764, 31611, 31448, 31275, 31092, 30899, 30696, 30483, 30261, 30029, 29788,
    29538, 29279, 29011, 28734, 28450, 28156, 27855, 27547, 27230, 26906, 26575, 26238,
    25893, 25542, 25185, 24821, 24452, 24078, 23698, 23314, 22924, 22530, 22132, 21730,
    21325, 20916, 20504, 20089, 19672, 19252, 18831, 18408, 17983, 17558, 17131, 16704,
    16277, 15850, 15423, 14997, 14572, 14148, 13726, 13306, 12887, 12471, 12058, 11647,
    11240, 10836, 10436, 10040, 9649, 9262, 8879, 8502, 8130, 7764, 7404, 7050,
    6702, 6361, 6026, 5699, 5379, 5066, 4761, 4464, 4175, 3894, 3622, 3359,
    3104, 2858, 2622, 2395, 2177, 1969, 1771, 1583, 1405, 1237, 1079, 932,
    795, 669, 554, 449, 355, 272, 200, 139, 89, 50, 22, 6,
];

/// 非对称 LPC 分析窗 (Q15), 以前 200 个采样上升, 最后 40 个采样下降
pub const LPC_ASYM_WIN_Q15: [i16; 240] = [
    2, 8, 18, 32, 51, 73, 99, 129, 163, 202, 244, 290,
    340, 395, 453, 515, 581, 651, 724, 802, 883, 969, 1058, 1151,
    1247, 1348, 1452, 1559, 1671, 1786, 1904, 2027, 2152, 2282, 2414, 2551,
    2690, 2833, 2979, 3129, 3282, 3438, 3597, 3760, 3926, 4094, 4266, 4441,
    4618, 4799, 4982, 5168, 5357, 5549, 5743, 5940, 6140, 6342, 6547, 6754,
    6963, 7175, 7389, 7605, 7823, 8044, 8266, 8491, 8717, 8946, 9176, 9408,
    9642, 9877, 10114, 10353, 10593, 10834, 11077, 11321, 11566, 11813, 12061, 12309,
    12559, 12810, 13062, 13314, 13567, 13821, 14075, 14331, 14586, 14842, 15099, 15355,
    15612, 15869, 16127, 16384, 16641, 16899, 17156, 17413, 17669, 17926, 18182, 18437,
    18693, 18947, 19201, 19454, 19706, 19958, 20209, 20459, 20707, 20955, 21202, 21447,
    21691, 21934, 22175, 22415, 22654, 22891, 23126, 23360, 23592, 23822, 24051, 24277,
    24502, 24724, 24945, 25163, 25379, 25593, 25805, 26014, 26221, 26426, 26628, 26828,
    27025, 27219, 27411, 27600, 27786, 27969, 28150, 28327, 28502, 28674, 28842, 29008,
    29171, 29330, 29486, 29639, 29789, 29935, 30078, 30217, 30354, 30486, 30616, 30741,
    30864, 30982, 31097, 31209, 31316, 31420, 31521, 31617, 31710, 31799, 31885, 31966,
    32044, 32117, 32187, 32253, 32315, 32373, 32428, 32478, 32524, 32566, 32605, 32639,
    32669, 32695, 32717, 32736, 32750, 32760, 32766, 32767, 32744, 32672, 32552, 32384,
    32169, 31906, 31597, 31241, 30839, 30392, 29901, 29366, 28787, 28166, 27504, 26802,
    26060, 25280, 24463, 23610, 22722, 21801, 20848, 19865, 18852, 17812, 16745, 15654,
    14540, 13404, 12249, 11076, 9887, 8683, 7466, 6239, 5002, 3758, 2508, 1255,
];

/// 自相关滞后窗 (60 Hz 高斯, Q15)
pub const LPC_LAG_WIN_Q15: [i16; 11] = [
    32767, 32732, 32623, 32442, 32191, 31871, 31484, 31033, 30520, 29950, 29324,
];

/// 合成滤波器带宽扩展系数 0.9025^k (Q15)
pub const CHIRP_SYNT_DENUM: [i16; 11] = [
    32767, 29573, 26690, 24087, 21739, 19619, 17707, 15980, 14422, 13016, 11747,
];

/// 感知加权滤波器带宽扩展系数 0.4222^k (Q15)
pub const CHIRP_WEIGHT_DENUM: [i16; 11] = [32767, 13835, 5841, 2466, 1041, 440, 186, 78, 33, 14, 6];

// ============================================================
// 起始状态
// ============================================================

/// 起始状态 3 bit 标量量化电平 (Q11)
pub const STATE_SQ3_Q11: [i16; 8] = [
    -7618, -4459, -2314, -634, 910, 2723, 4989, 8159,
];

/// 起始状态最大幅度的对数量化重建值 (整数幅度)
pub const STATE_FRGQ_AMP: [i32; 64] = [
    10, 12, 14, 16, 19, 22, 27, 32, 37, 44, 51, 60,
    69, 80, 91, 102, 114, 127, 139, 153, 165, 181, 198, 215,
    234, 253, 272, 294, 319, 346, 374, 403, 433, 467, 500, 536,
    575, 616, 659, 705, 754, 807, 864, 929, 1000, 1080, 1165, 1271,
    1385, 1524, 1671, 1843, 2034, 2243, 2485, 2772, 3096, 3487, 4019, 4635,
    5508, 6772, 8685, 12640,
];

/// 相邻重建值之间的判决门限 (对数域中点)
pub const STATE_FRGQ_THRESHOLD: [i32; 63] = [
    11, 13, 15, 17, 21, 25, 29, 34, 40, 47, 56, 65,
    74, 85, 96, 107, 120, 133, 146, 159, 173, 189, 206, 224,
    243, 262, 283, 306, 332, 360, 388, 418, 449, 483, 518, 555,
    595, 637, 681, 729, 780, 835, 896, 964, 1039, 1122, 1217, 1327,
    1453, 1596, 1755, 1936, 2136, 2361, 2624, 2930, 3286, 3744, 4316, 5053,
    6108, 7669, 10478,
];

/// 重建电平 4.5 对应的 Q11 值
pub const STATE_UNIT_Q11: i64 = 9216;

// ============================================================
// 自适应码本
// ============================================================

/// 第 1 级增益量化表 (5 bit, Q14)
pub const GAIN_SQ5_Q14: [i16; 32] = [
    614, 1229, 1843, 2458, 3072, 3686, 4301, 4915, 5530, 6144, 6758, 7373, 7987, 8602, 9216, 9830,
    10445, 11059, 11674, 12288, 12902, 13517, 14131, 14746, 15360, 15974, 16589, 17203, 17818,
    18432, 19046, 19661,
];

/// 第 2 级增益量化表 (4 bit, Q14, 相对上一级增益)
pub const GAIN_SQ4_Q14: [i16; 16] = [
    -17203, -14746, -12288, -9830, -7373, -4915, -2458, 0, 2458, 4915, 7373, 9830, 12288, 14746,
    17203, 19661,
];

/// 第 3 级增益量化表 (3 bit, Q14, 相对上一级增益)
pub const GAIN_SQ3_Q14: [i16; 8] = [-16384, -10813, -5407, 0, 4096, 8192, 12288, 16384];

/// 码本扩展段的 8 抽头 FIR (Q14)
pub const CB_FILTER_Q14: [i16; 8] = [
    -560, 1784, -3020, 13208, 11688, -2360, 1372, -552,
];

/// 增强 (内插) 码矢量的过渡权重 (Q15): 0.2, 0.4, 0.6, 0.8
pub const AUG_ALPHA_Q15: [i16; 4] = [6554, 13107, 19661, 26214];

/// 各码本块每级的主码矢量搜索范围
///
/// 第 0 行为起始状态扩展块, 其余行为第 1..=4 个自适应子帧.
pub const CB_SEARCH_RANGE: [[usize; 3]; 5] = [
    [58, 58, 58],
    [108, 44, 44],
    [108, 108, 108],
    [108, 108, 108],
    [108, 108, 108],
];

// ============================================================
// 增强器与 PLC
// ============================================================

/// 4 倍上采样分数延迟滤波器组 (Q14)
///
/// 第 j 行在整数位置 i 上插值出 x(i + j/4): `Σ_k h[j][k] * x[i + 3 - k]`.
pub const ENH_POLYPHASE_Q14: [[i16; 7]; 4] = [
    [0, 0, 0, 16384, 0, 0, 0],
    [256, -1260, 4724, 14124, -1744, 308, -256],
    [388, -2036, 9856, 9856, -2036, 388, -388],
    [308, -1744, 14124, 4724, -1260, 256, -308],
];

/// 周围周期的平滑权重 0.5(1 - cos(2πi/8)), i = 1..=3 (Q15)
pub const ENH_WT_Q15: [i16; 3] = [4797, 16384, 27969];

/// 增强缓冲中各 80 采样块的中心位置
pub const ENH_PLOCS: [i32; 8] = [40, 120, 200, 280, 360, 440, 520, 600];

/// 2 倍降采样低通滤波器 (Q12)
pub const ENH_LP_FILT_Q12: [i16; 7] = [
    -273, 512, 1297, 1696, 1297, 512, -273,
];

/// PLC 周期性门限: 相关系数平方 (Q15), 对应相关系数 0.40..=0.70
pub const PLC_PER_SQR_Q15: [i32; 6] = [5243, 6934, 8861, 11023, 13422, 16056];

/// 与 [`PLC_PER_SQR_Q15`] 对应的基音混合因子 (Q14)
pub const PLC_PITCH_FACT_Q14: [i32; 6] = [0, 3277, 6554, 9830, 13107, 16384];

// ============================================================
// 高通滤波与帧分类
// ============================================================

/// 编码端输入高通: 零点系数 (Q12, 已含 0.5 增益)
pub const HP_IN_ZEROS_Q12: [i32; 3] = [1899, -3798, 1899];
/// 编码端输入高通: 极点系数 (Q12, 取反号后用于反馈)
pub const HP_IN_POLES_Q12: [i32; 2] = [7807, -3733];

/// 解码端输出高通: 零点系数 (Q12)
pub const HP_OUT_ZEROS_Q12: [i32; 3] = [3849, -7699, 3849];
/// 解码端输出高通: 极点系数 (Q12, 取反号后用于反馈)
pub const HP_OUT_POLES_Q12: [i32; 2] = [7918, -3833];

/// 帧分类的位置权重 (Q15), 偏向帧内部的子帧
pub const SSQ_EN_WIN_Q15: [i32; 5] = [26214, 29491, 32767, 29491, 26214];

/// 帧分类能量窗的边沿渐变 (Q15): 1/6..=5/6
pub const SAMP_EN_WIN_Q15: [i32; 5] = [5461, 10923, 16384, 21845, 27307];
