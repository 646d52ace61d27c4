//! 定点信号处理内核 (signal processing library).
//!
//! 语音编解码器 (iLBC) 与 NetEq 隐藏/变速 DSP 共用的 Q 格式算术工具.
//!
//! 所有内核都以 `i16` 采样和 `i32` 累加值为主, 中间结果在 `i64` 中计算后饱和,
//! 因此在 debug 构建下也不会出现算术溢出 panic.
//!
//! 带历史状态的滤波器不使用负下标, 而是约定输出 (或输入) 缓冲区的前 `order`
//! 个元素存放状态, 见 [`filter_ar_fast_q12`] 与 [`filter_ma_fast_q12`].

mod filter;
mod lpc;
mod math;
mod vector;

pub use filter::{ar_filter, bw_expand, downsample_fast, filter_ar_fast_q12, filter_ma_fast_q12};
pub use lpc::levinson_durbin;
pub use math::{
    div_w32_w16, div_w32_w16_res_w16, get_size_in_bits, norm_u32, norm_w16, norm_w32, rand_u,
    sqrt_floor,
};
pub use vector::{
    add_affine_vector_to_vector, affine_transform_vector, auto_correlation, cross_correlation,
    dot_product_with_scale, elementwise_vector_mult, energy, get_scaling_square, max_abs_index_w16,
    max_abs_w16, max_abs_w32, max_index_w32, max_value_w16, min_value_w16,
    reverse_order_mult_array_elements, scale_and_add_vectors_with_round, scale_vector_with_sat,
    vector_bit_shift_w16, vector_bit_shift_w32_to_w16,
};

/// i16 最大值
pub const WORD16_MAX: i32 = 32767;
/// i16 最小值
pub const WORD16_MIN: i32 = -32768;

/// 饱和到 i16
#[inline]
pub fn sat_w16(value: i32) -> i16 {
    value.clamp(WORD16_MIN, WORD16_MAX) as i16
}

/// 从 i64 饱和到 i16
#[inline]
pub fn sat_w16_wide(value: i64) -> i16 {
    value.clamp(WORD16_MIN as i64, WORD16_MAX as i64) as i16
}

/// 从 i64 饱和到 i32
#[inline]
pub fn sat_w32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// 16x16 乘法后带舍入右移
#[inline]
pub fn mul_16_16_rsft_round(a: i16, b: i16, shift: u32) -> i32 {
    if shift == 0 {
        return a as i32 * b as i32;
    }
    ((a as i32 * b as i32) + (1 << (shift - 1))) >> shift
}

/// 按符号移位: 正数左移, 负数右移
#[inline]
pub fn shift_w32(value: i32, shift: i32) -> i32 {
    if shift >= 0 {
        sat_w32((value as i64) << shift.min(32))
    } else {
        value >> (-shift).min(31)
    }
}
