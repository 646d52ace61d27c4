//! 标量定点运算: 归一化, 除法, 开方, 随机数.

/// 将 `value` 左移到最高有效位 (符号位之后) 所需的位数.
///
/// `value == 0` 时返回 0.
pub fn norm_w32(value: i32) -> u32 {
    if value == 0 {
        return 0;
    }
    let magnitude = if value < 0 { !value } else { value };
    (magnitude as u32).leading_zeros().saturating_sub(1)
}

/// 16 位版本的 [`norm_w32`]
pub fn norm_w16(value: i16) -> u32 {
    if value == 0 {
        return 0;
    }
    let magnitude = if value < 0 { !value } else { value };
    (magnitude as u16).leading_zeros().saturating_sub(1)
}

/// 无符号归一化位数
pub fn norm_u32(value: u32) -> u32 {
    if value == 0 {
        return 0;
    }
    value.leading_zeros()
}

/// 表示 `value` 所需的位数
pub fn get_size_in_bits(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// 32/16 位除法, 分母为 0 时返回 i32::MAX
pub fn div_w32_w16(num: i32, den: i16) -> i32 {
    if den == 0 {
        return i32::MAX;
    }
    num / den as i32
}

/// 32/16 位除法, 结果饱和到 i16
pub fn div_w32_w16_res_w16(num: i32, den: i16) -> i16 {
    super::sat_w16(div_w32_w16(num, den))
}

/// 向下取整的整数平方根, 负数按 0 处理
pub fn sqrt_floor(value: i32) -> i32 {
    if value <= 0 {
        return 0;
    }
    (value as u32).isqrt() as i32
}

/// 线性同余随机数, 返回 [0, 32767] 的均匀分布值
pub fn rand_u(seed: &mut u32) -> i16 {
    *seed = seed.wrapping_mul(69069).wrapping_add(1) & 0x7FFF_FFFF;
    (*seed >> 16) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_w32() {
        assert_eq!(norm_w32(0), 0);
        assert_eq!(norm_w32(1), 30);
        assert_eq!(norm_w32(-1), 31);
        assert_eq!(norm_w32(0x4000_0000), 0);
        assert_eq!(norm_w32(i32::MIN), 0);
    }

    #[test]
    fn test_norm_w16_and_u32() {
        assert_eq!(norm_w16(1), 14);
        assert_eq!(norm_w16(16384), 0);
        assert_eq!(norm_u32(1), 31);
        assert_eq!(norm_u32(0x8000_0000), 0);
    }

    #[test]
    fn test_size_in_bits() {
        assert_eq!(get_size_in_bits(0), 0);
        assert_eq!(get_size_in_bits(1), 1);
        assert_eq!(get_size_in_bits(240), 8);
    }

    #[test]
    fn test_division_and_sqrt() {
        assert_eq!(div_w32_w16(100, 7), 14);
        assert_eq!(div_w32_w16(100, 0), i32::MAX);
        assert_eq!(div_w32_w16_res_w16(1 << 20, 1), 32767);
        assert_eq!(sqrt_floor(99), 9);
        assert_eq!(sqrt_floor(-5), 0);
    }

    #[test]
    fn test_rand_u_range() {
        let mut seed = 777u32;
        for _ in 0..1000 {
            let v = rand_u(&mut seed);
            assert!(v >= 0);
        }
    }
}
