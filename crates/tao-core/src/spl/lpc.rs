//! Levinson-Durbin 递推.

/// 由自相关序列求 LPC 系数.
///
/// 返回 `(a, k)`: `a[0..=order]` 为 Q12 的 LPC 系数 (`a[0] = 4096`),
/// `k[0..order]` 为 Q15 的反射系数. 当 `r[0] <= 0`, 任一反射系数模值 >= 1,
/// 或系数超出 Q12 可表示范围时视为不稳定, 返回 `None`.
///
/// 内部使用 Q28 系数与 i128 累加, 结果与平台无关.
pub fn levinson_durbin(r: &[i32], order: usize) -> Option<(Vec<i16>, Vec<i16>)> {
    const ONE: i128 = 1 << 28;

    if r.len() <= order || r[0] <= 0 {
        return None;
    }

    let mut a = vec![0i128; order + 1];
    a[0] = ONE;
    let mut k_out = Vec::with_capacity(order);
    let mut err = r[0] as i128;

    for i in 1..=order {
        let acc: i128 = (0..i).map(|j| a[j] * r[i - j] as i128).sum();
        let k = -acc / err;
        if k.abs() >= ONE {
            return None;
        }

        let prev = a.clone();
        for j in 1..i {
            a[j] = prev[j] + ((k * prev[i - j]) >> 28);
        }
        a[i] = k;

        err -= (err * ((k * k) >> 28)) >> 28;
        if err <= 0 {
            return None;
        }
        k_out.push((k >> 13).clamp(-32767, 32767) as i16);
    }

    let mut a_q12 = Vec::with_capacity(order + 1);
    for &c in &a {
        let v = (c + (1 << 15)) >> 16;
        if !(-32768..=32767).contains(&v) {
            return None;
        }
        a_q12.push(v as i16);
    }
    Some((a_q12, k_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_order_process() {
        // r[k] = 0.5^k -> a = [1, -0.5]
        let r = [1 << 20, 1 << 19, 1 << 18];
        let (a, k) = levinson_durbin(&r, 2).unwrap();
        assert_eq!(a[0], 4096);
        assert_eq!(a[1], -2048);
        assert_eq!(a[2], 0);
        assert_eq!(k[0], -16384);
    }

    #[test]
    fn test_white_noise_is_identity() {
        let r = [1000, 0, 0, 0];
        let (a, _) = levinson_durbin(&r, 3).unwrap();
        assert_eq!(a, vec![4096, 0, 0, 0]);
    }

    #[test]
    fn test_unstable_input() {
        assert!(levinson_durbin(&[0, 0, 0], 2).is_none());
        // |r[1]| > r[0] 不是合法的自相关
        assert!(levinson_durbin(&[100, 200], 1).is_none());
    }
}
