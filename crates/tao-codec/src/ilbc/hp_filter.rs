//! 二阶高通滤波器: 编码端输入 (约 0.5 倍增益) 与解码端输出 (约 2 倍增益, 饱和).

use tao_core::spl::{sat_w16_wide, sat_w32};

use super::tables::{HP_IN_POLES_Q12, HP_IN_ZEROS_Q12, HP_OUT_POLES_Q12, HP_OUT_ZEROS_Q12};

/// 二阶 IIR 高通, 输出状态以 Q4 保存
#[derive(Debug, Clone)]
pub struct HpFilter {
    zeros: [i32; 3],
    poles: [i32; 2],
    /// 输出从 Q4 转回采样域时的右移位数
    out_shift: u32,
    x: [i32; 2],
    y: [i32; 2],
}

impl HpFilter {
    /// 编码端输入高通
    pub fn input() -> Self {
        Self::with(HP_IN_ZEROS_Q12, HP_IN_POLES_Q12, 4)
    }

    /// 解码端输出高通 (含 2 倍增益)
    pub fn output() -> Self {
        Self::with(HP_OUT_ZEROS_Q12, HP_OUT_POLES_Q12, 3)
    }

    fn with(zeros: [i32; 3], poles: [i32; 2], out_shift: u32) -> Self {
        Self {
            zeros,
            poles,
            out_shift,
            x: [0; 2],
            y: [0; 2],
        }
    }

    /// 原地滤波
    pub fn process(&mut self, data: &mut [i16]) {
        let round = 1i64 << (self.out_shift - 1);
        for s in data.iter_mut() {
            let x0 = *s as i64;
            let ff = self.zeros[0] as i64 * x0
                + self.zeros[1] as i64 * self.x[0] as i64
                + self.zeros[2] as i64 * self.x[1] as i64;
            let fb = self.poles[0] as i64 * self.y[0] as i64 + self.poles[1] as i64 * self.y[1] as i64;
            let y0 = sat_w32(((ff << 4) + fb) >> 12);

            self.x = [*s as i32, self.x[0]];
            self.y = [y0, self.y[0]];
            *s = sat_w16_wide((y0 as i64 + round) >> self.out_shift);
        }
    }
}
