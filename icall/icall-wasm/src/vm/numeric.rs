//! Stack-only numeric instructions (0x45..=0xC4 and the saturating
//! truncations under the 0xFC prefix).

use crate::error::Trap;
use crate::model::Value;
use crate::vm::stack::ValueStack;

fn bool_val(b: bool) -> Value {
    Value::I32(b as i32)
}

macro_rules! int_ops {
    ($cmp:ident, $bin:ident, $t:ty, $u:ty, $cmp_base:literal, $bin_base:literal) => {
        /// eq ne lt_s lt_u gt_s gt_u le_s le_u ge_s ge_u
        fn $cmp(op: u8, a: $t, b: $t) -> bool {
            let (ua, ub) = (a as $u, b as $u);
            match op - $cmp_base {
                0 => a == b,
                1 => a != b,
                2 => a < b,
                3 => ua < ub,
                4 => a > b,
                5 => ua > ub,
                6 => a <= b,
                7 => ua <= ub,
                8 => a >= b,
                _ => ua >= ub,
            }
        }

        /// add sub mul div_s div_u rem_s rem_u and or xor shl shr_s shr_u rotl rotr
        fn $bin(op: u8, a: $t, b: $t) -> Result<$t, Trap> {
            let (ua, ub) = (a as $u, b as $u);
            let nonzero = || if b == 0 { Err(Trap::IntegerDivideByZero) } else { Ok(()) };
            Ok(match op - $bin_base {
                0 => a.wrapping_add(b),
                1 => a.wrapping_sub(b),
                2 => a.wrapping_mul(b),
                3 => {
                    nonzero()?;
                    if a == <$t>::MIN && b == -1 {
                        return Err(Trap::IntegerOverflow);
                    }
                    a / b
                }
                4 => {
                    nonzero()?;
                    (ua / ub) as $t
                }
                5 => {
                    nonzero()?;
                    a.wrapping_rem(b)
                }
                6 => {
                    nonzero()?;
                    (ua % ub) as $t
                }
                7 => a & b,
                8 => a | b,
                9 => a ^ b,
                10 => a.wrapping_shl(b as u32),
                11 => a.wrapping_shr(b as u32),
                12 => ua.wrapping_shr(b as u32) as $t,
                13 => a.rotate_left(b as u32),
                _ => a.rotate_right(b as u32),
            })
        }
    };
}

int_ops!(i32_cmp, i32_bin, i32, u32, 0x46, 0x6A);
int_ops!(i64_cmp, i64_bin, i64, u64, 0x51, 0x7C);

macro_rules! float_ops {
    ($cmp:ident, $un:ident, $bin:ident, $nearest:ident, $t:ty, $sign:expr, $cmp_base:literal, $un_base:literal, $bin_base:literal) => {
        /// eq ne lt gt le ge
        fn $cmp(op: u8, a: $t, b: $t) -> bool {
            match op - $cmp_base {
                0 => a == b,
                1 => a != b,
                2 => a < b,
                3 => a > b,
                4 => a <= b,
                _ => a >= b,
            }
        }

        /// Round half to even, keeping the sign of zero.
        fn $nearest(x: $t) -> $t {
            if (x - x.trunc()).abs() == 0.5 {
                2.0 * (x / 2.0).round()
            } else {
                x.round()
            }
        }

        /// abs neg ceil floor trunc nearest sqrt
        fn $un(op: u8, x: $t) -> $t {
            match op - $un_base {
                0 => <$t>::from_bits(x.to_bits() & !$sign),
                1 => <$t>::from_bits(x.to_bits() ^ $sign),
                2 => x.ceil(),
                3 => x.floor(),
                4 => x.trunc(),
                5 => $nearest(x),
                _ => x.sqrt(),
            }
        }

        /// add sub mul div min max copysign
        fn $bin(op: u8, a: $t, b: $t) -> $t {
            match op - $bin_base {
                0 => a + b,
                1 => a - b,
                2 => a * b,
                3 => a / b,
                4 | 5 if a.is_nan() || b.is_nan() => <$t>::NAN,
                // Equal operands cover +0/-0, where min prefers -0 and max +0.
                4 if a == b => <$t>::from_bits(a.to_bits() | b.to_bits()),
                5 if a == b => <$t>::from_bits(a.to_bits() & b.to_bits()),
                4 => a.min(b),
                5 => a.max(b),
                _ => a.copysign(b),
            }
        }
    };
}

float_ops!(f32_cmp, f32_un, f32_bin, f32_nearest, f32, 0x8000_0000u32, 0x5B, 0x8B, 0x92);
float_ops!(f64_cmp, f64_un, f64_bin, f64_nearest, f64, 0x8000_0000_0000_0000u64, 0x61, 0x99, 0xA0);

/// Truncate toward zero, trapping on NaN or when the result falls outside
/// `[lo, hi)`.
fn trunc_checked(x: f64, lo: f64, hi: f64) -> Result<f64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = x.trunc();
    if t >= lo && t < hi {
        Ok(t)
    } else {
        Err(Trap::IntegerOverflow)
    }
}

const I32_RANGE: (f64, f64) = (-2_147_483_648.0, 2_147_483_648.0);
const U32_RANGE: (f64, f64) = (0.0, 4_294_967_296.0);
const I64_RANGE: (f64, f64) = (-9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0);
const U64_RANGE: (f64, f64) = (0.0, 18_446_744_073_709_551_616.0);

/// Pop an f32 or f64 operand widened to f64; `wide` selects f64.
fn pop_float(s: &mut ValueStack, wide: bool) -> Result<f64, Trap> {
    if wide {
        s.pop_f64()
    } else {
        s.pop_f32().map(f64::from)
    }
}

pub(crate) fn execute(s: &mut ValueStack, op: u8) -> Result<(), Trap> {
    let v = match op {
        0x45 /* i32.eqz */ => bool_val(s.pop_i32()? == 0),
        0x46..=0x4F => {
            let b = s.pop_i32()?;
            bool_val(i32_cmp(op, s.pop_i32()?, b))
        }
        0x50 /* i64.eqz */ => bool_val(s.pop_i64()? == 0),
        0x51..=0x5A => {
            let b = s.pop_i64()?;
            bool_val(i64_cmp(op, s.pop_i64()?, b))
        }
        0x5B..=0x60 => {
            let b = s.pop_f32()?;
            bool_val(f32_cmp(op, s.pop_f32()?, b))
        }
        0x61..=0x66 => {
            let b = s.pop_f64()?;
            bool_val(f64_cmp(op, s.pop_f64()?, b))
        }
        0x67 /* i32.clz */ => Value::I32(s.pop_i32()?.leading_zeros() as i32),
        0x68 /* i32.ctz */ => Value::I32(s.pop_i32()?.trailing_zeros() as i32),
        0x69 /* i32.popcnt */ => Value::I32(s.pop_i32()?.count_ones() as i32),
        0x6A..=0x78 => {
            let b = s.pop_i32()?;
            Value::I32(i32_bin(op, s.pop_i32()?, b)?)
        }
        0x79 /* i64.clz */ => Value::I64(s.pop_i64()?.leading_zeros() as i64),
        0x7A /* i64.ctz */ => Value::I64(s.pop_i64()?.trailing_zeros() as i64),
        0x7B /* i64.popcnt */ => Value::I64(s.pop_i64()?.count_ones() as i64),
        0x7C..=0x8A => {
            let b = s.pop_i64()?;
            Value::I64(i64_bin(op, s.pop_i64()?, b)?)
        }
        0x8B..=0x91 => Value::F32(f32_un(op, s.pop_f32()?).to_bits()),
        0x92..=0x98 => {
            let b = s.pop_f32()?;
            Value::F32(f32_bin(op, s.pop_f32()?, b).to_bits())
        }
        0x99..=0x9F => Value::F64(f64_un(op, s.pop_f64()?).to_bits()),
        0xA0..=0xA6 => {
            let b = s.pop_f64()?;
            Value::F64(f64_bin(op, s.pop_f64()?, b).to_bits())
        }
        0xA7 /* i32.wrap_i64 */ => Value::I32(s.pop_i64()? as i32),
        0xA8 | 0xAA /* i32.trunc_f{32,64}_s */ => {
            let x = pop_float(s, op == 0xAA)?;
            Value::I32(trunc_checked(x, I32_RANGE.0, I32_RANGE.1)? as i32)
        }
        0xA9 | 0xAB /* i32.trunc_f{32,64}_u */ => {
            let x = pop_float(s, op == 0xAB)?;
            Value::I32(trunc_checked(x, U32_RANGE.0, U32_RANGE.1)? as u32 as i32)
        }
        0xAC /* i64.extend_i32_s */ => Value::I64(s.pop_i32()? as i64),
        0xAD /* i64.extend_i32_u */ => Value::I64(s.pop_i32()? as u32 as i64),
        0xAE | 0xB0 /* i64.trunc_f{32,64}_s */ => {
            let x = pop_float(s, op == 0xB0)?;
            Value::I64(trunc_checked(x, I64_RANGE.0, I64_RANGE.1)? as i64)
        }
        0xAF | 0xB1 /* i64.trunc_f{32,64}_u */ => {
            let x = pop_float(s, op == 0xB1)?;
            Value::I64(trunc_checked(x, U64_RANGE.0, U64_RANGE.1)? as u64 as i64)
        }
        0xB2 /* f32.convert_i32_s */ => Value::F32((s.pop_i32()? as f32).to_bits()),
        0xB3 /* f32.convert_i32_u */ => Value::F32((s.pop_i32()? as u32 as f32).to_bits()),
        0xB4 /* f32.convert_i64_s */ => Value::F32((s.pop_i64()? as f32).to_bits()),
        0xB5 /* f32.convert_i64_u */ => Value::F32((s.pop_i64()? as u64 as f32).to_bits()),
        0xB6 /* f32.demote_f64 */ => Value::F32((s.pop_f64()? as f32).to_bits()),
        0xB7 /* f64.convert_i32_s */ => Value::F64((s.pop_i32()? as f64).to_bits()),
        0xB8 /* f64.convert_i32_u */ => Value::F64((s.pop_i32()? as u32 as f64).to_bits()),
        0xB9 /* f64.convert_i64_s */ => Value::F64((s.pop_i64()? as f64).to_bits()),
        0xBA /* f64.convert_i64_u */ => Value::F64((s.pop_i64()? as u64 as f64).to_bits()),
        0xBB /* f64.promote_f32 */ => Value::F64(f64::from(s.pop_f32()?).to_bits()),
        0xBC /* i32.reinterpret_f32 */ => Value::I32(s.pop_f32()?.to_bits() as i32),
        0xBD /* i64.reinterpret_f64 */ => Value::I64(s.pop_f64()?.to_bits() as i64),
        0xBE /* f32.reinterpret_i32 */ => Value::F32(s.pop_i32()? as u32),
        0xBF /* f64.reinterpret_i64 */ => Value::F64(s.pop_i64()? as u64),
        0xC0 /* i32.extend8_s */ => Value::I32(s.pop_i32()? as i8 as i32),
        0xC1 /* i32.extend16_s */ => Value::I32(s.pop_i32()? as i16 as i32),
        0xC2 /* i64.extend8_s */ => Value::I64(s.pop_i64()? as i8 as i64),
        0xC3 /* i64.extend16_s */ => Value::I64(s.pop_i64()? as i16 as i64),
        0xC4 /* i64.extend32_s */ => Value::I64(s.pop_i64()? as i32 as i64),
        _ => return Err(Trap::Unreachable),
    };
    s.push(v)
}

/// `0xFC` sub-opcodes 0..=7. Float-to-int `as` casts already saturate and map NaN to 0.
pub(crate) fn trunc_sat(s: &mut ValueStack, sub: u8) -> Result<(), Trap> {
    let x = pop_float(s, matches!(sub, 2 | 3 | 6 | 7))?;
    let v = match sub {
        0 | 2 => Value::I32(x as i32),
        1 | 3 => Value::I32(x as u32 as i32),
        4 | 6 => Value::I64(x as i64),
        _ => Value::I64(x as u64 as i64),
    };
    s.push(v)
}
