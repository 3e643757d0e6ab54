//! BigInt constructor, BigInt.asUintN and BigInt.asIntN

use super::arg;
use crate::error::{messages, Error, Result};
use crate::runtime::coerce::{self, PreferredType};
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;
use num_bigint::{BigInt, Sign};
use num_traits::{One, ToPrimitive, Zero};

/// Widest BigInt the runtime will materialize
pub const MAX_BIGINT_BITS: u64 = 1 << 30;

/// `BigInt.asUintN(bits, bigint)`
pub fn as_uint_n(realm: &mut Realm, args: &[Value]) -> Result<Value> {
    let bits = coerce::to_index(realm, &arg(args, 0))?;
    let value = coerce::to_bigint(realm, &arg(args, 1))?;
    Ok(Value::BigInt(wrap_unsigned(bits, &value)?))
}

/// `BigInt.asIntN(bits, bigint)`
pub fn as_int_n(realm: &mut Realm, args: &[Value]) -> Result<Value> {
    let bits = coerce::to_index(realm, &arg(args, 0))?;
    let value = coerce::to_bigint(realm, &arg(args, 1))?;
    Ok(Value::BigInt(wrap_signed(bits, &value)))
}

/// `BigInt(value)` called as a function
pub fn call_constructor(realm: &mut Realm, args: &[Value]) -> Result<Value> {
    let prim = coerce::to_primitive(realm, &arg(args, 0), PreferredType::Number)?;
    match prim {
        Value::Number(n) => Ok(Value::BigInt(coerce::number_to_bigint(n)?)),
        other => Ok(Value::BigInt(coerce::to_bigint(realm, &other)?)),
    }
}

fn mod_pow2(value: &BigInt, bits: u64) -> BigInt {
    let modulus = BigInt::one() << bits;
    let r = value % &modulus;
    if r.sign() == Sign::Minus {
        r + modulus
    } else {
        r
    }
}

/// `value mod 2^bits`
pub fn wrap_unsigned(bits: u64, value: &BigInt) -> Result<BigInt> {
    if bits == 0 {
        return Ok(BigInt::zero());
    }
    if value.sign() != Sign::Minus && value.bits() <= bits {
        return Ok(value.clone());
    }
    if bits > MAX_BIGINT_BITS {
        return Err(Error::range_error(messages::BIGINT_TOO_BIG));
    }
    Ok(mod_pow2(value, bits))
}

/// `value` wrapped into the signed range of `bits` bits
pub fn wrap_signed(bits: u64, value: &BigInt) -> BigInt {
    if bits == 0 {
        return BigInt::zero();
    }
    if value.bits() < bits {
        return value.clone();
    }
    let r = mod_pow2(value, bits);
    if r.bit(bits - 1) {
        r - (BigInt::one() << bits)
    } else {
        r
    }
}

/// Low 128 bits of the two's complement representation of `value`
fn low_u128(value: &BigInt) -> u128 {
    match value.to_i128() {
        Some(v) => v as u128,
        None => mod_pow2(value, 128).to_u128().unwrap_or(0),
    }
}

/// Fixed-width wrap for `bits <= 64`, computed without bigint arithmetic
pub fn wrap_small(bits: u32, value: &BigInt, signed: bool) -> BigInt {
    if bits == 0 {
        return BigInt::zero();
    }
    let mask = u128::MAX >> (128 - bits);
    let low = low_u128(value) & mask;
    if signed && (low >> (bits - 1)) & 1 == 1 {
        BigInt::from(low as i128 - (1i128 << bits))
    } else {
        BigInt::from(low)
    }
}
