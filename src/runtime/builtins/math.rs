//! Unary Math functions

use super::{arg, BuiltinId};
use crate::error::Result;
use crate::runtime::coerce;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    FRound,
    Abs,
    Floor,
    Ceil,
    Trunc,
    Sqrt,
    Sign,
}

impl MathOp {
    pub fn from_builtin(id: BuiltinId) -> Option<Self> {
        match id {
            BuiltinId::MathFRound => Some(MathOp::FRound),
            BuiltinId::MathAbs => Some(MathOp::Abs),
            BuiltinId::MathFloor => Some(MathOp::Floor),
            BuiltinId::MathCeil => Some(MathOp::Ceil),
            BuiltinId::MathTrunc => Some(MathOp::Trunc),
            BuiltinId::MathSqrt => Some(MathOp::Sqrt),
            BuiltinId::MathSign => Some(MathOp::Sign),
            _ => None,
        }
    }

    /// Apply to an already converted number
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            MathOp::FRound => x as f32 as f64,
            MathOp::Abs => x.abs(),
            MathOp::Floor => x.floor(),
            MathOp::Ceil => x.ceil(),
            MathOp::Trunc => x.trunc(),
            MathOp::Sqrt => x.sqrt(),
            MathOp::Sign => {
                if x.is_nan() || x == 0.0 {
                    x
                } else if x > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Generic call: ToNumber(first argument), then apply
pub fn call(realm: &mut Realm, op: MathOp, args: &[Value]) -> Result<Value> {
    let x = coerce::to_number(realm, &arg(args, 0))?;
    Ok(Value::Number(op.apply(x)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fround_preserves_negative_zero() {
        let r = MathOp::FRound.apply(-0.0);
        assert_eq!(r, 0.0);
        assert!(r.is_sign_negative());
        assert_eq!(MathOp::FRound.apply(5.5), 5.5);
        assert_eq!(MathOp::FRound.apply(5.05), 5.050000190734863);
    }

    #[test]
    fn test_sign() {
        assert!(MathOp::Sign.apply(-0.0).is_sign_negative());
        assert_eq!(MathOp::Sign.apply(-3.0), -1.0);
        assert!(MathOp::Sign.apply(f64::NAN).is_nan());
    }

    #[test]
    fn test_call_without_argument_is_nan() {
        let mut realm = Realm::new();
        let r = call(&mut realm, MathOp::Floor, &[]).unwrap();
        assert!(r.as_number().unwrap().is_nan());
        let r = call(&mut realm, MathOp::Abs, &[Value::from("-4")]).unwrap();
        assert_eq!(r, Value::from(4));
    }

    #[test]
    fn test_bigint_argument_throws() {
        let mut realm = Realm::new();
        let err = call(&mut realm, MathOp::Sqrt, &[Value::BigInt(4.into())]).unwrap_err();
        assert!(err.to_string().contains("BigInt"));
    }
}
