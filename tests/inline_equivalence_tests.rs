//! Specialized fast paths agree with the generic builtins on every input

mod common;

use common::{render, warm};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use quickinline::engine::{CompilationTier, Engine};
use quickinline::guards::DeoptType;
use quickinline::profile::FunctionId;
use quickinline::runtime::object::MAX_SAFE_LENGTH;
use quickinline::{Result, Value};

/// Same call made on a compiled engine and a generic one
struct Pair {
    aot: Engine,
    generic: Engine,
    f: FunctionId,
    g: FunctionId,
}

impl Pair {
    fn new() -> Self {
        let mut aot = common::engine(true);
        let mut generic = common::engine(false);
        let f = aot.define_function("probe", "probe");
        let g = generic.define_function("probe", "probe");
        Pair { aot, generic, f, g }
    }

    fn warm<F>(&mut self, body: F)
    where
        F: FnMut(&mut Engine) -> Result<Value>,
    {
        warm(&mut self.aot, self.f, body);
        assert_eq!(self.aot.function(self.f).unwrap().tier, CompilationTier::Aot);
    }

    fn both<F>(&mut self, mut body: F) -> (String, String)
    where
        F: FnMut(&mut Engine) -> Result<Value>,
    {
        let a = self.aot.invoke(self.f, &mut body);
        let b = self.generic.invoke(self.g, &mut body);
        (render(a), render(b))
    }
}

fn numbers() -> Vec<Value> {
    vec![
        Value::from(0),
        Value::from(-0.0),
        Value::from(1.5),
        Value::from(-2.5),
        Value::from(f64::NAN),
        Value::from(f64::INFINITY),
        Value::from(-f64::INFINITY),
        Value::from(2147483648.0),
        Value::from(1e-310),
        Value::from(65601),
        Value::from("12"),
        Value::from(true),
        Value::Undefined,
        Value::Null,
    ]
}

#[test]
fn test_math_unary_functions() {
    for name in ["fround", "abs", "floor", "ceil", "trunc", "sqrt", "sign"] {
        let mut pair = Pair::new();
        pair.warm(|e| e.call_static(0, "Math", name, &[Value::from(3.25)]));
        for x in numbers() {
            let (a, b) = pair.both(|e| e.call_static(0, "Math", name, &[x.clone()]));
            assert_eq!(a, b, "Math.{}({:?})", name, x);
        }
    }
}

#[test]
fn test_from_char_code() {
    let mut pair = Pair::new();
    pair.warm(|e| e.call_static(0, "String", "fromCharCode", &[Value::from(97)]));
    for x in numbers() {
        let (a, b) = pair.both(|e| e.call_static(0, "String", "fromCharCode", &[x.clone()]));
        assert_eq!(a, b, "fromCharCode({:?})", x);
    }
}

#[test]
fn test_char_code_at() {
    let mut pair = Pair::new();
    let text = Value::from("abcdefghijklmnopq");
    pair.warm(|e| e.call_method(0, &text, "charCodeAt", &[Value::from(3)]));
    let indices = [
        Value::from(-1),
        Value::from(0),
        Value::from(16),
        Value::from(17),
        Value::from(1000),
        Value::from(-0.0),
        Value::from(2.7),
        Value::Undefined,
        Value::from("4"),
    ];
    for index in indices {
        let (a, b) = pair.both(|e| e.call_method(0, &text, "charCodeAt", &[index.clone()]));
        assert_eq!(a, b, "charCodeAt({:?})", index);
    }
}

#[test]
fn test_push_and_pop() {
    let mut pair = Pair::new();
    pair.warm(|e| {
        let arr = e.realm().new_array(vec![]);
        e.call_method(0, &arr, "push", &[Value::from(1)])?;
        e.call_method(1, &arr, "pop", &[])
    });
    let argument_lists: Vec<Vec<Value>> = vec![
        vec![],
        vec![Value::from(1)],
        vec![Value::from("a"), Value::Null, Value::from(2.5)],
        vec![Value::Undefined; 5],
    ];
    for args in argument_lists {
        let (a, b) = pair.both(|e| {
            let arr = e.realm().new_array(vec![Value::from(9)]);
            let len = e.call_method(0, &arr, "push", &args)?;
            let last = e.call_method(1, &arr, "pop", &[])?;
            Ok(Value::from(format!("{} {} {}", len.display(), last.display(), arr.display())))
        });
        assert_eq!(a, b, "push({:?})", args);
    }
}

#[test]
fn test_push_on_unusual_receivers() {
    let mut pair = Pair::new();
    pair.warm(|e| {
        let arr = e.realm().new_array(vec![]);
        e.call_method(0, &arr, "push", &[Value::from(1)])
    });
    for case in 0..4 {
        let (a, b) = pair.both(|e| {
            let arr = e.realm().new_array(vec![Value::from(1)]);
            let receiver = match case {
                0 => {
                    e.realm_mut().seal(&arr);
                    arr.clone()
                }
                1 => e.realm().new_proxy(&arr, None)?,
                2 => {
                    e.realm_mut().prevent_extensions(&arr);
                    arr.clone()
                }
                _ => {
                    let obj = e.realm().new_object();
                    e.realm_mut().set(&obj, "length", Value::from(2))?;
                    obj
                }
            };
            let push = e.realm_mut().get(&arr, "push")?;
            e.call(0, &push, &receiver, &[Value::from(5)])
        });
        assert_eq!(a, b, "receiver case {}", case);
    }
}

#[test]
fn test_push_overflow_stays_on_generic_path() {
    let mut pair = Pair::new();
    pair.warm(|e| {
        let arr = e.realm().new_array(vec![]);
        e.call_method(0, &arr, "push", &[Value::from(1)])
    });
    let (a, b) = pair.both(|e| {
        let arr = e.realm().new_array(vec![]);
        let push = e.realm_mut().get(&arr, "push")?;
        let huge = e.realm().new_object();
        e.realm_mut().set(&huge, "length", Value::from(MAX_SAFE_LENGTH as f64))?;
        e.call(0, &push, &huge, &[Value::from(1)])
    });
    assert_eq!(a, "throw TypeError");
    assert_eq!(a, b);
    assert_eq!(pair.aot.trace().deopts(), vec![DeoptType::BuiltinInstanceHClassMismatch]);
    assert!(pair.aot.trace().contains_line("Check Type: BuiltinInstanceHClassMismatch"));
}

#[test]
fn test_push_onto_max_length_array() {
    let mut pair = Pair::new();
    pair.warm(|e| {
        let arr = e.realm().new_array(vec![]);
        e.call_method(0, &arr, "push", &[Value::from(1)])
    });
    let (a, b) = pair.both(|e| {
        let arr = e.realm().new_array(vec![Value::from(1)]);
        e.realm_mut().set(&arr, "length", Value::from(4294967295.0))?;
        let pushed = render(e.call_method(0, &arr, "push", &[Value::from(7)]));
        let tail = e.realm_mut().get(&arr, "4294967295")?;
        let len = e.realm_mut().get(&arr, "length")?;
        Ok(Value::from(format!("{} {} {}", pushed, tail.display(), len.display())))
    });
    assert_eq!(a, "string:throw RangeError 7 4294967295");
    assert_eq!(a, b);
    assert_eq!(pair.aot.trace().deopts(), vec![DeoptType::BuiltinInstanceHClassMismatch]);
}

#[test]
fn test_bigint_as_n() {
    for name in ["asUintN", "asIntN"] {
        let mut pair = Pair::new();
        pair.warm(|e| e.call_static(0, "BigInt", name, &[Value::from(8), Value::BigInt(BigInt::from(300))]));
        let widths = [0, 1, 3, 32, 63, 64, 65, 200];
        let values = [
            BigInt::from(0),
            BigInt::from(25),
            BigInt::from(-1),
            BigInt::from(i64::MIN),
            BigInt::from(u64::MAX) * BigInt::from(3),
        ];
        for bits in widths {
            for value in &values {
                let (a, b) = pair.both(|e| {
                    e.call_static(0, "BigInt", name, &[Value::from(bits), Value::BigInt(value.clone())])
                });
                assert_eq!(a, b, "BigInt.{}({}, {})", name, bits, value);
            }
        }
        let (a, b) = pair.both(|e| e.call_static(0, "BigInt", name, &[Value::from(-1), Value::BigInt(BigInt::from(1))]));
        assert_eq!(a, b);
        assert_eq!(a, "throw RangeError");
    }
}

#[test]
fn test_bigint_constructor() {
    let mut pair = Pair::new();
    pair.warm(|e| e.call_global(0, "BigInt", &[Value::from(7)]));
    for x in numbers() {
        let (a, b) = pair.both(|e| e.call_global(0, "BigInt", &[x.clone()]));
        assert_eq!(a, b, "BigInt({:?})", x);
    }
}

#[test]
fn test_dataview_accessors() {
    let types = ["Int8", "Uint8", "Int16", "Uint16", "Int32", "Uint32", "Float32", "Float64"];
    for ty in types {
        let set = format!("set{}", ty);
        let get = format!("get{}", ty);
        let mut pair = Pair::new();
        let views: Vec<Value> = [&pair.aot, &pair.generic]
            .iter()
            .map(|engine| {
                let buffer = engine.realm().new_array_buffer(8);
                engine.realm().new_data_view(&buffer, 0, None).unwrap()
            })
            .collect();
        let aot_view = views[0].clone();
        pair.warm(|e| {
            e.call_method(0, &aot_view, &set, &[Value::from(0), Value::from(1)])?;
            e.call_method(1, &aot_view, &get, &[Value::from(0)])
        });

        let indices = [Value::from(0), Value::from(4), Value::from(7), Value::from(-1), Value::from(1.5)];
        for index in &indices {
            for x in numbers() {
                let view_for = |e: &Engine| if e.config().aot_enabled { views[0].clone() } else { views[1].clone() };
                let (a, b) = pair.both(|e| {
                    let view = view_for(e);
                    e.call_method(0, &view, &set, &[index.clone(), x.clone(), Value::from(true)])?;
                    e.call_method(1, &view, &get, &[index.clone(), Value::from(true)])
                });
                assert_eq!(a, b, "{}/{} at {:?} with {:?}", set, get, index, x);
            }
        }
    }
}

#[test]
fn test_typed_array_fill() {
    let mut pair = Pair::new();
    pair.warm(|e| {
        let ta = e.realm().new_typed_array(quickinline::runtime::ElementType::Int16, 6);
        e.call_method(0, &ta, "fill", &[Value::from(3), Value::from(1)])
    });
    let cases: Vec<Vec<Value>> = vec![
        vec![Value::from(70000)],
        vec![Value::from(-1), Value::from(-2)],
        vec![Value::from(5), Value::from(2), Value::from(4)],
        vec![Value::from(5), Value::from(10), Value::from(-10)],
        vec![Value::from(1.5), Value::Undefined, Value::from(3)],
        vec![Value::from("9"), Value::from(0.5)],
    ];
    for args in cases {
        let (a, b) = pair.both(|e| {
            let ta = e.realm().new_typed_array(quickinline::runtime::ElementType::Int16, 6);
            e.call_method(0, &ta, "fill", &args)?;
            let cells = (0..6)
                .map(|i| e.realm_mut().get(&ta, &i.to_string()).map(|v| v.display()))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::from(cells.join(",")))
        });
        assert_eq!(a, b, "fill({:?})", args);
    }
}
