//! Demo programs driving the engine
//!
//! Each scenario defines one function, runs it past the hot threshold so the
//! call sites get compiled, and prints its observable results on the final
//! round. Output must be identical with and without AOT.

use crate::engine::Engine;
use crate::error::Result;
use crate::runtime::{ElementType, JsString, Value};
use num_bigint::BigInt;

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub run: fn(&mut Engine) -> Result<()>,
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        SCENARIOS
    }

    pub fn find(name: &str) -> Option<&'static Scenario> {
        SCENARIOS.iter().find(|s| s.name == name)
    }
}

/// Run `scenario` on `engine` and return the printed lines
pub fn run_scenario(engine: &mut Engine, scenario: &Scenario) -> Result<Vec<String>> {
    tracing::debug!(scenario = scenario.name, "run");
    (scenario.run)(engine)?;
    Ok(engine.realm_mut().take_output())
}

static SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "push-empty",
        description: "[\"a\",2,3,4].push() returns 4 and leaves the array alone",
        run: push_empty,
    },
    Scenario {
        name: "push-string",
        description: "arr.push(\"s\") returns 5 and stores the string",
        run: push_string,
    },
    Scenario {
        name: "array-pop",
        description: "pop until empty, then undefined",
        run: array_pop,
    },
    Scenario {
        name: "charcodeat-negative",
        description: "charCodeAt(-1) on a flat string is NaN",
        run: charcodeat_negative,
    },
    Scenario {
        name: "charcodeat-rope",
        description: "charCodeAt on concatenated (tree) strings",
        run: charcodeat_rope,
    },
    Scenario {
        name: "fromcharcode",
        description: "String.fromCharCode with numbers, then a coercible string",
        run: from_char_code,
    },
    Scenario {
        name: "fround-negative-zero",
        description: "Math.fround(-0) keeps the sign",
        run: fround_negative_zero,
    },
    Scenario {
        name: "bigint-asuintn",
        description: "BigInt.asUintN(3, 25n) is 1n",
        run: bigint_as_uint_n,
    },
    Scenario {
        name: "bigint-constructor",
        description: "BigInt(int) then BigInt(1.5) raising RangeError",
        run: bigint_constructor,
    },
    Scenario {
        name: "frozen-push",
        description: "push onto a frozen array raises TypeError",
        run: frozen_push,
    },
    Scenario {
        name: "readonly-length",
        description: "push onto an array with read-only length inside try/catch",
        run: readonly_length,
    },
    Scenario {
        name: "monkeypatch",
        description: "Math.fround replaced by user code after compilation",
        run: monkeypatch,
    },
    Scenario {
        name: "prototype-element",
        description: "an indexed element appears on Array.prototype",
        run: prototype_element,
    },
    Scenario {
        name: "dataview",
        description: "DataView float64 round trip, then a detached buffer",
        run: dataview,
    },
    Scenario {
        name: "fill-detach",
        description: "TypedArray fill whose value's valueOf detaches the buffer",
        run: fill_detach,
    },
];

fn rounds(engine: &Engine) -> u64 {
    engine.config().tiering.hot_threshold + 2
}

fn caught(engine: &mut Engine, result: Result<Value>) -> Result<()> {
    match result {
        Ok(value) => engine.print(value.display()),
        Err(e) if e.is_catchable() => engine.print(format!("caught {}", e)),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn push_empty(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinArrayPush");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let arr = e
                .realm()
                .new_array(vec![Value::from("a"), Value::from(2), Value::from(3), Value::from(4)]);
            let len = e.call_method(0, &arr, "push", &[])?;
            if round + 1 == n {
                e.print(len.display());
                e.print(arr.display());
            }
            Ok(len)
        })?;
    }
    Ok(())
}

fn push_string(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinArrayPush");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let arr = e
                .realm()
                .new_array(vec![Value::from(1), Value::from(2), Value::from(3), Value::from(4)]);
            let len = e.call_method(0, &arr, "push", &[Value::from("s")])?;
            if round + 1 == n {
                let last = e.realm_mut().get(&arr, "4")?;
                e.print(len.display());
                e.print(format!("{}", last.strict_equals(&Value::from("s"))));
            }
            Ok(len)
        })?;
    }
    Ok(())
}

fn array_pop(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinArrayPop");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let arr = e.realm().new_array(vec![Value::from(1), Value::from(2)]);
            let mut popped = Vec::new();
            for _ in 0..3 {
                popped.push(e.call_method(0, &arr, "pop", &[])?.display());
            }
            if round + 1 == n {
                e.print(popped.join(" "));
                let len = e.realm_mut().get(&arr, "length")?;
                e.print(len.display());
            }
            Ok(Value::Undefined)
        })?;
    }
    Ok(())
}

fn charcodeat_negative(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinStringCharCodeAt");
    let n = rounds(engine);
    let text = Value::from("abcdefghijklmnopq");
    for round in 0..n {
        engine.invoke(f, |e| {
            let first = e.call_method(0, &text, "charCodeAt", &[Value::from(0)])?;
            let before = e.call_method(1, &text, "charCodeAt", &[Value::from(-1)])?;
            let past = e.call_method(2, &text, "charCodeAt", &[Value::from(17)])?;
            if round + 1 == n {
                e.print(format!("{} {} {}", first.display(), before.display(), past.display()));
            }
            Ok(before)
        })?;
    }
    Ok(())
}

fn charcodeat_rope(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinStringCharCodeAt");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let left = JsString::new("hello, world");
            let rope = Value::String(left.concat(&JsString::new(&format!(" #{}", round))));
            let code = e.call_method(0, &rope, "charCodeAt", &[Value::from(13)])?;
            if round + 1 == n {
                e.print(code.display());
            }
            Ok(code)
        })?;
    }
    Ok(())
}

fn from_char_code(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinStringFromCharCode");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let code = if round + 1 == n {
                Value::from("66")
            } else {
                Value::from(65 + (round % 26) as i32)
            };
            let s = e.call_static(0, "String", "fromCharCode", &[code])?;
            if round + 1 == n {
                e.print(s.display());
            }
            Ok(s)
        })?;
    }
    Ok(())
}

fn fround_negative_zero(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinMathFround");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let x = if round + 1 == n { -0.0 } else { round as f64 + 0.1 };
            let r = e.call_static(0, "Math", "fround", &[Value::from(x)])?;
            if round + 1 == n {
                let sign = match r {
                    Value::Number(v) if v == 0.0 && v.is_sign_negative() => "-0",
                    _ => "not -0",
                };
                e.print(sign);
            }
            Ok(r)
        })?;
    }
    Ok(())
}

fn bigint_as_uint_n(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinBigIntAsUintN");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let r = e.call_static(
                0,
                "BigInt",
                "asUintN",
                &[Value::from(3), Value::BigInt(BigInt::from(25))],
            )?;
            let wide = e.call_static(
                1,
                "BigInt",
                "asIntN",
                &[Value::from(64), Value::BigInt(BigInt::from(-5) - (BigInt::from(1) << 64))],
            )?;
            if round + 1 == n {
                e.print(format!("{}n {}n", r.display(), wide.display()));
            }
            Ok(r)
        })?;
    }
    Ok(())
}

fn bigint_constructor(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinBigIntConstructor");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let input = if round + 1 == n {
                Value::from(1.5)
            } else {
                Value::from(round as i32)
            };
            let result = e.call_global(0, "BigInt", &[input]);
            if round + 1 == n {
                caught(e, result)?;
            }
            Ok(Value::Undefined)
        })?;
    }
    Ok(())
}

fn frozen_push(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinArrayPush");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let arr = e.realm().new_array(vec![Value::from(0)]);
            if round + 1 == n {
                e.realm_mut().freeze(&arr);
            }
            let result = e.call_method(0, &arr, "push", &[Value::from(1)]);
            if round + 1 == n {
                caught(e, result)?;
                e.print(arr.display());
            } else {
                result?;
            }
            Ok(Value::Undefined)
        })?;
    }
    Ok(())
}

fn readonly_length(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinArrayPush");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let arr = e.realm().new_array(vec![]);
            if round + 1 == n {
                e.realm_mut().define_readonly_length(&arr)?;
            }
            let result = e.call_method(0, &arr, "push", &[Value::from(1), Value::from(2)]);
            if round + 1 == n {
                caught(e, result)?;
                let len = e.realm_mut().get(&arr, "length")?;
                e.print(len.display());
            } else {
                result?;
            }
            Ok(Value::Undefined)
        })?;
    }
    Ok(())
}

fn monkeypatch(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinMathFround");
    let n = rounds(engine);
    for round in 0..n {
        if round + 1 == n {
            let patched = engine
                .realm()
                .new_function("fround", |_, _, args| Ok(Value::from(42 + args.len() as i32)));
            let math = engine.realm_mut().global("Math")?;
            engine.realm_mut().set(&math, "fround", patched)?;
        }
        engine.invoke(f, |e| {
            let r = e.call_static(0, "Math", "fround", &[Value::from(5.5)])?;
            if round + 1 == n {
                e.print(r.display());
            }
            Ok(r)
        })?;
    }
    Ok(())
}

fn prototype_element(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinArrayPush");
    let n = rounds(engine);
    for round in 0..n {
        if round + 1 == n {
            let proto = Value::Object(engine.realm().intrinsics().array_prototype.clone());
            engine.realm_mut().set(&proto, "0", Value::from("from proto"))?;
        }
        engine.invoke(f, |e| {
            let arr = e.realm().new_array(vec![]);
            let len = e.call_method(0, &arr, "push", &[Value::from(7)])?;
            if round + 1 == n {
                e.print(format!("{} {}", len.display(), arr.display()));
            }
            Ok(len)
        })?;
    }
    Ok(())
}

fn dataview(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinDataViewGetFloat64");
    let n = rounds(engine);
    let buffer = engine.realm().new_array_buffer(16);
    let view = engine.realm().new_data_view(&buffer, 0, None)?;
    for round in 0..n {
        if round + 1 == n {
            engine.realm_mut().detach_buffer(&buffer)?;
        }
        engine.invoke(f, |e| {
            let x = Value::from(round as f64 + 0.25);
            let stored = e.call_method(0, &view, "setFloat64", &[Value::from(8), x]);
            let loaded = e.call_method(1, &view, "getFloat64", &[Value::from(8)]);
            if round + 1 == n {
                caught(e, stored)?;
                caught(e, loaded)?;
            } else {
                stored?;
                loaded?;
            }
            Ok(Value::Undefined)
        })?;
    }
    Ok(())
}

fn fill_detach(engine: &mut Engine) -> Result<()> {
    let f = engine.define_function("func_main_0", "builtinTypedArrayFill");
    let n = rounds(engine);
    for round in 0..n {
        engine.invoke(f, |e| {
            let ta = e.realm().new_typed_array(ElementType::Uint8, 4);
            let target = ta.clone();
            let detach = round + 1 == n;
            let value_of = e.realm().new_function("valueOf", move |realm, _, _| {
                if detach {
                    realm.detach_buffer(&target)?;
                }
                Ok(Value::from(7))
            });
            let value = e.realm().new_object();
            e.realm_mut().set(&value, "valueOf", value_of)?;
            let result = e.call_method(0, &ta, "fill", &[value, Value::from(1)]);
            if detach {
                caught(e, result)?;
            } else {
                result?;
            }
            if round + 2 == n {
                let cells: Vec<String> = (0..4)
                    .map(|i| e.realm_mut().get(&ta, &i.to_string()).map(|v| v.display()))
                    .collect::<Result<_>>()?;
                e.print(cells.join(","));
            }
            Ok(Value::Undefined)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Scenario::all().iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Scenario::all().len());
        assert!(Scenario::find("push-empty").is_some());
        assert!(Scenario::find("nope").is_none());
    }
}
