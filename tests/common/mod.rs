//! Shared test helpers for integration tests

use quickinline::engine::Engine;
use quickinline::profile::FunctionId;
use quickinline::scenarios::{run_scenario, Scenario};
use quickinline::{EngineConfig, Result, Value};

pub const HOT: u64 = 10;

/// Engine with recording trace and a small hot threshold
pub fn engine(aot: bool) -> Engine {
    Engine::new(config().with_aot(aot))
}

pub fn config() -> EngineConfig {
    EngineConfig::new().with_trace(true).with_hot_threshold(HOT)
}

/// Run a bundled scenario and return its printed lines
#[allow(dead_code)]
pub fn scenario_output(name: &str, aot: bool) -> Vec<String> {
    let scenario = Scenario::find(name).unwrap_or_else(|| panic!("no scenario {}", name));
    let mut engine = engine(aot);
    run_scenario(&mut engine, scenario).unwrap()
}

/// Invoke `f` enough times to compile it, calling `body` each round
#[allow(dead_code)]
pub fn warm<F>(engine: &mut Engine, f: FunctionId, mut body: F)
where
    F: FnMut(&mut Engine) -> Result<Value>,
{
    for _ in 0..HOT {
        engine.invoke(f, &mut body).unwrap();
    }
}

/// Result rendered the way a test compares it: value display or error kind
#[allow(dead_code)]
pub fn render(result: Result<Value>) -> String {
    match result {
        Ok(Value::Number(n)) if n == 0.0 && n.is_sign_negative() => "-0".to_string(),
        Ok(v) => format!("{}:{}", v.type_of(), v.display()),
        Err(e) => match e.kind() {
            Some(kind) => format!("throw {}", kind),
            None => format!("internal {}", e),
        },
    }
}
