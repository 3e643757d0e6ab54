//! Array.prototype.push / pop

use super::{to_object, BuiltinId};
use crate::error::{messages, Error, Result};
use crate::runtime::object::MAX_SAFE_LENGTH;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// `Array.prototype.push(...items)`
pub fn push(realm: &mut Realm, this: &Value, args: &[Value]) -> Result<Value> {
    let target = to_object(realm, this, &BuiltinId::ArrayPush.method_name())?;
    let len = realm.length_of_array_like(&target)?;
    push_from(realm, &target, args, len, 0)
}

/// Continue a push whose first `committed` items are already stored at
/// `base_len..base_len + committed`
pub fn push_from(
    realm: &mut Realm,
    target: &Value,
    args: &[Value],
    base_len: u64,
    committed: usize,
) -> Result<Value> {
    let argc = args.len() as u64;
    if base_len + argc > MAX_SAFE_LENGTH {
        return Err(Error::type_error(messages::PUSH_LENGTH_OVERFLOW));
    }
    for (i, item) in args.iter().enumerate().skip(committed) {
        let key = (base_len + i as u64).to_string();
        realm.set(target, &key, item.clone())?;
    }
    let new_len = Value::Number((base_len + argc) as f64);
    realm.set(target, "length", new_len.clone())?;
    Ok(new_len)
}

/// `Array.prototype.pop()`
pub fn pop(realm: &mut Realm, this: &Value, _args: &[Value]) -> Result<Value> {
    let target = to_object(realm, this, &BuiltinId::ArrayPop.method_name())?;
    let len = realm.length_of_array_like(&target)?;
    if len == 0 {
        realm.set(&target, "length", Value::Number(0.0))?;
        return Ok(Value::Undefined);
    }
    let key = (len - 1).to_string();
    let element = realm.get(&target, &key)?;
    if let Some(obj) = target.as_object() {
        if !realm.delete_property(obj, &key) {
            return Err(Error::type_error(messages::cannot_delete(&key)));
        }
    }
    realm.set(&target, "length", Value::Number((len - 1) as f64))?;
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_push_no_args_returns_length() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from("a"), Value::from(2), Value::from(3), Value::from(4)]);
        assert_eq!(push(&mut realm, &arr, &[]).unwrap(), Value::from(4));
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(4));
    }

    #[test]
    fn test_push_appends() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1)]);
        assert_eq!(push(&mut realm, &arr, &[Value::from("s"), Value::from(3)]).unwrap(), Value::from(3));
        assert_eq!(realm.get(&arr, "1").unwrap(), Value::from("s"));
    }

    #[test]
    fn test_push_frozen_throws() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![]);
        realm.freeze(&arr);
        let err = push(&mut realm, &arr, &[Value::from(1)]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(0));
    }

    #[test]
    fn test_push_array_like_overflow() {
        let mut realm = Realm::new();
        let obj = realm.new_object();
        realm.set(&obj, "length", Value::Number(MAX_SAFE_LENGTH as f64)).unwrap();
        let err = push(&mut realm, &obj, &[Value::from(1)]).unwrap_err();
        assert_eq!(err.to_string(), format!("TypeError: {}", messages::PUSH_LENGTH_OVERFLOW));
    }

    #[test]
    fn test_push_past_max_array_length() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1)]);
        realm.set(&arr, "length", Value::from(4294967295.0)).unwrap();
        let err = push(&mut realm, &arr, &[Value::from(7)]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RangeError));
        assert_eq!(realm.get(&arr, "4294967295").unwrap(), Value::from(7));
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(4294967295.0));
    }

    #[test]
    fn test_push_on_arguments_object() {
        let mut realm = Realm::new();
        let args = realm.new_arguments(vec![Value::from(1)]);
        assert_eq!(push(&mut realm, &args, &[Value::from(2)]).unwrap(), Value::from(2));
        assert_eq!(realm.get(&args, "1").unwrap(), Value::from(2));
    }

    #[test]
    fn test_push_from_resumes_without_repeating() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(0), Value::from("a")]);
        // One of two items already committed at index 1.
        let result = push_from(&mut realm, &arr, &[Value::from("a"), Value::from("b")], 1, 1).unwrap();
        assert_eq!(result, Value::from(3));
        assert_eq!(realm.get(&arr, "2").unwrap(), Value::from("b"));
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(3));
    }

    #[test]
    fn test_pop() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1), Value::from(2)]);
        assert_eq!(pop(&mut realm, &arr, &[]).unwrap(), Value::from(2));
        assert_eq!(realm.get(&arr, "length").unwrap(), Value::from(1));
        let empty = realm.new_array(vec![]);
        assert_eq!(pop(&mut realm, &empty, &[]).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_pop_sealed_throws() {
        let mut realm = Realm::new();
        let arr = realm.new_array(vec![Value::from(1)]);
        realm.seal(&arr);
        let err = pop(&mut realm, &arr, &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: Cannot delete property '0' of [object Array]");
    }

    #[test]
    fn test_push_nullish_receiver() {
        let mut realm = Realm::new();
        let err = push(&mut realm, &Value::Undefined, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Array.prototype.push called on null or undefined"
        );
    }
}
