//! `!param` substitution.
//!
//! A scalar tagged `!param name` is replaced by the caller-supplied value for
//! `name`; `!param name=default` falls back to `default` (parsed as YAML) when
//! no value was supplied. Substitution runs on the raw YAML tree before typed
//! deserialization, so a parameter can stand in for any scalar or structure.

use crate::ConfigError;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

const PARAM_TAG: &str = "param";

/// Caller-supplied parameter values, keyed by name.
pub type ParamSet = BTreeMap<String, Value>;

/// Parse a `key=value` command-line argument. The value is parsed as YAML so
/// `count=4` yields an integer and `flag=true` a boolean.
pub fn parse_param_arg(arg: &str) -> Result<(String, Value), ConfigError> {
    let Some((key, raw)) = arg.split_once('=') else {
        return Err(ConfigError::InvalidParamArg(arg.to_owned()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidParamArg(arg.to_owned()));
    }
    let value = parse_scalar(raw)?;
    Ok((key.to_owned(), value))
}

pub fn resolve_params(value: Value, params: &ParamSet) -> Result<Value, ConfigError> {
    match value {
        Value::Tagged(tagged) => resolve_tagged(*tagged, params),
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|v| resolve_params(v, params))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, resolve_params(v, params)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other),
    }
}

fn resolve_tagged(tagged: TaggedValue, params: &ParamSet) -> Result<Value, ConfigError> {
    if tagged.tag != PARAM_TAG {
        let value = resolve_params(tagged.value, params)?;
        return Ok(Value::Tagged(Box::new(TaggedValue {
            tag: tagged.tag,
            value,
        })));
    }

    let Value::String(spec) = tagged.value else {
        return Err(ConfigError::InvalidParamName(format!("{:?}", tagged.value)));
    };

    let (name, default) = match spec.split_once('=') {
        Some((name, default)) => (name.trim(), Some(parse_scalar(default.trim())?)),
        None => (spec.trim(), None),
    };

    let value = params.get(name).cloned().or(default);
    match value {
        Some(Value::Null) | None => Err(ConfigError::MissingParam(name.to_owned())),
        Some(v) => Ok(v),
    }
}

fn parse_scalar(raw: &str) -> Result<Value, ConfigError> {
    if raw.is_empty() {
        return Ok(Value::String(String::new()));
    }
    Ok(serde_yaml::from_str(raw)?)
}
