//! Layer merging and dotted-path access on YAML documents.

use serde_yaml::{Mapping, Value};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "BOCKOS_";

/// Variables with the prefix that are not configuration keys.
const RESERVED_ENV: &[&str] = &["BOCKOS_ROOT", "BOCKOS_RUNTIME_DIR"];

/// Merge `overlay` into `base`.
///
/// Mappings merge key by key; any other overlay value replaces the base
/// value. A null overlay leaves `base` untouched.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Read a dotted path (`engine.variant`).
#[must_use]
pub fn get_path<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(doc, |node, part| node.as_mapping()?.get(part))
}

/// Write a dotted path, creating intermediate mappings.
///
/// A non-mapping value on the way is replaced by a mapping.
pub fn set_path(doc: &mut Value, key: &str, value: Value) {
    let mut node = doc;
    let mut parts = key.split('.').peekable();

    while let Some(part) = parts.next() {
        if !node.is_mapping() {
            *node = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = node else {
            return;
        };
        let part = Value::String(part.to_string());

        if parts.peek().is_none() {
            map.insert(part, value);
            return;
        }
        node = map.entry(part).or_insert(Value::Null);
    }
}

/// Parse a command-line or environment value.
///
/// Booleans, integers and flow collections (`[a, b]`, `{k: v}`) are parsed
/// as YAML; everything else stays a string so values like `1.10` are not
/// turned into floats.
#[must_use]
pub fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    let structured = matches!(trimmed, "true" | "false")
        || trimmed.parse::<i64>().is_ok()
        || trimmed.starts_with('[')
        || trimmed.starts_with('{');

    if structured {
        if let Ok(value) = serde_yaml::from_str::<Value>(trimmed) {
            return value;
        }
    }
    Value::String(raw.to_string())
}

/// Build the environment layer from `BOCKOS_*` variables.
///
/// `BOCKOS_ENGINE__VARIANT=x` becomes `engine: {variant: x}`.
pub fn env_overrides<I>(vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut layer = Value::Null;
    for (name, raw) in vars {
        if RESERVED_ENV.contains(&name.as_str()) {
            continue;
        }
        let Some(stripped) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if stripped.is_empty() {
            continue;
        }

        let key = stripped
            .split("__")
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(".");
        tracing::debug!(%name, %key, "Applying environment override");
        set_path(&mut layer, &key, parse_value(&raw));
    }
    layer
}
