//! Random record generation
//!
//! Produces values that satisfy a JSON Schema node: types, formats, enums,
//! numeric bounds, string lengths and patterns, array sizes and uniqueness,
//! and required object properties. Used to seed stores with fixtures.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use regex_syntax::hir::{Class, Hir, HirKind};
use serde_json::{json, Value};

use amp_connector::datautils::format_rfc3339;
use amp_connector::error::{ConnectorError, ConnectorResult};
use amp_connector::operation::Record;

use crate::config::{MemStoreConfig, DEFAULT_GENERATOR_DEPTH, DEFAULT_UNIQUE_RETRIES};
use crate::schema::ObjectSchema;

/// Nesting level at which generation fails; reached only when required
/// properties recurse.
const RECURSION_LIMIT: usize = 32;

const MAX_REF_HOPS: usize = 16;

/// Extra repetitions allowed for `*`, `+` and `{n,}`.
const OPEN_REPEAT: u32 = 4;

/// Cap on repetitions for very wide `{n,m}` quantifiers.
const MAX_REPEAT_SPREAD: u32 = 64;

/// Spread used when a numeric bound is missing.
const DEFAULT_SPAN: f64 = 1000.0;

const OPTIONAL_PROBABILITY: f64 = 0.75;

/// Characters preferred when a regex class allows them.
const PRINTABLE: (char, char) = (' ', '~');

/// Schema for dependents with no property definition.
static ANY_VALUE: Value = Value::Bool(true);

/// 2000-01-01 to 2030-01-01.
const TIMESTAMP_RANGE: std::ops::Range<i64> = 946_684_800..1_893_456_000;

/// Where a node lives, for `$ref` resolution and error messages.
struct Scope<'a> {
    root: &'a Value,
    object: &'a str,
}

impl<'a> Scope<'a> {
    fn invalid(&self, message: impl Into<String>) -> ConnectorError {
        ConnectorError::InvalidSchema {
            object: self.object.to_string(),
            message: message.into(),
        }
    }

    /// Follow local `$ref` pointers.
    fn resolve<'n>(&self, node: &'n Value) -> ConnectorResult<&'n Value>
    where
        'a: 'n,
    {
        let mut node = node;
        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = node.get("$ref").and_then(Value::as_str) else {
                return Ok(node);
            };
            let pointer = reference
                .strip_prefix('#')
                .ok_or_else(|| self.invalid(format!("only local references are supported: {reference}")))?;
            node = self
                .root
                .pointer(pointer)
                .ok_or_else(|| self.invalid(format!("unresolved reference {reference}")))?;
        }
        Err(self.invalid("reference chain too long"))
    }
}

/// Numeric bounds of a schema node.
#[derive(Debug, Clone, Copy, Default)]
struct Bounds {
    min: Option<f64>,
    max: Option<f64>,
    exclusive_min: bool,
    exclusive_max: bool,
}

impl Bounds {
    /// Accepts both the boolean (draft 4) and numeric forms of the exclusive
    /// keywords.
    fn of(node: &Value) -> Self {
        let mut bounds = Bounds {
            min: node.get("minimum").and_then(Value::as_f64),
            max: node.get("maximum").and_then(Value::as_f64),
            ..Default::default()
        };
        match node.get("exclusiveMinimum") {
            Some(Value::Bool(flag)) => bounds.exclusive_min = *flag,
            Some(value) => {
                if let Some(x) = value.as_f64().filter(|x| bounds.min.map_or(true, |m| *x >= m)) {
                    bounds.min = Some(x);
                    bounds.exclusive_min = true;
                }
            }
            None => {}
        }
        match node.get("exclusiveMaximum") {
            Some(Value::Bool(flag)) => bounds.exclusive_max = *flag,
            Some(value) => {
                if let Some(x) = value.as_f64().filter(|x| bounds.max.map_or(true, |m| *x <= m)) {
                    bounds.max = Some(x);
                    bounds.exclusive_max = true;
                }
            }
            None => {}
        }
        bounds
    }

    /// Closed range, filling a missing side `DEFAULT_SPAN` away from the other.
    fn span(&self) -> (f64, f64) {
        match (self.min, self.max) {
            (Some(low), Some(high)) => (low, high),
            (Some(low), None) => (low, low + DEFAULT_SPAN),
            (None, Some(high)) => (high - DEFAULT_SPAN, high),
            (None, None) => (0.0, DEFAULT_SPAN),
        }
    }

    /// Inclusive integer range.
    fn integer_span(&self) -> (f64, f64) {
        let (low, high) = self.span();
        let low = if self.exclusive_min { low.floor() + 1.0 } else { low.ceil() };
        let high = if self.exclusive_max { high.ceil() - 1.0 } else { high.floor() };
        (low, high)
    }
}

/// Smallest multiple of `step` that is a whole number.
fn integral_step(step: f64) -> Option<f64> {
    (1..=1000)
        .map(|n| f64::from(n) * step)
        .find(|v| (v - v.round()).abs() < 1e-9)
        .map(f64::round)
}

/// Number of distinct values a node admits, when small and known.
fn domain_size(node: &Value) -> Option<usize> {
    if node.get("const").is_some() {
        return Some(1);
    }
    if let Some(values) = node.get("enum").and_then(Value::as_array) {
        let mut distinct: Vec<&Value> = Vec::with_capacity(values.len());
        for value in values {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        return Some(distinct.len());
    }
    match node.get("type").and_then(Value::as_str) {
        Some("boolean") => Some(2),
        Some("null") => Some(1),
        Some("integer") => {
            let bounds = Bounds::of(node);
            if bounds.min.is_none() || bounds.max.is_none() {
                return None;
            }
            let step = node.get("multipleOf").and_then(Value::as_f64).unwrap_or(1.0);
            let step = integral_step(step)?;
            let (low, high) = bounds.integer_span();
            let count = ((high / step).floor() - (low / step).ceil() + 1.0).max(0.0);
            Some(count as usize)
        }
        _ => None,
    }
}

fn usize_keyword(node: &Value, keyword: &str) -> Option<usize> {
    node.get(keyword)
        .and_then(Value::as_u64)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

/// `minLength`/`maxLength` of a string node, counted in characters.
#[derive(Debug, Clone, Copy)]
struct Lengths {
    min: usize,
    max: Option<usize>,
}

impl Lengths {
    fn of(node: &Value) -> Self {
        Self {
            min: usize_keyword(node, "minLength").unwrap_or(0),
            max: usize_keyword(node, "maxLength"),
        }
    }

    fn fits(&self, value: &str) -> bool {
        let len = value.chars().count();
        len >= self.min && self.max.map_or(true, |max| len <= max)
    }

    /// Range for the variable part of a value whose fixed part is `fixed`
    /// characters long. The part is at least `floor` long and defaults to at
    /// most `preferred` when no maximum applies.
    fn variable(&self, fixed: usize, floor: usize, preferred: usize) -> Option<(usize, usize)> {
        let low = floor.max(self.min.saturating_sub(fixed));
        let high = match self.max {
            Some(max) => max.checked_sub(fixed)?,
            None => preferred.max(low),
        };
        (low <= high).then_some((low, high))
    }
}

/// Produces schema-conforming random values.
pub struct RecordGenerator {
    rng: StdRng,
    max_depth: usize,
    unique_retries: u32,
}

impl Default for RecordGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordGenerator")
            .field("max_depth", &self.max_depth)
            .field("unique_retries", &self.unique_retries)
            .finish_non_exhaustive()
    }
}

impl RecordGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            max_depth: DEFAULT_GENERATOR_DEPTH,
            unique_retries: DEFAULT_UNIQUE_RETRIES,
        }
    }

    pub fn from_config(config: &MemStoreConfig) -> Self {
        Self::new()
            .with_max_depth(config.generator_depth)
            .with_unique_retries(config.unique_retries)
    }

    /// Make the output reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_unique_retries(mut self, retries: u32) -> Self {
        self.unique_retries = retries.max(1);
        self
    }

    /// A random element of `items`.
    pub fn pick<'c, T>(&mut self, items: &'c [T]) -> Option<&'c T> {
        items.choose(&mut self.rng)
    }

    /// Generate a record for `schema`.
    pub fn record(&mut self, schema: &ObjectSchema) -> ConnectorResult<Record> {
        let scope = Scope {
            root: schema.document(),
            object: schema.name(),
        };
        match self.generate(&scope, schema.document(), schema.name(), 0)? {
            Value::Object(record) => Ok(record),
            other => Err(scope.invalid(format!("root schema generated {other}, not an object"))),
        }
    }

    /// Generate a value for a standalone schema document.
    pub fn value(&mut self, schema: &Value) -> ConnectorResult<Value> {
        let scope = Scope {
            root: schema,
            object: "schema",
        };
        self.generate(&scope, schema, "$", 0)
    }

    fn generate(&mut self, scope: &Scope<'_>, node: &Value, property: &str, depth: usize) -> ConnectorResult<Value> {
        if depth > RECURSION_LIMIT {
            return Err(scope.invalid(format!(
                "'{property}' nests deeper than {RECURSION_LIMIT} levels"
            )));
        }
        let node = scope.resolve(node)?;

        if let Some(value) = node.get("const") {
            return Ok(value.clone());
        }
        if let Some(values) = node.get("enum").and_then(Value::as_array) {
            return values
                .choose(&mut self.rng)
                .cloned()
                .ok_or_else(|| scope.invalid(format!("'{property}' has an empty enum")));
        }
        if let Some(branches) = node
            .get("oneOf")
            .or_else(|| node.get("anyOf"))
            .and_then(Value::as_array)
        {
            let branch = branches
                .choose(&mut self.rng)
                .ok_or_else(|| scope.invalid(format!("'{property}' has no alternatives")))?;
            return self.generate(scope, branch, property, depth);
        }

        match self.pick_type(node).as_str() {
            "null" => Ok(Value::Null),
            "boolean" => Ok(Value::Bool(self.rng.gen())),
            "integer" => self.integer(scope, node, property),
            "number" => self.number(scope, node, property),
            "array" => self.array(scope, node, property, depth),
            "object" => self.object(scope, node, depth).map(Value::Object),
            _ => self.string(scope, node, property),
        }
    }

    /// Prefer a concrete type over `null` when a node allows several.
    fn pick_type(&mut self, node: &Value) -> String {
        match node.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(Value::Array(kinds)) => {
                let names: Vec<&str> = kinds.iter().filter_map(Value::as_str).collect();
                let concrete: Vec<&str> = names.iter().copied().filter(|k| *k != "null").collect();
                concrete
                    .choose(&mut self.rng)
                    .or(names.first())
                    .map_or_else(|| "null".to_string(), |k| k.to_string())
            }
            _ if node.get("properties").is_some() => "object".to_string(),
            _ if node.get("items").is_some() => "array".to_string(),
            _ => "string".to_string(),
        }
    }

    fn integer(&mut self, scope: &Scope<'_>, node: &Value, property: &str) -> ConnectorResult<Value> {
        let step = node.get("multipleOf").and_then(Value::as_f64).unwrap_or(1.0);
        let step = integral_step(step)
            .ok_or_else(|| scope.invalid(format!("'{property}' has no integral multipleOf")))?;
        let (low, high) = Bounds::of(node).integer_span();
        let first = (low / step).ceil() as i64;
        let last = (high / step).floor() as i64;
        if first > last {
            return Err(scope.invalid(format!("'{property}' admits no integer")));
        }
        let value = self.rng.gen_range(first..=last) as f64 * step;
        Ok(json!(value as i64))
    }

    fn number(&mut self, scope: &Scope<'_>, node: &Value, property: &str) -> ConnectorResult<Value> {
        let bounds = Bounds::of(node);
        let (low, high) = bounds.span();
        let empty = || scope.invalid(format!("'{property}' admits no number"));

        if let Some(step) = node.get("multipleOf").and_then(Value::as_f64).filter(|s| *s > 0.0) {
            let mut first = (low / step).ceil() as i64;
            let mut last = (high / step).floor() as i64;
            if bounds.exclusive_min && first as f64 * step <= low {
                first += 1;
            }
            if bounds.exclusive_max && last as f64 * step >= high {
                last -= 1;
            }
            if first > last {
                return Err(empty());
            }
            return Ok(json!(self.rng.gen_range(first..=last) as f64 * step));
        }

        if high < low || (high == low && (bounds.exclusive_min || bounds.exclusive_max)) {
            return Err(empty());
        }
        if high == low {
            return Ok(json!(low));
        }
        let mut value = self.rng.gen_range(low..high);
        if bounds.exclusive_min && value <= low {
            value = low + (high - low) / 2.0;
        }
        Ok(json!(value))
    }

    fn string(&mut self, scope: &Scope<'_>, node: &Value, property: &str) -> ConnectorResult<Value> {
        let lengths = Lengths::of(node);
        if lengths.max.is_some_and(|max| max < lengths.min) {
            return Err(scope.invalid(format!("'{property}' has maxLength below minLength")));
        }
        if let Some(pattern) = node.get("pattern").and_then(Value::as_str) {
            return self.matching(scope, property, pattern, lengths).map(Value::String);
        }
        if let Some(format) = node.get("format").and_then(Value::as_str) {
            if let Some(formatted) = self.formatted(format, lengths) {
                if !lengths.fits(&formatted) {
                    return Err(scope.invalid(format!(
                        "'{property}': no {format} value fits the length bounds"
                    )));
                }
                return Ok(Value::String(formatted));
            }
        }

        let (low, high) = match lengths.max {
            Some(max) if usize_keyword(node, "minLength").is_none() => (max.min(1), max),
            Some(max) => (lengths.min, max),
            None => (lengths.min.max(1), lengths.min.max(1) + 12),
        };
        let len = self.rng.gen_range(low..=high);
        Ok(Value::String(self.alphanumeric(len)))
    }

    /// A value for a known `format`, sized to `lengths` where the format has
    /// a variable part. `None` for unknown formats.
    fn formatted(&mut self, format: &str, lengths: Lengths) -> Option<String> {
        let value = match format {
            "email" => {
                let domain = ["example.com", "ex.io"]
                    .into_iter()
                    .find(|domain| lengths.variable(domain.len() + 1, 1, 12).is_some())
                    .unwrap_or("example.com");
                let local = match lengths.variable(domain.len() + 1, 1, 12) {
                    Some((low, high)) => self.rng.gen_range(low..=high),
                    None => 12,
                };
                format!("{}@{domain}", self.letters(local))
            }
            "uuid" => uuid::Builder::from_random_bytes(self.rng.gen())
                .into_uuid()
                .to_string(),
            "date" => self.timestamp().format("%Y-%m-%d").to_string(),
            "date-time" => format_rfc3339(&self.timestamp()),
            "uri" => {
                const PREFIX: &str = "https://ex.io/";
                let path = match lengths.variable(PREFIX.len(), 1, 16) {
                    Some((low, high)) => self.rng.gen_range(low..=high),
                    None => 16,
                };
                format!("{PREFIX}{}", self.letters(path))
            }
            "phone" => format!(
                "+1-555-{:03}-{:04}",
                self.rng.gen_range(0..1000),
                self.rng.gen_range(0..10000)
            ),
            _ => return None,
        };
        Some(value)
    }

    fn timestamp(&mut self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.rng.gen_range(TIMESTAMP_RANGE), 0).unwrap_or_default()
    }

    fn letters(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(self.rng.gen_range(b'a'..=b'z')))
            .collect()
    }

    fn alphanumeric(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// A string matching `pattern` within `lengths`, built from its syntax
    /// tree and checked against the compiled regex.
    fn matching(
        &mut self,
        scope: &Scope<'_>,
        property: &str,
        pattern: &str,
        lengths: Lengths,
    ) -> ConnectorResult<String> {
        let hir = regex_syntax::parse(pattern)
            .map_err(|e| scope.invalid(format!("'{property}' pattern {pattern:?}: {e}")))?;
        let regex = Regex::new(pattern)
            .map_err(|e| scope.invalid(format!("'{property}' pattern {pattern:?}: {e}")))?;

        for _ in 0..self.unique_retries {
            let mut out = String::new();
            self.emit(&hir, &mut out);
            if lengths.fits(&out) && regex.is_match(&out) {
                return Ok(out);
            }
        }
        Err(scope.invalid(format!(
            "'{property}': no string matching {pattern:?} within the length bounds after {} attempts",
            self.unique_retries
        )))
    }

    fn emit(&mut self, hir: &Hir, out: &mut String) {
        match hir.kind() {
            HirKind::Empty | HirKind::Look(_) => {}
            HirKind::Literal(literal) => out.push_str(&String::from_utf8_lossy(&literal.0)),
            HirKind::Class(Class::Unicode(class)) => {
                let ranges: Vec<(char, char)> =
                    class.ranges().iter().map(|r| (r.start(), r.end())).collect();
                if let Some(c) = self.pick_char(&ranges) {
                    out.push(c);
                }
            }
            HirKind::Class(Class::Bytes(class)) => {
                let ranges: Vec<(char, char)> = class
                    .ranges()
                    .iter()
                    .map(|r| (char::from(r.start()), char::from(r.end())))
                    .collect();
                if let Some(c) = self.pick_char(&ranges) {
                    out.push(c);
                }
            }
            HirKind::Repetition(repetition) => {
                let max = repetition.max.map_or(repetition.min + OPEN_REPEAT, |m| {
                    m.min(repetition.min + MAX_REPEAT_SPREAD)
                });
                let count = self.rng.gen_range(repetition.min..=max.max(repetition.min));
                for _ in 0..count {
                    self.emit(&repetition.sub, out);
                }
            }
            HirKind::Capture(capture) => self.emit(&capture.sub, out),
            HirKind::Concat(parts) => {
                for part in parts {
                    self.emit(part, out);
                }
            }
            HirKind::Alternation(branches) => {
                if let Some(branch) = branches.choose(&mut self.rng) {
                    self.emit(branch, out);
                }
            }
        }
    }

    fn pick_char(&mut self, ranges: &[(char, char)]) -> Option<char> {
        let printable: Vec<(char, char)> = ranges
            .iter()
            .filter_map(|&(start, end)| {
                let start = start.max(PRINTABLE.0);
                let end = end.min(PRINTABLE.1);
                (start <= end).then_some((start, end))
            })
            .collect();
        let pool: &[(char, char)] = if printable.is_empty() { ranges } else { &printable };
        let &(start, end) = pool.choose(&mut self.rng)?;
        let code = self.rng.gen_range(u32::from(start)..=u32::from(end));
        char::from_u32(code).or(Some(start))
    }

    fn array(&mut self, scope: &Scope<'_>, node: &Value, property: &str, depth: usize) -> ConnectorResult<Value> {
        let min = usize_keyword(node, "minItems").unwrap_or(0);
        let max = usize_keyword(node, "maxItems").unwrap_or(min + 3);
        if max < min {
            return Err(scope.invalid(format!("'{property}' has maxItems below minItems")));
        }
        let unique = node.get("uniqueItems").and_then(Value::as_bool).unwrap_or(false);
        let items = node.get("items");

        let mut count = if depth >= self.max_depth {
            min
        } else {
            self.rng.gen_range(min..=max)
        };
        if unique {
            let domain = match items {
                Some(items) => domain_size(scope.resolve(items)?),
                None => None,
            };
            if let Some(domain) = domain {
                if domain < min {
                    return Err(ConnectorError::UniqueConstraint {
                        property: property.to_string(),
                        message: format!(
                            "{min} unique items required but only {domain} distinct values exist"
                        ),
                    });
                }
                count = count.min(domain);
            }
        }

        let prefix: &[Value] = node
            .get("prefixItems")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if matches!(items, Some(Value::Bool(false))) {
            if prefix.len() < min {
                return Err(scope.invalid(format!(
                    "'{property}' needs {min} items but allows only {}",
                    prefix.len()
                )));
            }
            count = count.min(prefix.len());
        }

        let mut values: Vec<Value> = Vec::with_capacity(count);
        while values.len() < count {
            let slot = prefix.get(values.len()).or(items);
            let mut attempts = 0;
            let value = loop {
                let candidate = match slot {
                    Some(slot) => self.generate(scope, slot, property, depth + 1)?,
                    None => Value::String(self.alphanumeric(8)),
                };
                if !unique || !values.contains(&candidate) {
                    break candidate;
                }
                attempts += 1;
                if attempts >= self.unique_retries {
                    return Err(ConnectorError::UniqueValue {
                        property: property.to_string(),
                        attempts,
                    });
                }
            };
            values.push(value);
        }
        Ok(Value::Array(values))
    }

    /// Required properties are always generated; optional ones only above
    /// the depth limit. Properties named by `dependentRequired` follow the
    /// property that triggers them.
    fn object(&mut self, scope: &Scope<'_>, node: &Value, depth: usize) -> ConnectorResult<Record> {
        let required: Vec<&str> = node
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut record = Record::new();
        let Some(properties) = node.get("properties").and_then(Value::as_object) else {
            return Ok(record);
        };
        for (name, property) in properties {
            let wanted = required.contains(&name.as_str())
                || (depth < self.max_depth && self.rng.gen_bool(OPTIONAL_PROBABILITY));
            if wanted {
                let value = self.generate(scope, property, name, depth + 1)?;
                record.insert(name.clone(), value);
            }
        }

        let Some(dependencies) = node.get("dependentRequired").and_then(Value::as_object) else {
            return Ok(record);
        };
        for (trigger, dependents) in dependencies {
            if !record.contains_key(trigger) {
                continue;
            }
            for dependent in dependents.as_array().into_iter().flatten().filter_map(Value::as_str) {
                if record.contains_key(dependent) {
                    continue;
                }
                let schema = properties.get(dependent).unwrap_or(&ANY_VALUE);
                let value = self.generate(scope, schema, dependent, depth + 1)?;
                record.insert(dependent.to_string(), value);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_schema() -> ObjectSchema {
        ObjectSchema::compile(
            "account",
            json!({
                "type": "object",
                "required": ["id", "code", "email", "score", "ratio", "tags", "address"],
                "properties": {
                    "id": {"type": "string", "format": "uuid", "x-amp-id-field": true},
                    "code": {"type": "string", "pattern": "^[A-Z]{3}-[0-9]{4}$"},
                    "email": {"type": "string", "format": "email"},
                    "website": {"type": "string", "format": "uri"},
                    "founded": {"type": "string", "format": "date"},
                    "updated": {"type": "string", "format": "date-time"},
                    "phone": {"type": "string", "format": "phone"},
                    "nickname": {"type": "string", "minLength": 3, "maxLength": 5},
                    "status": {"enum": ["active", "churned"]},
                    "score": {"type": "integer", "minimum": 1, "maximum": 100, "multipleOf": 5},
                    "ratio": {"type": "number", "exclusiveMinimum": 0, "maximum": 1},
                    "note": {"type": ["string", "null"]},
                    "tags": {
                        "type": "array",
                        "items": {"enum": ["a", "b", "c"]},
                        "minItems": 2,
                        "maxItems": 3,
                        "uniqueItems": true
                    },
                    "address": {
                        "type": "object",
                        "required": ["city"],
                        "properties": {
                            "city": {"type": "string", "minLength": 2},
                            "zip": {"type": "string", "pattern": "^\\d{5}$"}
                        }
                    }
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_generated_records_validate() {
        let schema = account_schema();
        let mut generator = RecordGenerator::new().with_seed(7);
        for _ in 0..50 {
            let record = generator.record(&schema).unwrap();
            schema.validate(&record).unwrap();

            let code = record["code"].as_str().unwrap();
            assert_eq!(code.len(), 8);
            let score = record["score"].as_i64().unwrap();
            assert!(score % 5 == 0 && (5..=100).contains(&score));
            let ratio = record["ratio"].as_f64().unwrap();
            assert!(ratio > 0.0 && ratio <= 1.0);
            let tags = record["tags"].as_array().unwrap();
            assert!((2..=3).contains(&tags.len()));
        }
    }

    #[test]
    fn test_seed_makes_output_reproducible() {
        let schema = account_schema();
        let first = RecordGenerator::new().with_seed(42).record(&schema).unwrap();
        let second = RecordGenerator::new().with_seed(42).record(&schema).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_string_length_bounds() {
        let mut generator = RecordGenerator::new().with_seed(1);
        for _ in 0..100 {
            let value = generator
                .value(&json!({"type": "string", "minLength": 4, "maxLength": 6}))
                .unwrap();
            let len = value.as_str().unwrap().chars().count();
            assert!((4..=6).contains(&len), "length {len}");
        }
        assert!(generator
            .value(&json!({"type": "string", "minLength": 6, "maxLength": 4}))
            .is_err());
    }

    #[test]
    fn test_formats_respect_length_bounds() {
        let mut generator = RecordGenerator::new().with_seed(5);
        for _ in 0..50 {
            let email = generator
                .value(&json!({"type": "string", "format": "email", "maxLength": 8}))
                .unwrap();
            let email = email.as_str().unwrap();
            assert!(email.chars().count() <= 8, "{email}");
            assert!(email.contains('@'));

            let uri = generator
                .value(&json!({"type": "string", "format": "uri", "minLength": 30, "maxLength": 32}))
                .unwrap();
            let len = uri.as_str().unwrap().chars().count();
            assert!((30..=32).contains(&len), "length {len}");
        }

        let too_short = generator.value(&json!({"type": "string", "format": "uuid", "maxLength": 10}));
        assert!(matches!(too_short, Err(ConnectorError::InvalidSchema { .. })));
    }

    #[test]
    fn test_patterns_respect_length_bounds() {
        let mut generator = RecordGenerator::new().with_seed(9);
        let regex = Regex::new("^[a-z]+$").unwrap();
        for _ in 0..50 {
            let value = generator
                .value(&json!({"type": "string", "pattern": "^[a-z]+$", "maxLength": 2}))
                .unwrap();
            let value = value.as_str().unwrap();
            assert!(value.chars().count() <= 2, "{value}");
            assert!(regex.is_match(value));
        }

        let impossible = generator.value(&json!({"type": "string", "pattern": "^a{3}$", "maxLength": 2}));
        assert!(matches!(impossible, Err(ConnectorError::InvalidSchema { .. })));
    }

    #[test]
    fn test_prefix_items_and_dependent_required() {
        let schema = ObjectSchema::compile(
            "shipment",
            json!({
                "type": "object",
                "required": ["id", "route", "carrier"],
                "properties": {
                    "id": {"type": "string"},
                    "route": {
                        "type": "array",
                        "prefixItems": [{"type": "integer"}, {"type": "string", "format": "date"}],
                        "minItems": 2,
                        "maxItems": 2
                    },
                    "carrier": {"type": "string"},
                    "tracking": {"type": "string", "minLength": 6}
                },
                "dependentRequired": {"carrier": ["tracking"]}
            }),
        )
        .unwrap();

        let mut generator = RecordGenerator::new().with_seed(13);
        for _ in 0..20 {
            let record = generator.record(&schema).unwrap();
            schema.validate(&record).unwrap();
            assert_eq!(record["route"].as_array().unwrap().len(), 2);
            assert!(record["route"][0].is_i64());
            assert!(record["tracking"].as_str().unwrap().len() >= 6);
        }
    }

    #[test]
    fn test_unique_items_impossible() {
        let mut generator = RecordGenerator::new();
        let result = generator.value(&json!({
            "type": "array",
            "items": {"type": "boolean"},
            "minItems": 3,
            "uniqueItems": true
        }));
        assert!(matches!(result, Err(ConnectorError::UniqueConstraint { .. })));
    }

    #[test]
    fn test_unique_items_retry_budget() {
        let mut generator = RecordGenerator::new().with_unique_retries(10);
        let result = generator.value(&json!({
            "type": "array",
            "items": {"type": "string", "pattern": "^a$"},
            "minItems": 2,
            "uniqueItems": true
        }));
        match result {
            Err(ConnectorError::UniqueValue { attempts, .. }) => assert_eq!(attempts, 10),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_recursive_schema_terminates() {
        let mut generator = RecordGenerator::new().with_seed(3).with_max_depth(3);
        let schema = json!({
            "$ref": "#/definitions/node",
            "definitions": {
                "node": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "children": {"type": "array", "items": {"$ref": "#/definitions/node"}}
                    }
                }
            }
        });
        for _ in 0..20 {
            assert!(generator.value(&schema).unwrap().is_object());
        }
    }

    #[test]
    fn test_required_recursion_fails() {
        let mut generator = RecordGenerator::new();
        let schema = json!({
            "$ref": "#/definitions/node",
            "definitions": {
                "node": {
                    "type": "object",
                    "required": ["next"],
                    "properties": {"next": {"$ref": "#/definitions/node"}}
                }
            }
        });
        assert!(matches!(
            generator.value(&schema),
            Err(ConnectorError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_integer_bounds() {
        let mut generator = RecordGenerator::new().with_seed(11);
        for _ in 0..100 {
            let value = generator
                .value(&json!({"type": "integer", "exclusiveMinimum": 10, "exclusiveMaximum": 13}))
                .unwrap();
            assert!(matches!(value.as_i64(), Some(11 | 12)));
        }
        assert!(generator
            .value(&json!({"type": "integer", "minimum": 3, "maximum": 4, "multipleOf": 5}))
            .is_err());
    }
}
