//! Input validation at the trust boundary.
//!
//! Inputs arrive over a channel that strips all type information, so the
//! receiving side re-validates every call against the route's schema and
//! never trusts the caller's static types. Validators collect every
//! violation before failing, so a single rejection lists all offending
//! fields, each with its dotted path.

use serde_json::Value;

use tabwise_wire::Issue;

/// Validates an untyped input value into a route's input type.
///
/// Any `Fn(&Value) -> Result<I, Vec<Issue>>` implements this, so validators
/// are ordinarily written as plain functions built from the extractors in
/// this module.
pub trait Schema<I>: Send + Sync {
    /// Parses the raw input, returning either the typed value or the full
    /// list of violations.
    fn parse(&self, input: &Value) -> Result<I, Vec<Issue>>;
}

impl<I, F> Schema<I> for F
where
    F: Fn(&Value) -> Result<I, Vec<Issue>> + Send + Sync,
{
    fn parse(&self, input: &Value) -> Result<I, Vec<Issue>> {
        self(input)
    }
}

/// Accepts only a root-level string.
///
/// # Errors
///
/// Returns a single root-path issue when the input is not a string.
pub fn text(input: &Value) -> Result<String, Vec<Issue>> {
    input
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| vec![Issue::root(format!("expected a string, got {}", kind_of(input)))])
}

/// Accepts an absent input (`null`).
///
/// Routes that take no input still receive a value slot on the wire; this
/// validator pins it to `null` so stray payloads are rejected rather than
/// silently discarded.
///
/// # Errors
///
/// Returns a single root-path issue when the input is anything but `null`.
pub fn unit(input: &Value) -> Result<(), Vec<Issue>> {
    if input.is_null() {
        Ok(())
    } else {
        Err(vec![Issue::root(format!(
            "expected no input, got {}",
            kind_of(input)
        ))])
    }
}

/// Begins reading fields out of a root-level object.
///
/// # Errors
///
/// Returns a single root-path issue when the input is not an object.
pub fn object(input: &Value) -> Result<ObjectReader<'_>, Vec<Issue>> {
    input
        .as_object()
        .map(|fields| ObjectReader {
            fields,
            issues: Vec::new(),
        })
        .ok_or_else(|| vec![Issue::root(format!("expected an object, got {}", kind_of(input)))])
}

/// Field-by-field reader over an object input.
///
/// Extractors record an issue and return a placeholder when a field is
/// missing or has the wrong type; the placeholder never escapes because
/// [`ObjectReader::finish`] fails whenever any issue was recorded. This lets
/// a validator read every field before reporting, so the caller sees the
/// complete list of problems at once.
pub struct ObjectReader<'a> {
    fields: &'a serde_json::Map<String, Value>,
    issues: Vec<Issue>,
}

impl ObjectReader<'_> {
    /// Reads a required string field.
    pub fn required_str(&mut self, name: &str) -> String {
        match self.fields.get(name) {
            Some(value) => value.as_str().map(str::to_owned).unwrap_or_else(|| {
                self.issues
                    .push(Issue::new(name, format!("expected a string, got {}", kind_of(value))));
                String::new()
            }),
            None => {
                self.issues.push(Issue::new(name, "field is required"));
                String::new()
            }
        }
    }

    /// Reads a required integer field.
    pub fn required_i64(&mut self, name: &str) -> i64 {
        match self.fields.get(name) {
            Some(value) => value.as_i64().unwrap_or_else(|| {
                self.issues.push(Issue::new(
                    name,
                    format!("expected an integer, got {}", kind_of(value)),
                ));
                0
            }),
            None => {
                self.issues.push(Issue::new(name, "field is required"));
                0
            }
        }
    }

    /// Reads an optional string field; absence is not a violation.
    pub fn optional_str(&mut self, name: &str) -> Option<String> {
        match self.fields.get(name) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = value.as_str().map(str::to_owned);
                if parsed.is_none() {
                    self.issues.push(Issue::new(
                        name,
                        format!("expected a string, got {}", kind_of(value)),
                    ));
                }
                parsed
            }
        }
    }

    /// Completes the read, failing with every recorded issue.
    ///
    /// # Errors
    ///
    /// Returns the accumulated issue list when any extractor recorded a
    /// violation.
    pub fn finish(self) -> Result<(), Vec<Issue>> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self.issues)
        }
    }
}

/// Names a JSON value's kind for diagnostics.
fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
