//! Built-in functions callable from rule expressions

use crate::error::EvalError;

use super::engine::Engine;
use super::types::Value;

pub type BuiltinFn = Box<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

fn arity(name: &str, expected: usize, args: &[Value]) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn numeric(value: &Value) -> Result<f64, EvalError> {
    value
        .as_f64()
        .ok_or_else(|| EvalError::NotNumeric(value.canonical()))
}

impl Engine {
    /// Math builtins registered on every engine.
    pub(super) fn register_default_builtins(&mut self) {
        self.register_builtin("abs", |args| {
            arity("abs", 1, args)?;
            Ok(Value::Float(numeric(&args[0])?.abs()))
        });

        self.register_builtin("round", |args| {
            arity("round", 1, args)?;
            Ok(Value::Float(numeric(&args[0])?.round()))
        });

        self.register_builtin("floor", |args| {
            arity("floor", 1, args)?;
            Ok(Value::Float(numeric(&args[0])?.floor()))
        });

        self.register_builtin("ceil", |args| {
            arity("ceil", 1, args)?;
            Ok(Value::Float(numeric(&args[0])?.ceil()))
        });
    }

    /// Formatting and string builtins used by suggestion rules.
    pub fn register_formatting_builtins(&mut self) {
        self.register_builtin("format_time", |args| {
            arity("format_time", 1, args)?;
            Ok(Value::Str(format_duration(numeric(&args[0])?)))
        });

        self.register_builtin("format_percent", |args| {
            arity("format_percent", 1, args)?;
            Ok(Value::Str(format!("{:.1}%", numeric(&args[0])?)))
        });

        self.register_builtin("format_number", |args| {
            arity("format_number", 1, args)?;
            Ok(Value::Str(format_with_commas(numeric(&args[0])? as i64)))
        });

        self.register_builtin("round_to", |args| {
            arity("round_to", 2, args)?;
            let value = numeric(&args[0])?;
            let places = numeric(&args[1])?;
            let mult = 10f64.powf(places);
            Ok(Value::Float((value * mult).round() / mult))
        });

        self.register_builtin("truncate", |args| {
            arity("truncate", 2, args)?;
            let text = args[0].canonical();
            let max_len = numeric(&args[1])? as usize;
            if text.chars().count() > max_len {
                let keep = max_len.saturating_sub(3);
                let prefix: String = text.chars().take(keep).collect();
                return Ok(Value::Str(prefix + "..."));
            }
            Ok(Value::Str(text))
        });

        self.register_builtin("concat", |args| {
            let mut out = String::new();
            for arg in args {
                out.push_str(&arg.canonical());
            }
            Ok(Value::Str(out))
        });

        self.register_builtin("contains", |args| {
            arity("contains", 2, args)?;
            Ok(Value::Bool(
                args[0].canonical().contains(&args[1].canonical()),
            ))
        });

        self.register_builtin("starts_with", |args| {
            arity("starts_with", 2, args)?;
            Ok(Value::Bool(
                args[0].canonical().starts_with(&args[1].canonical()),
            ))
        });

        self.register_builtin("ends_with", |args| {
            arity("ends_with", 2, args)?;
            Ok(Value::Bool(
                args[0].canonical().ends_with(&args[1].canonical()),
            ))
        });

        self.register_builtin("min", |args| {
            arity("min", 2, args)?;
            Ok(Value::Float(numeric(&args[0])?.min(numeric(&args[1])?)))
        });

        self.register_builtin("max", |args| {
            arity("max", 2, args)?;
            Ok(Value::Float(numeric(&args[0])?.max(numeric(&args[1])?)))
        });
    }
}

/// Formats microseconds as a human-readable duration.
///
/// `850` → `"850μs"`, `1_500_000` → `"1.50s"`, `90_000_000` →
/// `"2m 30s"`, `7_200_000_000` → `"2h 0m"`.
pub fn format_duration(us: f64) -> String {
    if us < 1000.0 {
        return format!("{:.0}μs", us);
    }
    let ms = us / 1000.0;
    if ms < 1000.0 {
        return format!("{:.1}ms", ms);
    }
    let s = ms / 1000.0;
    if s < 60.0 {
        return format!("{:.2}s", s);
    }
    let m = s / 60.0;
    if m < 60.0 {
        return format!("{:.0}m {}s", m, (s as i64) % 60);
    }
    let h = m / 60.0;
    format!("{:.0}h {}m", h, (m as i64) % 60)
}

/// Formats an integer with thousands separators: `1234567` → `"1,234,567"`.
pub fn format_with_commas(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        return format!("-{}", out);
    }
    out
}
