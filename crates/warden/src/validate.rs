//! `input_validate` rule engine.
//!
//! Actions declare validation as a comma-separated tag string (`"required"`,
//! `"numeric"`, `"len=1-32"`, `"oneof=start stop restart"`...), the same
//! shape as a single `validate.Var(input, tag)` call against a handful of the
//! tags that struct field validation exposes. An empty `input_validate`
//! always passes, matching the no-op case.

use regex::Regex;
use std::sync::OnceLock;

/// Validate `input` against the comma-separated `rules` tag string.
/// All rules must pass (AND semantics); an unrecognized rule is an error
/// rather than a silent pass, so a typo in an action file is caught at
/// dispatch time instead of disabling validation unnoticed.
pub fn validate(input: &str, rules: &str) -> Result<(), String> {
    if rules.trim().is_empty() {
        return Ok(());
    }
    for rule in rules.split(',') {
        let rule = rule.trim();
        if rule.is_empty() {
            continue;
        }
        apply_rule(input, rule)?;
    }
    Ok(())
}

fn apply_rule(input: &str, rule: &str) -> Result<(), String> {
    let (name, arg) = match rule.split_once('=') {
        Some((name, arg)) => (name, Some(arg)),
        None => (rule, None),
    };

    match name {
        "required" => {
            if input.is_empty() {
                return Err("input is required".to_string());
            }
        }
        "numeric" => {
            if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("'{input}' is not numeric"));
            }
        }
        "alpha" => {
            if input.is_empty() || !input.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(format!("'{input}' is not alphabetic"));
            }
        }
        "alphanum" => {
            if input.is_empty() || !input.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!("'{input}' is not alphanumeric"));
            }
        }
        "email" => {
            if !email_pattern().is_match(input) {
                return Err(format!("'{input}' is not a valid email"));
            }
        }
        "len" => {
            let bounds = arg.ok_or_else(|| "len rule requires an argument".to_string())?;
            check_len_bounds(input, bounds)?;
        }
        "min" => {
            let min: usize = arg
                .ok_or_else(|| "min rule requires an argument".to_string())?
                .parse()
                .map_err(|_| "min rule argument must be an integer".to_string())?;
            if input.len() < min {
                return Err(format!("'{input}' is shorter than {min}"));
            }
        }
        "max" => {
            let max: usize = arg
                .ok_or_else(|| "max rule requires an argument".to_string())?
                .parse()
                .map_err(|_| "max rule argument must be an integer".to_string())?;
            if input.len() > max {
                return Err(format!("'{input}' is longer than {max}"));
            }
        }
        "oneof" => {
            let options = arg.ok_or_else(|| "oneof rule requires an argument".to_string())?;
            if !options.split_whitespace().any(|opt| opt == input) {
                return Err(format!("'{input}' is not one of [{options}]"));
            }
        }
        "cron" => {
            if cron::Schedule::try_from(input).is_err() {
                return Err(format!("'{input}' is not a valid cron expression"));
            }
        }
        other => return Err(format!("unrecognized validation rule '{other}'")),
    }
    Ok(())
}

fn check_len_bounds(input: &str, bounds: &str) -> Result<(), String> {
    let len = input.chars().count();
    if let Some((min, max)) = bounds.split_once('-') {
        let min: usize = min.parse().map_err(|_| "len rule bounds must be integers".to_string())?;
        let max: usize = max.parse().map_err(|_| "len rule bounds must be integers".to_string())?;
        if len < min || len > max {
            return Err(format!("'{input}' length {len} is outside [{min}, {max}]"));
        }
    } else {
        let exact: usize = bounds.parse().map_err(|_| "len rule bound must be an integer".to_string())?;
        if len != exact {
            return Err(format!("'{input}' length {len} is not exactly {exact}"));
        }
    }
    Ok(())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern is valid"))
}
