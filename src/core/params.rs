//! Parameter specifications, values and command templating.
//!
//! An experiment file declares each parameter axis either as a literal
//! (fixed), a list of alternatives (categorical), or a continuous range in
//! `linear(lo, hi)` / `logscale(lo, hi)` form. This module owns the parsed
//! representation of those axes and the `${name}` substitution applied to
//! command templates before execution.
use crate::error::SweepXError;
use crate::Result;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// An ordered parameter assignment, mapping parameter names to values.
///
/// Insertion order is preserved so that summary tables keep the column
/// order of the experiment file.
pub type Params = IndexMap<String, ParamValue>;

/// A concrete parameter value as substituted into command templates.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Numeric value (integers are widened to `f64`)
    Number(f64),
    /// Textual value, substituted verbatim
    Text(String),
}

impl ParamValue {
    /// Numeric content, if this value is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    // Compiled once; the pattern itself is a literal and cannot fail.
    Regex::new(r"^(linear|logscale)\(\s*([^,\s]+)\s*,\s*([^,\s)]+)\s*\)$")
        .expect("range pattern is valid")
});

/// Parsed specification of one parameter axis.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    /// Fixed numeric literal
    FixedNumber(f64),
    /// Fixed string literal, stored double-quoted so it survives shell
    /// word-splitting when substituted
    FixedText(String),
    /// Finite ordered set of alternatives
    Categorical(Vec<ParamValue>),
    /// Continuous range `[low, high]` on a linear scale
    Linear {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },
    /// Continuous range `[low, high]` sampled on a log scale; `low > 0`
    LogScale {
        /// Lower bound, strictly positive
        low: f64,
        /// Upper bound
        high: f64,
    },
}

impl ParamSpec {
    /// Classify a string literal: `linear(lo, hi)` / `logscale(lo, hi)`
    /// forms become continuous ranges, anything else is a fixed string.
    pub fn from_text(name: &str, text: &str) -> Result<Self> {
        if let Some(caps) = RANGE_RE.captures(text.trim()) {
            let low: f64 = caps[2].parse().map_err(|_| {
                SweepXError::config(format!(
                    "parameter \"{}\": invalid lower bound \"{}\"",
                    name, &caps[2]
                ))
            })?;
            let high: f64 = caps[3].parse().map_err(|_| {
                SweepXError::config(format!(
                    "parameter \"{}\": invalid upper bound \"{}\"",
                    name, &caps[3]
                ))
            })?;
            if high < low {
                return Err(SweepXError::config(format!(
                    "parameter \"{}\": upper bound {} is below lower bound {}",
                    name, high, low
                )));
            }
            if &caps[1] == "logscale" {
                if low <= 0.0 {
                    return Err(SweepXError::config(format!(
                        "parameter \"{}\": logscale ranges require a positive lower bound, got {}",
                        name, low
                    )));
                }
                Ok(ParamSpec::LogScale { low, high })
            } else {
                Ok(ParamSpec::Linear { low, high })
            }
        } else {
            // Quoted so multi-word strings stay one shell argument.
            Ok(ParamSpec::FixedText(format!("\"{}\"", text)))
        }
    }

    /// Whether this axis is a continuous range.
    pub fn is_continuous(&self) -> bool {
        matches!(self, ParamSpec::Linear { .. } | ParamSpec::LogScale { .. })
    }

    /// The finite set of values this axis enumerates in a comparison node.
    ///
    /// Continuous ranges cannot be enumerated; the validator rejects them
    /// before an experiment starts.
    pub fn enumerable_values(&self) -> Option<Vec<ParamValue>> {
        match self {
            ParamSpec::FixedNumber(n) => Some(vec![ParamValue::Number(*n)]),
            ParamSpec::FixedText(s) => Some(vec![ParamValue::Text(s.clone())]),
            ParamSpec::Categorical(vals) => Some(vals.clone()),
            ParamSpec::Linear { .. } | ParamSpec::LogScale { .. } => None,
        }
    }
}

/// Replace every `${name}` occurrence in each command with the value of
/// `name` from the assignment.
///
/// Unknown placeholders are left untouched; the shell surfaces them to the
/// user verbatim.
pub fn fill_commands(commands: &[String], params: &Params) -> Vec<String> {
    commands
        .iter()
        .map(|command| {
            let mut filled = command.clone();
            for (name, value) in params {
                filled = filled.replace(&format!("${{{}}}", name), &value.to_string());
            }
            filled
        })
        .collect()
}

/// Merge two assignments; entries of `b` shadow entries of `a`.
pub fn join_params(a: &Params, b: &Params) -> Params {
    let mut joined = a.clone();
    for (k, v) in b {
        joined.insert(k.clone(), v.clone());
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params(entries: &[(&str, ParamValue)]) -> Params {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[rstest]
    #[case("linear(0, 1)", ParamSpec::Linear { low: 0.0, high: 1.0 })]
    #[case("linear(-2.5,7)", ParamSpec::Linear { low: -2.5, high: 7.0 })]
    #[case("logscale(0.001, 10)", ParamSpec::LogScale { low: 0.001, high: 10.0 })]
    #[case("logscale( 1 , 100 )", ParamSpec::LogScale { low: 1.0, high: 100.0 })]
    fn test_range_parsing(#[case] text: &str, #[case] expected: ParamSpec) {
        let spec = ParamSpec::from_text("x", text).unwrap();
        assert_eq!(spec, expected);
    }

    #[test]
    fn test_logscale_rejects_nonpositive_lower_bound() {
        let err = ParamSpec::from_text("y", "logscale(0, 10)").unwrap_err();
        assert!(err.to_string().contains("positive lower bound"));
    }

    #[test]
    fn test_range_with_inverted_bounds() {
        let err = ParamSpec::from_text("x", "linear(2, 1)").unwrap_err();
        assert!(err.to_string().contains("below lower bound"));
    }

    #[test]
    fn test_plain_string_is_fixed_and_quoted() {
        let spec = ParamSpec::from_text("m", "methodA").unwrap();
        assert_eq!(spec, ParamSpec::FixedText("\"methodA\"".to_string()));
    }

    #[test]
    fn test_fill_commands_substitutes_all_occurrences() {
        let commands = vec!["echo ${a} ${b} ${a}".to_string()];
        let assignment = params(&[
            ("a", ParamValue::Number(1.5)),
            ("b", ParamValue::Text("x".into())),
        ]);
        let filled = fill_commands(&commands, &assignment);
        assert_eq!(filled, vec!["echo 1.5 x 1.5".to_string()]);
    }

    #[test]
    fn test_fill_commands_leaves_unknown_placeholders() {
        let commands = vec!["echo ${missing}".to_string()];
        let filled = fill_commands(&commands, &Params::new());
        assert_eq!(filled, vec!["echo ${missing}".to_string()]);
    }

    #[test]
    fn test_join_params_later_shadows_earlier() {
        let a = params(&[("k", ParamValue::Number(1.0))]);
        let b = params(&[("k", ParamValue::Number(2.0))]);
        let joined = join_params(&a, &b);
        assert_eq!(joined["k"], ParamValue::Number(2.0));
    }

    #[test]
    fn test_enumerable_values() {
        assert_eq!(
            ParamSpec::FixedNumber(3.0).enumerable_values(),
            Some(vec![ParamValue::Number(3.0)])
        );
        assert!(ParamSpec::Linear { low: 0.0, high: 1.0 }
            .enumerable_values()
            .is_none());
    }
}
