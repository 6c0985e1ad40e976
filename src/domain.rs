//! Value domains: the concrete sample values tried for each parameter.

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::schema::{ParamType, Parameter};

const MAX_REPEAT: u32 = 64;

/// Strings tried, in order, when looking for a value a pattern rejects.
const NON_MATCHING_CANDIDATES: [&str; 7] = ["", "!@#$%^&*", "invalid value", "0", "a", " ", "~~~~"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Valid,
    Boundary,
    Invalid,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleValue {
    pub value: Value,
    pub kind: ValueKind,
}

/// Ordered, deduplicated, never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueDomain {
    values: Vec<SampleValue>,
    /// Set when a pattern could not be satisfied and a placeholder stands in.
    pub unverified: bool,
    /// Why a generic placeholder was used, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl ValueDomain {
    fn empty() -> Self {
        Self {
            values: Vec::new(),
            unverified: false,
            fallback_reason: None,
        }
    }

    fn single(value: Value, kind: ValueKind) -> Self {
        let mut domain = Self::empty();
        domain.push(value, kind);
        domain
    }

    /// Keeps the first occurrence of a value.
    fn push(&mut self, value: Value, kind: ValueKind) {
        if !self.values.iter().any(|existing| existing.value == value) {
            self.values.push(SampleValue { value, kind });
        }
    }

    pub fn values(&self) -> &[SampleValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SampleValue> {
        self.values.get(index)
    }

    /// `1 | 100 | 50` style rendering for prompts and reports.
    pub fn describe(&self) -> String {
        self.values
            .iter()
            .map(|v| match v.kind {
                ValueKind::Invalid => format!("{} (invalid)", render_value(&v.value)),
                _ => render_value(&v.value),
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

/// Placeholder for a declared type when nothing else is known.
pub fn placeholder_for(param_type: &ParamType) -> Value {
    match param_type {
        ParamType::String => json!("string"),
        ParamType::Integer => json!(0),
        ParamType::Number => json!(0.0),
        ParamType::Boolean => json!(true),
        ParamType::Array => json!([]),
        ParamType::Object => json!({}),
        ParamType::Unknown(_) => json!("value"),
    }
}

#[derive(Debug, Clone)]
pub struct DomainBuilder {
    max_string_length: usize,
}

impl Default for DomainBuilder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl DomainBuilder {
    pub fn new(max_string_length: usize) -> Self {
        Self {
            max_string_length: max_string_length.max(1),
        }
    }

    pub fn build(&self, param: &Parameter) -> ValueDomain {
        let constraints = &param.constraints;

        if !constraints.enum_values.is_empty() {
            let mut domain = ValueDomain::empty();
            for value in &constraints.enum_values {
                domain.push(value.clone(), ValueKind::Valid);
            }
            return domain;
        }

        let domain = match &param.param_type {
            ParamType::Boolean => {
                let mut domain = ValueDomain::single(json!(true), ValueKind::Valid);
                domain.push(json!(false), ValueKind::Valid);
                Some(domain)
            }
            ParamType::Integer => self.numeric(param, true),
            ParamType::Number => self.numeric(param, false),
            ParamType::String => self.string(param),
            ParamType::Array | ParamType::Object => None,
            ParamType::Unknown(kind) => {
                let mut domain = ValueDomain::single(placeholder_for(&param.param_type), ValueKind::Placeholder);
                domain.fallback_reason = Some(format!("unsupported type '{}'", kind));
                return domain;
            }
        };

        domain.unwrap_or_else(|| self.placeholder(param))
    }

    fn placeholder(&self, param: &Parameter) -> ValueDomain {
        match &param.constraints.default {
            Some(default) => ValueDomain::single(default.clone(), ValueKind::Valid),
            None => ValueDomain::single(placeholder_for(&param.param_type), ValueKind::Placeholder),
        }
    }

    fn numeric(&self, param: &Parameter, integer: bool) -> Option<ValueDomain> {
        let c = &param.constraints;
        let step = if integer { 1.0 } else { 0.001 };
        let low = c.minimum.map(|m| if c.exclusive_minimum { m + step } else { m });
        let high = c.maximum.map(|m| if c.exclusive_maximum { m - step } else { m });
        let low = if integer { low.map(f64::ceil) } else { low };
        let high = if integer { high.map(f64::floor) } else { high };
        let to_value = |n: f64| number_value(n, integer);

        match (low, high) {
            (Some(low), Some(high)) => {
                let mut domain = ValueDomain::single(to_value(low), ValueKind::Boundary);
                if low < high {
                    domain.push(to_value(high), ValueKind::Boundary);
                    let mid = low + (high - low) / 2.0;
                    let mid = if integer { mid.floor() } else { mid };
                    domain.push(to_value(mid), ValueKind::Valid);
                }
                Some(domain)
            }
            (Some(low), None) => {
                let mut domain = ValueDomain::single(to_value(low), ValueKind::Boundary);
                domain.push(to_value(low - step.max(1.0)), ValueKind::Invalid);
                Some(domain)
            }
            (None, Some(high)) => {
                let mut domain = ValueDomain::single(to_value(high), ValueKind::Boundary);
                domain.push(to_value(high + step.max(1.0)), ValueKind::Invalid);
                Some(domain)
            }
            (None, None) => None,
        }
    }

    fn string(&self, param: &Parameter) -> Option<ValueDomain> {
        let c = &param.constraints;

        if let Some(pattern) = &c.pattern {
            return Some(self.pattern_domain(param, pattern));
        }

        if c.min_length.is_some() || c.max_length.is_some() {
            let cap = self.max_string_length;
            let min = c.min_length.unwrap_or(0).min(cap);
            let max = c.max_length.map(|m| m.min(cap));
            let filler = |n: usize| json!("a".repeat(n));

            let mut domain = ValueDomain::single(filler(min), ValueKind::Boundary);
            if let Some(max) = max {
                if max > min {
                    domain.push(filler(max), ValueKind::Boundary);
                }
            }
            if min > 0 {
                domain.push(filler(min - 1), ValueKind::Invalid);
            }
            if let Some(declared_max) = c.max_length {
                if declared_max < cap {
                    domain.push(filler(declared_max + 1), ValueKind::Invalid);
                }
            }
            return Some(domain);
        }

        c.format
            .as_deref()
            .and_then(format_sample)
            .map(|sample| ValueDomain::single(json!(sample), ValueKind::Valid))
    }

    fn pattern_domain(&self, param: &Parameter, pattern: &str) -> ValueDomain {
        let unverified = |reason: String| {
            let mut domain = ValueDomain::single(placeholder_for(&param.param_type), ValueKind::Placeholder);
            domain.unverified = true;
            domain.fallback_reason = Some(reason);
            domain
        };

        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(_) => return unverified(format!("pattern '{}' cannot be evaluated", pattern)),
        };

        let candidate = match synthesize_match(pattern) {
            Some(candidate) if regex.is_match(&candidate) => candidate,
            _ => return unverified(format!("no value matching '{}' could be synthesized", pattern)),
        };

        let mut domain = ValueDomain::single(json!(candidate), ValueKind::Valid);
        if let Some(invalid) = NON_MATCHING_CANDIDATES
            .iter()
            .find(|candidate| !regex.is_match(candidate))
        {
            domain.push(json!(invalid), ValueKind::Invalid);
        }
        domain
    }
}

fn number_value(n: f64, integer: bool) -> Value {
    if integer {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn format_sample(format: &str) -> Option<&'static str> {
    let sample = match format {
        "date" => "2024-01-15",
        "date-time" => "2024-01-15T10:30:00Z",
        "time" => "10:30:00",
        "uuid" => "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        "email" => "user@example.com",
        "uri" | "url" => "https://example.com/resource",
        "hostname" => "api.example.com",
        "ipv4" => "192.168.0.1",
        "ipv6" => "2001:db8::1",
        "password" => "P@ssw0rd!",
        "byte" => "U3dhZ2dlcg==",
        _ => return None,
    };
    Some(sample)
}

/// Produces a string the pattern should match, or `None` for constructs the
/// synthesizer does not handle (backreferences, inline flags).
pub fn synthesize_match(pattern: &str) -> Option<String> {
    let mut parser = PatternParser {
        chars: pattern.chars().collect(),
        pos: 0,
    };
    let branches = parser.alternation()?;
    if parser.pos != parser.chars.len() {
        return None;
    }
    let mut out = String::new();
    render_sequence(branches.first()?, &mut out)?;
    Some(out)
}

enum Atom {
    Literal(char),
    Class { ranges: Vec<(char, char)>, negated: bool },
    Any,
    Group(Vec<Vec<Piece>>),
    Empty,
}

struct Piece {
    atom: Atom,
    min: u32,
    max: Option<u32>,
}

struct PatternParser {
    chars: Vec<char>,
    pos: usize,
}

impl PatternParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn alternation(&mut self) -> Option<Vec<Vec<Piece>>> {
        let mut branches = vec![self.sequence()?];
        while self.peek() == Some('|') {
            self.pos += 1;
            branches.push(self.sequence()?);
        }
        Some(branches)
    }

    fn sequence(&mut self) -> Option<Vec<Piece>> {
        let mut pieces = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            let atom = self.atom()?;
            let (min, max) = self.quantifier();
            pieces.push(Piece { atom, min, max });
        }
        Some(pieces)
    }

    fn atom(&mut self) -> Option<Atom> {
        match self.next()? {
            '^' | '$' => Some(Atom::Empty),
            '.' => Some(Atom::Any),
            '[' => self.class(),
            '(' => self.group(),
            '\\' => self.escape(),
            '*' | '+' | '?' | '{' => None,
            other => Some(Atom::Literal(other)),
        }
    }

    fn group(&mut self) -> Option<Atom> {
        let mut lookaround = false;
        if self.peek() == Some('?') {
            self.pos += 1;
            match self.next()? {
                ':' => {}
                '=' | '!' => lookaround = true,
                '<' if matches!(self.peek(), Some('=') | Some('!')) => {
                    self.pos += 1;
                    lookaround = true;
                }
                '<' => self.skip_past('>')?,
                'P' if self.peek() == Some('<') => self.skip_past('>')?,
                _ => return None,
            }
        }
        let branches = self.alternation()?;
        if self.next()? != ')' {
            return None;
        }
        Some(if lookaround { Atom::Empty } else { Atom::Group(branches) })
    }

    fn skip_past(&mut self, end: char) -> Option<()> {
        while self.next()? != end {}
        Some(())
    }

    fn escape(&mut self) -> Option<Atom> {
        let atom = match self.next()? {
            'd' => Atom::Class { ranges: digit_ranges(), negated: false },
            'w' => Atom::Class { ranges: word_ranges(), negated: false },
            's' => Atom::Class { ranges: space_ranges(), negated: false },
            'D' => Atom::Class { ranges: digit_ranges(), negated: true },
            'W' => Atom::Class { ranges: word_ranges(), negated: true },
            'S' => Atom::Class { ranges: space_ranges(), negated: true },
            'b' | 'B' | 'A' | 'z' | 'Z' => Atom::Empty,
            'n' => Atom::Literal('\n'),
            't' => Atom::Literal('\t'),
            'r' => Atom::Literal('\r'),
            c if c.is_ascii_digit() => return None,
            other => Atom::Literal(other),
        };
        Some(atom)
    }

    fn class(&mut self) -> Option<Atom> {
        let mut negated = false;
        if self.peek() == Some('^') {
            negated = true;
            self.pos += 1;
        }

        let mut ranges = Vec::new();
        let mut first = true;
        loop {
            let c = self.next()?;
            if c == ']' && !first {
                break;
            }
            first = false;

            let start = if c == '\\' {
                match self.next()? {
                    'd' => {
                        ranges.extend(digit_ranges());
                        continue;
                    }
                    'w' => {
                        ranges.extend(word_ranges());
                        continue;
                    }
                    's' => {
                        ranges.extend(space_ranges());
                        continue;
                    }
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                }
            } else {
                c
            };

            if self.peek() == Some('-') && self.peek_at(1).map_or(false, |n| n != ']') {
                self.pos += 1;
                let mut end = self.next()?;
                if end == '\\' {
                    end = self.next()?;
                }
                ranges.push((start, end));
            } else {
                ranges.push((start, start));
            }
        }

        Some(Atom::Class { ranges, negated })
    }

    fn quantifier(&mut self) -> (u32, Option<u32>) {
        let bounds = match self.peek() {
            Some('*') => {
                self.pos += 1;
                (0, None)
            }
            Some('+') => {
                self.pos += 1;
                (1, None)
            }
            Some('?') => {
                self.pos += 1;
                (0, Some(1))
            }
            Some('{') => match self.braces() {
                Some(bounds) => bounds,
                None => return (1, Some(1)),
            },
            _ => return (1, Some(1)),
        };

        // Lazy or possessive suffix
        if matches!(self.peek(), Some('?') | Some('+')) {
            self.pos += 1;
        }
        bounds
    }

    /// `{n}`, `{n,}` or `{n,m}`; leaves the position untouched on anything else.
    fn braces(&mut self) -> Option<(u32, Option<u32>)> {
        let start = self.pos;
        let close = self.chars[start..].iter().position(|&c| c == '}')? + start;
        let body: String = self.chars[start + 1..close].iter().collect();

        let bounds = match body.split_once(',') {
            None => {
                let n = body.trim().parse().ok()?;
                (n, Some(n))
            }
            Some((low, high)) => {
                let low = low.trim().parse().ok()?;
                let high = high.trim();
                if high.is_empty() {
                    (low, None)
                } else {
                    (low, Some(high.parse().ok()?))
                }
            }
        };
        self.pos = close + 1;
        Some(bounds)
    }
}

fn digit_ranges() -> Vec<(char, char)> {
    vec![('0', '9')]
}

fn word_ranges() -> Vec<(char, char)> {
    vec![('a', 'z'), ('A', 'Z'), ('0', '9'), ('_', '_')]
}

fn space_ranges() -> Vec<(char, char)> {
    vec![(' ', ' '), ('\t', '\t')]
}

fn render_sequence(pieces: &[Piece], out: &mut String) -> Option<()> {
    for piece in pieces {
        let count = piece.min.max(1).min(piece.max.unwrap_or(u32::MAX)).min(MAX_REPEAT);
        for _ in 0..count {
            render_atom(&piece.atom, out)?;
        }
    }
    Some(())
}

fn render_atom(atom: &Atom, out: &mut String) -> Option<()> {
    match atom {
        Atom::Literal(c) => out.push(*c),
        Atom::Any => out.push('a'),
        Atom::Class { ranges, negated } => out.push(pick_from_class(ranges, *negated)?),
        Atom::Group(branches) => render_sequence(branches.first()?, out)?,
        Atom::Empty => {}
    }
    Some(())
}

fn pick_from_class(ranges: &[(char, char)], negated: bool) -> Option<char> {
    let in_class = |c: char| ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi);
    if negated {
        return "aA0_-.x ".chars().find(|&c| !in_class(c));
    }
    ranges
        .iter()
        .map(|&(lo, _)| lo)
        .find(|c| c.is_ascii_alphanumeric())
        .or_else(|| ranges.first().map(|&(lo, _)| lo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraints, ParamLocation};

    fn param(param_type: ParamType, constraints: Constraints) -> Parameter {
        Parameter {
            constraints,
            ..Parameter::new("p", ParamLocation::Query, param_type)
        }
    }

    fn values(domain: &ValueDomain) -> Vec<Value> {
        domain.values().iter().map(|v| v.value.clone()).collect()
    }

    #[test]
    fn test_enum_values_in_declared_order_deduplicated() {
        let p = param(
            ParamType::String,
            Constraints {
                enum_values: vec![json!("b"), json!("a"), json!("b")],
                ..Default::default()
            },
        );
        assert_eq!(values(&DomainBuilder::default().build(&p)), vec![json!("b"), json!("a")]);
    }

    #[test]
    fn test_boolean_domain() {
        let p = param(ParamType::Boolean, Constraints::default());
        assert_eq!(values(&DomainBuilder::default().build(&p)), vec![json!(true), json!(false)]);
    }

    #[test]
    fn test_bounded_integer() {
        let p = param(
            ParamType::Integer,
            Constraints {
                minimum: Some(1.0),
                maximum: Some(100.0),
                ..Default::default()
            },
        );
        assert_eq!(values(&DomainBuilder::default().build(&p)), vec![json!(1), json!(100), json!(50)]);
    }

    #[test]
    fn test_exclusive_integer_bounds_shift_inward() {
        let p = param(
            ParamType::Integer,
            Constraints {
                minimum: Some(0.0),
                maximum: Some(10.0),
                exclusive_minimum: true,
                exclusive_maximum: true,
                ..Default::default()
            },
        );
        assert_eq!(values(&DomainBuilder::default().build(&p)), vec![json!(1), json!(9), json!(5)]);
    }

    #[test]
    fn test_degenerate_range_is_single_value() {
        let p = param(
            ParamType::Number,
            Constraints {
                minimum: Some(5.0),
                maximum: Some(5.0),
                ..Default::default()
            },
        );
        assert_eq!(values(&DomainBuilder::default().build(&p)), vec![json!(5.0)]);
    }

    #[test]
    fn test_pattern_domain_has_matching_and_non_matching_values() {
        let p = param(
            ParamType::String,
            Constraints {
                pattern: Some(r"^[A-Z]{3}-\d{4}$".to_string()),
                ..Default::default()
            },
        );
        let domain = DomainBuilder::default().build(&p);
        assert!(!domain.unverified);
        assert_eq!(domain.values()[0].value, json!("AAA-0000"));
        assert_eq!(domain.values()[1].kind, ValueKind::Invalid);
        assert_eq!(domain.len(), 2);
    }

    #[test]
    fn test_unsatisfiable_pattern_falls_back_unverified() {
        let p = param(
            ParamType::String,
            Constraints {
                pattern: Some(r"^(a)\1$".to_string()),
                ..Default::default()
            },
        );
        let domain = DomainBuilder::default().build(&p);
        assert!(domain.unverified);
        assert_eq!(values(&domain), vec![json!("string")]);
        assert!(domain.fallback_reason.is_some());
    }

    #[test]
    fn test_synthesizer_constructs() {
        let cases = [
            r"^(foo|bar)baz$",
            r"^[^@\s]+@[a-z]+\.[a-z]{2,}$",
            r"^\d+(\.\d{1,2})?$",
            r"^(?:[A-Fa-f0-9]{2}:){5}[A-Fa-f0-9]{2}$",
            r"^v\d+\.\d+\.\d+(-[a-z]+)?$",
            r"^[\w.-]+$",
        ];
        for pattern in cases {
            let candidate = synthesize_match(pattern).unwrap();
            assert!(Regex::new(pattern).unwrap().is_match(&candidate), "{} -> {}", pattern, candidate);
        }
    }

    #[test]
    fn test_length_bounds_produce_boundary_and_invalid_strings() {
        let p = param(
            ParamType::String,
            Constraints {
                min_length: Some(2),
                max_length: Some(4),
                ..Default::default()
            },
        );
        assert_eq!(
            values(&DomainBuilder::default().build(&p)),
            vec![json!("aa"), json!("aaaa"), json!("a"), json!("aaaaa")]
        );
    }

    #[test]
    fn test_unconstrained_placeholders() {
        let builder = DomainBuilder::default();
        assert_eq!(values(&builder.build(&param(ParamType::String, Constraints::default()))), vec![json!("string")]);
        assert_eq!(values(&builder.build(&param(ParamType::Integer, Constraints::default()))), vec![json!(0)]);

        let unknown = builder.build(&param(ParamType::Unknown("file".to_string()), Constraints::default()));
        assert_eq!(unknown.len(), 1);
        assert!(unknown.fallback_reason.is_some());
    }

    #[test]
    fn test_format_placeholder() {
        let p = param(
            ParamType::String,
            Constraints {
                format: Some("uuid".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            values(&DomainBuilder::default().build(&p)),
            vec![json!("3fa85f64-5717-4562-b3fc-2c963f66afa6")]
        );
    }
}
