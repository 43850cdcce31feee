use crate::ast::Position;
use crate::diagnostic::{pretty_join, Diagnostic, UnitSink};
use serde_json::{json, Value};
use std::fmt::{Display, Formatter};

/// Slot types named by the block tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    Number,
    PositiveNumber,
    Integer,
    PositiveInteger,
    Angle,
    Color,
    String,
    Boolean,
    Reference,
    FunctionReference,
}

impl SlotType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "number" => SlotType::Number,
            "positive_number" => SlotType::PositiveNumber,
            "integer" => SlotType::Integer,
            "positive_integer" => SlotType::PositiveInteger,
            "angle" => SlotType::Angle,
            "color" => SlotType::Color,
            "string" => SlotType::String,
            "boolean" => SlotType::Boolean,
            "reference" => SlotType::Reference,
            "functionreference" => SlotType::FunctionReference,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            SlotType::Number => "number",
            SlotType::PositiveNumber => "positive_number",
            SlotType::Integer => "integer",
            SlotType::PositiveInteger => "positive_integer",
            SlotType::Angle => "angle",
            SlotType::Color => "color",
            SlotType::String => "string",
            SlotType::Boolean => "boolean",
            SlotType::Reference => "reference",
            SlotType::FunctionReference => "functionreference",
        }
    }

    /// Human readable form used in hints, e.g. "positive integer".
    pub fn describe(self) -> String {
        self.name().replace('_', " ")
    }

    /// Casts a raw value into this slot. `None` means the value does not fit.
    pub fn cast(self, value: &RawValue) -> Option<Expression> {
        let text = match value {
            RawValue::Empty => return None,
            RawValue::Expr(expr) if expr.passes_through() => return Some(expr.clone()),
            RawValue::Expr(Expression::Primitive(primitive)) => primitive.literal_text()?,
            RawValue::Expr(Expression::Shadow { .. }) => return None,
            RawValue::Text(text) => text.clone(),
        };
        let primitive = match self {
            SlotType::Number => Primitive::Number(parse_num(&text)?),
            SlotType::PositiveNumber => {
                let num = parse_num(&text)?;
                if num.as_f64() < 0.0 {
                    return None;
                }
                Primitive::PositiveNumber(num)
            }
            SlotType::Integer => Primitive::Integer(parse_integer(&text)?),
            SlotType::PositiveInteger => {
                let value = parse_integer(&text)?;
                if value.as_f64() < 0.0 {
                    return None;
                }
                Primitive::PositiveInteger(value)
            }
            SlotType::Angle => {
                let rounded = parse_num(&text)?.as_f64().round();
                if !(0.0..=360.0).contains(&rounded) {
                    return None;
                }
                Primitive::Angle(rounded as i64)
            }
            SlotType::Color => parse_color(&text)?,
            SlotType::String => Primitive::String(text),
            SlotType::Boolean => return None,
            SlotType::Reference => Primitive::Reference(text),
            SlotType::FunctionReference => Primitive::FunctionReference(text),
        };
        Some(Expression::Primitive(primitive))
    }

    /// The canonical zero value placed in front of a plugged slot.
    pub fn default_primitive(self) -> Option<Primitive> {
        match self {
            SlotType::Number => Some(Primitive::Number(Num::Int(0))),
            SlotType::PositiveNumber => Some(Primitive::PositiveNumber(Num::Int(0))),
            SlotType::Integer => Some(Primitive::Integer(Num::Int(0))),
            SlotType::PositiveInteger => Some(Primitive::PositiveInteger(Num::Int(0))),
            SlotType::Angle => Some(Primitive::Angle(0)),
            SlotType::Color => Some(Primitive::Color { r: 0, g: 0, b: 0 }),
            SlotType::String => Some(Primitive::String(String::new())),
            SlotType::Boolean | SlotType::Reference | SlotType::FunctionReference => None,
        }
    }
}

impl Display for SlotType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(value) => value as f64,
            Num::Float(value) => value,
        }
    }
}

impl Display for Num {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Num::Int(value) => write!(f, "{}", value),
            Num::Float(value) => write!(f, "{}", value),
        }
    }
}

fn parse_num(text: &str) -> Option<Num> {
    let value: f64 = text.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(Num::Int(value as i64))
    } else {
        Some(Num::Float(value))
    }
}

/// Integral values too large for `i64` stay floats but still count.
fn parse_integer(text: &str) -> Option<Num> {
    match parse_num(text)? {
        Num::Float(value) if value.fract() != 0.0 => None,
        num => Some(num),
    }
}

fn parse_color(text: &str) -> Option<Primitive> {
    let hex = text.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Primitive::Color {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Reference(String),
    FunctionReference(String),
    Number(Num),
    PositiveNumber(Num),
    Integer(Num),
    PositiveInteger(Num),
    Angle(i64),
    Color { r: u8, g: u8, b: u8 },
    String(String),
    Broadcast { name: String, id: String },
    Variable { name: String, id: String },
    List { name: String, id: String },
    /// Points at a node in the graph.
    Node(String),
    /// Points at an argument reporter node reading a procedure parameter.
    Parameter(String),
    Error,
}

impl Primitive {
    /// Text of a literal primitive, used when a literal is recast to another slot.
    fn literal_text(&self) -> Option<String> {
        match self {
            Primitive::Number(num)
            | Primitive::PositiveNumber(num)
            | Primitive::Integer(num)
            | Primitive::PositiveInteger(num) => Some(num.to_string()),
            Primitive::Angle(value) => Some(value.to_string()),
            Primitive::Color { r, g, b } => Some(format!("#{:02x}{:02x}{:02x}", r, g, b)),
            Primitive::String(text) => Some(text.clone()),
            Primitive::Broadcast { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.literal_text().is_some()
    }

    pub fn render(&self) -> Value {
        match self {
            Primitive::FunctionReference(id) => json!([1, id]),
            Primitive::Reference(id) | Primitive::Node(id) | Primitive::Parameter(id) => json!([2, id]),
            Primitive::Number(num) => json!([1, [4, num.to_string()]]),
            Primitive::PositiveNumber(num) => json!([1, [5, num.to_string()]]),
            Primitive::PositiveInteger(value) => json!([1, [6, value.to_string()]]),
            Primitive::Integer(value) => json!([1, [7, value.to_string()]]),
            Primitive::Angle(value) => json!([1, [8, value.to_string()]]),
            Primitive::Color { r, g, b } => json!([1, [9, format!("#{:02x}{:02x}{:02x}", r, g, b)]]),
            Primitive::String(text) => json!([1, [10, text]]),
            Primitive::Broadcast { name, id } => json!([1, [11, name, id]]),
            Primitive::Variable { name, id } => json!([3, [12, name, id], [4, "0"]]),
            Primitive::List { name, id } => json!([3, [13, name, id], [4, "0"]]),
            Primitive::Error => json!([null]),
        }
    }

    /// The part of the rendering that sits inside a shadow pair.
    fn render_inner(&self) -> Value {
        match self.render() {
            Value::Array(mut items) if items.len() > 1 => items.swap_remove(1),
            _ => Value::Null,
        }
    }
}

/// A fully resolved slot value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Primitive(Primitive),
    /// `front` is the literal fallback, `back` the supplied value.
    Shadow { front: Primitive, back: Primitive },
}

impl Expression {
    pub fn error() -> Self {
        Expression::Primitive(Primitive::Error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Expression::Primitive(Primitive::Error))
    }

    /// Values coming from a sub-expression or a variable keep their shape in any slot.
    pub fn passes_through(&self) -> bool {
        match self {
            Expression::Shadow { .. } => true,
            Expression::Primitive(primitive) => matches!(
                primitive,
                Primitive::Node(_)
                    | Primitive::Parameter(_)
                    | Primitive::Variable { .. }
                    | Primitive::List { .. }
                    | Primitive::Error
            ),
        }
    }

    pub fn render(&self) -> Value {
        match self {
            Expression::Primitive(primitive) => primitive.render(),
            Expression::Shadow { front, back } => json!([3, back.render_inner(), front.render_inner()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Variable { name: String, id: String },
    Input { name: String },
}

impl Field {
    pub fn render(&self) -> Value {
        match self {
            Field::Variable { name, id } => json!([name, id]),
            Field::Input { name } => json!([name, null]),
        }
    }
}

/// What an argument looks like before it is cast into its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Text(String),
    Expr(Expression),
}

impl RawValue {
    fn describe(&self) -> String {
        match self {
            RawValue::Empty => "nothing".to_string(),
            RawValue::Text(text) => format!("{:?}", text),
            RawValue::Expr(Expression::Primitive(primitive)) => match primitive.literal_text() {
                Some(text) => format!("{:?}", text),
                None => "an expression".to_string(),
            },
            RawValue::Expr(Expression::Shadow { .. }) => "an expression".to_string(),
        }
    }
}

pub fn cast_to(value: &RawValue, slot: SlotType, sink: &UnitSink, at: Option<Position>) -> Expression {
    if let RawValue::Expr(expr) = value {
        if expr.is_error() {
            return expr.clone();
        }
    }
    match slot.cast(value) {
        Some(expr) => expr,
        None => {
            sink.throw(
                Diagnostic::type_error(format!("Can't cast {} to {}.", value.describe(), slot))
                    .with_hint(format!("Replace the value in the input with a {}.", slot.describe()))
                    .at_opt(at),
            );
            Expression::error()
        }
    }
}

pub fn validate_arg(value: RawValue, slot: SlotType, sink: &UnitSink, at: Option<Position>) -> Expression {
    cast_to(&value, slot, sink, at)
}

/// Checks arity, then casts every value. Excess values are dropped and
/// missing ones padded with empty slots.
pub fn validate_args(
    mut values: Vec<RawValue>,
    slots: &[SlotType],
    sink: &UnitSink,
    at: Option<Position>,
) -> Vec<Expression> {
    let names: Vec<String> = slots.iter().map(|s| s.name().to_string()).collect();
    if values.len() > slots.len() {
        let supplied: Vec<String> = values.iter().map(RawValue::describe).collect();
        sink.throw(
            Diagnostic::argument(format!(
                "Too many arguments supplied, requested {}, got {} ({}).",
                slots.len(),
                values.len(),
                pretty_join(&supplied, " and ")
            ))
            .with_hint(format!(
                "The requested types are {}, {} in total.",
                pretty_join(&names, " and "),
                slots.len()
            ))
            .at_opt(at),
        );
        values.truncate(slots.len());
    }
    if values.len() < slots.len() {
        let missing = slots.len() - values.len();
        sink.throw(
            Diagnostic::argument(format!(
                "Too few arguments supplied, requested {}, got {}.",
                slots.len(),
                values.len()
            ))
            .with_hint(format!("Add {} argument{}.", missing, if missing > 1 { "s" } else { "" }))
            .at_opt(at),
        );
        values.resize(slots.len(), RawValue::Empty);
    }
    values
        .iter()
        .zip(slots)
        .map(|(value, slot)| cast_to(value, *slot, sink, at))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticKind, Diagnostics};

    fn text(value: &str) -> RawValue {
        RawValue::Text(value.to_string())
    }

    #[test]
    fn numbers_keep_integral_values_as_integers() {
        assert_eq!(
            SlotType::Number.cast(&text("10")),
            Some(Expression::Primitive(Primitive::Number(Num::Int(10))))
        );
        assert_eq!(
            SlotType::Number.cast(&text("10.0")),
            Some(Expression::Primitive(Primitive::Number(Num::Int(10))))
        );
        assert_eq!(
            SlotType::Number.cast(&text("2.5")),
            Some(Expression::Primitive(Primitive::Number(Num::Float(2.5))))
        );
        assert_eq!(SlotType::Number.cast(&text("ten")), None);
    }

    #[test]
    fn recasting_a_literal_is_idempotent() {
        let once = SlotType::Number.cast(&text("4.0")).unwrap();
        let twice = SlotType::Number.cast(&RawValue::Expr(once.clone())).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn angle_accepts_rounded_values_in_range() {
        for (input, ok) in [
            ("0", true),
            ("360", true),
            ("360.4", true),
            ("360.6", false),
            ("-0.4", true),
            ("-1", false),
            ("90", true),
        ] {
            assert_eq!(SlotType::Angle.cast(&text(input)).is_some(), ok, "angle {}", input);
        }
    }

    #[test]
    fn positive_integer_requires_integral_non_negative() {
        assert!(SlotType::PositiveInteger.cast(&text("3")).is_some());
        assert!(SlotType::PositiveInteger.cast(&text("0")).is_some());
        assert!(SlotType::PositiveInteger.cast(&text("3.5")).is_none());
        assert!(SlotType::PositiveInteger.cast(&text("-2")).is_none());
        assert!(SlotType::PositiveNumber.cast(&text("-0.5")).is_none());
    }

    #[test]
    fn references_pass_through_every_slot() {
        let values = [
            Expression::Primitive(Primitive::Node("n1".into())),
            Expression::Primitive(Primitive::Parameter("p1".into())),
            Expression::Primitive(Primitive::Variable {
                name: "x".into(),
                id: "v1".into(),
            }),
        ];
        for slot in [
            SlotType::Number,
            SlotType::Angle,
            SlotType::String,
            SlotType::Boolean,
            SlotType::Color,
            SlotType::Reference,
        ] {
            for value in &values {
                assert_eq!(slot.cast(&RawValue::Expr(value.clone())).as_ref(), Some(value));
            }
        }
    }

    #[test]
    fn empty_fails_every_cast() {
        assert!(SlotType::String.cast(&RawValue::Empty).is_none());
        assert!(SlotType::Reference.cast(&RawValue::Empty).is_none());
    }

    #[test]
    fn colors_parse_hex_triplets() {
        assert_eq!(
            SlotType::Color.cast(&text("#ff8000")),
            Some(Expression::Primitive(Primitive::Color { r: 255, g: 128, b: 0 }))
        );
        assert!(SlotType::Color.cast(&text("orange")).is_none());
    }

    #[test]
    fn error_placeholders_are_not_reported_twice() {
        let diagnostics = Diagnostics::new();
        let sink = diagnostics.sink(None);
        let result = cast_to(&RawValue::Expr(Expression::error()), SlotType::Number, &sink, None);
        assert!(result.is_error());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn too_many_arguments_truncate() {
        let diagnostics = Diagnostics::new();
        let sink = diagnostics.sink(None);
        let result = validate_args(vec![text("1"), text("2")], &[SlotType::Number], &sink, None);
        assert_eq!(result.len(), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::Argument), 1);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn too_few_arguments_pad_and_fail_casting() {
        let diagnostics = Diagnostics::new();
        let sink = diagnostics.sink(None);
        let result = validate_args(vec![text("1")], &[SlotType::Number, SlotType::Number], &sink, None);
        assert_eq!(result.len(), 2);
        assert!(result[1].is_error());
        assert_eq!(diagnostics.count(DiagnosticKind::Argument), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::Type), 1);
    }

    #[test]
    fn shadow_renders_value_before_fallback() {
        let shadow = Expression::Shadow {
            front: Primitive::Number(Num::Int(0)),
            back: Primitive::Node("abc".into()),
        };
        assert_eq!(shadow.render(), json!([3, "abc", [4, "0"]]));
    }

    #[test]
    fn defaults_exist_only_for_literal_slots() {
        assert_eq!(SlotType::String.default_primitive(), Some(Primitive::String(String::new())));
        assert_eq!(SlotType::PositiveInteger.default_primitive(), Some(Primitive::PositiveInteger(Num::Int(0))));
        assert_eq!(SlotType::Boolean.default_primitive(), None);
    }

    #[test]
    fn integral_values_beyond_i64_still_fit_integer_slots() {
        let cast = SlotType::PositiveInteger.cast(&text("100000000000000000000"));
        assert_eq!(
            cast,
            Some(Expression::Primitive(Primitive::PositiveInteger(Num::Float(1e20))))
        );
        assert_eq!(
            cast.map(|expr| expr.render()),
            Some(json!([1, [6, "100000000000000000000"]]))
        );
        assert!(SlotType::Integer.cast(&text("-1e20")).is_some());
        assert!(SlotType::PositiveInteger.cast(&text("-1e20")).is_none());
    }

    #[test]
    fn substack_and_prototype_references_do_not_pass_through() {
        assert_eq!(
            SlotType::Reference.cast(&text("n1")),
            Some(Expression::Primitive(Primitive::Reference("n1".into())))
        );
        let substack = RawValue::Expr(Expression::Primitive(Primitive::Reference("n1".into())));
        assert!(SlotType::String.cast(&substack).is_none());
        let prototype = RawValue::Expr(Expression::Primitive(Primitive::FunctionReference("f1".into())));
        assert!(SlotType::Number.cast(&prototype).is_none());
    }
}
