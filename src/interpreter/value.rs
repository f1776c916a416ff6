use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ErrorKind;
use crate::lexer::{Span, TokenKind};
use crate::parser::ast::Node;

use super::scope::ScopeId;

/// A failed value operation, before the interpreter attaches span and
/// traceback information.
#[derive(Debug, Clone, PartialEq)]
pub struct OpError {
    pub kind: ErrorKind,
    pub details: String,
}

impl OpError {
    pub fn new(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
        }
    }

    fn math(details: impl Into<String>) -> Self {
        Self::new(ErrorKind::Math, details)
    }
}

pub type OpResult<T = Value> = Result<T, OpError>;

/// Integers and floats unified behind one numeric kind. Integer arithmetic
/// spills into floats on overflow rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(value) => *value as f64,
            Number::Float(value) => *value,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            Number::Int(value) => Some(*value),
            Number::Float(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Int(value) => *value == 0,
            Number::Float(value) => *value == 0.0,
        }
    }

    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_add(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 + b as f64)),
            _ => Number::Float(self.as_f64() + other.as_f64()),
        }
    }

    fn sub(self, other: Self) -> Self {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_sub(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 - b as f64)),
            _ => Number::Float(self.as_f64() - other.as_f64()),
        }
    }

    fn mul(self, other: Self) -> Self {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a
                .checked_mul(b)
                .map(Number::Int)
                .unwrap_or(Number::Float(a as f64 * b as f64)),
            _ => Number::Float(self.as_f64() * other.as_f64()),
        }
    }

    /// True division always produces a float.
    fn div(self, other: Self) -> OpResult<Self> {
        if other.is_zero() {
            return Err(OpError::math("division by zero"));
        }
        Ok(Number::Float(self.as_f64() / other.as_f64()))
    }

    /// Floor division; the result floors toward negative infinity.
    fn floor_div(self, other: Self) -> OpResult<Self> {
        if other.is_zero() {
            return Err(OpError::math("division by zero"));
        }
        Ok(match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                let quotient = a / b;
                let remainder = a % b;
                if remainder != 0 && (remainder < 0) != (b < 0) {
                    Number::Int(quotient - 1)
                } else {
                    Number::Int(quotient)
                }
            }
            _ => Number::Float((self.as_f64() / other.as_f64()).floor()),
        })
    }

    /// Remainder with the sign of the divisor.
    fn modulo(self, other: Self) -> OpResult<Self> {
        if other.is_zero() {
            return Err(OpError::math("division by zero"));
        }
        Ok(match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                let remainder = a % b;
                if remainder != 0 && (remainder < 0) != (b < 0) {
                    Number::Int(remainder + b)
                } else {
                    Number::Int(remainder)
                }
            }
            _ => {
                let (a, b) = (self.as_f64(), other.as_f64());
                let remainder = a % b;
                if remainder != 0.0 && (remainder < 0.0) != (b < 0.0) {
                    Number::Float(remainder + b)
                } else {
                    Number::Float(remainder)
                }
            }
        })
    }

    fn pow(self, other: Self) -> Self {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) if b >= 0 => u32::try_from(b)
                .ok()
                .and_then(|exp| a.checked_pow(exp))
                .map(Number::Int)
                .unwrap_or(Number::Float((a as f64).powf(b as f64))),
            _ => Number::Float(self.as_f64().powf(other.as_f64())),
        }
    }

    fn bitwise(self, other: Self, op: &TokenKind) -> OpResult<Self> {
        let (Number::Int(a), Number::Int(b)) = (self, other) else {
            return Err(OpError::math(format!(
                "invalid operation: {} (for {} and {})",
                op.describe(),
                self,
                other
            )));
        };
        if matches!(op, TokenKind::Shl | TokenKind::Shr) && b < 0 {
            return Err(OpError::math("negative shift count"));
        }
        Ok(Number::Int(match op {
            TokenKind::BitAnd => a & b,
            TokenKind::BitOr => a | b,
            TokenKind::BitXor => a ^ b,
            TokenKind::Shl => a.checked_shl(b.try_into().unwrap_or(64)).unwrap_or(0),
            TokenKind::Shr => a.checked_shr(b.try_into().unwrap_or(64)).unwrap_or(0),
            _ => unreachable!(),
        }))
    }

    pub fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) if value.is_nan() => write!(f, "nan"),
            Number::Float(value) if value.is_infinite() => {
                write!(f, "{}inf", if *value < 0.0 { "-" } else { "" })
            }
            Number::Float(value) => write!(f, "{value:?}"),
        }
    }
}

/// Dict keys compare by value; `1` and `1.0` are the same key, containers and
/// functions are unhashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Null,
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Str(String),
}

impl DictKey {
    pub fn of(value: &Value) -> OpResult<Self> {
        Ok(match &value.kind {
            ValueKind::Null => DictKey::Null,
            ValueKind::Bool(b) => DictKey::Bool(*b),
            ValueKind::Number(Number::Int(i)) => DictKey::Int(*i),
            ValueKind::Number(Number::Float(f)) => {
                // Integral floats collapse onto the integer key.
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    DictKey::Int(*f as i64)
                } else {
                    DictKey::FloatBits(f.to_bits())
                }
            }
            ValueKind::Str(s) => DictKey::Str(s.to_string()),
            _ => {
                return Err(OpError::new(
                    ErrorKind::Dict,
                    format!("unhashable value: {value}"),
                ))
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            DictKey::Null => Value::null(),
            DictKey::Bool(b) => Value::bool(*b),
            DictKey::Int(i) => Value::int(*i),
            DictKey::FloatBits(bits) => Value::float(f64::from_bits(*bits)),
            DictKey::Str(s) => Value::str(s.clone()),
        }
    }
}

/// A user-defined function: the body it shares with the AST, its argument
/// names, and the scope it captured at definition time.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub args: Vec<String>,
    pub body: Rc<Node>,
    pub auto_return: bool,
    pub scope: ScopeId,
}

/// A host-provided function. Receives already-evaluated values; any failure
/// it reports surfaces as a FunctionError.
pub struct Native {
    pub name: &'static str,
    pub func: super::builtins::NativeFn,
}

impl std::fmt::Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

/// A function bound to a receiver on attribute access; the receiver is
/// prepended to the arguments at call time.
#[derive(Debug)]
pub struct Member {
    pub receiver: Value,
    pub func: Value,
}

/// A named attribute bag created by `namespace`.
#[derive(Debug)]
pub struct NamespaceVal {
    pub name: String,
}

/// An opaque host object exposed through the plugin hook.
#[derive(Debug)]
pub struct SingleVal {
    pub label: String,
}

pub type Attrs = Rc<RefCell<IndexMap<String, Value>>>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<IndexMap<DictKey, Value>>>;

#[derive(Debug, Clone)]
pub enum ValueKind {
    Null,
    Bool(bool),
    Number(Number),
    Str(Rc<String>),
    List(ListRef),
    Dict(DictRef),
    Function(Rc<Function>),
    Native(Rc<Native>),
    Member(Rc<Member>),
    Namespace(Rc<NamespaceVal>),
    Single(Rc<SingleVal>),
}

/// A runtime value: the tagged payload plus the attribute map every value
/// owns and an optional span for diagnostics. Cloning shares the payload and
/// the attributes.
#[derive(Debug, Clone)]
pub struct Value {
    pub kind: ValueKind,
    pub attrs: Attrs,
    pub span: Option<Span>,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            attrs: Rc::new(RefCell::new(IndexMap::new())),
            span: None,
        }
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Number(Number::Int(value)))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ValueKind::Number(Number::Float(value)))
    }

    pub fn number(value: Number) -> Self {
        Self::new(ValueKind::Number(value))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::new(ValueKind::Str(Rc::new(value.into())))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::new(ValueKind::List(Rc::new(RefCell::new(items))))
    }

    pub fn dict(items: IndexMap<DictKey, Value>) -> Self {
        Self::new(ValueKind::Dict(Rc::new(RefCell::new(items))))
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Null => "null",
            ValueKind::Bool(_) => "bool",
            ValueKind::Number(Number::Int(_)) => "int",
            ValueKind::Number(Number::Float(_)) => "float",
            ValueKind::Str(_) => "string",
            ValueKind::List(_) => "list",
            ValueKind::Dict(_) => "dict",
            ValueKind::Function(_) => "function",
            ValueKind::Native(_) => "built-in function",
            ValueKind::Member(_) => "member-function",
            ValueKind::Namespace(_) => "namespace",
            ValueKind::Single(_) => "single",
        }
    }

    pub fn is_true(&self) -> bool {
        match &self.kind {
            ValueKind::Null => false,
            ValueKind::Bool(value) => *value,
            ValueKind::Number(number) => !number.is_zero(),
            ValueKind::Str(value) => !value.is_empty(),
            ValueKind::List(items) => !items.borrow().is_empty(),
            ValueKind::Dict(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    fn as_number_for_cmp(&self) -> Option<Number> {
        match &self.kind {
            ValueKind::Number(number) => Some(*number),
            ValueKind::Bool(value) => Some(Number::Int(*value as i64)),
            _ => None,
        }
    }

    /// Value equality: numeric kinds compare by value (booleans count as 0/1),
    /// containers compare element-wise, everything else by identity.
    pub fn equals(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number_for_cmp(), other.as_number_for_cmp()) {
            return a.compare(b) == Some(Ordering::Equal);
        }
        match (&self.kind, &other.kind) {
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Str(a), ValueKind::Str(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (ValueKind::Dict(a), ValueKind::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            (ValueKind::Function(a), ValueKind::Function(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Native(a), ValueKind::Native(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Member(a), ValueKind::Member(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Namespace(a), ValueKind::Namespace(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Single(a), ValueKind::Single(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn compare(&self, other: &Value) -> OpResult<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number_for_cmp(), other.as_number_for_cmp()) {
            return a
                .compare(b)
                .ok_or_else(|| OpError::math("values are not comparable"));
        }
        match (&self.kind, &other.kind) {
            (ValueKind::Str(a), ValueKind::Str(b)) => Ok(a.cmp(b)),
            (ValueKind::List(a), ValueKind::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(self.invalid_cmp(other)),
        }
    }

    fn invalid_cmp(&self, other: &Value) -> OpError {
        OpError::math(format!(
            "invalid comparison between {} and {}",
            self.kind_name(),
            other.kind_name()
        ))
    }

    fn invalid(&self, op: &TokenKind, other: &Value) -> OpError {
        OpError::math(format!(
            "invalid operation: {} (for {} and {})",
            op.describe(),
            self,
            other
        ))
    }

    /// A stable identity tag. Heap-backed values report their shared cell, so
    /// aliases agree and equal-but-distinct values do not; scalars hash their
    /// value.
    pub fn identity(&self) -> i64 {
        fn hash_scalar<T: Hash>(tag: u8, value: &T) -> i64 {
            let mut hasher = DefaultHasher::new();
            tag.hash(&mut hasher);
            value.hash(&mut hasher);
            hasher.finish() as i64
        }

        match &self.kind {
            ValueKind::Null => hash_scalar(0, &0u8),
            ValueKind::Bool(value) => hash_scalar(1, value),
            ValueKind::Number(Number::Int(value)) => hash_scalar(2, value),
            ValueKind::Number(Number::Float(value)) => hash_scalar(2, &value.to_bits()),
            ValueKind::Str(value) => Rc::as_ptr(value) as i64,
            ValueKind::List(value) => Rc::as_ptr(value) as i64,
            ValueKind::Dict(value) => Rc::as_ptr(value) as i64,
            ValueKind::Function(value) => Rc::as_ptr(value) as i64,
            ValueKind::Native(value) => Rc::as_ptr(value) as i64,
            ValueKind::Member(value) => Rc::as_ptr(value) as i64,
            ValueKind::Namespace(value) => Rc::as_ptr(value) as i64,
            ValueKind::Single(value) => Rc::as_ptr(value) as i64,
        }
    }

    /// Unary operator dispatch. `@`-map and calls live in the interpreter;
    /// everything else is value-local.
    pub fn unary_op(&self, op: &TokenKind) -> OpResult {
        match op {
            TokenKind::Plus => match &self.kind {
                ValueKind::Number(number) => Ok(Value::number(*number)),
                ValueKind::Bool(value) => Ok(Value::int(*value as i64)),
                _ => Err(OpError::math(format!("invalid operation: + (for {self})"))),
            },
            TokenKind::Minus => match &self.kind {
                ValueKind::Number(Number::Int(value)) => Ok(Value::int(-value)),
                ValueKind::Number(Number::Float(value)) => Ok(Value::float(-value)),
                ValueKind::Bool(value) => Ok(Value::int(-(*value as i64))),
                _ => Err(OpError::math(format!("invalid operation: - (for {self})"))),
            },
            TokenKind::Not => Ok(Value::bool(!self.is_true())),
            TokenKind::Xat => Ok(Value::int(self.identity())),
            TokenKind::Invert => self.invert(),
            _ => Err(OpError::math(format!(
                "invalid operation: {} (for {self})",
                op.describe()
            ))),
        }
    }

    /// `~`: bitwise complement on integers, reversal on strings and lists,
    /// key/value inversion on dicts.
    fn invert(&self) -> OpResult {
        match &self.kind {
            ValueKind::Number(Number::Int(value)) => Ok(Value::int(!value)),
            ValueKind::Bool(value) => Ok(Value::int(!(*value as i64))),
            ValueKind::Str(value) => Ok(Value::str(value.chars().rev().collect::<String>())),
            ValueKind::List(items) => {
                Ok(Value::list(items.borrow().iter().rev().cloned().collect()))
            }
            ValueKind::Dict(items) => {
                let mut inverted = IndexMap::new();
                for (key, value) in items.borrow().iter() {
                    inverted.insert(DictKey::of(value)?, key.to_value());
                }
                Ok(Value::dict(inverted))
            }
            _ => Err(OpError::math(format!("invalid operation: ~ (for {self})"))),
        }
    }

    /// Binary operator dispatch, keyed off the left operand's variant.
    pub fn binary_op(&self, op: &TokenKind, other: &Value) -> OpResult {
        use TokenKind::*;
        match op {
            Ee => return Ok(Value::bool(self.equals(other))),
            Ne => return Ok(Value::bool(!self.equals(other))),
            Lt => return Ok(Value::bool(self.compare(other)? == Ordering::Less)),
            Lte => return Ok(Value::bool(self.compare(other)? != Ordering::Greater)),
            Gt => return Ok(Value::bool(self.compare(other)? == Ordering::Greater)),
            Gte => return Ok(Value::bool(self.compare(other)? != Ordering::Less)),
            // a :: b reads "a in b".
            Double => return other.contains(self),
            Question => return Ok(Value::list(vec![self.clone(), other.clone()])),
            Arrow => return self.index_by(other),
            _ => {}
        }

        match &self.kind {
            ValueKind::Number(number) => self.number_op(*number, op, other),
            ValueKind::Bool(value) => {
                // Booleans arithmetic like 0/1.
                self.number_op(Number::Int(*value as i64), op, other)
            }
            ValueKind::Str(value) => self.str_op(value, op, other),
            ValueKind::List(items) => self.list_op(items, op, other),
            ValueKind::Dict(items) => self.dict_op(items, op, other),
            _ => Err(self.invalid(op, other)),
        }
    }

    fn number_op(&self, number: Number, op: &TokenKind, other: &Value) -> OpResult {
        use TokenKind::*;

        // Repetition with the container on the right.
        if let (Mul, Number::Int(count)) = (op, number) {
            match &other.kind {
                ValueKind::Str(value) => return Ok(repeat_str(value, count)),
                ValueKind::List(items) => return Ok(repeat_list(&items.borrow(), count)),
                _ => {}
            }
        }

        let rhs = match other.as_number_for_cmp() {
            Some(rhs) => rhs,
            None => return Err(self.invalid(op, other)),
        };
        Ok(match op {
            Plus => Value::number(number.add(rhs)),
            Minus => Value::number(number.sub(rhs)),
            Mul => Value::number(number.mul(rhs)),
            Div => Value::number(number.div(rhs)?),
            Floor => Value::number(number.floor_div(rhs)?),
            Mod => Value::number(number.modulo(rhs)?),
            Pow => Value::number(number.pow(rhs)),
            BitAnd | BitOr | BitXor | Shl | Shr => Value::number(number.bitwise(rhs, op)?),
            _ => return Err(self.invalid(op, other)),
        })
    }

    fn str_op(&self, value: &Rc<String>, op: &TokenKind, other: &Value) -> OpResult {
        use TokenKind::*;
        match (op, &other.kind) {
            (Plus, ValueKind::Str(rhs)) => Ok(Value::str(format!("{value}{rhs}"))),
            (Mul, ValueKind::Number(Number::Int(count))) => Ok(repeat_str(value, *count)),
            // `/` on a string is index lookup.
            (Div, _) => self.index_by(other),
            _ => Err(self.invalid(op, other)),
        }
    }

    fn list_op(&self, items: &ListRef, op: &TokenKind, other: &Value) -> OpResult {
        use TokenKind::*;
        match (op, &other.kind) {
            (Plus, ValueKind::List(rhs)) => {
                let mut combined = items.borrow().clone();
                combined.extend(rhs.borrow().iter().cloned());
                Ok(Value::list(combined))
            }
            (Mul, ValueKind::Number(Number::Int(count))) => {
                Ok(repeat_list(&items.borrow(), *count))
            }
            _ => Err(self.invalid(op, other)),
        }
    }

    fn dict_op(&self, items: &DictRef, op: &TokenKind, other: &Value) -> OpResult {
        use TokenKind::*;
        match op {
            // `|` merges two dicts, right-biased.
            BitOr => {
                let ValueKind::Dict(rhs) = &other.kind else {
                    return Err(OpError::new(ErrorKind::Dict, "not a dictionary"));
                };
                let mut merged = items.borrow().clone();
                for (key, value) in rhs.borrow().iter() {
                    merged.insert(key.clone(), value.clone());
                }
                Ok(Value::dict(merged))
            }
            _ => Err(self.invalid(op, other)),
        }
    }

    /// Indexing: integer positions into strings and lists (negative counts
    /// from the end), key lookup into dicts.
    pub fn index_by(&self, index: &Value) -> OpResult {
        match &self.kind {
            ValueKind::Str(value) => {
                let chars: Vec<char> = value.chars().collect();
                let at = resolve_index(index, chars.len())?;
                Ok(Value::str(chars[at].to_string()))
            }
            ValueKind::List(items) => {
                let items = items.borrow();
                let at = resolve_index(index, items.len())?;
                Ok(items[at].clone())
            }
            ValueKind::Dict(items) => {
                let key = DictKey::of(index)?;
                items.borrow().get(&key).cloned().ok_or_else(|| {
                    OpError::new(ErrorKind::Dict, format!("key {index} not in dict"))
                })
            }
            _ => Err(OpError::math(format!(
                "invalid operation: index (for {self})"
            ))),
        }
    }

    /// Membership (`x :: self`): substring for strings, element equality for
    /// lists, key containment for dicts.
    pub fn contains(&self, other: &Value) -> OpResult {
        match &self.kind {
            ValueKind::Str(value) => {
                let ValueKind::Str(needle) = &other.kind else {
                    return Err(self.invalid(&TokenKind::Double, other));
                };
                Ok(Value::bool(value.contains(needle.as_str())))
            }
            ValueKind::List(items) => Ok(Value::bool(
                items.borrow().iter().any(|item| item.equals(other)),
            )),
            ValueKind::Dict(items) => {
                let key = DictKey::of(other)?;
                Ok(Value::bool(items.borrow().contains_key(&key)))
            }
            _ => Err(self.invalid(&TokenKind::Double, other)),
        }
    }

    /// The elements iterated by `@`-map.
    pub fn iterable_items(&self) -> OpResult<Vec<Value>> {
        match &self.kind {
            ValueKind::Str(value) => Ok(value
                .chars()
                .map(|c| Value::str(c.to_string()))
                .collect()),
            ValueKind::List(items) => Ok(items.borrow().clone()),
            ValueKind::Dict(items) => Ok(items
                .borrow()
                .iter()
                .map(|(key, value)| Value::list(vec![key.to_value(), value.clone()]))
                .collect()),
            _ => Err(OpError::math("cannot become an iterable")),
        }
    }

    pub fn getattr(&self, name: &str) -> OpResult {
        self.attrs.borrow().get(name).cloned().ok_or_else(|| {
            OpError::new(ErrorKind::Class, format!("no attribute named \"{name}\""))
        })
    }

    pub fn setattr(&self, name: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    /// The quoted form used inside containers and by the `string` builtin.
    pub fn repr(&self) -> String {
        match &self.kind {
            ValueKind::Str(value) => {
                let escaped = value
                    .replace('\\', "\\\\")
                    .replace('\'', "\\'")
                    .replace('\n', "\\n")
                    .replace('\r', "\\r")
                    .replace('\t', "\\t");
                format!("'{escaped}'")
            }
            _ => self.to_string(),
        }
    }
}

fn repeat_str(value: &str, count: i64) -> Value {
    Value::str(value.repeat(count.max(0) as usize))
}

fn repeat_list(items: &[Value], count: i64) -> Value {
    let mut result = Vec::with_capacity(items.len() * count.max(0) as usize);
    for _ in 0..count.max(0) {
        result.extend(items.iter().cloned());
    }
    Value::list(result)
}

/// Map a (possibly negative) index value onto `len`, or report why it
/// cannot be.
fn resolve_index(index: &Value, len: usize) -> OpResult<usize> {
    let ValueKind::Number(number) = &index.kind else {
        return Err(OpError::new(
            ErrorKind::List,
            format!("{index} cannot be used as an index"),
        ));
    };
    let Some(at) = number.as_index() else {
        return Err(OpError::new(
            ErrorKind::List,
            format!("{index} cannot be used as an index"),
        ));
    };
    let resolved = if at < 0 { at + len as i64 } else { at };
    if resolved < 0 || resolved >= len as i64 {
        return Err(OpError::new(ErrorKind::List, "index out of range"));
    }
    Ok(resolved as usize)
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool(value) => write!(f, "{value}"),
            ValueKind::Number(number) => write!(f, "{number}"),
            ValueKind::Str(value) => write!(f, "{value}"),
            ValueKind::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            ValueKind::Dict(items) => {
                write!(f, "{{")?;
                for (i, (key, value)) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key.to_value().repr(), value.repr())?;
                }
                write!(f, "}}")
            }
            ValueKind::Function(func) => write!(f, "<function {}>", func.name),
            ValueKind::Native(native) => write!(f, "<built-in function {}>", native.name),
            ValueKind::Member(member) => write!(f, "<member-function {}>", member.func),
            ValueKind::Namespace(namespace) => write!(f, "<namespace {}>", namespace.name),
            ValueKind::Single(single) => write!(f, "{}", single.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_arithmetic() {
        let result = Value::int(7).binary_op(&TokenKind::Plus, &Value::int(35)).unwrap();
        assert!(result.equals(&Value::int(42)));
    }

    #[test]
    fn test_true_division_yields_float() {
        let result = Value::int(7).binary_op(&TokenKind::Div, &Value::int(2)).unwrap();
        assert!(result.equals(&Value::float(3.5)));
    }

    #[test]
    fn test_floor_division_floors_toward_negative() {
        let result = Value::int(-7)
            .binary_op(&TokenKind::Floor, &Value::int(2))
            .unwrap();
        assert!(result.equals(&Value::int(-4)));
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        let result = Value::int(-7).binary_op(&TokenKind::Mod, &Value::int(3)).unwrap();
        assert!(result.equals(&Value::int(2)));
    }

    #[test]
    fn test_division_by_zero() {
        let error = Value::int(1).binary_op(&TokenKind::Div, &Value::int(0)).unwrap_err();
        assert_eq!(ErrorKind::Math, error.kind);
        assert_eq!("division by zero", error.details);
    }

    #[test]
    fn test_string_concat_and_repeat() {
        let result = Value::str("ab").binary_op(&TokenKind::Plus, &Value::str("cd")).unwrap();
        assert!(result.equals(&Value::str("abcd")));

        let result = Value::str("ab").binary_op(&TokenKind::Mul, &Value::int(3)).unwrap();
        assert!(result.equals(&Value::str("ababab")));

        let result = Value::int(2).binary_op(&TokenKind::Mul, &Value::str("xy")).unwrap();
        assert!(result.equals(&Value::str("xyxy")));
    }

    #[test]
    fn test_string_div_is_index() {
        let result = Value::str("abc").binary_op(&TokenKind::Div, &Value::int(1)).unwrap();
        assert!(result.equals(&Value::str("b")));
    }

    #[test]
    fn test_list_indexing_supports_negatives() {
        let list = Value::list(vec![Value::int(1), Value::int(2), Value::int(3)]);
        assert!(list.index_by(&Value::int(-1)).unwrap().equals(&Value::int(3)));

        let error = list.index_by(&Value::int(3)).unwrap_err();
        assert_eq!(ErrorKind::List, error.kind);
    }

    #[test]
    fn test_dict_merge_is_right_biased() {
        let mut left = IndexMap::new();
        left.insert(DictKey::Str("a".into()), Value::int(1));
        left.insert(DictKey::Str("b".into()), Value::int(2));
        let mut right = IndexMap::new();
        right.insert(DictKey::Str("b".into()), Value::int(20));

        let merged = Value::dict(left).binary_op(&TokenKind::BitOr, &Value::dict(right)).unwrap();
        assert!(merged
            .index_by(&Value::str("b"))
            .unwrap()
            .equals(&Value::int(20)));
    }

    #[test]
    fn test_membership() {
        let list = Value::list(vec![Value::int(1), Value::int(2)]);
        let result = Value::int(2).binary_op(&TokenKind::Double, &list).unwrap();
        assert!(result.is_true());

        let result = Value::str("ell")
            .binary_op(&TokenKind::Double, &Value::str("hello"))
            .unwrap();
        assert!(result.is_true());
    }

    #[test]
    fn test_invert() {
        assert!(Value::str("abc")
            .unary_op(&TokenKind::Invert)
            .unwrap()
            .equals(&Value::str("cba")));
        assert!(Value::int(0)
            .unary_op(&TokenKind::Invert)
            .unwrap()
            .equals(&Value::int(-1)));

        let mut items = IndexMap::new();
        items.insert(DictKey::Str("k".into()), Value::int(1));
        let inverted = Value::dict(items).unary_op(&TokenKind::Invert).unwrap();
        assert!(inverted
            .index_by(&Value::int(1))
            .unwrap()
            .equals(&Value::str("k")));
    }

    #[test]
    fn test_identity_is_alias_stable() {
        let list = Value::list(vec![Value::int(1)]);
        let alias = list.clone();
        let distinct = Value::list(vec![Value::int(1)]);

        assert_eq!(list.identity(), alias.identity());
        assert_ne!(list.identity(), distinct.identity());
    }

    #[test]
    fn test_bool_compares_numerically() {
        assert!(Value::bool(true).equals(&Value::int(1)));
        assert!(!Value::bool(true).equals(&Value::int(2)));
    }

    #[test]
    fn test_unsupported_op_is_math_error() {
        let error = Value::null().binary_op(&TokenKind::Plus, &Value::int(1)).unwrap_err();
        assert_eq!(ErrorKind::Math, error.kind);
    }

    #[test]
    fn test_unhashable_dict_key() {
        let error = DictKey::of(&Value::list(vec![])).unwrap_err();
        assert_eq!(ErrorKind::Dict, error.kind);
    }

    #[test]
    fn test_display_forms() {
        let list = Value::list(vec![Value::int(1), Value::str("a"), Value::null()]);
        assert_eq!("[1, 'a', null]", list.to_string());
        assert_eq!("2.5", Value::float(2.5).to_string());
        assert_eq!("2.0", Value::float(2.0).to_string());
    }
}
