use crate::ast::Type;
use std::cmp::Ordering;
use std::fmt;

/// Insertion-ordered map used for `Dict` values.
///
/// Keys are compared structurally, which also makes float keys usable
/// without hashing them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DictValue {
    entries: Vec<(Value, Value)>,
}

impl DictValue {
    pub fn new() -> Self {
        DictValue {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or overwrites; an existing key keeps its slot.
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }
}

impl FromIterator<(Value, Value)> for DictValue {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut dict = DictValue::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}

/// Runtime type of a value, with `Unknown` holes for element types that
/// only empty containers have been seen for.
///
/// Homogeneity checks fold every element into one shape, so the holes left
/// by `[]` or `{}` are filled in by later elements instead of matching
/// anything forever.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Unknown,
    Int,
    Float,
    Bool,
    String,
    List(Box<Shape>),
    Pair(Box<Shape>, Box<Shape>),
    Dict(Box<Shape>, Box<Shape>),
}

impl Shape {
    pub fn of(value: &Value) -> Shape {
        match value {
            Value::Int(_) => Shape::Int,
            Value::Float(_) => Shape::Float,
            Value::Bool(_) => Shape::Bool,
            Value::String(_) => Shape::String,
            Value::List(items) => Shape::List(Box::new(Shape::of_all(items))),
            Value::Pair(first, second) => {
                Shape::Pair(Box::new(Shape::of(first)), Box::new(Shape::of(second)))
            }
            Value::Dict(dict) => Shape::Dict(
                Box::new(Shape::of_all(dict.iter().map(|(k, _)| k))),
                Box::new(Shape::of_all(dict.iter().map(|(_, v)| v))),
            ),
        }
    }

    /// Shape shared by a run of elements, `Unknown` for none.
    pub fn of_all<'a>(values: impl IntoIterator<Item = &'a Value>) -> Shape {
        values.into_iter().fold(Shape::Unknown, |acc, value| {
            acc.unify(&Shape::of(value)).unwrap_or(acc)
        })
    }

    /// The most specific shape both sides fit, or `None` when they conflict.
    pub fn unify(&self, other: &Shape) -> Option<Shape> {
        match (self, other) {
            (Shape::Unknown, shape) | (shape, Shape::Unknown) => Some(shape.clone()),
            (Shape::List(a), Shape::List(b)) => Some(Shape::List(Box::new(a.unify(b)?))),
            (Shape::Pair(a1, a2), Shape::Pair(b1, b2)) => Some(Shape::Pair(
                Box::new(a1.unify(b1)?),
                Box::new(a2.unify(b2)?),
            )),
            (Shape::Dict(ak, av), Shape::Dict(bk, bv)) => Some(Shape::Dict(
                Box::new(ak.unify(bk)?),
                Box::new(av.unify(bv)?),
            )),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    /// Refines the shape with one more element. On a conflict the shape is
    /// left as it was and `false` is returned.
    pub fn admit(&mut self, value: &Value) -> bool {
        match self.unify(&Shape::of(value)) {
            Some(refined) => {
                *self = refined;
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Unknown => write!(f, "?"),
            Shape::Int => write!(f, "int"),
            Shape::Float => write!(f, "float"),
            Shape::Bool => write!(f, "bool"),
            Shape::String => write!(f, "string"),
            Shape::List(elem) => write!(f, "List<{}>", elem),
            Shape::Pair(first, second) => write!(f, "Pair<{}, {}>", first, second),
            Shape::Dict(key, value) => write!(f, "Dict<{}, {}>", key, value),
        }
    }
}

/// Runtime value produced by evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    List(Vec<Value>),
    Pair(Box<Value>, Box<Value>),
    Dict(DictValue),
}

impl Value {
    pub fn pair(first: Value, second: Value) -> Self {
        Value::Pair(Box::new(first), Box::new(second))
    }

    /// The value a bare declaration of `ty` starts out with.
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::Bool => Value::Bool(false),
            Type::String => Value::String(String::new()),
            Type::List(_) => Value::List(Vec::new()),
            Type::Pair(first, second) => {
                Value::pair(Value::default_for(first), Value::default_for(second))
            }
            Type::Dict(_, _) => Value::Dict(DictValue::new()),
        }
    }

    /// Structural check of this value against a declared type.
    ///
    /// Empty lists and dicts conform to any element type.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Int(_), Type::Int)
            | (Value::Float(_), Type::Float)
            | (Value::Bool(_), Type::Bool)
            | (Value::String(_), Type::String) => true,
            (Value::List(items), Type::List(elem)) => items.iter().all(|v| v.conforms_to(elem)),
            (Value::Pair(first, second), Type::Pair(first_ty, second_ty)) => {
                first.conforms_to(first_ty) && second.conforms_to(second_ty)
            }
            (Value::Dict(dict), Type::Dict(key_ty, value_ty)) => dict
                .iter()
                .all(|(k, v)| k.conforms_to(key_ty) && v.conforms_to(value_ty)),
            _ => false,
        }
    }

    /// Whether two values have the same runtime type. Element types an
    /// empty container leaves open match anything.
    pub fn same_type(&self, other: &Value) -> bool {
        Shape::of(self).unify(&Shape::of(other)).is_some()
    }

    /// Human-readable runtime type, inferred from contents; `?` marks an
    /// element type no element has revealed yet.
    pub fn type_name(&self) -> String {
        Shape::of(self).to_string()
    }

    /// Ordering used by relational operators, `orderby` and key-sorted loops.
    /// `None` when the two values are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality used by `==` and `!=`; ints and floats compare numerically.
    pub fn equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) => Some(*a as f64 == *b),
            (Value::Float(a), Value::Int(b)) => Some(*a == *b as f64),
            _ if self.same_type(other) => Some(self == other),
            _ => None,
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Pair(first, second) => {
                write!(f, "(")?;
                first.fmt_nested(f)?;
                write!(f, ", ")?;
                second.fmt_nested(f)?;
                write!(f, ")")
            }
            Value::Dict(dict) => {
                write!(f, "{{")?;
                for (i, (k, v)) in dict.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    k.fmt_nested(f)?;
                    write!(f, ": ")?;
                    v.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
        }
    }
}
