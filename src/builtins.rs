use crate::ast::Type;
use crate::interpreter::RuntimeError;
use crate::source::Position;
use crate::value::{Shape, Value};

/// Functions resolved before user definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFunction {
    Print,
    GetInt,
    GetFloat,
    GetString,
}

impl BuiltinFunction {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "print" => Some(BuiltinFunction::Print),
            "get_int" => Some(BuiltinFunction::GetInt),
            "get_float" => Some(BuiltinFunction::GetFloat),
            "get_string" => Some(BuiltinFunction::GetString),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFunction::Print => "print",
            BuiltinFunction::GetInt => "get_int",
            BuiltinFunction::GetFloat => "get_float",
            BuiltinFunction::GetString => "get_string",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            BuiltinFunction::Print => 1,
            BuiltinFunction::GetInt | BuiltinFunction::GetFloat | BuiltinFunction::GetString => 0,
        }
    }

    /// Converts one line of console input into the function's result.
    pub fn parse_input(self, line: &str, position: Position) -> Result<Value, RuntimeError> {
        let text = line.trim_end_matches(['\n', '\r']);
        let invalid = |expected: &str| RuntimeError::Console {
            message: format!("expected {}, got '{}'", expected, text),
            position,
        };
        match self {
            BuiltinFunction::GetInt => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| invalid("an integer")),
            BuiltinFunction::GetFloat => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid("a float")),
            BuiltinFunction::GetString => Ok(Value::String(text.to_string())),
            BuiltinFunction::Print => Err(invalid("no input")),
        }
    }
}

/// Methods callable as `value.name(args)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMethod {
    Length,
    Add,
    Delete,
    Get,
    Contains,
    First,
    Second,
    At,
    Append,
    Remove,
    Type,
}

impl BuiltinMethod {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "length" => Some(BuiltinMethod::Length),
            "add" => Some(BuiltinMethod::Add),
            "delete" => Some(BuiltinMethod::Delete),
            "get" => Some(BuiltinMethod::Get),
            "contains" => Some(BuiltinMethod::Contains),
            "first" => Some(BuiltinMethod::First),
            "second" => Some(BuiltinMethod::Second),
            "at" => Some(BuiltinMethod::At),
            "append" => Some(BuiltinMethod::Append),
            "remove" => Some(BuiltinMethod::Remove),
            "type" => Some(BuiltinMethod::Type),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinMethod::Length => "length",
            BuiltinMethod::Add => "add",
            BuiltinMethod::Delete => "delete",
            BuiltinMethod::Get => "get",
            BuiltinMethod::Contains => "contains",
            BuiltinMethod::First => "first",
            BuiltinMethod::Second => "second",
            BuiltinMethod::At => "at",
            BuiltinMethod::Append => "append",
            BuiltinMethod::Remove => "remove",
            BuiltinMethod::Type => "type",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            BuiltinMethod::Length | BuiltinMethod::First | BuiltinMethod::Second | BuiltinMethod::Type => 0,
            BuiltinMethod::Delete
            | BuiltinMethod::Get
            | BuiltinMethod::Contains
            | BuiltinMethod::At
            | BuiltinMethod::Append
            | BuiltinMethod::Remove => 1,
            BuiltinMethod::Add => 2,
        }
    }

    /// Methods whose result replaces the receiver's variable.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            BuiltinMethod::Add | BuiltinMethod::Delete | BuiltinMethod::Append | BuiltinMethod::Remove
        )
    }

    /// Applies the method to an evaluated receiver. `declared` is the
    /// receiver variable's declared type, when the receiver is a variable.
    /// The caller has already checked the argument count.
    pub fn apply(
        self,
        receiver: Value,
        args: Vec<Value>,
        declared: Option<&Type>,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        let unsupported = |receiver: &Value| RuntimeError::UnknownMethod {
            method: self.name().to_string(),
            receiver: receiver.type_name(),
            position,
        };
        let mut args = args.into_iter();
        let mut arg = || args.next().ok_or(RuntimeError::WrongArgumentCount {
            name: self.name().to_string(),
            expected: self.arity(),
            found: 0,
            position,
        });

        match (self, receiver) {
            (BuiltinMethod::Length, Value::List(items)) => Ok(Value::Int(items.len() as i64)),
            (BuiltinMethod::Length, Value::Dict(dict)) => Ok(Value::Int(dict.len() as i64)),
            (BuiltinMethod::Length, Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),

            (BuiltinMethod::Add, Value::Dict(mut dict)) => {
                let key = arg()?;
                let value = arg()?;
                admit(Shape::of_all(dict.iter().map(|(k, _)| k)), &key, position)?;
                admit(Shape::of_all(dict.iter().map(|(_, v)| v)), &value, position)?;
                dict.insert(key, value);
                Ok(Value::Dict(dict))
            }
            (BuiltinMethod::Add, Value::List(mut items)) => {
                let index = list_index(&arg()?, items.len() + 1, position)?;
                let value = arg()?;
                admit(Shape::of_all(&items), &value, position)?;
                items.insert(index, value);
                Ok(Value::List(items))
            }

            (BuiltinMethod::Delete, Value::Dict(mut dict)) => {
                let key = arg()?;
                if dict.remove(&key).is_none() {
                    return Err(RuntimeError::KeyNotFound {
                        key: key.to_string(),
                        position,
                    });
                }
                Ok(Value::Dict(dict))
            }
            (BuiltinMethod::Delete, Value::List(mut items)) => {
                let index = list_index(&arg()?, items.len(), position)?;
                items.remove(index);
                Ok(Value::List(items))
            }

            (BuiltinMethod::Get, Value::Dict(dict)) => {
                let key = arg()?;
                dict.get(&key).cloned().ok_or(RuntimeError::KeyNotFound {
                    key: key.to_string(),
                    position,
                })
            }

            (BuiltinMethod::Contains, Value::Dict(dict)) => Ok(Value::Bool(dict.contains_key(&arg()?))),
            (BuiltinMethod::Contains, Value::List(items)) => {
                let needle = arg()?;
                Ok(Value::Bool(items.iter().any(|item| item.equals(&needle) == Some(true))))
            }

            (BuiltinMethod::First, Value::Pair(first, _)) => Ok(*first),
            (BuiltinMethod::Second, Value::Pair(_, second)) => Ok(*second),

            (BuiltinMethod::At, Value::List(mut items)) => {
                let index = list_index(&arg()?, items.len(), position)?;
                Ok(items.swap_remove(index))
            }

            (BuiltinMethod::Append, Value::List(mut items)) => {
                let value = arg()?;
                admit(Shape::of_all(&items), &value, position)?;
                items.push(value);
                Ok(Value::List(items))
            }

            (BuiltinMethod::Remove, Value::List(mut items)) => {
                let value = arg()?;
                match items.iter().position(|item| item.equals(&value) == Some(true)) {
                    Some(index) => {
                        items.remove(index);
                        Ok(Value::List(items))
                    }
                    None => Err(RuntimeError::ValueNotFound {
                        value: value.to_string(),
                        position,
                    }),
                }
            }

            (BuiltinMethod::Type, receiver) => Ok(Value::String(type_of(&receiver, declared))),

            (_, receiver) => Err(unsupported(&receiver)),
        }
    }
}

/// Element type for lists, full type for everything else.
fn type_of(receiver: &Value, declared: Option<&Type>) -> String {
    match (declared, receiver) {
        (Some(Type::List(elem)), _) => elem.to_string(),
        (Some(ty), _) => ty.to_string(),
        (None, Value::List(items)) => Shape::of_all(items).to_string(),
        (None, other) => other.type_name(),
    }
}

fn list_index(index: &Value, len: usize, position: Position) -> Result<usize, RuntimeError> {
    match index {
        Value::Int(i) if *i >= 0 && (*i as usize) < len => Ok(*i as usize),
        Value::Int(i) => Err(RuntimeError::IndexOutOfRange {
            index: *i,
            length: len,
            position,
        }),
        other => Err(RuntimeError::WrongType {
            expected: "int".to_string(),
            found: other.type_name(),
            position,
        }),
    }
}

// Checks a new element against the shape of the elements already stored.
fn admit(mut shape: Shape, incoming: &Value, position: Position) -> Result<(), RuntimeError> {
    if shape.admit(incoming) {
        return Ok(());
    }
    Err(RuntimeError::WrongType {
        expected: shape.to_string(),
        found: incoming.type_name(),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DictValue;

    fn pos() -> Position {
        Position::new(1, 1)
    }

    #[test]
    fn arities_are_fixed() {
        assert_eq!(BuiltinMethod::Add.arity(), 2);
        assert_eq!(BuiltinMethod::At.arity(), 1);
        assert_eq!(BuiltinMethod::Length.arity(), 0);
        assert_eq!(BuiltinFunction::Print.arity(), 1);
        assert_eq!(BuiltinFunction::GetInt.arity(), 0);
    }

    #[test]
    fn list_add_inserts_at_position() {
        let list = Value::List(vec![Value::Int(1), Value::Int(3)]);
        let result = BuiltinMethod::Add
            .apply(list, vec![Value::Int(1), Value::Int(2)], None, pos())
            .unwrap();
        assert_eq!(result, Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn list_add_may_append_at_end() {
        let list = Value::List(vec![Value::Int(1)]);
        let result = BuiltinMethod::Add
            .apply(list, vec![Value::Int(1), Value::Int(2)], None, pos())
            .unwrap();
        assert_eq!(result, Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn at_rejects_negative_index() {
        let list = Value::List(vec![Value::Int(1)]);
        let err = BuiltinMethod::At.apply(list, vec![Value::Int(-1)], None, pos()).unwrap_err();
        assert!(matches!(err, RuntimeError::IndexOutOfRange { index: -1, length: 1, .. }));
    }

    #[test]
    fn delete_missing_key_fails() {
        let dict = Value::Dict(DictValue::new());
        let err = BuiltinMethod::Delete.apply(dict, vec![Value::Int(1)], None, pos()).unwrap_err();
        assert!(matches!(err, RuntimeError::KeyNotFound { .. }));
    }

    #[test]
    fn append_keeps_list_homogeneous() {
        let list = Value::List(vec![Value::Int(1)]);
        let err = BuiltinMethod::Append
            .apply(list, vec![Value::String("a".into())], None, pos())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::WrongType { .. }));
    }

    #[test]
    fn append_checks_against_every_element() {
        let list = Value::List(vec![
            Value::List(vec![]),
            Value::List(vec![Value::Int(1)]),
        ]);
        let err = BuiltinMethod::Append
            .apply(list, vec![Value::List(vec![Value::String("a".into())])], None, pos())
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::WrongType {
                expected: "List<int>".to_string(),
                found: "List<string>".to_string(),
                position: pos(),
            }
        );
    }

    #[test]
    fn dict_add_checks_against_every_value() {
        let dict: DictValue = vec![
            (Value::Int(1), Value::List(vec![])),
            (Value::Int(2), Value::List(vec![Value::Int(1)])),
        ]
        .into_iter()
        .collect();
        let err = BuiltinMethod::Add
            .apply(
                Value::Dict(dict),
                vec![Value::Int(3), Value::List(vec![Value::Bool(true)])],
                None,
                pos(),
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::WrongType { ref expected, .. } if expected == "List<int>"));
    }

    #[test]
    fn contains_and_remove_compare_numbers_by_value() {
        let list = Value::List(vec![Value::Float(1.0), Value::Float(2.5)]);
        let found = BuiltinMethod::Contains
            .apply(list.clone(), vec![Value::Int(1)], None, pos())
            .unwrap();
        assert_eq!(found, Value::Bool(true));
        let rest = BuiltinMethod::Remove.apply(list, vec![Value::Int(1)], None, pos()).unwrap();
        assert_eq!(rest, Value::List(vec![Value::Float(2.5)]));
    }

    #[test]
    fn type_prefers_declared_element_type() {
        let declared = Type::List(Box::new(Type::Float));
        let result = BuiltinMethod::Type
            .apply(Value::List(vec![]), vec![], Some(&declared), pos())
            .unwrap();
        assert_eq!(result, Value::String("float".into()));
    }

    #[test]
    fn pair_methods_on_list_are_unknown() {
        let err = BuiltinMethod::First
            .apply(Value::List(vec![]), vec![], None, pos())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownMethod { .. }));
    }

    #[test]
    fn get_int_parses_trimmed_line() {
        assert_eq!(BuiltinFunction::GetInt.parse_input(" 42\n", pos()).unwrap(), Value::Int(42));
        assert!(BuiltinFunction::GetInt.parse_input("x\n", pos()).is_err());
    }
}
