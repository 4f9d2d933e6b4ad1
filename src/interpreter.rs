use crate::ast::*;
use crate::builtins::{BuiltinFunction, BuiltinMethod};
use crate::scope::{Binding, CallState, Environment, Scope};
use crate::source::Position;
use crate::value::{DictValue, Shape, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Undefined variable {name} at {position}")]
    UndefinedVariable { name: String, position: Position },
    #[error("Function {name} is not defined at {position}")]
    FunctionNotDefined { name: String, position: Position },
    #[error("Function {name} is already defined at {position}")]
    FunctionAlreadyDefined { name: String, position: Position },
    #[error("Wrong type at {position}: expected {expected}, found {found}")]
    WrongType {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("Wrong return type at {position}: expected {expected}, found {found}")]
    WrongReturnType {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("List elements differ in type at {position}")]
    HeterogeneousList { position: Position },
    #[error("Division by zero at {position}")]
    DivisionByZero { position: Position },
    #[error("Maximum call depth of {limit} exceeded at {position}")]
    RecursionLimit { limit: usize, position: Position },
    #[error("Too many iterations (limit {limit}) at {position}")]
    IterationLimit { limit: usize, position: Position },
    #[error("{name} takes {expected} argument(s) but {found} were given at {position}")]
    WrongArgumentCount {
        name: String,
        expected: usize,
        found: usize,
        position: Position,
    },
    #[error("{receiver} has no method {method} at {position}")]
    UnknownMethod {
        method: String,
        receiver: String,
        position: Position,
    },
    #[error("Index {index} out of range for length {length} at {position}")]
    IndexOutOfRange {
        index: i64,
        length: usize,
        position: Position,
    },
    #[error("Key {key} not found at {position}")]
    KeyNotFound { key: String, position: Position },
    #[error("Value {value} not found at {position}")]
    ValueNotFound { value: String, position: Position },
    #[error("Arithmetic overflow at {position}")]
    ArithmeticOverflow { position: Position },
    #[error("Function {name} ended without returning a value (called at {position})")]
    MissingReturn { name: String, position: Position },
    #[error("Console error at {position}: {message}")]
    Console { message: String, position: Position },
}

impl RuntimeError {
    pub fn position(&self) -> Position {
        match self {
            RuntimeError::UndefinedVariable { position, .. }
            | RuntimeError::FunctionNotDefined { position, .. }
            | RuntimeError::FunctionAlreadyDefined { position, .. }
            | RuntimeError::WrongType { position, .. }
            | RuntimeError::WrongReturnType { position, .. }
            | RuntimeError::HeterogeneousList { position }
            | RuntimeError::DivisionByZero { position }
            | RuntimeError::RecursionLimit { position, .. }
            | RuntimeError::IterationLimit { position, .. }
            | RuntimeError::WrongArgumentCount { position, .. }
            | RuntimeError::UnknownMethod { position, .. }
            | RuntimeError::IndexOutOfRange { position, .. }
            | RuntimeError::KeyNotFound { position, .. }
            | RuntimeError::ValueNotFound { position, .. }
            | RuntimeError::ArithmeticOverflow { position }
            | RuntimeError::MissingReturn { position, .. }
            | RuntimeError::Console { position, .. } => *position,
        }
    }

    fn wrong_type(expected: impl ToString, found: &Value, position: Position) -> Self {
        RuntimeError::WrongType {
            expected: expected.to_string(),
            found: found.type_name(),
            position,
        }
    }
}

/// Resource bounds enforced during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of simultaneously active function frames.
    pub max_call_depth: usize,
    /// Maximum number of passes a single `while` loop may run.
    pub max_loop_iterations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_call_depth: 10,
            max_loop_iterations: 100,
        }
    }
}

/// Control flow signal
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    Continue,
    Return(Value),
}

/// Tree-walking evaluator over a parsed [`Program`].
pub struct Interpreter {
    functions: HashMap<String, Rc<Function>>,
    env: Environment,
    limits: Limits,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Interpreter::with_io(limits, io::BufReader::new(io::stdin()), io::stdout())
    }

    /// Builds an interpreter reading `get_*` input from `input` and writing
    /// `print` output to `output`.
    pub fn with_io(limits: Limits, input: impl BufRead + 'static, output: impl Write + 'static) -> Self {
        Interpreter {
            functions: HashMap::new(),
            env: Environment::new(),
            limits,
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Registers every function, initialises globals, then calls `main`.
    pub fn run(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.load(program)?;
        self.call_main()
    }

    /// Registers the program's functions and initialises its globals in
    /// source order. Definitions accumulate across calls.
    pub fn load(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for func in program.functions() {
            self.define_function(func)?;
        }
        for stmt in program.globals() {
            let result = self.exec_stmt(stmt);
            self.recover(result)?;
        }
        Ok(())
    }

    pub fn define_function(&mut self, func: &Function) -> Result<(), RuntimeError> {
        if self.functions.contains_key(&func.name) || BuiltinFunction::lookup(&func.name).is_some() {
            return Err(RuntimeError::FunctionAlreadyDefined {
                name: func.name.clone(),
                position: func.position,
            });
        }
        debug!(function = %func.name, params = func.params.len(), "registered function");
        self.functions.insert(func.name.clone(), Rc::new(func.clone()));
        Ok(())
    }

    pub fn call_main(&mut self) -> Result<Value, RuntimeError> {
        let main = self
            .functions
            .get("main")
            .cloned()
            .ok_or(RuntimeError::FunctionNotDefined {
                name: "main".to_string(),
                position: Position::new(1, 1),
            })?;
        let position = main.position;
        let result = self.invoke(main, Vec::new(), position);
        self.recover(result)
    }

    /// Evaluates a standalone expression against the globals.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        let result = self.eval_expr(expr);
        self.recover(result)
    }

    /// Forgets every function and global.
    pub fn reset(&mut self) {
        self.functions.clear();
        self.env = Environment::new();
    }

    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn globals(&self) -> &HashMap<String, Binding> {
        self.env.globals()
    }

    // A failed run leaves frames behind; drop them so the globals stay usable.
    fn recover<T>(&mut self, result: Result<T, RuntimeError>) -> Result<T, RuntimeError> {
        if result.is_err() {
            self.env.unwind();
        }
        result
    }

    fn call_function(&mut self, name: &str, args: &[Expr], position: Position) -> Result<Value, RuntimeError> {
        if let Some(builtin) = BuiltinFunction::lookup(name) {
            let values = self.eval_args(args)?;
            check_arity(name, builtin.arity(), values.len(), position)?;
            return self.call_builtin(builtin, values, position);
        }
        let func = self.lookup_function(name, position)?;
        let values = self.eval_args(args)?;
        self.invoke(func, values, position)
    }

    fn lookup_function(&self, name: &str, position: Position) -> Result<Rc<Function>, RuntimeError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::FunctionNotDefined {
                name: name.to_string(),
                position,
            })
    }

    fn invoke(&mut self, func: Rc<Function>, args: Vec<Value>, call_site: Position) -> Result<Value, RuntimeError> {
        check_arity(&func.name, func.params.len(), args.len(), call_site)?;
        if self.env.depth() >= self.limits.max_call_depth {
            return Err(RuntimeError::RecursionLimit {
                limit: self.limits.max_call_depth,
                position: call_site,
            });
        }

        let mut params = Scope::new();
        for ((ty, name), value) in func.params.iter().zip(args) {
            if !value.conforms_to(ty) {
                return Err(RuntimeError::wrong_type(ty, &value, call_site));
            }
            params.vars.insert(name.clone(), Binding::new(ty.clone(), value));
        }

        self.env.push_frame(&func.name, func.return_type.clone(), call_site, params);
        self.env.advance(CallState::Running);
        debug!(function = %func.name, depth = self.env.depth(), "call");

        // A `Return` flow only completes the call once the return statement
        // has moved the frame to `Returning`.
        let result = match self.exec_block(&func.body) {
            Ok(ControlFlow::Return(value)) if self.env.advance(CallState::Completed) => Ok(value),
            Ok(_) => Err(RuntimeError::MissingReturn {
                name: func.name.clone(),
                position: call_site,
            }),
            Err(e) => Err(e),
        };
        if let Some(frame) = self.env.pop_frame() {
            debug!(
                function = %frame.function,
                call_site = %frame.call_site,
                state = ?frame.state,
                "frame popped"
            );
        }
        result
    }

    fn call_builtin(
        &mut self,
        builtin: BuiltinFunction,
        mut args: Vec<Value>,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        let console = |err: io::Error| RuntimeError::Console {
            message: err.to_string(),
            position,
        };
        match builtin {
            BuiltinFunction::Print => {
                let value = args.pop().ok_or(RuntimeError::WrongArgumentCount {
                    name: builtin.name().to_string(),
                    expected: 1,
                    found: 0,
                    position,
                })?;
                writeln!(self.output, "{}", value).map_err(console)?;
                self.output.flush().map_err(console)?;
                Ok(value)
            }
            BuiltinFunction::GetInt | BuiltinFunction::GetFloat | BuiltinFunction::GetString => {
                let mut line = String::new();
                if self.input.read_line(&mut line).map_err(console)? == 0 {
                    return Err(RuntimeError::Console {
                        message: "unexpected end of input".to_string(),
                        position,
                    });
                }
                builtin.parse_input(&line, position)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    pub fn exec_block(&mut self, block: &Block) -> Result<ControlFlow, RuntimeError> {
        for stmt in &block.statements {
            if let ControlFlow::Return(value) = self.exec_stmt(stmt)? {
                return Ok(ControlFlow::Return(value));
            }
        }
        Ok(ControlFlow::Continue)
    }

    // Runs a block inside a fresh child scope.
    fn exec_scoped(&mut self, block: &Block, bound: Option<(&str, Binding)>) -> Result<ControlFlow, RuntimeError> {
        self.env.push_scope();
        if let Some((name, binding)) = bound {
            self.env.declare(name, binding);
        }
        let flow = self.exec_block(block);
        self.env.pop_scope();
        flow
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<ControlFlow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Declaration(ty, name) => {
                if self.env.depth() == 0 {
                    debug!(global = %name, "initialised global");
                }
                self.env.declare(name, Binding::new(ty.clone(), Value::default_for(ty)));
                Ok(ControlFlow::Continue)
            }

            StmtKind::Init(ty, name, init) => {
                let value = self.eval_expr(init)?;
                if !value.conforms_to(ty) {
                    return Err(RuntimeError::wrong_type(ty, &value, init.position));
                }
                if self.env.depth() == 0 {
                    debug!(global = %name, value = %value, "initialised global");
                }
                self.env.declare(name, Binding::new(ty.clone(), value));
                Ok(ControlFlow::Continue)
            }

            StmtKind::Assign(name, expr) => {
                if self.env.lookup(name).is_none() {
                    return Err(RuntimeError::UndefinedVariable {
                        name: name.clone(),
                        position: stmt.position,
                    });
                }
                let value = self.eval_expr(expr)?;
                self.store(name, value, expr.position)?;
                Ok(ControlFlow::Continue)
            }

            StmtKind::If(cond, then_block, else_block) => {
                if self.eval_bool(cond)? {
                    self.exec_block(then_block)
                } else if let Some(else_block) = else_block {
                    self.exec_block(else_block)
                } else {
                    Ok(ControlFlow::Continue)
                }
            }

            StmtKind::While(cond, body) => {
                let limit = self.limits.max_loop_iterations;
                let mut passes = 0;
                while self.eval_bool(cond)? {
                    if passes == limit {
                        return Err(RuntimeError::IterationLimit {
                            limit,
                            position: stmt.position,
                        });
                    }
                    passes += 1;
                    trace!(pass = passes, "while pass");
                    if let ControlFlow::Return(value) = self.exec_scoped(body, None)? {
                        return Ok(ControlFlow::Return(value));
                    }
                }
                Ok(ControlFlow::Continue)
            }

            StmtKind::For(for_loop) => {
                let items = self.loop_items(for_loop, stmt.position)?;
                self.run_for(for_loop, items)
            }

            StmtKind::ForSorted(for_loop, key_fn) => {
                let items = self.loop_items(for_loop, stmt.position)?;
                let func = self.lookup_function(key_fn, stmt.position)?;
                let mut keyed = Vec::with_capacity(items.len());
                for item in items {
                    let key = self.invoke(Rc::clone(&func), vec![item.clone()], stmt.position)?;
                    keyed.push((key, item));
                }
                let sorted = sort_by_key(keyed, stmt.position)?;
                self.run_for(for_loop, sorted)
            }

            StmtKind::Return(expr) => {
                let value = self.eval_expr(expr)?;
                if let Some(frame) = self.env.current_frame() {
                    if !value.conforms_to(&frame.return_type) {
                        return Err(RuntimeError::WrongReturnType {
                            expected: frame.return_type.to_string(),
                            found: value.type_name(),
                            position: stmt.position,
                        });
                    }
                }
                self.env.advance(CallState::Returning);
                Ok(ControlFlow::Return(value))
            }

            StmtKind::Expr(expr) => {
                self.eval_expr(expr)?;
                Ok(ControlFlow::Continue)
            }
        }
    }

    // Writes a new value into an existing variable, checking its declared type.
    fn store(&mut self, name: &str, value: Value, position: Position) -> Result<(), RuntimeError> {
        let binding = self
            .env
            .lookup_mut(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.to_string(),
                position,
            })?;
        if !value.conforms_to(&binding.ty) {
            return Err(RuntimeError::wrong_type(&binding.ty, &value, position));
        }
        binding.value = value;
        Ok(())
    }

    // Elements for `for`: list items, or dict entries as pairs.
    fn loop_items(&mut self, for_loop: &ForLoop, position: Position) -> Result<Vec<Value>, RuntimeError> {
        let items = match self.eval_expr(&for_loop.collection)? {
            Value::List(items) => items,
            Value::Dict(dict) => dict.iter().map(|(k, v)| Value::pair(k.clone(), v.clone())).collect(),
            other => return Err(RuntimeError::wrong_type("List or Dict", &other, for_loop.collection.position)),
        };
        if let Some(item) = items.iter().find(|item| !item.conforms_to(&for_loop.var_type)) {
            return Err(RuntimeError::wrong_type(&for_loop.var_type, item, position));
        }
        Ok(items)
    }

    fn run_for(&mut self, for_loop: &ForLoop, items: Vec<Value>) -> Result<ControlFlow, RuntimeError> {
        for item in items {
            trace!(var = %for_loop.var_name, item = %item, "for pass");
            let binding = Binding::new(for_loop.var_type.clone(), item);
            if let ControlFlow::Return(value) = self.exec_scoped(&for_loop.body, Some((for_loop.var_name.as_str(), binding)))? {
                return Ok(ControlFlow::Return(value));
            }
        }
        Ok(ControlFlow::Continue)
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::IntLit(n) => Ok(Value::Int(*n)),
            ExprKind::FloatLit(f) => Ok(Value::Float(*f)),
            ExprKind::BoolLit(b) => Ok(Value::Bool(*b)),
            ExprKind::StringLit(s) => Ok(Value::String(s.clone())),

            ExprKind::List(elements) => {
                let mut items: Vec<Value> = Vec::with_capacity(elements.len());
                let mut shape = Shape::Unknown;
                for element in elements {
                    let value = self.eval_expr(element)?;
                    if !shape.admit(&value) {
                        return Err(RuntimeError::HeterogeneousList {
                            position: element.position,
                        });
                    }
                    items.push(value);
                }
                Ok(Value::List(items))
            }

            ExprKind::Pair(first, second) => {
                let first = self.eval_expr(first)?;
                let second = self.eval_expr(second)?;
                Ok(Value::pair(first, second))
            }

            ExprKind::Dict(entries) => {
                let mut dict = DictValue::new();
                let (mut key_shape, mut value_shape) = (Shape::Unknown, Shape::Unknown);
                for (key_expr, value_expr) in entries {
                    let key = self.eval_expr(key_expr)?;
                    if !key_shape.admit(&key) {
                        return Err(RuntimeError::wrong_type(&key_shape, &key, key_expr.position));
                    }
                    let value = self.eval_expr(value_expr)?;
                    if !value_shape.admit(&value) {
                        return Err(RuntimeError::wrong_type(&value_shape, &value, value_expr.position));
                    }
                    dict.insert(key, value);
                }
                Ok(Value::Dict(dict))
            }

            ExprKind::Var(name) => self
                .env
                .lookup(name)
                .map(|binding| binding.value.clone())
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: name.clone(),
                    position: expr.position,
                }),

            ExprKind::BinOp(left, BinOp::And, right) => {
                Ok(Value::Bool(self.eval_bool(left)? && self.eval_bool(right)?))
            }
            ExprKind::BinOp(left, BinOp::Or, right) => {
                Ok(Value::Bool(self.eval_bool(left)? || self.eval_bool(right)?))
            }
            ExprKind::BinOp(left, op, right) => {
                let l = self.eval_expr(left)?;
                let r = self.eval_expr(right)?;
                eval_binop(l, *op, r, expr.position)
            }

            ExprKind::UnaryOp(op, operand) => {
                let v = self.eval_expr(operand)?;
                match (op, v) {
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(RuntimeError::ArithmeticOverflow { position: expr.position }),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Neg, other) => Err(RuntimeError::wrong_type("int or float", &other, operand.position)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Not, other) => Err(RuntimeError::wrong_type(Type::Bool, &other, operand.position)),
                }
            }

            ExprKind::Call(name, args) => self.call_function(name, args, expr.position),

            ExprKind::MethodCall(receiver, name, args) => self.call_method(receiver, name, args, expr.position),

            ExprKind::Query(query) => self.eval_query(query),
        }
    }

    fn eval_bool(&mut self, expr: &Expr) -> Result<bool, RuntimeError> {
        match self.eval_expr(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::wrong_type(Type::Bool, &other, expr.position)),
        }
    }

    fn call_method(
        &mut self,
        receiver: &Expr,
        name: &str,
        args: &[Expr],
        position: Position,
    ) -> Result<Value, RuntimeError> {
        let target = self.eval_expr(receiver)?;
        let args = self.eval_args(args)?;
        let method = BuiltinMethod::lookup(name).ok_or_else(|| RuntimeError::UnknownMethod {
            method: name.to_string(),
            receiver: target.type_name(),
            position,
        })?;
        check_arity(name, method.arity(), args.len(), position)?;

        let variable = match &receiver.kind {
            ExprKind::Var(var) => Some(var.as_str()),
            _ => None,
        };
        let declared = variable.and_then(|var| self.env.lookup(var)).map(|binding| binding.ty.clone());
        let result = method.apply(target, args, declared.as_ref(), position)?;

        if let (true, Some(var)) = (method.is_mutating(), variable) {
            self.store(var, result.clone(), position)?;
        }
        Ok(result)
    }

    fn eval_query(&mut self, query: &Query) -> Result<Value, RuntimeError> {
        let dict = match self.eval_expr(&query.source)? {
            Value::Dict(dict) => dict,
            other => return Err(RuntimeError::wrong_type("Dict", &other, query.source.position)),
        };

        let mut rows: Vec<(Value, Value)> = Vec::new();
        let mut shape = Shape::Unknown;
        for (key, value) in dict.iter() {
            let entry = Value::pair(key.clone(), value.clone());
            if !entry.conforms_to(&query.var_type) {
                return Err(RuntimeError::wrong_type(&query.var_type, &entry, query.source.position));
            }
            trace!(var = %query.var_name, entry = %entry, "query entry");

            self.env.push_scope();
            self.env
                .declare(&query.var_name, Binding::new(query.var_type.clone(), entry));
            let row = self.eval_query_entry(query);
            self.env.pop_scope();

            if let Some((selected, order)) = row? {
                if !shape.admit(&selected) {
                    return Err(RuntimeError::HeterogeneousList {
                        position: query.select.position,
                    });
                }
                rows.push((selected, order));
            }
        }

        let selected = match &query.order_by {
            Some(order_by) => {
                let keyed = rows.into_iter().map(|(selected, order)| (order, selected)).collect();
                sort_by_key(keyed, order_by.position)?
            }
            None => rows.into_iter().map(|(selected, _)| selected).collect(),
        };
        Ok(Value::List(selected))
    }

    // Returns the projected value and its ordering key, or None when filtered out.
    fn eval_query_entry(&mut self, query: &Query) -> Result<Option<(Value, Value)>, RuntimeError> {
        if let Some(filter) = &query.filter {
            if !self.eval_bool(filter)? {
                return Ok(None);
            }
        }
        let selected = self.eval_expr(&query.select)?;
        let order = match &query.order_by {
            Some(order_by) => self.eval_expr(order_by)?,
            None => Value::Bool(false),
        };
        Ok(Some((selected, order)))
    }
}

fn check_arity(name: &str, expected: usize, found: usize, position: Position) -> Result<(), RuntimeError> {
    if expected == found {
        return Ok(());
    }
    Err(RuntimeError::WrongArgumentCount {
        name: name.to_string(),
        expected,
        found,
        position,
    })
}

/// Stable ascending sort of `(key, item)` rows by key; keys must be mutually
/// comparable.
fn sort_by_key(mut rows: Vec<(Value, Value)>, position: Position) -> Result<Vec<Value>, RuntimeError> {
    if let Some((first, _)) = rows.first() {
        if let Some((key, _)) = rows.iter().find(|(key, _)| first.compare(key).is_none()) {
            return Err(RuntimeError::wrong_type(first.type_name(), key, position));
        }
    }
    rows.sort_by(|a, b| a.0.compare(&b.0).unwrap_or(Ordering::Equal));
    Ok(rows.into_iter().map(|(_, item)| item).collect())
}

fn eval_binop(left: Value, op: BinOp, right: Value, position: Position) -> Result<Value, RuntimeError> {
    let overflow = RuntimeError::ArithmeticOverflow { position };
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => match (left, right) {
            (Value::Int(l), Value::Int(r)) => {
                let result = match op {
                    BinOp::Add => l.checked_add(r),
                    BinOp::Sub => l.checked_sub(r),
                    BinOp::Mul => l.checked_mul(r),
                    _ if r == 0 => return Err(RuntimeError::DivisionByZero { position }),
                    _ => l.checked_div(r),
                };
                result.map(Value::Int).ok_or(overflow)
            }
            (Value::String(l), Value::String(r)) if op == BinOp::Add => Ok(Value::String(l + &r)),
            (l, r) => {
                let (Some(a), Some(b)) = (as_float(&l), as_float(&r)) else {
                    let culprit = if as_float(&l).is_none() { l } else { r };
                    return Err(RuntimeError::wrong_type("int or float", &culprit, position));
                };
                match op {
                    BinOp::Add => Ok(Value::Float(a + b)),
                    BinOp::Sub => Ok(Value::Float(a - b)),
                    BinOp::Mul => Ok(Value::Float(a * b)),
                    _ if b == 0.0 => Err(RuntimeError::DivisionByZero { position }),
                    _ => Ok(Value::Float(a / b)),
                }
            }
        },
        BinOp::Eq | BinOp::Ne => {
            let equal = left
                .equals(&right)
                .ok_or_else(|| RuntimeError::wrong_type(left.type_name(), &right, position))?;
            Ok(Value::Bool(if op == BinOp::Eq { equal } else { !equal }))
        }
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = left
                .compare(&right)
                .ok_or_else(|| RuntimeError::wrong_type(left.type_name(), &right, position))?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Gt => ordering == Ordering::Greater,
                BinOp::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinOp::And | BinOp::Or => unreachable!("logical operators short-circuit in eval_expr"),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::cell::RefCell;

    /// Shared buffer so tests can read back what `print` wrote.
    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn program(source: &str) -> Program {
        Parser::new(source).unwrap().parse_program().unwrap()
    }

    fn run(source: &str) -> Result<Value, RuntimeError> {
        let mut interp = Interpreter::with_io(Limits::default(), io::empty(), io::sink());
        interp.run(&program(source))
    }

    #[test]
    fn test_main_result() {
        assert_eq!(run("function int main() { return 3 + 1; }"), Ok(Value::Int(4)));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let src = "function bool main() { return false && 1 / 0 == 1; }";
        assert_eq!(run(src), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_logical_operands_must_be_bool_when_evaluated() {
        for src in [
            "function bool main() { return true && 1; }",
            "function bool main() { return false || 1; }",
            "function bool main() { return 1 && false; }",
        ] {
            assert!(matches!(
                run(src),
                Err(RuntimeError::WrongType { ref expected, .. }) if expected == "bool"
            ));
        }
        assert_eq!(run("function bool main() { return true || 1; }"), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_int_division_truncates() {
        assert_eq!(run("function int main() { return -7 / 2; }"), Ok(Value::Int(-3)));
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        assert_eq!(run("function float main() { return 1 + 0.5; }"), Ok(Value::Float(1.5)));
    }

    #[test]
    fn test_if_block_shares_enclosing_scope() {
        let src = "function int main() { if (true) { int x = 3; } return x; }";
        assert_eq!(run(src), Ok(Value::Int(3)));
    }

    #[test]
    fn test_loop_variable_is_scoped() {
        let src = "function int main() { for (int i in [1, 2]) { } return i; }";
        assert!(matches!(run(src), Err(RuntimeError::UndefinedVariable { .. })));
    }

    #[test]
    fn test_method_writes_back_to_variable() {
        let src = "function int main() { List<int> xs = [1]; xs.append(2); return xs.length(); }";
        assert_eq!(run(src), Ok(Value::Int(2)));
    }

    #[test]
    fn test_missing_return() {
        let src = "function int main() { int x = 1; }";
        assert!(matches!(run(src), Err(RuntimeError::MissingReturn { .. })));
    }

    #[test]
    fn test_callee_return_does_not_complete_caller() {
        let src = "function int one() { return 1; } function int main() { one(); }";
        assert!(matches!(
            run(src),
            Err(RuntimeError::MissingReturn { ref name, .. }) if name == "main"
        ));
    }

    #[test]
    fn test_failed_call_leaves_no_frames() {
        let mut interp = Interpreter::with_io(Limits::default(), io::empty(), io::sink());
        let prog = program("int g = 4; function int boom() { return 1 / 0; }");
        interp.load(&prog).unwrap();
        let call = Parser::new("boom()").unwrap().parse_standalone_expr().unwrap();
        assert!(interp.evaluate(&call).is_err());
        let read = Parser::new("g").unwrap().parse_standalone_expr().unwrap();
        assert_eq!(interp.evaluate(&read), Ok(Value::Int(4)));
    }

    #[test]
    fn test_print_writes_and_returns_argument() {
        let out = Capture::default();
        let mut interp = Interpreter::with_io(Limits::default(), io::empty(), out.clone());
        let result = interp.run(&program("function int main() { return print(5) + 1; }"));
        assert_eq!(result, Ok(Value::Int(6)));
        assert_eq!(String::from_utf8_lossy(&out.0.borrow()), "5\n");
    }

    #[test]
    fn test_get_int_reads_input_line() {
        let input = io::Cursor::new("41\n");
        let mut interp = Interpreter::with_io(Limits::default(), input, io::sink());
        let result = interp.run(&program("function int main() { return get_int() + 1; }"));
        assert_eq!(result, Ok(Value::Int(42)));
    }

    #[test]
    fn test_custom_depth_limit() {
        let limits = Limits {
            max_call_depth: 3,
            ..Limits::default()
        };
        let mut interp = Interpreter::with_io(limits, io::empty(), io::sink());
        let src = "function int f(int n) { return f(n + 1); } function int main() { return f(0); }";
        let err = interp.run(&program(src)).unwrap_err();
        assert!(matches!(err, RuntimeError::RecursionLimit { limit: 3, .. }));
    }
}
