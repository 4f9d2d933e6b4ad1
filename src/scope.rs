use crate::ast::Type;
use crate::source::Position;
use crate::value::Value;
use std::collections::HashMap;

/// A variable slot: its declared type and current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: Type,
    pub value: Value,
}

impl Binding {
    pub fn new(ty: Type, value: Value) -> Self {
        Binding { ty, value }
    }
}

/// A scope containing variables
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub vars: HashMap<String, Binding>,
}

impl Scope {
    pub fn new() -> Self {
        Scope {
            vars: HashMap::new(),
        }
    }
}

/// Lifecycle of a single function activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ready,
    Running,
    Returning,
    Completed,
}

impl CallState {
    /// Frames only move forward, one step at a time; `Completed` is
    /// reachable only through `Returning`.
    pub fn can_advance_to(self, next: CallState) -> bool {
        matches!(
            (self, next),
            (CallState::Ready, CallState::Running)
                | (CallState::Running, CallState::Returning)
                | (CallState::Returning, CallState::Completed)
        )
    }
}

/// One function activation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub function: String,
    pub return_type: Type,
    pub call_site: Position,
    pub state: CallState,
    // Index of the frame's outermost scope in `Environment::scopes`.
    scope_base: usize,
}

/// Globals plus the stack of scopes and activation frames.
///
/// Every frame owns a contiguous run of scopes: the parameter scope it was
/// created with and any loop or query scopes pushed while it runs. Lookups
/// see only the current frame's run, then the globals.
#[derive(Debug, Default)]
pub struct Environment {
    globals: HashMap<String, Binding>,
    scopes: Vec<Scope>,
    frames: Vec<Frame>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    fn scope_base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.scope_base)
    }

    /// Number of active function frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Moves the current frame to `next`. Returns false, leaving the frame
    /// untouched, when there is no frame or the step is out of order.
    pub fn advance(&mut self, next: CallState) -> bool {
        match self.frames.last_mut() {
            Some(frame) if frame.state.can_advance_to(next) => {
                frame.state = next;
                true
            }
            _ => false,
        }
    }

    pub fn push_frame(&mut self, function: &str, return_type: Type, call_site: Position, params: Scope) {
        self.frames.push(Frame {
            function: function.to_string(),
            return_type,
            call_site,
            state: CallState::Ready,
            scope_base: self.scopes.len(),
        });
        self.scopes.push(params);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        self.scopes.truncate(frame.scope_base);
        Some(frame)
    }

    /// Drops every frame and scope, leaving only the globals.
    pub fn unwind(&mut self) {
        self.frames.clear();
        self.scopes.clear();
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > self.scope_base() {
            self.scopes.pop();
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes[self.scope_base()..]
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(name))
            .or_else(|| self.globals.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        let base = self.scope_base();
        match self.scopes[base..]
            .iter_mut()
            .rev()
            .find(|scope| scope.vars.contains_key(name))
        {
            Some(scope) => scope.vars.get_mut(name),
            None => self.globals.get_mut(name),
        }
    }

    /// Binds `name` in the innermost visible scope, or as a global when no
    /// scope is open.
    pub fn declare(&mut self, name: &str, binding: Binding) {
        if self.scopes.len() > self.scope_base() {
            if let Some(scope) = self.scopes.last_mut() {
                scope.vars.insert(name.to_string(), binding);
                return;
            }
        }
        self.declare_global(name, binding);
    }

    pub fn declare_global(&mut self, name: &str, binding: Binding) {
        self.globals.insert(name.to_string(), binding);
    }

    pub fn globals(&self) -> &HashMap<String, Binding> {
        &self.globals
    }
}
