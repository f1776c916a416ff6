pub mod builtins;
pub mod context;
pub mod loader;
pub mod scope;
pub mod value;

use std::path::PathBuf;
use std::rc::Rc;

use crate::error::{Error, ErrorKind};
use crate::lexer::{Span, TokenKind};
use crate::parser::ast::{Node, NodeKind, UsingMember};

use self::context::{FrameId, Frames};
use self::loader::PluginModule;
use self::scope::{ScopeId, Scopes};
use self::value::{DictKey, Function, Member, Number, OpError, Value, ValueKind};

pub const DEFAULT_MAX_RECURSION: usize = 8192;

/// Why a handler stopped early. `?` on an `Eval` is the short-circuit check:
/// every early exit propagates upward untouched until the construct that
/// consumes it (a loop, a call, a `try`) takes over.
#[derive(Debug)]
pub enum Exit {
    Return(Value),
    Break,
    Continue,
    Error(Box<Error>),
}

pub type Eval = Result<Value, Exit>;

/// Tree-walking evaluator: one handler per node variant over an arena of
/// scopes and an arena of traceback frames.
pub struct Interpreter {
    pub scopes: Scopes,
    pub frames: Frames,
    pub global: ScopeId,
    /// Visitor depth guard; overflow surfaces as a RuntimeError instead of
    /// blowing the host stack.
    depth: usize,
    pub max_depth: usize,
    /// Second entry of the module search path, after the working directory.
    pub lib_dir: PathBuf,
    pub plugins: Vec<Box<dyn PluginModule>>,
    /// Extensions reserved for plugins even when none is registered.
    pub plugin_allowlist: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut scopes = Scopes::default();
        let global = scopes.alloc(None);
        Self {
            scopes,
            frames: Frames::default(),
            global,
            depth: 0,
            max_depth: DEFAULT_MAX_RECURSION,
            lib_dir: default_lib_dir(),
            plugins: vec![],
            plugin_allowlist: vec![],
        }
    }

    /// Build a runtime error carrying the traceback for `frame`.
    pub fn error(
        &self,
        kind: ErrorKind,
        details: impl Into<String>,
        span: &Span,
        frame: FrameId,
    ) -> Exit {
        Exit::Error(Box::new(
            Error::new(kind, details, Some(span.clone()))
                .with_trace(self.frames.trace(frame, Some(span))),
        ))
    }

    fn op_error(&self, error: OpError, span: &Span, frame: FrameId) -> Exit {
        self.error(error.kind, error.details, span, frame)
    }

    pub fn visit(&mut self, node: &Node, scope: ScopeId, frame: FrameId) -> Eval {
        self.depth += 1;
        if self.depth > self.max_depth {
            self.depth -= 1;
            return Err(self.error(
                ErrorKind::Runtime,
                "maximum recursion depth exceeded",
                &node.span,
                frame,
            ));
        }
        let result = self.visit_inner(node, scope, frame);
        self.depth -= 1;
        result
    }

    fn visit_inner(&mut self, node: &Node, scope: ScopeId, frame: FrameId) -> Eval {
        let span = &node.span;
        match &node.kind {
            NodeKind::Int(value) => Ok(Value::int(*value).with_span(span.clone())),
            NodeKind::Float(value) => Ok(Value::float(*value).with_span(span.clone())),
            NodeKind::Str(value) => Ok(Value::str(value.clone()).with_span(span.clone())),
            NodeKind::Bool(value) => Ok(Value::bool(*value).with_span(span.clone())),
            NodeKind::Null => Ok(Value::null().with_span(span.clone())),

            NodeKind::Unary { op, operand } => {
                let value = self.visit(operand, scope, frame)?;
                value
                    .unary_op(op)
                    .map(|result| result.with_span(span.clone()))
                    .map_err(|error| self.op_error(error, span, frame))
            }

            NodeKind::Binary { left, op, right } => {
                let left = self.visit(left, scope, frame)?;
                let right = self.visit(right, scope, frame)?;

                // `iterable @ function` maps the callee over the elements.
                if op == &TokenKind::At {
                    let items = left
                        .iterable_items()
                        .map_err(|error| self.op_error(error, span, frame))?;
                    let mut results = Vec::with_capacity(items.len());
                    for item in items {
                        results.push(self.call_value(&right, vec![item], span, scope, frame)?);
                    }
                    return Ok(Value::list(results).with_span(span.clone()));
                }

                left.binary_op(op, &right)
                    .map(|result| result.with_span(span.clone()))
                    .map_err(|error| self.op_error(error, span, frame))
            }

            // `and` yields the left value when falsy, otherwise the right.
            NodeKind::And { left, right } => {
                let left = self.visit(left, scope, frame)?;
                if !left.is_true() {
                    return Ok(left);
                }
                self.visit(right, scope, frame)
            }

            // `or` yields the left value when truthy, otherwise the right.
            NodeKind::Or { left, right } => {
                let left = self.visit(left, scope, frame)?;
                if left.is_true() {
                    return Ok(left);
                }
                self.visit(right, scope, frame)
            }

            NodeKind::VarAccess { name } => match self.scopes.get(scope, name) {
                Some(value) => Ok(value.with_span(span.clone())),
                None => Err(self.error(
                    ErrorKind::Variable,
                    format!("\"{name}\" is not defined"),
                    span,
                    frame,
                )),
            },

            NodeKind::VarAssign { name, value } => {
                let value = self.visit(value, scope, frame)?;
                if name.starts_with("CONST") && self.scopes.get(scope, name).is_some() {
                    return Err(self.error(
                        ErrorKind::Variable,
                        format!("cannot redefine the const variable {name}"),
                        span,
                        frame,
                    ));
                }
                self.scopes.set(scope, name.clone(), value.clone());
                Ok(value.with_span(span.clone()))
            }

            NodeKind::If { cases, else_case } => {
                for case in cases {
                    let condition = self.visit(&case.condition, scope, frame)?;
                    if condition.is_true() {
                        let value = self.visit(&case.body, scope, frame)?;
                        return Ok(if case.is_block { Value::null() } else { value });
                    }
                }
                if let Some(else_case) = else_case {
                    let value = self.visit(&else_case.body, scope, frame)?;
                    return Ok(if else_case.is_block { Value::null() } else { value });
                }
                Ok(Value::null())
            }

            NodeKind::For {
                var,
                start,
                end,
                step,
                body,
                is_block,
                else_body,
            } => self.visit_for(
                var, start.as_deref(), end, step.as_deref(), body, *is_block,
                else_body.as_deref(), span, scope, frame,
            ),

            NodeKind::While {
                condition,
                body,
                is_block,
                else_body,
            } => {
                let mut elements = vec![];
                let mut broke = false;
                loop {
                    let condition = self.visit(condition, scope, frame)?;
                    if !condition.is_true() {
                        break;
                    }
                    match self.visit(body, scope, frame) {
                        Ok(value) => elements.push(value),
                        Err(Exit::Continue) => continue,
                        Err(Exit::Break) => {
                            broke = true;
                            break;
                        }
                        Err(other) => return Err(other),
                    }
                }
                if !broke {
                    if let Some(else_body) = else_body {
                        self.visit(else_body, scope, frame)?;
                    }
                }
                Ok(if *is_block {
                    Value::null()
                } else {
                    Value::list(elements).with_span(span.clone())
                })
            }

            NodeKind::Exit { status } => {
                let Some(status) = status else {
                    std::process::exit(0);
                };
                let status = self.visit(status, scope, frame)?;
                match &status.kind {
                    ValueKind::Number(number) => std::process::exit(number.as_f64() as i32),
                    _ => {
                        eprintln!("{status}");
                        std::process::exit(1);
                    }
                }
            }

            NodeKind::Throw { name, details } => self.visit_throw(
                name.as_deref(),
                details.as_deref(),
                span,
                scope,
                frame,
            ),

            NodeKind::Return { value } => {
                let value = match value {
                    Some(value) => self.visit(value, scope, frame)?,
                    None => Value::null(),
                };
                Err(Exit::Return(value))
            }
            NodeKind::Continue => Err(Exit::Continue),
            NodeKind::Break => Err(Exit::Break),

            NodeKind::Function {
                name,
                args,
                body,
                auto_return,
            } => {
                let func = Value::new(ValueKind::Function(Rc::new(Function {
                    name: name.clone().unwrap_or_else(|| "<lambda>".into()),
                    args: args.clone(),
                    body: Rc::clone(body),
                    auto_return: *auto_return,
                    scope,
                })))
                .with_span(span.clone());
                if let Some(name) = name {
                    self.scopes.set(scope, name.clone(), func.clone());
                }
                Ok(func)
            }

            NodeKind::Call { callee, args } => {
                let callee = self.visit(callee, scope, frame)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.visit(arg, scope, frame)?);
                }
                let result = self.call_value(&callee, values, span, scope, frame)?;
                Ok(result.with_span(span.clone()))
            }

            NodeKind::Index { target, index } => {
                let target = self.visit(target, scope, frame)?;
                let index = self.visit(index, scope, frame)?;
                target
                    .index_by(&index)
                    .map(|value| value.with_span(span.clone()))
                    .map_err(|error| self.op_error(error, span, frame))
            }

            NodeKind::List { items, .. } => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    elements.push(self.visit(item, scope, frame)?);
                }
                Ok(Value::list(elements).with_span(span.clone()))
            }

            NodeKind::Dict { items } => {
                let mut map = indexmap::IndexMap::new();
                for (key_node, value_node) in items {
                    let key = self.visit(key_node, scope, frame)?;
                    let key = DictKey::of(&key)
                        .map_err(|error| self.op_error(error, &key_node.span, frame))?;
                    let value = self.visit(value_node, scope, frame)?;
                    map.insert(key, value);
                }
                Ok(Value::dict(map).with_span(span.clone()))
            }

            NodeKind::Include { module } => {
                let module = self.visit(module, scope, frame)?;
                let ValueKind::Str(name) = &module.kind else {
                    return Err(self.error(
                        ErrorKind::Include,
                        "module name must be string",
                        span,
                        frame,
                    ));
                };
                loader::include(self, &name.clone(), span, scope, frame)?;
                Ok(Value::null().with_span(span.clone()))
            }

            NodeKind::Try {
                body,
                catch_name,
                catch_details,
                catch_body,
                is_block,
                else_body,
                finally_body,
            } => match self.visit(body, scope, frame) {
                Ok(value) => {
                    if let Some(else_body) = else_body {
                        self.visit(else_body, scope, frame)?;
                    }
                    if let Some(finally_body) = finally_body {
                        self.visit(finally_body, scope, frame)?;
                    }
                    Ok(if *is_block { Value::null() } else { value })
                }
                Err(Exit::Error(error)) => {
                    let (name, details) = error.catch();
                    self.scopes.set(scope, catch_name.clone(), Value::str(name));
                    self.scopes
                        .set(scope, catch_details.clone(), Value::str(details));
                    let caught = self.visit(catch_body, scope, frame);
                    if let Some(finally_body) = finally_body {
                        self.visit(finally_body, scope, frame)?;
                    }
                    let value = caught?;
                    Ok(if *is_block { Value::null() } else { value })
                }
                // return/break/continue out of the try body: finally still
                // runs, then the early exit propagates.
                Err(early) => {
                    if let Some(finally_body) = finally_body {
                        self.visit(finally_body, scope, frame)?;
                    }
                    Err(early)
                }
            },

            NodeKind::Delete { name } => {
                if name.starts_with("CONST") {
                    return Err(self.error(
                        ErrorKind::Variable,
                        format!("cannot delete the const variable {name}"),
                        span,
                        frame,
                    ));
                }
                if self.scopes.remove(scope, name).is_none() {
                    return Err(self.error(
                        ErrorKind::Variable,
                        format!("\"{name}\" is not defined"),
                        span,
                        frame,
                    ));
                }
                Ok(Value::null())
            }

            NodeKind::Assert { condition, details } => {
                let condition = self.visit(condition, scope, frame)?;
                let details = match details {
                    Some(details) => self.visit(details, scope, frame)?.to_string(),
                    None => String::new(),
                };
                if !condition.is_true() {
                    return Err(self.error(ErrorKind::Assert, details, span, frame));
                }
                Ok(Value::null())
            }

            NodeKind::Switch {
                condition,
                cases,
                default,
                auto_return,
            } => {
                let condition = self.visit(condition, scope, frame)?;
                for case in cases {
                    let matches = self.visit(&case.matches, scope, frame)?;
                    if !condition.equals(&matches) {
                        continue;
                    }
                    if let Some(guard) = &case.guard {
                        if self.visit(guard, scope, frame)?.is_true() {
                            continue;
                        }
                    }
                    let value = self.visit(&case.body, scope, frame)?;
                    return Ok(if *auto_return { value } else { Value::null() });
                }
                if let Some(default) = default {
                    let value = self.visit(default, scope, frame)?;
                    return Ok(if *auto_return { value } else { Value::null() });
                }
                Ok(Value::null())
            }

            NodeKind::AttrAccess { target, name } => {
                let target = self.visit(target, scope, frame)?;
                let attr = target
                    .getattr(name)
                    .map_err(|error| self.op_error(error, span, frame))?;

                // Functions accessed through a non-namespace receiver bind it.
                let is_namespace = matches!(target.kind, ValueKind::Namespace(_));
                let is_function = matches!(
                    attr.kind,
                    ValueKind::Function(_) | ValueKind::Native(_)
                );
                if !is_namespace && is_function {
                    return Ok(Value::new(ValueKind::Member(Rc::new(Member {
                        receiver: target,
                        func: attr,
                    })))
                    .with_span(span.clone()));
                }
                Ok(attr.with_span(span.clone()))
            }

            NodeKind::AttrAssign {
                receiver,
                attr,
                value,
            } => {
                let Some(target) = self.scopes.get(scope, receiver) else {
                    return Err(self.error(
                        ErrorKind::Variable,
                        format!("\"{receiver}\" is not defined"),
                        span,
                        frame,
                    ));
                };
                let value = self.visit(value, scope, frame)?;
                target.setattr(attr.clone(), value.clone());
                Ok(value.with_span(span.clone()))
            }

            NodeKind::Namespace { name, body } => {
                let namespace_scope = self.scopes.alloc(Some(scope));
                let namespace_frame =
                    self.frames
                        .alloc(name.clone(), Some(frame), Some(span.clone()));
                self.visit(body, namespace_scope, namespace_frame)?;

                let namespace = Value::new(ValueKind::Namespace(Rc::new(
                    value::NamespaceVal { name: name.clone() },
                )))
                .with_span(span.clone());
                for (key, value) in self.scopes.snapshot(namespace_scope) {
                    namespace.setattr(key, value);
                }
                self.scopes.set(scope, name.clone(), namespace.clone());
                Ok(namespace)
            }

            NodeKind::Using { namespace, member } => {
                let Some(target) = self.scopes.get(scope, namespace) else {
                    return Err(self.error(
                        ErrorKind::Variable,
                        format!("namespace \"{namespace}\" is not defined"),
                        span,
                        frame,
                    ));
                };
                if !matches!(target.kind, ValueKind::Namespace(_)) {
                    return Err(self.error(
                        ErrorKind::Class,
                        format!("\"{namespace}\" is not a namespace"),
                        span,
                        frame,
                    ));
                }
                match member {
                    UsingMember::All => {
                        let attrs: Vec<(String, Value)> = target
                            .attrs
                            .borrow()
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        self.scopes.update(scope, attrs);
                    }
                    UsingMember::Name(name) => {
                        let value = target
                            .getattr(name)
                            .map_err(|error| self.op_error(error, span, frame))?;
                        self.scopes.set(scope, name.clone(), value);
                    }
                }
                Ok(Value::null())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_for(
        &mut self,
        var: &str,
        start: Option<&Node>,
        end: &Node,
        step: Option<&Node>,
        body: &Node,
        is_block: bool,
        else_body: Option<&Node>,
        span: &Span,
        scope: ScopeId,
        frame: FrameId,
    ) -> Eval {
        if var.starts_with("CONST") {
            return Err(self.error(
                ErrorKind::Variable,
                format!("cannot use the const variable \"{var}\" here"),
                span,
                frame,
            ));
        }

        let start_value = match start {
            Some(node) => self.loop_bound(node, scope, frame)?,
            None => Number::Int(0),
        };
        let end_value = self.loop_bound(end, scope, frame)?;
        let step_value = match step {
            Some(node) => self.loop_bound(node, scope, frame)?,
            None => Number::Int(1),
        };

        let ascending = step_value.as_f64() >= 0.0;
        let mut elements = vec![];
        let mut broke = false;
        let mut i = start_value;

        loop {
            let keep_going = match i.compare(end_value) {
                Some(std::cmp::Ordering::Less) => ascending,
                Some(std::cmp::Ordering::Greater) => !ascending,
                _ => false,
            };
            if !keep_going {
                break;
            }

            self.scopes.set(scope, var.to_string(), Value::number(i));
            i = i.add(step_value);

            match self.visit(body, scope, frame) {
                Ok(value) => elements.push(value),
                Err(Exit::Continue) => continue,
                Err(Exit::Break) => {
                    broke = true;
                    break;
                }
                Err(other) => return Err(other),
            }
        }

        if !broke {
            if let Some(else_body) = else_body {
                self.visit(else_body, scope, frame)?;
            }
        }
        Ok(if is_block {
            Value::null()
        } else {
            Value::list(elements).with_span(span.clone())
        })
    }

    /// `for` bounds must evaluate to numbers.
    fn loop_bound(&mut self, node: &Node, scope: ScopeId, frame: FrameId) -> Result<Number, Exit> {
        let value = self.visit(node, scope, frame)?;
        match value.kind {
            ValueKind::Number(number) => Ok(number),
            _ => Err(self.error(ErrorKind::Variable, "must be a number", &node.span, frame)),
        }
    }

    fn visit_throw(
        &mut self,
        name: Option<&Node>,
        details: Option<&Node>,
        span: &Span,
        scope: ScopeId,
        frame: FrameId,
    ) -> Eval {
        let (Some(name), Some(details)) = (name, details) else {
            return Err(self.error(
                ErrorKind::Runtime,
                "no active exception to throw",
                span,
                frame,
            ));
        };

        let details = self.visit(details, scope, frame)?;
        let name = self.visit(name, scope, frame)?;
        let ValueKind::Str(name) = &name.kind else {
            return Err(self.error(
                ErrorKind::Variable,
                "error name must be string",
                span,
                frame,
            ));
        };

        if name.as_str() == "BaseError" {
            return Err(self.error(
                ErrorKind::Variable,
                "cannot throw BaseError",
                span,
                frame,
            ));
        }
        let Some(kind) = ErrorKind::from_name(name) else {
            return Err(self.error(
                ErrorKind::Variable,
                format!("no error named \"{name}\""),
                span,
                frame,
            ));
        };
        if !kind.throwable() {
            return Err(self.error(
                ErrorKind::Runtime,
                "must throw a runtime-error",
                span,
                frame,
            ));
        }
        Err(self.error(kind, details.to_string(), span, frame))
    }

    /// Invoke any callable value: user functions (fresh child scope of the
    /// captured one, positional binding, arity checked), member functions
    /// (receiver prepended), natives, and lists (slice form).
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        span: &Span,
        scope: ScopeId,
        frame: FrameId,
    ) -> Eval {
        match &callee.kind {
            ValueKind::Function(func) => {
                if args.len() != func.args.len() {
                    return Err(self.error(
                        ErrorKind::Function,
                        format!(
                            "{} takes {} arguments, got {}",
                            func.name,
                            func.args.len(),
                            args.len()
                        ),
                        span,
                        frame,
                    ));
                }

                let call_scope = self.scopes.alloc(Some(func.scope));
                let call_frame =
                    self.frames
                        .alloc(func.name.clone(), Some(frame), Some(span.clone()));
                for (name, value) in func.args.iter().zip(args) {
                    self.scopes.set(call_scope, name.clone(), value);
                }

                let auto_return = func.auto_return;
                match self.visit(&Rc::clone(&func.body), call_scope, call_frame) {
                    Ok(value) => Ok(if auto_return { value } else { Value::null() }),
                    Err(Exit::Return(value)) => Ok(value),
                    Err(other) => Err(other),
                }
            }

            ValueKind::Member(member) => {
                let mut full_args = Vec::with_capacity(args.len() + 1);
                full_args.push(member.receiver.clone());
                full_args.extend(args);
                self.call_value(&member.func.clone(), full_args, span, scope, frame)
            }

            ValueKind::Native(native) => {
                let func = native.func;
                func(self, &args)
                    .map_err(|details| self.error(ErrorKind::Function, details, span, frame))
            }

            // Calling a list slices it: list(start, stop, step).
            ValueKind::List(items) => {
                let sliced = builtins::slice_values(&items.borrow(), &args)
                    .map_err(|error| self.op_error(error, span, frame))?;
                Ok(Value::list(sliced))
            }

            _ => Err(self.error(ErrorKind::Function, "not a callable object", span, frame)),
        }
    }
}

fn default_lib_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("lib")))
        .unwrap_or_else(|| PathBuf::from("lib"))
}

impl From<Error> for Exit {
    fn from(error: Error) -> Self {
        Exit::Error(Box::new(error))
    }
}
