use std::rc::Rc;

use serde_json::{json, Value as Json};

use crate::lexer::{Span, TokenKind};

/// One branch of an `if`/`elif` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct IfCase {
    pub condition: Node,
    pub body: Node,
    pub is_block: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseCase {
    pub body: Node,
    pub is_block: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub matches: Node,
    pub body: Node,
    /// `case X unless G`: the case is skipped when G is truthy.
    pub guard: Option<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UsingMember {
    /// `using NS.*` — merge every attribute into the enclosing scope.
    All,
    /// `using NS.x` — bind a single name.
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,

    Unary {
        op: TokenKind,
        operand: Box<Node>,
    },
    Binary {
        left: Box<Node>,
        op: TokenKind,
        right: Box<Node>,
    },
    /// Short-circuit `and`; distinct from the generic binary node.
    And {
        left: Box<Node>,
        right: Box<Node>,
    },
    /// Short-circuit `or`; distinct from the generic binary node.
    Or {
        left: Box<Node>,
        right: Box<Node>,
    },

    VarAccess {
        name: String,
    },
    VarAssign {
        name: String,
        value: Box<Node>,
    },

    If {
        cases: Vec<IfCase>,
        else_case: Option<Box<ElseCase>>,
    },
    For {
        var: String,
        start: Option<Box<Node>>,
        end: Box<Node>,
        step: Option<Box<Node>>,
        body: Box<Node>,
        is_block: bool,
        else_body: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
        is_block: bool,
        else_body: Option<Box<Node>>,
    },

    Exit {
        status: Option<Box<Node>>,
    },
    Throw {
        name: Option<Box<Node>>,
        details: Option<Box<Node>>,
    },
    Return {
        value: Option<Box<Node>>,
    },
    Continue,
    Break,

    Function {
        /// `None` for lambdas.
        name: Option<String>,
        args: Vec<String>,
        body: Rc<Node>,
        auto_return: bool,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Index {
        target: Box<Node>,
        index: Box<Node>,
    },

    List {
        items: Vec<Node>,
        /// Statement-list bodies are block lists; literal lists are not.
        is_block: bool,
    },
    Dict {
        items: Vec<(Node, Node)>,
    },

    Include {
        module: Box<Node>,
    },
    Try {
        body: Box<Node>,
        catch_name: String,
        catch_details: String,
        catch_body: Box<Node>,
        is_block: bool,
        else_body: Option<Box<Node>>,
        finally_body: Option<Box<Node>>,
    },
    Delete {
        name: String,
    },
    Assert {
        condition: Box<Node>,
        details: Option<Box<Node>>,
    },
    Switch {
        condition: Box<Node>,
        cases: Vec<SwitchCase>,
        default: Option<Box<Node>>,
        auto_return: bool,
    },

    AttrAccess {
        target: Box<Node>,
        name: String,
    },
    AttrAssign {
        receiver: String,
        attr: String,
        value: Box<Node>,
    },
    Namespace {
        name: String,
        body: Box<Node>,
    },
    Using {
        namespace: String,
        member: UsingMember,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The span-free dump shape written to `.parse/ast.json`.
    pub fn as_json(&self) -> Json {
        use NodeKind::*;
        match &self.kind {
            Int(value) => json!({"type": "number", "value": value}),
            Float(value) => json!({"type": "number", "value": value}),
            Str(value) => json!({"type": "string", "value": value}),
            Bool(value) => json!({"type": "bool", "value": value}),
            Null => json!({"type": "null"}),
            Unary { op, operand } => json!({
                "type": "unary", "op": op.describe(), "operand": operand.as_json(),
            }),
            Binary { left, op, right } => json!({
                "type": "binary", "op": op.describe(),
                "left": left.as_json(), "right": right.as_json(),
            }),
            And { left, right } => json!({
                "type": "and", "left": left.as_json(), "right": right.as_json(),
            }),
            Or { left, right } => json!({
                "type": "or", "left": left.as_json(), "right": right.as_json(),
            }),
            VarAccess { name } => json!({"type": "var-access", "name": name}),
            VarAssign { name, value } => json!({
                "type": "var-assign", "name": name, "value": value.as_json(),
            }),
            If { cases, else_case } => json!({
                "type": "if",
                "cases": cases.iter().map(|case| json!({
                    "condition": case.condition.as_json(),
                    "body": case.body.as_json(),
                    "oneline": !case.is_block,
                })).collect::<Vec<_>>(),
                "else-case": else_case.as_ref().map(|case| json!({
                    "body": case.body.as_json(),
                    "oneline": !case.is_block,
                })),
            }),
            For {
                var,
                start,
                end,
                step,
                body,
                is_block,
                else_body,
            } => json!({
                "type": "for",
                "name": var,
                "start": start.as_ref().map(|n| n.as_json()),
                "end": end.as_json(),
                "step": step.as_ref().map(|n| n.as_json()),
                "body": body.as_json(),
                "oneline": !is_block,
                "else": else_body.as_ref().map(|n| n.as_json()),
            }),
            While {
                condition,
                body,
                is_block,
                else_body,
            } => json!({
                "type": "while",
                "condition": condition.as_json(),
                "body": body.as_json(),
                "oneline": !is_block,
                "else": else_body.as_ref().map(|n| n.as_json()),
            }),
            Exit { status } => json!({
                "type": "exit", "status": status.as_ref().map(|n| n.as_json()),
            }),
            Throw { name, details } => json!({
                "type": "throw",
                "error": name.as_ref().map(|n| n.as_json()),
                "details": details.as_ref().map(|n| n.as_json()),
            }),
            Return { value } => json!({
                "type": "return", "value": value.as_ref().map(|n| n.as_json()),
            }),
            Continue => json!({"type": "continue"}),
            Break => json!({"type": "break"}),
            Function {
                name,
                args,
                body,
                auto_return,
            } => json!({
                "type": "function",
                "name": name.clone().unwrap_or_else(|| "<lambda>".into()),
                "args": args,
                "body": body.as_json(),
                "oneline": auto_return,
            }),
            Call { callee, args } => json!({
                "type": "call",
                "func": callee.as_json(),
                "args": args.iter().map(Node::as_json).collect::<Vec<_>>(),
            }),
            Index { target, index } => json!({
                "type": "index", "object": target.as_json(), "index": index.as_json(),
            }),
            List { items, is_block } => json!({
                "type": "list",
                "items": items.iter().map(Node::as_json).collect::<Vec<_>>(),
                "is-block": is_block,
            }),
            Dict { items } => json!({
                "type": "dict",
                "items": items.iter()
                    .map(|(k, v)| json!([k.as_json(), v.as_json()]))
                    .collect::<Vec<_>>(),
            }),
            Include { module } => json!({"type": "include", "module": module.as_json()}),
            Try {
                body,
                catch_name,
                catch_details,
                catch_body,
                is_block,
                else_body,
                finally_body,
            } => json!({
                "type": "try",
                "try-body": body.as_json(),
                "name-var": catch_name,
                "details-var": catch_details,
                "catch-body": catch_body.as_json(),
                "else-body": else_body.as_ref().map(|n| n.as_json()),
                "finally-body": finally_body.as_ref().map(|n| n.as_json()),
                "oneline": !is_block,
            }),
            Delete { name } => json!({"type": "delete", "var": name}),
            Assert { condition, details } => json!({
                "type": "assert",
                "condition": condition.as_json(),
                "details": details.as_ref().map(|n| n.as_json()),
            }),
            Switch {
                condition,
                cases,
                default,
                auto_return,
            } => json!({
                "type": "switch",
                "condition": condition.as_json(),
                "cases": cases.iter().map(|case| json!({
                    "match": case.matches.as_json(),
                    "body": case.body.as_json(),
                    "unless": case.guard.as_ref().map(|n| n.as_json()),
                })).collect::<Vec<_>>(),
                "default": default.as_ref().map(|n| n.as_json()),
                "oneline": auto_return,
            }),
            AttrAccess { target, name } => json!({
                "type": "attr-access", "target": target.as_json(), "attr": name,
            }),
            AttrAssign {
                receiver,
                attr,
                value,
            } => json!({
                "type": "attr-assign",
                "receiver": receiver,
                "attr": attr,
                "value": value.as_json(),
            }),
            Namespace { name, body } => json!({
                "type": "namespace", "name": name, "body": body.as_json(),
            }),
            Using { namespace, member } => {
                let member = match member {
                    UsingMember::All => "*".to_string(),
                    UsingMember::Name(name) => name.clone(),
                };
                json!({"type": "using", "namespace": namespace, "member": member})
            }
        }
    }
}
