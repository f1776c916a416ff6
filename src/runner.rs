use std::fs;

use log::debug;

use crate::error::{Error, ErrorKind};
use crate::interpreter::loader::PluginModule;
use crate::interpreter::value::Value;
use crate::interpreter::{builtins, Exit, Interpreter};
use crate::lexer::{Lexer, Token};
use crate::parser;

/// Wires lexer, parser and interpreter together for one source buffer and
/// owns the global environment across runs (the REPL reuses it).
pub struct Runner {
    pub interpreter: Interpreter,
    /// Write `.parse/tokens.json` and `.parse/ast.json` for each run.
    pub dump_parse: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        let mut interpreter = Interpreter::new();
        builtins::install(&mut interpreter);
        Self {
            interpreter,
            dump_parse: false,
        }
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PluginModule>) {
        for extension in plugin.extensions() {
            self.interpreter.plugin_allowlist.push(extension.to_string());
        }
        self.interpreter.plugins.push(plugin);
    }

    /// Run one source buffer against the persistent global scope. Returns
    /// the program's terminal value (the block list of statement values).
    pub fn run(&mut self, file: &str, text: &str) -> Result<Value, Error> {
        let global = self.interpreter.global;
        self.interpreter
            .scopes
            .set(global, "__System_file", Value::str(file));
        self.interpreter
            .scopes
            .set(global, "__System_code", Value::str(text));

        let tokens = Lexer::new(file, text).lex()?;
        if self.dump_parse {
            self.dump_tokens(&tokens);
        }

        let ast = parser::parse(tokens)?;
        if self.dump_parse {
            self.dump(".parse/ast.json", &ast.as_json());
        }

        let frame = self.interpreter.frames.alloc("<program>", None, None);
        match self.interpreter.visit(&ast, global, frame) {
            Ok(value) => Ok(value),
            Err(Exit::Error(error)) => Err(*error),
            // A break/continue/return can only reach here smuggled through a
            // deferred closure; report it instead of crashing the host.
            Err(_) => Err(Error::new(
                ErrorKind::Runtime,
                "unexpected early exit at top level",
                None,
            )),
        }
    }

    fn dump_tokens(&self, tokens: &[Token]) {
        let kinds: Vec<_> = tokens.iter().map(|token| &token.kind).collect();
        match serde_json::to_value(&kinds) {
            Ok(json) => self.dump(".parse/tokens.json", &json),
            Err(err) => debug!("token dump failed: {err}"),
        }
    }

    fn dump(&self, path: &str, json: &serde_json::Value) {
        let write = || -> std::io::Result<()> {
            fs::create_dir_all(".parse")?;
            fs::write(path, serde_json::to_string_pretty(json).unwrap_or_default())
        };
        if let Err(err) = write() {
            debug!("could not write {path}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::interpreter::value::ValueKind;

    fn last_value(source: &str) -> Value {
        let mut runner = Runner::new();
        let result = runner.run("<test>", source).expect("should evaluate");
        let ValueKind::List(items) = &result.kind else {
            panic!("program result should be a block list");
        };
        let items = items.borrow();
        items.last().expect("program should not be empty").clone()
    }

    fn fails_with(source: &str) -> Error {
        Runner::new().run("<test>", source).unwrap_err()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert!(last_value("1 + 2 * 3").equals(&Value::int(7)));
    }

    #[test]
    fn test_loop_accumulation() {
        let source = "var x = 0\nfor i = 1 to 5 then var x = x + i\nx";
        assert!(last_value(source).equals(&Value::int(10)));
    }

    #[test]
    fn test_recursive_function() {
        let source = "\
function fact(n) do if n <= 1 then 1 else n * fact(n - 1)
fact(5)";
        assert!(last_value(source).equals(&Value::int(120)));
    }

    #[test]
    fn test_try_catch_binds_kind_and_details() {
        let source = "\
var caught = null
try then
throw \"MathError\", \"oops\"
catch k, d then
var caught = k + \":\" + d
end
caught";
        assert!(last_value(source).equals(&Value::str("MathError:oops")));
    }

    #[test]
    fn test_statement_form_try() {
        let source = "\
var kind = null
try then var x = 1 / 0 catch k, d then var kind = k
kind";
        assert!(last_value(source).equals(&Value::str("MathError")));
    }

    #[test]
    fn test_namespace_using_star() {
        let source = "\
namespace M
var x = 41
function f() do x + 1
end
using M.*
f()";
        assert!(last_value(source).equals(&Value::int(42)));
    }

    #[test]
    fn test_switch_guard() {
        let source = "switch 2 case 1 then \"a\" case 2 unless false then \"b\" default \"c\" end";
        assert!(last_value(source).equals(&Value::str("b")));
    }

    #[test]
    fn test_switch_guard_skips_to_default() {
        let source = "switch 2 case 2 unless true then \"b\" default \"c\" end";
        assert!(last_value(source).equals(&Value::str("c")));
    }

    #[test]
    fn test_const_is_write_once() {
        let error = fails_with("var CONST_X = 1\nvar CONST_X = 2");
        assert_eq!(ErrorKind::Variable, error.kind);

        let error = fails_with("var CONST_X = 1\ndelete CONST_X");
        assert_eq!(ErrorKind::Variable, error.kind);
    }

    #[test]
    fn test_scope_isolation() {
        let source = "\
function f() do var inner = 1
f()
inner";
        let error = fails_with(source);
        assert_eq!(ErrorKind::Variable, error.kind);
        assert_eq!("\"inner\" is not defined", error.details);
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let source = "\
var hits = []
function mark() do append(hits, 1)
false and mark()
true or mark()
len(hits)";
        assert!(last_value(source).equals(&Value::int(0)));
    }

    #[test]
    fn test_for_direction_follows_step_sign() {
        let source = "for i = 5 to 0 step 0 - 1 then i";
        let result = last_value(source);
        assert!(result.equals(&Value::list(
            (1..=5).rev().map(Value::int).collect()
        )));
    }

    #[test]
    fn test_loop_else_runs_only_without_break() {
        let source = "\
var log = []
for i = 0 to 3 then
append(log, i)
else
append(log, 99)
end
while true then
break
else
append(log, 98)
end
log";
        let result = last_value(source);
        assert!(result.equals(&Value::list(vec![
            Value::int(0),
            Value::int(1),
            Value::int(2),
            Value::int(99)
        ])));
    }

    #[test]
    fn test_finally_runs_on_every_path() {
        let source = "\
var log = []
function f()
try then
return 1
catch k, d then
append(log, \"c1\")
finally
append(log, \"f1\")
end
end
f()
try then
throw \"ListError\", \"x\"
catch k, d then
append(log, \"c2\")
finally
append(log, \"f2\")
end
try then
pass
catch k, d then
append(log, \"c3\")
else
append(log, \"e3\")
finally
append(log, \"f3\")
end
log";
        let result = last_value(source);
        assert!(result.equals(&Value::list(vec![
            Value::str("f1"),
            Value::str("c2"),
            Value::str("f2"),
            Value::str("e3"),
            Value::str("f3"),
        ])));
    }

    #[test]
    fn test_early_return_through_finally() {
        let source = "\
function f()
try then
return 7
catch k, d then
pass
finally
pass
end
end
f()";
        assert!(last_value(source).equals(&Value::int(7)));
    }

    #[test]
    fn test_member_function_prepends_receiver() {
        let source = "\
var box = {}
attr box.first = lambda self do getdefault(self, \"items\", [])
box.first()";
        let result = last_value(source);
        assert!(result.equals(&Value::list(vec![])));
    }

    #[test]
    fn test_map_operator() {
        let source = "[1, 2, 3] @ (lambda x do x * 2)";
        assert!(last_value(source).equals(&Value::list(vec![
            Value::int(2),
            Value::int(4),
            Value::int(6)
        ])));
    }

    #[test]
    fn test_membership_operator() {
        assert!(last_value("2 :: [1, 2, 3]").equals(&Value::bool(true)));
        assert!(last_value("\"x\" :: {\"x\": 1}").equals(&Value::bool(true)));
    }

    #[test]
    fn test_arrow_is_index() {
        assert!(last_value("[10, 20] -> 1").equals(&Value::int(20)));
        assert!(last_value("{\"k\": 5} -> \"k\"").equals(&Value::int(5)));
    }

    #[test]
    fn test_assert() {
        let error = fails_with("assert 1 == 2, \"broken math\"");
        assert_eq!(ErrorKind::Assert, error.kind);
        assert_eq!("broken math", error.details);
    }

    #[test]
    fn test_unknown_error_name_in_throw() {
        let error = fails_with("throw \"NoSuchError\", \"x\"");
        assert_eq!(ErrorKind::Variable, error.kind);
        assert_eq!("no error named \"NoSuchError\"", error.details);
    }

    #[test]
    fn test_throw_base_error_is_rejected() {
        let error = fails_with("throw \"BaseError\", \"x\"");
        assert_eq!(ErrorKind::Variable, error.kind);
    }

    #[test]
    fn test_recursion_guard() {
        let mut runner = Runner::new();
        runner.interpreter.max_depth = 256;
        let error = runner.run("<test>", "function f() do f()\nf()").unwrap_err();
        assert_eq!(ErrorKind::Runtime, error.kind);
        assert_eq!("maximum recursion depth exceeded", error.details);
    }

    #[test]
    fn test_traceback_names_call_chain() {
        let source = "\
function inner() do 1 / 0
function outer() do inner()
outer()";
        let error = fails_with(source);
        let names: Vec<_> = error.trace.iter().map(|frame| frame.name.as_str()).collect();
        assert_eq!(vec!["<program>", "outer", "inner"], names);
    }

    #[test]
    fn test_repl_keeps_global_state() {
        let mut runner = Runner::new();
        runner.run("<stdin>", "var x = 40").expect("should evaluate");
        let result = runner.run("<stdin>", "x + 2").expect("should evaluate");
        let ValueKind::List(items) = &result.kind else {
            panic!("program result should be a block list");
        };
        assert!(items.borrow()[0].equals(&Value::int(42)));
    }
}
