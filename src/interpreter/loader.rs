use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::error::ErrorKind;
use crate::lexer::{Lexer, Span};
use crate::parser;

use super::context::FrameId;
use super::scope::ScopeId;
use super::value::Value;
use super::{Eval, Exit, Interpreter};

/// The hook host modules plug into. A plugin claims a set of file extensions
/// (without the dot) and turns the module source into bindings to merge into
/// the including scope. No foreign code ever runs inside the interpreter.
pub trait PluginModule {
    fn extensions(&self) -> &[&str];
    fn load(&self, path: &Path, source: &str) -> Result<Vec<(String, Value)>, String>;
}

/// Resolve and evaluate an `include` target: the working directory first,
/// then the interpreter's `lib` directory.
pub fn include(
    interpreter: &mut Interpreter,
    module: &str,
    span: &Span,
    scope: ScopeId,
    frame: FrameId,
) -> Eval {
    debug!("resolving include \"{module}\"");

    let cwd_path = std::env::current_dir()
        .map(|dir| dir.join(module))
        .unwrap_or_else(|_| PathBuf::from(module));
    let lib_path = interpreter.lib_dir.join(module);

    let path = if cwd_path.exists() {
        cwd_path
    } else if lib_path.exists() {
        lib_path
    } else {
        return Err(interpreter.error(
            ErrorKind::Include,
            format!("no module named {module}"),
            span,
            frame,
        ));
    };

    try_include(interpreter, &path, span, scope, frame)
}

fn try_include(
    interpreter: &mut Interpreter,
    path: &Path,
    span: &Span,
    scope: ScopeId,
    frame: FrameId,
) -> Eval {
    let display = path.to_string_lossy().to_string();
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(interpreter.error(
                ErrorKind::Include,
                format!("file {display} not found"),
                span,
                frame,
            ))
        }
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
            return Err(interpreter.error(
                ErrorKind::Include,
                "the encoding of module file must be UTF-8",
                span,
                frame,
            ))
        }
        Err(err) => {
            return Err(interpreter.error(
                ErrorKind::Include,
                format!("cannot read file: {err}"),
                span,
                frame,
            ))
        }
    };

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let plugin = interpreter
        .plugins
        .iter()
        .position(|plugin| plugin.extensions().contains(&extension.as_str()));
    if let Some(at) = plugin {
        trace!("loading \"{display}\" through a plugin");
        let bindings = match interpreter.plugins[at].load(path, &source) {
            Ok(bindings) => bindings,
            Err(err) => {
                return Err(interpreter.error(
                    ErrorKind::Include,
                    format!("plugin module error: {err}"),
                    span,
                    frame,
                ))
            }
        };
        interpreter.scopes.update(scope, bindings);
        return Ok(Value::null());
    }
    if interpreter
        .plugin_allowlist
        .iter()
        .any(|ext| ext == &extension)
    {
        return Err(interpreter.error(
            ErrorKind::Include,
            format!("no plugin registered for .{extension} modules"),
            span,
            frame,
        ));
    }

    trace!("evaluating module \"{display}\"");
    let tokens = Lexer::new(display.clone(), source).lex().map_err(Exit::from)?;
    let ast = parser::parse(tokens).map_err(Exit::from)?;

    let module_scope = interpreter.scopes.alloc(Some(interpreter.global));
    let module_frame = interpreter
        .frames
        .alloc("<module>", Some(frame), Some(span.clone()));
    interpreter.visit(&ast, module_scope, module_frame)?;

    let bindings = interpreter.scopes.snapshot(module_scope);
    interpreter.scopes.update(scope, bindings);
    Ok(Value::null())
}
