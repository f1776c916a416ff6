use std::error::Error as StdError;
use std::fmt::Display;

use colored::Colorize;

use crate::lexer::Span;

/// The closed error taxonomy. The textual names returned by
/// [`ErrorKind::name`] are the public interface used by `throw` and `catch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IllegalCharacter,
    InvalidSyntax,
    Outside,
    Runtime,
    Math,
    Variable,
    Function,
    List,
    Dict,
    Include,
    Assert,
    Class,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        use ErrorKind::*;
        match self {
            IllegalCharacter => "IllegalCharacterError",
            InvalidSyntax => "InvalidSyntaxError",
            Outside => "OutsideError",
            Runtime => "RuntimeError",
            Math => "MathError",
            Variable => "VariableError",
            Function => "FunctionError",
            List => "ListError",
            Dict => "DictError",
            Include => "IncludeError",
            Assert => "AssertError",
            Class => "ClassError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        use ErrorKind::*;
        Some(match name {
            "IllegalCharacterError" => IllegalCharacter,
            "InvalidSyntaxError" => InvalidSyntax,
            "OutsideError" => Outside,
            "RuntimeError" => Runtime,
            "MathError" => Math,
            "VariableError" => Variable,
            "FunctionError" => Function,
            "ListError" => List,
            "DictError" => Dict,
            "IncludeError" => Include,
            "AssertError" => Assert,
            "ClassError" => Class,
            _ => return None,
        })
    }

    /// Only runtime kinds may be instantiated by `throw`; the phase-1 kinds
    /// exist before any context does.
    pub fn throwable(&self) -> bool {
        use ErrorKind::*;
        !matches!(self, IllegalCharacter | InvalidSyntax | Outside)
    }
}

/// One rendered traceback entry. The innermost frame carries the error's own
/// position, outer frames the position their child was entered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub file: String,
    pub line: usize,
    pub name: String,
}

/// The common carrier for every diagnosed failure: kind, free-form details,
/// the offending span, and (for runtime errors) a traceback snapshot taken
/// when the error was raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub details: String,
    pub span: Option<Span>,
    /// Outermost frame first, most recent call last. Empty for lex/parse
    /// phase errors.
    pub trace: Vec<TraceFrame>,
}

impl Error {
    pub fn new(kind: ErrorKind, details: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            kind,
            details: details.into(),
            span,
            trace: vec![],
        }
    }

    pub fn with_trace(mut self, trace: Vec<TraceFrame>) -> Self {
        self.trace = trace;
        self
    }

    /// The `(kind name, details)` pair a `catch` clause binds.
    pub fn catch(&self) -> (String, String) {
        (self.kind.name().to_string(), self.details.clone())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.trace.is_empty() {
            writeln!(f, "Traceback (most recent call last):")?;
            for frame in &self.trace {
                writeln!(f, "\tFile {}, line {}, in {}", frame.file, frame.line, frame.name)?;
            }
        }

        writeln!(f, "{}: {}", self.kind.name(), self.details)?;

        if let Some(span) = &self.span {
            if self.trace.is_empty() {
                writeln!(f, "File {}, line {}", span.file(), span.end.line + 1)?;
            }
            writeln!(f)?;
            for line in span.underline().lines() {
                let is_marker = !line.is_empty() && line.chars().all(|c| c == ' ' || c == '^');
                if is_marker {
                    writeln!(f, "{}", line.red())?;
                } else {
                    writeln!(f, "{line}")?;
                }
            }
        }

        Ok(())
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in [
            ErrorKind::IllegalCharacter,
            ErrorKind::InvalidSyntax,
            ErrorKind::Outside,
            ErrorKind::Runtime,
            ErrorKind::Math,
            ErrorKind::Variable,
            ErrorKind::Function,
            ErrorKind::List,
            ErrorKind::Dict,
            ErrorKind::Include,
            ErrorKind::Assert,
            ErrorKind::Class,
        ] {
            assert_eq!(Some(kind), ErrorKind::from_name(kind.name()));
        }
        assert_eq!(None, ErrorKind::from_name("BaseError"));
    }

    #[test]
    fn test_traceback_rendering() {
        let error = Error::new(ErrorKind::Math, "division by zero", None).with_trace(vec![
            TraceFrame {
                file: "<test>".into(),
                line: 1,
                name: "<program>".into(),
            },
            TraceFrame {
                file: "<test>".into(),
                line: 3,
                name: "divide".into(),
            },
        ]);

        let rendered = error.to_string();
        assert!(rendered.starts_with("Traceback (most recent call last):\n"));
        assert!(rendered.contains("\tFile <test>, line 3, in divide\n"));
        assert!(rendered.contains("MathError: division by zero"));
    }
}
