use std::fmt::Debug;
use std::rc::Rc;

/// A source buffer together with the name it was loaded from. Shared by every
/// position produced while lexing it, so diagnostics can always quote the
/// offending line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Source {
    pub file: String,
    pub text: String,
}

impl Source {
    pub fn new(file: impl Into<String>, text: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            file: file.into(),
            text: text.into(),
        })
    }
}

/// A cursor into a source buffer. `line` and `column` are zero-based and only
/// shifted to one-based when rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Step over `current`, keeping line/column bookkeeping in sync. `index`
    /// is a byte offset so spans slice cleanly out of UTF-8 source.
    pub fn advance(&mut self, current: Option<char>) {
        self.index += current.map_or(1, char::len_utf8);
        self.column += 1;

        if current == Some('\n') {
            self.column = 0;
            self.line += 1;
        }
    }
}

/// A (start, end) pair of cursors into one source buffer; `end` is exclusive.
#[derive(Clone, Default)]
pub struct Span {
    pub source: Rc<Source>,
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(source: Rc<Source>, start: Position, end: Position) -> Self {
        Self { source, start, end }
    }

    /// A single-character span at `start`.
    pub fn at(source: Rc<Source>, start: Position) -> Self {
        let mut end = start;
        end.advance(None);
        Self { source, start, end }
    }

    /// The span from the start of `self` to the end of `other`.
    pub fn to(&self, other: &Span) -> Span {
        Span {
            source: Rc::clone(&self.source),
            start: self.start,
            end: other.end,
        }
    }

    pub fn file(&self) -> &str {
        &self.source.file
    }

    /// The source excerpt covered by this span.
    pub fn lexeme(&self) -> &str {
        let text = &self.source.text;
        let end = self.end.index.min(text.len());
        &text[self.start.index.min(end)..end]
    }

    /// The covered source line(s) with a caret underline, tabs stripped.
    /// Every covered line is echoed; carets run from the start column on the
    /// first line to the end column on the last.
    pub fn underline(&self) -> String {
        let text = &self.source.text;
        let mut res = String::new();

        let mut idx_start = text[..self.start.index.min(text.len())]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        let line_count = self.end.line - self.start.line + 1;
        for i in 0..line_count {
            let idx_end = text[idx_start..]
                .find('\n')
                .map(|o| idx_start + o)
                .unwrap_or(text.len());
            let line = &text[idx_start..idx_end];

            let col_start = if i == 0 { self.start.column } else { 0 };
            let col_end = if i == line_count - 1 {
                self.end.column.max(col_start + 1)
            } else {
                line.chars().count().max(col_start + 1)
            };

            res.push_str(line);
            res.push('\n');
            res.push_str(&" ".repeat(col_start));
            res.push_str(&"^".repeat(col_end - col_start));
            res.push('\n');

            idx_start = idx_end + 1;
            if idx_start > text.len() {
                break;
            }
        }

        res.replace('\t', "")
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}..{}:{}",
            self.source.file,
            self.start.line + 1,
            self.start.column + 1,
            self.end.line + 1,
            self.end.column + 1
        )
    }
}

// Spans never take part in semantic comparisons.
impl PartialEq for Span {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for Span {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_tracks_lines() {
        let mut position = Position::default();
        position.advance(Some('a'));
        position.advance(Some('\n'));

        assert_eq!(
            Position {
                index: 2,
                line: 1,
                column: 0
            },
            position
        );
    }

    #[test]
    fn test_lexeme_is_the_covered_text() {
        let source = Source::new("<test>", "var foo = 42");
        let span = Span::new(
            Rc::clone(&source),
            Position {
                index: 4,
                line: 0,
                column: 4,
            },
            Position {
                index: 7,
                line: 0,
                column: 7,
            },
        );

        assert_eq!("foo", span.lexeme());
    }

    #[test]
    fn test_underline_marks_the_span() {
        let source = Source::new("<test>", "var foo = 42");
        let span = Span::new(
            Rc::clone(&source),
            Position {
                index: 4,
                line: 0,
                column: 4,
            },
            Position {
                index: 7,
                line: 0,
                column: 7,
            },
        );

        assert_eq!("var foo = 42\n    ^^^\n", span.underline());
    }
}
