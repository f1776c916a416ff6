use crate::error::TraceFrame;
use crate::lexer::Span;

/// Index of an evaluation frame in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameId(pub(crate) usize);

/// One evaluation frame: the display name shown in tracebacks, the frame it
/// was entered from, and the call-site span.
#[derive(Debug)]
struct Frame {
    name: String,
    parent: Option<FrameId>,
    entry_span: Option<Span>,
}

/// Arena of evaluation frames. Frames only exist to render tracebacks, so
/// they are append-only for the lifetime of one evaluation.
#[derive(Debug, Default)]
pub struct Frames {
    frames: Vec<Frame>,
}

impl Frames {
    pub fn alloc(
        &mut self,
        name: impl Into<String>,
        parent: Option<FrameId>,
        entry_span: Option<Span>,
    ) -> FrameId {
        self.frames.push(Frame {
            name: name.into(),
            parent,
            entry_span,
        });
        FrameId(self.frames.len() - 1)
    }

    /// Snapshot the traceback for an error raised at `span` inside `frame`:
    /// the innermost frame reports the error position, every outer frame the
    /// position its child was entered from. Outermost entry first.
    pub fn trace(&self, frame: FrameId, span: Option<&Span>) -> Vec<TraceFrame> {
        let mut entries = vec![];
        let mut position = span.cloned();
        let mut current = Some(frame);

        while let Some(id) = current {
            let frame = &self.frames[id.0];
            let (file, line) = position
                .as_ref()
                .map(|span| (span.file().to_string(), span.start.line + 1))
                .unwrap_or_else(|| ("<unknown>".to_string(), 0));
            entries.push(TraceFrame {
                file,
                line,
                name: frame.name.clone(),
            });
            position = frame.entry_span.clone();
            current = frame.parent;
        }

        entries.reverse();
        entries
    }
}
