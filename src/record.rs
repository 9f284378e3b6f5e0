use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;
use tracing::Level;

/// One event as seen by the line formatter.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// Message with its arguments already interpolated.
    pub message: String,
    /// Structured fields other than `message`, in recording order.
    pub fields: Vec<(String, String)>,
    pub error: Option<ErrorReport>,
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Utc>, level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            fields: Vec::new(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: ErrorReport) -> Self {
        self.error = Some(error);
        self
    }
}

/// A location in a stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub function: Option<String>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if let Some(function) = &self.function {
            write!(f, " in {}", function)?;
        }
        Ok(())
    }
}

/// An error captured for logging: kind, message, cause chain and trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: Option<String>,
    pub message: String,
    pub causes: Vec<String>,
    pub frames: Vec<Frame>,
}

impl ErrorReport {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            message: message.into(),
            causes: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Capture a typed error, naming it after its type.
    pub fn from_error<E: Error>(err: &E) -> Self {
        let mut report = Self::from_dyn(err);
        report.kind = Some(short_type_name::<E>().to_string());
        report
    }

    /// Capture an error whose concrete type is not known.
    pub fn from_dyn(err: &(dyn Error + '_)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: None,
            message: err.to_string(),
            causes,
            frames: Vec::new(),
        }
    }

    pub fn with_frame(
        mut self,
        file: impl Into<String>,
        line: u32,
        function: Option<impl Into<String>>,
    ) -> Self {
        self.frames.push(Frame {
            file: file.into(),
            line,
            function: function.map(Into::into),
        });
        self
    }

    /// `<kind>: <message>`, or just the message when the kind is unknown.
    pub fn headline(&self) -> String {
        match &self.kind {
            Some(kind) => format!("{}: {}", kind, self.message),
            None => self.message.clone(),
        }
    }

    /// Text form used for continuation lines: headline, causes, then
    /// frames. Embedded newlines are split so no line contains one.
    pub fn lines(&self) -> Vec<String> {
        let causes = self.causes.iter().map(|c| format!("caused by: {}", c));
        let frames = self.frames.iter().map(|f| format!("  {}", f));
        std::iter::once(self.headline())
            .chain(causes)
            .chain(frames)
            .flat_map(|text| text.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

/// Frames of the current call stack, outermost first, like a traceback.
///
/// Frames without file and line information are dropped, as are frames in
/// the standard library, the test harness, this crate and `backtrace`
/// itself, so a panic trace starts at the caller's code.
pub fn capture_frames() -> Vec<Frame> {
    let trace = backtrace::Backtrace::new();
    let mut frames = Vec::new();
    for frame in trace.frames() {
        for symbol in frame.symbols() {
            let (Some(file), Some(line), Some(name)) =
                (symbol.filename(), symbol.lineno(), symbol.name())
            else {
                continue;
            };
            let function = strip_hash(&format!("{:#}", name)).to_string();
            if is_runtime_frame(&function) {
                continue;
            }
            frames.push(Frame {
                file: file.display().to_string(),
                line,
                function: Some(function),
            });
        }
    }
    frames.reverse();
    frames
}

fn is_runtime_frame(function: &str) -> bool {
    const RUNTIME: [&str; 8] = [
        "std::", "core::", "alloc::", "backtrace::", "test::", "joblog::", "rust_", "__rust",
    ];
    let path = function.trim_start_matches('<');
    RUNTIME.iter().any(|prefix| path.starts_with(prefix))
}

/// `foo::bar::h0123456789abcdef` -> `foo::bar`.
fn strip_hash(function: &str) -> &str {
    match function.rsplit_once("::h") {
        Some((path, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            path
        }
        _ => function,
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
