use std::fmt;

/// A source position attached to an instruction via a `.loc` directive
/// (spec §4.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub file: u32,
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// The reason a VM trap fired (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    DivideByZero,
    IntegerOverflow,
    SignedCastOutOfRange,
    NullOrUnalignedAccess,
    BoundsCheckFailure,
    RuntimeHelperError,
    Explicit,
    StepBudgetExhausted,
    /// The call stack exceeded `VmOptions::max_recursion_depth` (spec §4.6
    /// "interpreter safety limits"), distinct from `StepBudgetExhausted`'s
    /// instruction-count limit.
    CallStackOverflow,
}

impl TrapKind {
    /// The mnemonic used by `trap.kind` operands in the text format
    /// (spec §4.1's "trap-kind token round trip").
    pub fn token(self) -> &'static str {
        match self {
            TrapKind::DivideByZero => "DivByZero",
            TrapKind::IntegerOverflow => "Overflow",
            TrapKind::SignedCastOutOfRange => "CastOutOfRange",
            TrapKind::NullOrUnalignedAccess => "BadPointer",
            TrapKind::BoundsCheckFailure => "BoundsCheck",
            TrapKind::RuntimeHelperError => "RuntimeError",
            TrapKind::Explicit => "Explicit",
            TrapKind::StepBudgetExhausted => "StepBudget",
            TrapKind::CallStackOverflow => "StackOverflow",
        }
    }

    pub fn from_token(s: &str) -> Option<TrapKind> {
        Some(match s {
            "DivByZero" => TrapKind::DivideByZero,
            "Overflow" => TrapKind::IntegerOverflow,
            "CastOutOfRange" => TrapKind::SignedCastOutOfRange,
            "BadPointer" => TrapKind::NullOrUnalignedAccess,
            "BoundsCheck" => TrapKind::BoundsCheckFailure,
            "RuntimeError" => TrapKind::RuntimeHelperError,
            "Explicit" => TrapKind::Explicit,
            "StepBudget" => TrapKind::StepBudgetExhausted,
            "StackOverflow" => TrapKind::CallStackOverflow,
            _ => return None,
        })
    }
}

/// The kind of failure a [`Diagnostic`] reports (spec §7).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    SyntaxError,
    VerifierError,
    LinkError,
    Trap(TrapKind),
    /// Not a true error; a pause sentinel used by breakpoints and step limits.
    DebugPause,
}

/// The structured diagnostic shared by every failure surface: parser,
/// verifier, linker, runtime bridge, and VM (spec §6 "Diagnostic channel").
///
/// Diagnostics are never exceptions; they flow via `Result` return values or
/// a dedicated sink the embedder installs (see `il_vm::trace`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub loc: Option<SourceLoc>,
    pub function: Option<String>,
    pub block: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            loc: None,
            function: None,
            block: None,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::SyntaxError, message)
    }

    pub fn verifier(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::VerifierError, message)
    }

    pub fn link(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::LinkError, message)
    }

    pub fn trap(kind: TrapKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Trap(kind), message)
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    pub fn with_block(mut self, label: impl Into<String>) -> Self {
        self.block = Some(label.into());
        self
    }

    pub fn is_trap(&self) -> bool {
        matches!(self.kind, DiagnosticKind::Trap(_))
    }
}
