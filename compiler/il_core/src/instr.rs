use crate::diagnostic::{SourceLoc, TrapKind};
use crate::ids::{BlockId, ValueId};
use crate::ty::Ty;
use crate::value::Value;

/// The predicate of an integer comparison (`icmp_*` / `scmp_*` / `ucmp_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    pub fn mnemonic(self) -> &'static str {
        match self {
            IntPredicate::Eq => "icmp_eq",
            IntPredicate::Ne => "icmp_ne",
            IntPredicate::Slt => "scmp_lt",
            IntPredicate::Sle => "scmp_le",
            IntPredicate::Sgt => "scmp_gt",
            IntPredicate::Sge => "scmp_ge",
            IntPredicate::Ult => "ucmp_lt",
            IntPredicate::Ule => "ucmp_le",
            IntPredicate::Ugt => "ucmp_gt",
            IntPredicate::Uge => "ucmp_ge",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<IntPredicate> {
        Some(match s {
            "icmp_eq" => IntPredicate::Eq,
            "icmp_ne" => IntPredicate::Ne,
            "scmp_lt" => IntPredicate::Slt,
            "scmp_le" => IntPredicate::Sle,
            "scmp_gt" => IntPredicate::Sgt,
            "scmp_ge" => IntPredicate::Sge,
            "ucmp_lt" => IntPredicate::Ult,
            "ucmp_le" => IntPredicate::Ule,
            "ucmp_gt" => IntPredicate::Ugt,
            "ucmp_ge" => IntPredicate::Uge,
            _ => return None,
        })
    }

    /// Evaluate the predicate over two 64-bit operands using the
    /// signedness the predicate names.
    pub fn eval(self, a: i64, b: i64) -> bool {
        match self {
            IntPredicate::Eq => a == b,
            IntPredicate::Ne => a != b,
            IntPredicate::Slt => a < b,
            IntPredicate::Sle => a <= b,
            IntPredicate::Sgt => a > b,
            IntPredicate::Sge => a >= b,
            IntPredicate::Ult => (a as u64) < (b as u64),
            IntPredicate::Ule => (a as u64) <= (b as u64),
            IntPredicate::Ugt => (a as u64) > (b as u64),
            IntPredicate::Uge => (a as u64) >= (b as u64),
        }
    }
}

/// The predicate of a floating-point comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl FloatPredicate {
    pub fn mnemonic(self) -> &'static str {
        match self {
            FloatPredicate::Oeq => "fcmp_eq",
            FloatPredicate::One => "fcmp_ne",
            FloatPredicate::Olt => "fcmp_lt",
            FloatPredicate::Ole => "fcmp_le",
            FloatPredicate::Ogt => "fcmp_gt",
            FloatPredicate::Oge => "fcmp_ge",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<FloatPredicate> {
        Some(match s {
            "fcmp_eq" => FloatPredicate::Oeq,
            "fcmp_ne" => FloatPredicate::One,
            "fcmp_lt" => FloatPredicate::Olt,
            "fcmp_le" => FloatPredicate::Ole,
            "fcmp_gt" => FloatPredicate::Ogt,
            "fcmp_ge" => FloatPredicate::Oge,
            _ => return None,
        })
    }

    pub fn eval(self, a: f64, b: f64) -> bool {
        match self {
            FloatPredicate::Oeq => a == b,
            FloatPredicate::One => a != b,
            FloatPredicate::Olt => a < b,
            FloatPredicate::Ole => a <= b,
            FloatPredicate::Ogt => a > b,
            FloatPredicate::Oge => a >= b,
        }
    }
}

/// Every operation the IL supports (spec §4.1 grammar, §4.4, §4.6).
///
/// Opcodes that are not terminators never appear at the end of a block;
/// [`Opcode::is_terminator`] is the single source of truth the verifier,
/// analyses, and the VM all consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Checked (trapping) integer arithmetic.
    IAddOvf,
    ISubOvf,
    IMulOvf,
    // Wrapping integer arithmetic (no trap).
    IAdd,
    ISub,
    IMul,
    // Checked division / remainder (trap on zero divisor and, for signed
    // division, on the INT_MIN / -1 overflow case).
    SDivChk0,
    SRemChk0,
    UDivChk0,
    URemChk0,
    // Bitwise / shifts.
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    // Float arithmetic.
    FAdd,
    FSub,
    FMul,
    FDiv,
    // Comparisons.
    ICmp(IntPredicate),
    FCmp(FloatPredicate),
    // Conversions.
    /// Zero-extend an `i1` to `i64` (`true` becomes `1`).
    Zext1,
    // Memory.
    Alloca,
    Load,
    Store,
    // Constants materialised as an instruction result (interned at VM
    // construction time; see spec §4.6).
    ConstStr,
    // Calls.
    Call,
    // Terminators.
    Br,
    CBr,
    SwitchI32,
    Ret,
    Trap,
    TrapKind(TrapKind),
    TrapFromErr,
    ResumeSame,
    ResumeNext,
    ResumeLabel,
    // Exception handling (not terminators).
    EhPush,
    EhPop,
    EhEntry,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Br
                | Opcode::CBr
                | Opcode::SwitchI32
                | Opcode::Ret
                | Opcode::Trap
                | Opcode::TrapKind(_)
                | Opcode::TrapFromErr
                | Opcode::ResumeSame
                | Opcode::ResumeNext
                | Opcode::ResumeLabel
        )
    }

    pub fn is_eh_sensitive(self) -> bool {
        matches!(
            self,
            Opcode::EhEntry
                | Opcode::EhPush
                | Opcode::EhPop
                | Opcode::ResumeSame
                | Opcode::ResumeNext
                | Opcode::ResumeLabel
        )
    }

    pub fn mnemonic(self) -> String {
        match self {
            Opcode::IAddOvf => "iadd.ovf".into(),
            Opcode::ISubOvf => "isub.ovf".into(),
            Opcode::IMulOvf => "imul.ovf".into(),
            Opcode::IAdd => "iadd".into(),
            Opcode::ISub => "isub".into(),
            Opcode::IMul => "imul".into(),
            Opcode::SDivChk0 => "sdiv.chk0".into(),
            Opcode::SRemChk0 => "srem.chk0".into(),
            Opcode::UDivChk0 => "udiv.chk0".into(),
            Opcode::URemChk0 => "urem.chk0".into(),
            Opcode::And => "and".into(),
            Opcode::Or => "or".into(),
            Opcode::Xor => "xor".into(),
            Opcode::Shl => "shl".into(),
            Opcode::LShr => "lshr".into(),
            Opcode::AShr => "ashr".into(),
            Opcode::FAdd => "fadd".into(),
            Opcode::FSub => "fsub".into(),
            Opcode::FMul => "fmul".into(),
            Opcode::FDiv => "fdiv".into(),
            Opcode::ICmp(p) => p.mnemonic().into(),
            Opcode::FCmp(p) => p.mnemonic().into(),
            Opcode::Zext1 => "zext1".into(),
            Opcode::Alloca => "alloca".into(),
            Opcode::Load => "load".into(),
            Opcode::Store => "store".into(),
            Opcode::ConstStr => "const_str".into(),
            Opcode::Call => "call".into(),
            Opcode::Br => "br".into(),
            Opcode::CBr => "cbr".into(),
            Opcode::SwitchI32 => "switch.i32".into(),
            Opcode::Ret => "ret".into(),
            Opcode::Trap => "trap".into(),
            Opcode::TrapKind(_) => "trap.kind".into(),
            Opcode::TrapFromErr => "trap.from_err".into(),
            Opcode::ResumeSame => "resume.same".into(),
            Opcode::ResumeNext => "resume.next".into(),
            Opcode::ResumeLabel => "resume.label".into(),
            Opcode::EhPush => "eh.push".into(),
            Opcode::EhPop => "eh.pop".into(),
            Opcode::EhEntry => "eh.entry".into(),
        }
    }

    /// The default result type for opcodes whose result type is fixed by
    /// the opcode alone (spec §4.1 "result type annotations are elided
    /// when they equal the opcode's default result type").
    pub fn default_result_ty(self) -> Option<Ty> {
        match self {
            Opcode::ICmp(_) | Opcode::FCmp(_) => Some(Ty::I1),
            Opcode::Zext1 => Some(Ty::I64),
            Opcode::ConstStr => Some(Ty::Str),
            Opcode::Alloca => Some(Ty::Ptr),
            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => Some(Ty::F64),
            _ => None,
        }
    }
}

/// A single instruction within a basic block (spec §3 "Instruction").
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    /// The SSA id this instruction defines, if any. Absent for terminators
    /// other than nothing (terminators never define a result) and for
    /// `store`/`eh.push`/`eh.pop`.
    pub result: Option<ValueId>,
    pub result_ty: Ty,
    pub operands: Vec<Value>,
    /// The callee symbol, present only for [`Opcode::Call`].
    pub callee: Option<String>,
    /// Successor labels, in instruction-specific order:
    /// - `br`: `[target]`
    /// - `cbr`: `[then, else]`
    /// - `switch.i32`: `[default, case_0, case_1, ...]`
    /// - `resume.label`: `[target]`
    /// - `eh.push`: `[handler]`
    pub successors: Vec<BlockId>,
    /// One branch-argument list per entry in `successors`.
    pub branch_args: Vec<Vec<Value>>,
    /// Case values for `switch.i32`, parallel to `successors[1..]`.
    pub switch_cases: Vec<i64>,
    pub loc: Option<SourceLoc>,
}

impl Instruction {
    pub fn new(opcode: Opcode, result_ty: Ty) -> Self {
        Instruction {
            opcode,
            result: None,
            result_ty,
            operands: Vec::new(),
            callee: None,
            successors: Vec::new(),
            branch_args: Vec::new(),
            switch_cases: Vec::new(),
            loc: None,
        }
    }

    pub fn with_result(mut self, id: ValueId) -> Self {
        self.result = Some(id);
        self
    }

    pub fn with_operands(mut self, operands: Vec<Value>) -> Self {
        self.operands = operands;
        self
    }

    pub fn with_callee(mut self, callee: impl Into<String>) -> Self {
        self.callee = Some(callee.into());
        self
    }

    pub fn with_loc(mut self, loc: SourceLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    /// Whether this opcode is one `SimplifyCFG`'s exception-handling guard
    /// must never touch (spec §4.4 SimplifyCFG, §9 first Open Question).
    pub fn is_eh_sensitive(&self) -> bool {
        self.opcode.is_eh_sensitive()
    }

    /// Replace every occurrence of `old` with `new` across operands and
    /// branch arguments. Used by constant folding and peephole rewrites
    /// (spec §4.4) to retire a temporary after inlining its value.
    pub fn replace_value(&mut self, old: ValueId, new: &Value) {
        for op in self.operands.iter_mut() {
            if op.as_temp() == Some(old) {
                *op = new.clone();
            }
        }
        for args in self.branch_args.iter_mut() {
            for arg in args.iter_mut() {
                if arg.as_temp() == Some(old) {
                    *arg = new.clone();
                }
            }
        }
    }
}
