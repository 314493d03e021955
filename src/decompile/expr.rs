use crate::descriptor::JvmType;

use super::cfg_types::BlockId;

/// Binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul, Div, Rem,
    Shl, Shr, Ushr,
    And, Or, Xor,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }
}

/// Unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    /// Boolean negation of a condition that is not a comparison.
    Not,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq, Ne, Lt, Ge, Gt, Le,
}

impl CompareOp {
    /// Returns the negated comparison.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// Java source token for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// Method invocation kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Local variable reference with its display name already chosen.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    pub index: u16,
    pub name: String,
    pub ty: JvmType,
}

/// Expression tree node -- represents a value-producing computation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    // --- Literals ---
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    BoolLiteral(bool),
    StringLiteral(String),
    ClassLiteral(String),
    NullLiteral,

    // --- Variables ---
    LocalLoad(LocalVar),
    This,
    /// The exception object on entry to a handler.
    CaughtException(String),

    // --- Operations ---
    BinaryOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    Cast { target_type: JvmType, operand: Box<Expr> },
    Instanceof { operand: Box<Expr>, check_type: String },

    // --- Field access ---
    FieldGet {
        object: Option<Box<Expr>>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
    },

    // --- Method invocation ---
    MethodCall {
        kind: InvokeKind,
        object: Option<Box<Expr>>,
        class_name: String,
        method_name: String,
        descriptor: String,
        args: Vec<Expr>,
        return_type: JvmType,
    },

    // --- Object creation ---
    New {
        class_name: String,
        args: Vec<Expr>,
    },
    NewArray { element_type: JvmType, length: Box<Expr> },
    NewMultiArray { element_type: JvmType, dimensions: Vec<Expr> },
    ArrayLength { array: Box<Expr> },
    ArrayLoad { array: Box<Expr>, index: Box<Expr>, element_type: JvmType },

    // --- Comparison ---
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    /// Result of lcmp/fcmpl/fcmpg/dcmpl/dcmpg: -1, 0, or 1
    CmpResult { left: Box<Expr>, right: Box<Expr> },

    // --- invokedynamic ---
    InvokeDynamic {
        method_name: String,
        args: Vec<Expr>,
    },

    // --- Fallback ---
    Unresolved(String),

    /// An object between `new` and its constructor call, keyed by the
    /// offset of the `new`.
    UninitNew { class_name: String, site: u32 },
}

impl Expr {
    /// The logical negation of a branch condition.
    pub fn negate(self) -> Expr {
        match self {
            Expr::Compare { op, left, right } => Expr::Compare {
                op: op.negate(),
                left,
                right,
            },
            Expr::BoolLiteral(b) => Expr::BoolLiteral(!b),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            other => Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(other),
            },
        }
    }

    /// Whether evaluating the expression can do more than read values.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Expr::MethodCall { .. } | Expr::New { .. } | Expr::InvokeDynamic { .. } => true,
            Expr::NewArray { .. } | Expr::NewMultiArray { .. } => true,
            Expr::BinaryOp { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right } => left.has_side_effects() || right.has_side_effects(),
            Expr::UnaryOp { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::Instanceof { operand, .. } => operand.has_side_effects(),
            Expr::FieldGet { object, .. } => object.as_ref().is_some_and(|o| o.has_side_effects()),
            Expr::ArrayLength { array } => array.has_side_effects(),
            Expr::ArrayLoad { array, index, .. } => array.has_side_effects() || index.has_side_effects(),
            _ => false,
        }
    }
}

/// Statement -- represents a side-effecting operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    LocalStore { var: LocalVar, value: Expr },
    FieldStore {
        object: Option<Expr>,
        class_name: String,
        field_name: String,
        value: Expr,
    },
    ArrayStore { array: Expr, index: Expr, value: Expr },
    ExprStmt(Expr),
    Iinc { var: LocalVar, amount: i32 },
    Return(Option<Expr>),
    Throw(Expr),
    Monitor { enter: bool, object: Expr },
    /// Something the simulation could not express, kept as a comment.
    Comment(String),
}

/// A simulated basic block: the result of stack-simulating one BasicBlock.
#[derive(Clone, Debug)]
pub struct SimulatedBlock {
    pub id: BlockId,
    pub statements: Vec<Stmt>,
    pub exit_stack: Vec<Expr>,
    /// Condition under which the taken edge is followed (conditional branches).
    pub branch_condition: Option<Expr>,
    /// Scrutinee of a tableswitch or lookupswitch.
    pub switch_value: Option<Expr>,
}
