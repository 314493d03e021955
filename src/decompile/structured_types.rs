use std::collections::BTreeSet;

use super::cfg_types::BlockId;
use super::expr::{Expr, Stmt};

/// A statement produced by control flow structuring.
/// Represents Java-level control flow constructs.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredStmt {
    /// A simple statement (from stack simulation).
    Simple(Stmt),
    /// Start of a basic block. Rendered only when a `Goto` targets it.
    Label(BlockId),
    /// if / if-else
    If {
        condition: Expr,
        then_body: Vec<StructuredStmt>,
        else_body: Vec<StructuredStmt>,
    },
    /// while loop; `while (true)` when no exit condition was recovered
    While {
        condition: Expr,
        body: Vec<StructuredStmt>,
    },
    /// do-while loop
    DoWhile {
        body: Vec<StructuredStmt>,
        condition: Expr,
    },
    /// switch statement
    Switch {
        expr: Expr,
        cases: Vec<SwitchCase>,
    },
    /// try-catch
    TryCatch {
        try_body: Vec<StructuredStmt>,
        catches: Vec<CatchClause>,
    },
    Break,
    Continue,
    /// Fallback for control flow no construct above expresses.
    Goto(BlockId),
    Comment(String),
}

/// A switch case arm. Falls through into the next arm unless its body ends
/// with a `Break`, return or throw.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub labels: Vec<SwitchLabel>,
    pub body: Vec<StructuredStmt>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SwitchLabel {
    Value(i32),
    Default,
}

/// A catch clause in a try-catch.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    /// Internal name; `java/lang/Throwable` for catch-all handlers.
    pub exception_type: String,
    pub var_name: String,
    pub body: Vec<StructuredStmt>,
}

/// A structured method body: the sequence of structured statements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredBody {
    pub statements: Vec<StructuredStmt>,
    /// Blocks some `Goto` jumps to.
    pub goto_targets: BTreeSet<BlockId>,
}

impl StructuredBody {
    pub fn new(statements: Vec<StructuredStmt>) -> Self {
        Self {
            statements,
            goto_targets: BTreeSet::new(),
        }
    }

    /// Whether structuring fell back to gotos anywhere in the body.
    pub fn has_gotos(&self) -> bool {
        !self.goto_targets.is_empty()
    }
}
