//! Declaration placement for locals of a structured body.

use std::collections::{BTreeMap, BTreeSet};

use super::expr::*;
use super::structured_types::*;

/// Path from the body to a statement: `(statement list, index)` at each level.
type Position = Vec<(usize, usize)>;

/// Locals whose first store does not enclose all their uses, in order of
/// first store. They are declared at the top of the method body instead of
/// at that store.
pub fn hoisted_locals(statements: &[StructuredStmt]) -> Vec<LocalVar> {
    let mut scan = ScopeScan::default();
    let mut path = Vec::new();
    scan.list(statements, &mut path);

    let mut hoisted = Vec::new();
    for (name, first) in &scan.first_store {
        if scan.caught.contains(name) {
            continue;
        }
        let escapes = scan.read_before_store.contains(name)
            || scan.uses[name].iter().any(|at| !encloses(&first.at, at));
        if escapes {
            hoisted.push((first.order, first.var.clone()));
        }
    }
    hoisted.sort_by_key(|(order, _)| *order);
    hoisted.into_iter().map(|(_, var)| var).collect()
}

/// Whether a declaration at `store` is in scope at `at`: `at` lies in the
/// same statement list at or after the store, or nested below such a statement.
fn encloses(store: &Position, at: &Position) -> bool {
    let Some((&(list, index), outer)) = store.split_last() else {
        return true;
    };
    at.len() > outer.len()
        && at[..outer.len()] == *outer
        && at[outer.len()].0 == list
        && at[outer.len()].1 >= index
}

struct FirstStore {
    var: LocalVar,
    at: Position,
    order: usize,
}

#[derive(Default)]
struct ScopeScan {
    lists: usize,
    first_store: BTreeMap<String, FirstStore>,
    uses: BTreeMap<String, Vec<Position>>,
    read_before_store: BTreeSet<String>,
    caught: BTreeSet<String>,
}

impl ScopeScan {
    fn list(&mut self, stmts: &[StructuredStmt], path: &mut Position) {
        let id = self.lists;
        self.lists += 1;
        for (index, stmt) in stmts.iter().enumerate() {
            path.push((id, index));
            self.stmt(stmt, path);
            path.pop();
        }
    }

    fn stmt(&mut self, stmt: &StructuredStmt, path: &mut Position) {
        match stmt {
            StructuredStmt::Simple(s) => self.simple(s, path),
            StructuredStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition, path);
                self.list(then_body, path);
                self.list(else_body, path);
            }
            StructuredStmt::While { condition, body } => {
                self.expr(condition, path);
                self.list(body, path);
            }
            StructuredStmt::DoWhile { body, condition } => {
                self.list(body, path);
                self.expr(condition, path);
            }
            StructuredStmt::Switch { expr, cases } => {
                self.expr(expr, path);
                for case in cases {
                    self.list(&case.body, path);
                }
            }
            StructuredStmt::TryCatch { try_body, catches } => {
                self.list(try_body, path);
                for catch in catches {
                    self.caught.insert(catch.var_name.clone());
                    self.list(&catch.body, path);
                }
            }
            StructuredStmt::Label(_)
            | StructuredStmt::Break
            | StructuredStmt::Continue
            | StructuredStmt::Goto(_)
            | StructuredStmt::Comment(_) => {}
        }
    }

    fn simple(&mut self, stmt: &Stmt, path: &Position) {
        match stmt {
            Stmt::LocalStore { var, value } => {
                self.expr(value, path);
                if !self.first_store.contains_key(&var.name) {
                    let order = self.first_store.len();
                    self.first_store.insert(
                        var.name.clone(),
                        FirstStore {
                            var: var.clone(),
                            at: path.clone(),
                            order,
                        },
                    );
                }
                self.use_at(var, path);
            }
            Stmt::FieldStore { object, value, .. } => {
                if let Some(object) = object {
                    self.expr(object, path);
                }
                self.expr(value, path);
            }
            Stmt::ArrayStore { array, index, value } => {
                self.expr(array, path);
                self.expr(index, path);
                self.expr(value, path);
            }
            Stmt::ExprStmt(expr) | Stmt::Throw(expr) | Stmt::Return(Some(expr)) => self.expr(expr, path),
            Stmt::Monitor { object, .. } => self.expr(object, path),
            Stmt::Iinc { var, .. } => self.use_at(var, path),
            Stmt::Return(None) | Stmt::Comment(_) => {}
        }
    }

    fn use_at(&mut self, var: &LocalVar, path: &Position) {
        if !self.first_store.contains_key(&var.name) {
            self.read_before_store.insert(var.name.clone());
        }
        self.uses.entry(var.name.clone()).or_default().push(path.clone());
    }

    fn expr(&mut self, expr: &Expr, path: &Position) {
        match expr {
            Expr::LocalLoad(var) => self.use_at(var, path),
            Expr::BinaryOp { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right } => {
                self.expr(left, path);
                self.expr(right, path);
            }
            Expr::UnaryOp { operand, .. }
            | Expr::Cast { operand, .. }
            | Expr::Instanceof { operand, .. } => self.expr(operand, path),
            Expr::FieldGet { object, .. } => {
                if let Some(object) = object {
                    self.expr(object, path);
                }
            }
            Expr::MethodCall { object, args, .. } => {
                if let Some(object) = object {
                    self.expr(object, path);
                }
                for arg in args {
                    self.expr(arg, path);
                }
            }
            Expr::New { args, .. } | Expr::InvokeDynamic { args, .. } => {
                for arg in args {
                    self.expr(arg, path);
                }
            }
            Expr::NewMultiArray { dimensions, .. } => {
                for dim in dimensions {
                    self.expr(dim, path);
                }
            }
            Expr::NewArray { length, .. } => self.expr(length, path),
            Expr::ArrayLength { array } => self.expr(array, path),
            Expr::ArrayLoad { array, index, .. } => {
                self.expr(array, path);
                self.expr(index, path);
            }
            Expr::IntLiteral(_)
            | Expr::LongLiteral(_)
            | Expr::FloatLiteral(_)
            | Expr::DoubleLiteral(_)
            | Expr::BoolLiteral(_)
            | Expr::StringLiteral(_)
            | Expr::ClassLiteral(_)
            | Expr::NullLiteral
            | Expr::This
            | Expr::CaughtException(_)
            | Expr::Unresolved(_)
            | Expr::UninitNew { .. } => {}
        }
    }
}
