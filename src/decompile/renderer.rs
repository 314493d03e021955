use std::collections::BTreeSet;
use std::fmt::Write;

use crate::descriptor::{simple_class_name, JvmType};
use crate::method_info::{MethodCode, MethodDescriptor};

use super::cfg_types::BlockId;
use super::expr::*;
use super::scope::hoisted_locals;
use super::structured_types::*;

/// Configuration for rendering Java source code.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub indent: String,
    /// Mark the bytecode offset at which every block starts.
    pub show_offsets: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent: "    ".into(),
            show_offsets: false,
        }
    }
}

/// The parts of a class declaration printed around its methods.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassOutline {
    /// Internal name, e.g. `com/example/Foo`.
    pub name: String,
    pub modifiers: Vec<&'static str>,
    /// `class`, `interface`, `enum` or `@interface`.
    pub kind: &'static str,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldOutline>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldOutline {
    pub modifiers: Vec<&'static str>,
    pub ty: JvmType,
    pub name: String,
}

/// Java source code renderer.
pub struct JavaRenderer {
    config: RenderConfig,
    output: String,
    indent_level: usize,
    this_class: String,
    return_type: JvmType,
    declared: BTreeSet<String>,
    goto_targets: BTreeSet<BlockId>,
}

impl JavaRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            output: String::new(),
            indent_level: 0,
            this_class: String::new(),
            return_type: JvmType::Void,
            declared: BTreeSet::new(),
            goto_targets: BTreeSet::new(),
        }
    }

    /// Render a class declaration around already rendered method texts.
    pub fn render_class(mut self, outline: &ClassOutline, methods: &[String]) -> String {
        if let Some((package, _)) = outline.name.rsplit_once('/') {
            self.writeln(&format!("package {};", package.replace('/', ".")));
            self.newline();
        }

        let mut decl = String::new();
        for modifier in &outline.modifiers {
            decl.push_str(modifier);
            decl.push(' ');
        }
        decl.push_str(outline.kind);
        decl.push(' ');
        decl.push_str(&class_simple_name(&outline.name));
        if let Some(ref super_class) = outline.super_class {
            if super_class != "java/lang/Object" && outline.kind == "class" {
                decl.push_str(" extends ");
                decl.push_str(&class_simple_name(super_class));
            }
        }
        if !outline.interfaces.is_empty() {
            decl.push_str(if outline.kind == "interface" { " extends " } else { " implements " });
            let names: Vec<String> = outline.interfaces.iter().map(|i| class_simple_name(i)).collect();
            decl.push_str(&names.join(", "));
        }
        decl.push_str(" {");
        self.writeln(&decl);
        self.indent_level += 1;

        for field in &outline.fields {
            let mut line = String::new();
            for modifier in &field.modifiers {
                line.push_str(modifier);
                line.push(' ');
            }
            write!(line, "{} {};", type_name(&field.ty), field.name).ok();
            self.writeln(&line);
        }

        for (i, method) in methods.iter().enumerate() {
            if i > 0 || !outline.fields.is_empty() {
                self.newline();
            }
            for line in method.lines() {
                if line.is_empty() {
                    self.newline();
                } else {
                    self.writeln(line);
                }
            }
        }

        self.indent_level -= 1;
        self.writeln("}");
        self.output
    }

    /// Render one method: its declaration, then the body when there is one.
    pub fn render_method(
        mut self,
        class_name: &str,
        method: &MethodDescriptor,
        body: Option<&StructuredBody>,
    ) -> String {
        self.this_class = class_name.to_string();
        self.return_type = method.signature.ret.clone();

        let mut decl = String::new();
        if method.name == "<clinit>" {
            decl.push_str("static");
        } else {
            for modifier in method.access_flags.modifiers() {
                decl.push_str(modifier);
                decl.push(' ');
            }
            if method.name == "<init>" {
                decl.push_str(&class_simple_name(class_name));
            } else {
                decl.push_str(&type_name(&method.signature.ret));
                decl.push(' ');
                decl.push_str(&method.name);
            }

            let mut slot = if method.is_static() { 0 } else { 1 };
            let mut params = Vec::new();
            for ty in &method.signature.params {
                let name = param_name(method.code.as_ref(), slot, ty);
                params.push(format!("{} {}", type_name(ty), name));
                self.declared.insert(name);
                slot += ty.slot_size();
            }
            write!(decl, "({})", params.join(", ")).ok();
            if !method.throws.is_empty() {
                let names: Vec<String> = method.throws.iter().map(|t| class_simple_name(t)).collect();
                write!(decl, " throws {}", names.join(", ")).ok();
            }
        }

        match body {
            None => {
                decl.push(';');
                self.writeln(&decl);
            }
            Some(body) => {
                self.goto_targets = body.goto_targets.clone();
                decl.push_str(" {");
                self.writeln(&decl);
                self.indent_level += 1;
                for var in hoisted_locals(&body.statements) {
                    if self.declared.insert(var.name.clone()) {
                        self.writeln(&format!("{} {};", type_name(&var.ty), var.name));
                    }
                }
                self.render_stmts(&body.statements);
                self.indent_level -= 1;
                self.writeln("}");
            }
        }
        self.output
    }

    fn render_stmts(&mut self, stmts: &[StructuredStmt]) {
        for stmt in stmts {
            self.render_structured_stmt(stmt);
        }
    }

    fn render_block(&mut self, stmts: &[StructuredStmt]) {
        self.indent_level += 1;
        self.render_stmts(stmts);
        self.indent_level -= 1;
    }

    fn render_structured_stmt(&mut self, stmt: &StructuredStmt) {
        match stmt {
            StructuredStmt::Simple(s) => self.render_simple_stmt(s),
            StructuredStmt::Label(id) => {
                if self.goto_targets.contains(id) {
                    self.writeln(&format!("L{}:", id));
                } else if self.config.show_offsets {
                    self.writeln(&format!("// @{}", id));
                }
            }
            StructuredStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.writeln(&format!("if ({}) {{", self.render_expr(condition)));
                self.render_block(then_body);
                if !else_body.is_empty() {
                    self.writeln("} else {");
                    self.render_block(else_body);
                }
                self.writeln("}");
            }
            StructuredStmt::While { condition, body } => {
                self.writeln(&format!("while ({}) {{", self.render_expr(condition)));
                self.render_block(body);
                self.writeln("}");
            }
            StructuredStmt::DoWhile { body, condition } => {
                self.writeln("do {");
                self.render_block(body);
                self.writeln(&format!("}} while ({});", self.render_expr(condition)));
            }
            StructuredStmt::Switch { expr, cases } => {
                self.writeln(&format!("switch ({}) {{", self.render_expr(expr)));
                self.indent_level += 1;
                for case in cases {
                    for label in &case.labels {
                        match label {
                            SwitchLabel::Value(v) => self.writeln(&format!("case {}:", v)),
                            SwitchLabel::Default => self.writeln("default:"),
                        }
                    }
                    self.render_block(&case.body);
                }
                self.indent_level -= 1;
                self.writeln("}");
            }
            StructuredStmt::TryCatch { try_body, catches } => {
                self.writeln("try {");
                self.render_block(try_body);
                for catch in catches {
                    self.declared.insert(catch.var_name.clone());
                    self.writeln(&format!(
                        "}} catch ({} {}) {{",
                        class_simple_name(&catch.exception_type),
                        catch.var_name
                    ));
                    self.render_block(&catch.body);
                }
                self.writeln("}");
            }
            StructuredStmt::Break => self.writeln("break;"),
            StructuredStmt::Continue => self.writeln("continue;"),
            StructuredStmt::Goto(target) => self.writeln(&format!("goto L{};", target)),
            StructuredStmt::Comment(text) => self.writeln(&format!("// {}", text)),
        }
    }

    fn render_simple_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::LocalStore { var, value } => {
                let value = self.render_expr(value);
                if self.declared.insert(var.name.clone()) {
                    self.writeln(&format!("{} {} = {};", type_name(&var.ty), var.name, value));
                } else {
                    self.writeln(&format!("{} = {};", var.name, value));
                }
            }
            Stmt::FieldStore {
                object,
                class_name,
                field_name,
                value,
            } => {
                let target = match object {
                    Some(obj) => format!("{}.{}", self.render_operand(obj), field_name),
                    None => format!("{}.{}", class_simple_name(class_name), field_name),
                };
                self.writeln(&format!("{} = {};", target, self.render_expr(value)));
            }
            Stmt::ArrayStore { array, index, value } => {
                self.writeln(&format!(
                    "{}[{}] = {};",
                    self.render_operand(array),
                    self.render_expr(index),
                    self.render_expr(value)
                ));
            }
            Stmt::ExprStmt(expr) => {
                self.writeln(&format!("{};", self.render_expr(expr)));
            }
            Stmt::Iinc { var, amount } => match amount {
                1 => self.writeln(&format!("{}++;", var.name)),
                -1 => self.writeln(&format!("{}--;", var.name)),
                n if *n < 0 => self.writeln(&format!("{} -= {};", var.name, -(*n as i64))),
                n => self.writeln(&format!("{} += {};", var.name, n)),
            },
            Stmt::Return(None) => self.writeln("return;"),
            Stmt::Return(Some(expr)) => {
                let value = match (expr, &self.return_type) {
                    (Expr::IntLiteral(0), JvmType::Boolean) => "false".to_string(),
                    (Expr::IntLiteral(1), JvmType::Boolean) => "true".to_string(),
                    _ => self.render_expr(expr),
                };
                self.writeln(&format!("return {};", value));
            }
            Stmt::Throw(expr) => {
                self.writeln(&format!("throw {};", self.render_expr(expr)));
            }
            Stmt::Monitor { enter, object } => {
                let op = if *enter { "monitorenter" } else { "monitorexit" };
                self.writeln(&format!("// {} {}", op, self.render_expr(object)));
            }
            Stmt::Comment(text) => self.writeln(&format!("// {}", text)),
        }
    }

    fn render_expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::IntLiteral(v) => format!("{}", v),
            Expr::LongLiteral(v) => format!("{}L", v),
            Expr::FloatLiteral(v) => {
                if v.is_nan() {
                    "Float.NaN".into()
                } else if v.is_infinite() {
                    if *v > 0.0 {
                        "Float.POSITIVE_INFINITY".into()
                    } else {
                        "Float.NEGATIVE_INFINITY".into()
                    }
                } else {
                    format!("{:?}f", v)
                }
            }
            Expr::DoubleLiteral(v) => {
                if v.is_nan() {
                    "Double.NaN".into()
                } else if v.is_infinite() {
                    if *v > 0.0 {
                        "Double.POSITIVE_INFINITY".into()
                    } else {
                        "Double.NEGATIVE_INFINITY".into()
                    }
                } else {
                    format!("{:?}", v)
                }
            }
            Expr::BoolLiteral(b) => format!("{}", b),
            Expr::StringLiteral(s) => format!("\"{}\"", escape_java_string(s)),
            Expr::ClassLiteral(name) => format!("{}.class", class_simple_name(name)),
            Expr::NullLiteral => "null".into(),
            Expr::LocalLoad(var) => var.name.clone(),
            Expr::This => "this".into(),
            Expr::CaughtException(_) => "e".into(),
            Expr::BinaryOp { op, left, right } => format!(
                "{} {} {}",
                self.render_operand(left),
                op.as_str(),
                self.render_operand(right)
            ),
            Expr::UnaryOp { op, operand } => {
                let op_str = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                };
                format!("{}{}", op_str, self.render_operand(operand))
            }
            Expr::Cast { target_type, operand } => {
                format!("({}) {}", type_name(target_type), self.render_operand(operand))
            }
            Expr::Instanceof { operand, check_type } => format!(
                "{} instanceof {}",
                self.render_operand(operand),
                class_simple_name(check_type)
            ),
            Expr::FieldGet {
                object,
                class_name,
                field_name,
                ..
            } => match object {
                Some(obj) => format!("{}.{}", self.render_operand(obj), field_name),
                None => format!("{}.{}", class_simple_name(class_name), field_name),
            },
            Expr::MethodCall {
                kind,
                object,
                class_name,
                method_name,
                args,
                ..
            } => {
                let args = self.render_args(args);
                match (kind, object.as_deref()) {
                    (InvokeKind::Special, Some(Expr::This)) if method_name == "<init>" => {
                        if *class_name == self.this_class {
                            format!("this({})", args)
                        } else {
                            format!("super({})", args)
                        }
                    }
                    (InvokeKind::Special, Some(Expr::This)) if *class_name != self.this_class => {
                        format!("super.{}({})", method_name, args)
                    }
                    (_, Some(obj)) => {
                        format!("{}.{}({})", self.render_operand(obj), method_name, args)
                    }
                    (_, None) => format!("{}.{}({})", class_simple_name(class_name), method_name, args),
                }
            }
            Expr::New { class_name, args } => {
                format!("new {}({})", class_simple_name(class_name), self.render_args(args))
            }
            Expr::NewArray { element_type, length } => {
                let (base, extra) = split_array(element_type);
                format!("new {}[{}]{}", base, self.render_expr(length), "[]".repeat(extra))
            }
            Expr::NewMultiArray {
                element_type,
                dimensions,
            } => {
                let (base, extra) = split_array(element_type);
                let dims: String = dimensions
                    .iter()
                    .map(|d| format!("[{}]", self.render_expr(d)))
                    .collect();
                format!("new {}{}{}", base, dims, "[]".repeat(extra))
            }
            Expr::ArrayLength { array } => format!("{}.length", self.render_operand(array)),
            Expr::ArrayLoad { array, index, .. } => {
                format!("{}[{}]", self.render_operand(array), self.render_expr(index))
            }
            Expr::Compare { op, left, right } => format!(
                "{} {} {}",
                self.render_operand(left),
                op.as_str(),
                self.render_operand(right)
            ),
            Expr::CmpResult { left, right } => {
                format!("compare({}, {})", self.render_expr(left), self.render_expr(right))
            }
            Expr::InvokeDynamic { method_name, args } => {
                format!("/* invokedynamic */ {}({})", method_name, self.render_args(args))
            }
            Expr::Unresolved(msg) => format!("/* {} */", msg),
            Expr::UninitNew { class_name, .. } => {
                format!("/* uninitialized */ new {}", class_simple_name(class_name))
            }
        }
    }

    /// Render an operand of a larger expression, parenthesized unless atomic.
    fn render_operand(&self, expr: &Expr) -> String {
        match expr {
            Expr::BinaryOp { .. }
            | Expr::Compare { .. }
            | Expr::Cast { .. }
            | Expr::Instanceof { .. }
            | Expr::UnaryOp { .. } => format!("({})", self.render_expr(expr)),
            Expr::IntLiteral(v) if *v < 0 => format!("({})", v),
            _ => self.render_expr(expr),
        }
    }

    fn render_args(&self, args: &[Expr]) -> String {
        args.iter()
            .map(|a| self.render_expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(&self.config.indent);
        }
    }

    fn writeln(&mut self, text: &str) {
        self.write_indent();
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }
}

/// Source name of a parameter slot, chosen the way the body names loads of it.
fn param_name(code: Option<&MethodCode>, slot: u16, ty: &JvmType) -> String {
    if let Some(name) = code.and_then(|c| c.local_name(slot, 0).or_else(|| c.any_local_name(slot))) {
        return name.to_string();
    }
    let prefix = match ty {
        JvmType::Array(_) => "obj",
        other => other.local_prefix(),
    };
    format!("{}{}", prefix, slot)
}

/// `java/util/Map$Entry` -> `Map.Entry`
fn class_simple_name(name: &str) -> String {
    if name.starts_with('[') {
        if let Some(ty) = crate::descriptor::parse_field_descriptor(name) {
            return type_name(&ty);
        }
    }
    simple_class_name(name).replace('$', ".")
}

fn type_name(ty: &JvmType) -> String {
    match ty {
        JvmType::Reference(name) => class_simple_name(name),
        JvmType::Array(inner) => format!("{}[]", type_name(inner)),
        other => other.source_name(),
    }
}

/// Base element type name and the number of array levels above it.
fn split_array(ty: &JvmType) -> (String, usize) {
    let mut extra = 0;
    let mut cur = ty;
    while let JvmType::Array(inner) = cur {
        extra += 1;
        cur = inner;
    }
    (type_name(cur), extra)
}

fn escape_java_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                write!(out, "\\u{:04x}", c as u32).ok();
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_method_descriptor;
    use crate::method_info::MethodAccessFlags;

    fn var(name: &str, ty: JvmType) -> LocalVar {
        LocalVar {
            index: 1,
            name: name.into(),
            ty,
        }
    }

    fn method(name: &str, descriptor: &str, flags: MethodAccessFlags) -> MethodDescriptor {
        MethodDescriptor {
            name: name.into(),
            descriptor: descriptor.into(),
            signature: parse_method_descriptor(descriptor).unwrap(),
            access_flags: flags,
            throws: vec![],
            code: None,
        }
    }

    #[test]
    fn declares_locals_on_first_store_only() {
        let x = var("i1", JvmType::Int);
        let body = StructuredBody::new(vec![
            StructuredStmt::Simple(Stmt::LocalStore {
                var: x.clone(),
                value: Expr::IntLiteral(0),
            }),
            StructuredStmt::Simple(Stmt::LocalStore {
                var: x.clone(),
                value: Expr::IntLiteral(-3),
            }),
            StructuredStmt::Simple(Stmt::Iinc { var: x, amount: -2 }),
        ]);
        let text = JavaRenderer::new(RenderConfig::default()).render_method(
            "demo/Calc",
            &method("f", "()V", MethodAccessFlags::STATIC),
            Some(&body),
        );
        assert_eq!(
            text,
            "static void f() {\n    int i1 = 0;\n    i1 = -3;\n    i1 -= 2;\n}\n"
        );
    }

    #[test]
    fn local_assigned_in_both_arms_is_declared_before_the_if() {
        let r = var("i1", JvmType::Int);
        let arm = |value| {
            vec![StructuredStmt::Simple(Stmt::LocalStore {
                var: r.clone(),
                value: Expr::IntLiteral(value),
            })]
        };
        let body = StructuredBody::new(vec![
            StructuredStmt::If {
                condition: Expr::Compare {
                    op: CompareOp::Gt,
                    left: Box::new(Expr::LocalLoad(var("i0", JvmType::Int))),
                    right: Box::new(Expr::IntLiteral(0)),
                },
                then_body: arm(1),
                else_body: arm(2),
            },
            StructuredStmt::Simple(Stmt::Return(Some(Expr::LocalLoad(r.clone())))),
        ]);
        let text = JavaRenderer::new(RenderConfig::default()).render_method(
            "demo/Calc",
            &method("pick", "(I)I", MethodAccessFlags::STATIC),
            Some(&body),
        );
        assert_eq!(
            text,
            "static int pick(int i0) {\n    int i1;\n    if (i0 > 0) {\n        i1 = 1;\n    } else {\n        i1 = 2;\n    }\n    return i1;\n}\n"
        );
    }

    #[test]
    fn nested_binary_operands_are_parenthesized() {
        let renderer = JavaRenderer::new(RenderConfig::default());
        let sum = Expr::BinaryOp {
            op: BinOp::Add,
            left: Box::new(Expr::IntLiteral(1)),
            right: Box::new(Expr::IntLiteral(2)),
        };
        let product = Expr::BinaryOp {
            op: BinOp::Mul,
            left: Box::new(sum),
            right: Box::new(Expr::IntLiteral(3)),
        };
        assert_eq!(renderer.render_expr(&product), "(1 + 2) * 3");
        assert_eq!(renderer.render_expr(&Expr::DoubleLiteral(1.0)), "1.0");
        assert_eq!(renderer.render_expr(&Expr::FloatLiteral(f32::NAN)), "Float.NaN");
        assert_eq!(renderer.render_expr(&Expr::LongLiteral(7)), "7L");
        assert_eq!(
            renderer.render_expr(&Expr::StringLiteral("a\"b\n".into())),
            "\"a\\\"b\\n\""
        );
    }

    #[test]
    fn declaration_without_code() {
        let text = JavaRenderer::new(RenderConfig::default()).render_method(
            "demo/Shape",
            &method(
                "area",
                "(Ljava/lang/String;[I)D",
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            ),
            None,
        );
        assert_eq!(text, "public abstract double area(String obj1, int[] obj2);\n");
    }

    #[test]
    fn constructor_calls_super() {
        let body = StructuredBody::new(vec![StructuredStmt::Simple(Stmt::ExprStmt(
            Expr::MethodCall {
                kind: InvokeKind::Special,
                object: Some(Box::new(Expr::This)),
                class_name: "java/lang/Object".into(),
                method_name: "<init>".into(),
                descriptor: "()V".into(),
                args: vec![],
                return_type: JvmType::Void,
            },
        ))]);
        let text = JavaRenderer::new(RenderConfig::default()).render_method(
            "demo/Point",
            &method("<init>", "()V", MethodAccessFlags::PUBLIC),
            Some(&body),
        );
        assert_eq!(text, "public Point() {\n    super();\n}\n");
    }

    #[test]
    fn class_outline_wraps_methods() {
        let outline = ClassOutline {
            name: "demo/Point".into(),
            modifiers: vec!["public"],
            kind: "class",
            super_class: Some("java/lang/Object".into()),
            interfaces: vec!["java/lang/Runnable".into()],
            fields: vec![FieldOutline {
                modifiers: vec!["private"],
                ty: JvmType::Int,
                name: "x".into(),
            }],
        };
        let text = JavaRenderer::new(RenderConfig::default())
            .render_class(&outline, &["void run() {\n}\n".to_string()]);
        assert_eq!(
            text,
            "package demo;\n\npublic class Point implements Runnable {\n    private int x;\n\n    void run() {\n    }\n}\n"
        );
    }

    #[test]
    fn goto_targets_get_labels() {
        let mut body = StructuredBody::new(vec![
            StructuredStmt::Label(0),
            StructuredStmt::Goto(4),
            StructuredStmt::Label(4),
            StructuredStmt::Simple(Stmt::Return(None)),
        ]);
        body.goto_targets.insert(4);
        let text = JavaRenderer::new(RenderConfig::default()).render_method(
            "demo/A",
            &method("g", "()V", MethodAccessFlags::empty()),
            Some(&body),
        );
        assert_eq!(text, "void g() {\n    goto L4;\n    L4:\n    return;\n}\n");
    }
}
