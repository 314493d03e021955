use log::{debug, warn};
use rayon::prelude::*;

use crate::code_attribute::{disassemble, DisassemblyPolicy};
use crate::constant_info::ConstantPool;
use crate::descriptor::parse_field_descriptor;
use crate::error::{EngineError, ParseError};
use crate::method_info::{MethodCode, MethodDescriptor};
use crate::types::{ClassAccessFlags, ClassFile};

use super::cfg::build_cfg;
use super::renderer::{ClassOutline, FieldOutline, JavaRenderer, RenderConfig};
use super::stack_sim::StackSimulator;
use super::structured_types::{StructuredBody, StructuredStmt};
use super::structuring::structure_method;

/// Options controlling the decompilation process.
#[derive(Clone, Debug)]
pub struct DecompileOptions {
    pub render: RenderConfig,
    /// Decompile the methods of a class on the rayon thread pool.
    pub parallel: bool,
    /// Keep going past undecodable opcodes, showing them as comments.
    pub fallback_to_raw: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            render: RenderConfig::default(),
            parallel: false,
            fallback_to_raw: true,
        }
    }
}

/// The main decompiler entry point.
#[derive(Clone, Debug, Default)]
pub struct Decompiler {
    options: DecompileOptions,
}

impl Decompiler {
    pub fn new(options: DecompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Decompile one method, selected by name or `name:descriptor`, to its
    /// declaration and body.
    pub fn decompile_method(&self, class: &ClassFile, method_name: &str) -> Result<String, EngineError> {
        let index = class
            .find_method(method_name)?
            .ok_or_else(|| EngineError::MethodNotFound(method_name.to_string()))?;
        let method = class.methods[index].describe(&class.const_pool)?;
        Ok(self.render_method(class.this_class_name()?, &method, &class.const_pool))
    }

    /// Decompile a whole class: declaration, fields and every method.
    pub fn decompile_class(&self, class: &ClassFile) -> Result<String, EngineError> {
        let class_name = class.this_class_name()?;
        let outline = class_outline(class)?;
        let methods = class
            .methods
            .iter()
            .map(|m| m.describe(&class.const_pool))
            .collect::<Result<Vec<_>, ParseError>>()?;

        let rendered = if self.options.parallel && methods.len() > 1 {
            self.render_parallel(class_name, &methods, &class.const_pool)
        } else {
            methods
                .iter()
                .map(|m| self.render_method(class_name, m, &class.const_pool))
                .collect()
        };

        Ok(JavaRenderer::new(self.options.render.clone()).render_class(&outline, &rendered))
    }

    /// Render a resolved method. Never fails: undecodable bodies render as a
    /// comment and methods without code as a bare declaration.
    pub fn render_method(&self, class_name: &str, method: &MethodDescriptor, pool: &ConstantPool) -> String {
        let body = method
            .code
            .as_ref()
            .map(|code| self.structure(method, code, pool));
        JavaRenderer::new(self.options.render.clone()).render_method(class_name, method, body.as_ref())
    }

    /// Run the pipeline up to structuring for one method body.
    pub fn structure(&self, method: &MethodDescriptor, code: &MethodCode, pool: &ConstantPool) -> StructuredBody {
        let instructions = match disassemble(&code.code, DisassemblyPolicy::Strict) {
            Ok(instructions) => instructions,
            Err(err) if self.options.fallback_to_raw => {
                warn!("{}: {}; decompiling with raw opcodes", method.key(), err);
                match disassemble(&code.code, DisassemblyPolicy::RawFallback) {
                    Ok(instructions) => instructions,
                    Err(err) => return undecodable(err),
                }
            }
            Err(err) => return undecodable(err),
        };
        let cfg = build_cfg(&instructions, &code.exception_table);
        debug!(
            "{}: {} instructions in {} blocks",
            method.key(),
            instructions.len(),
            cfg.blocks.len()
        );
        let simulated = StackSimulator::new(pool, code, method.is_static()).simulate(&cfg);
        structure_method(&cfg, &simulated, pool)
    }

    fn render_parallel(&self, class_name: &str, methods: &[MethodDescriptor], pool: &ConstantPool) -> Vec<String> {
        debug!("decompiling {} methods of {} in parallel", methods.len(), class_name);
        methods
            .par_iter()
            .map(|m| self.render_method(class_name, m, pool))
            .collect()
    }
}

fn undecodable(err: impl std::fmt::Display) -> StructuredBody {
    StructuredBody::new(vec![StructuredStmt::Comment(format!(
        "bytecode could not be decoded: {}",
        err
    ))])
}

fn class_outline(class: &ClassFile) -> Result<ClassOutline, ParseError> {
    let flags = class.access_flags;
    let kind = if flags.contains(ClassAccessFlags::ANNOTATION) {
        "@interface"
    } else if flags.contains(ClassAccessFlags::INTERFACE) {
        "interface"
    } else if flags.contains(ClassAccessFlags::ENUM) {
        "enum"
    } else {
        "class"
    };
    let mut modifiers = Vec::new();
    if flags.contains(ClassAccessFlags::PUBLIC) {
        modifiers.push("public");
    }
    if flags.contains(ClassAccessFlags::ABSTRACT) && kind == "class" {
        modifiers.push("abstract");
    }
    if flags.contains(ClassAccessFlags::FINAL) && kind == "class" {
        modifiers.push("final");
    }

    let mut fields = Vec::new();
    for field in &class.fields {
        let descriptor = field.descriptor(&class.const_pool)?;
        fields.push(FieldOutline {
            modifiers: field.access_flags.modifiers(),
            ty: parse_field_descriptor(descriptor)
                .ok_or_else(|| ParseError::InvalidDescriptor(descriptor.to_string()))?,
            name: field.name(&class.const_pool)?.to_string(),
        });
    }

    Ok(ClassOutline {
        name: class.this_class_name()?.to_string(),
        modifiers,
        kind,
        super_class: class.super_class_name()?.map(str::to_string),
        interfaces: class.interface_names()?.into_iter().map(str::to_string).collect(),
        fields,
    })
}

/// Convenience function: decompile a ClassFile with default options.
pub fn decompile(class: &ClassFile) -> Result<String, EngineError> {
    Decompiler::default().decompile_class(class)
}

