//! Command surface over one opened class file.

use log::debug;

use crate::code_attribute::{disassemble, render_listing, AddressedInstruction, DisassemblyPolicy};
#[cfg(feature = "decompile")]
use crate::decompile::{cfg_for_code, ControlFlowGraph, DecompileOptions, Decompiler};
use crate::error::EngineError;
use crate::interpreter::{DebugSession, SessionConfig, Value};
use crate::method_info::MethodDescriptor;
use crate::types::ClassFile;

/// Options for every stage the engine drives.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub disassembly: DisassemblyPolicy,
    #[cfg(feature = "decompile")]
    pub decompile: DecompileOptions,
    pub session: SessionConfig,
}

/// A parsed class and the commands that inspect it.
///
/// Methods are selected by name, or by `name:descriptor` when overloaded.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    class: ClassFile,
}

impl Engine {
    /// Parse `bytes`. Errors leave no engine behind; other engines are
    /// unaffected.
    pub fn open(bytes: &[u8], config: EngineConfig) -> Result<Self, EngineError> {
        let class = crate::open(bytes)?;
        debug!(
            "opened {} ({} methods)",
            class.this_class_name().unwrap_or("<unnamed>"),
            class.methods.len()
        );
        Ok(Self::from_class(class, config))
    }

    pub fn from_class(class: ClassFile, config: EngineConfig) -> Self {
        Self { config, class }
    }

    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve a method by name or `name:descriptor`.
    pub fn method(&self, method: &str) -> Result<MethodDescriptor, EngineError> {
        let index = self
            .class
            .find_method(method)?
            .ok_or_else(|| EngineError::MethodNotFound(method.to_string()))?;
        Ok(self.class.methods[index].describe(&self.class.const_pool)?)
    }

    /// Every method of the class, resolved.
    pub fn methods(&self) -> Result<Vec<MethodDescriptor>, EngineError> {
        self.class
            .methods
            .iter()
            .map(|m| Ok(m.describe(&self.class.const_pool)?))
            .collect()
    }

    /// Instruction stream of a method; empty for abstract and native methods.
    pub fn disassemble(&self, method: &str) -> Result<Vec<AddressedInstruction>, EngineError> {
        match self.method(method)?.code {
            Some(code) => Ok(disassemble(&code.code, self.config.disassembly)?),
            None => Ok(Vec::new()),
        }
    }

    /// Disassembly listing with line markers and resolved operands.
    pub fn listing(&self, method: &str) -> Result<String, EngineError> {
        let descriptor = self.method(method)?;
        let Some(code) = descriptor.code.as_ref() else {
            return Ok(String::new());
        };
        let instructions = disassemble(&code.code, self.config.disassembly)?;
        Ok(render_listing(&instructions, &self.class.const_pool, Some(code)))
    }

    /// Source approximation of one method.
    #[cfg(feature = "decompile")]
    pub fn decompile(&self, method: &str) -> Result<String, EngineError> {
        self.decompiler().decompile_method(&self.class, method)
    }

    /// Source approximation of the whole class.
    #[cfg(feature = "decompile")]
    pub fn decompile_class(&self) -> Result<String, EngineError> {
        self.decompiler().decompile_class(&self.class)
    }

    /// Control flow graph of a method, `None` when it has no code.
    #[cfg(feature = "decompile")]
    pub fn cfg(&self, method: &str) -> Result<Option<ControlFlowGraph>, EngineError> {
        match self.method(method)?.code {
            Some(code) => Ok(Some(cfg_for_code(&code, self.config.disassembly)?)),
            None => Ok(None),
        }
    }

    #[cfg(feature = "decompile")]
    fn decompiler(&self) -> Decompiler {
        Decompiler::new(self.config.decompile.clone())
    }

    /// Open a debug session on `method`. Missing arguments are symbolic.
    pub fn start_session(&self, method: &str, args: Vec<Value>) -> Result<DebugSession<'_>, EngineError> {
        DebugSession::new(&self.class, method, args, self.config.session.clone())
    }

    /// Classes referenced from the constant pool, outside `java/lang`.
    pub fn dependencies(&self) -> Vec<String> {
        self.class.const_pool.class_references().into_iter().collect()
    }
}
