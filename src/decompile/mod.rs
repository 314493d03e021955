//! Bytecode to Java-like source: control flow graph, symbolic stack
//! simulation, structure recovery and rendering.

pub mod cfg;
pub mod cfg_types;
pub mod class_decompiler;
pub mod expr;
pub mod renderer;
mod scope;
pub mod stack_sim;
pub mod structured_types;
pub mod structuring;

pub use cfg::{build_cfg, cfg_for_code};
pub use cfg_types::{BasicBlock, BlockId, BranchCondition, ControlFlowGraph, Terminator};
pub use class_decompiler::{decompile, DecompileOptions, Decompiler};
pub use renderer::{JavaRenderer, RenderConfig};
pub use stack_sim::StackSimulator;
pub use structured_types::{StructuredBody, StructuredStmt};
pub use structuring::structure_method;
