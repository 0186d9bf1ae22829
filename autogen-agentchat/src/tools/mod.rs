//! Tool system: registration, argument marshaling and output normalization.
//!
//! This module provides the pieces a reasoning loop needs to call external
//! tools safely: immutable [`ToolDescriptor`]s held in a shared
//! [`ToolRegistry`], a pure [`ParameterMarshaler`] that validates raw model
//! arguments, and an [`OutputNormalizer`] that turns raw payloads into
//! bounded [`Observation`]s.

mod base_tool;
mod descriptor;
mod function_tool;
mod marshal;
mod normalize;
mod registry;

pub use base_tool::{InvocationContext, ToolInvoker, ToolOutcome};
#[cfg(test)]
pub use base_tool::MockToolInvoker;
pub use descriptor::{
    InputSchema, OutputKind, ParamType, ParameterSpec, ToolDescriptor, ToolDescriptorBuilder, ToolSpec,
};
pub use function_tool::{AsyncToolFunction, FunctionTool};
pub use marshal::{marshal_args, ParameterMarshaler, TypedArgs, TypedValue};
pub use normalize::{NormalizerConfig, Observation, OutputNormalizer};
pub use registry::ToolRegistry;
