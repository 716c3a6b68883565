//! Instrumented execution of single skills and skill chains.

pub mod skill;
pub mod workflow;

pub use skill::{ExecutionResult, InstrumentedExecutor, Preflight};
pub use workflow::{
    map_inputs, InstrumentedWorkflowExecutor, StepLogic, WorkflowOutcome, WorkflowStep,
};
