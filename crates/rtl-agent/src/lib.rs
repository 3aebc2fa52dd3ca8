//! RTL agent: adapters that connect the `refinement` core to the outside
//! world. An HTTP generation client, Verilator/Icarus lint backends with a
//! cocotb test stage, and benchmark workspace I/O.

pub mod agent;
pub mod client;
pub mod config;
pub mod toolchain;
pub mod workspace;

pub use agent::{build_toolchain, execute, prepare, run, PreparedRun, RunReport};
pub use client::{response_text, SlmClient};
pub use config::{AgentConfig, ApiFlavor, EndpointConfig, ToolchainConfig};
pub use toolchain::{
    lint_chain, CocotbRunner, HdlToolchain, LintBackend, LintTool, TestOutcome, ToolError,
};
pub use workspace::CodeWorkspace;
