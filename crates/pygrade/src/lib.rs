// pygrade: grading harness for machine-generated Python code via RustPython VM.

pub mod cache;
pub mod engine;
pub mod env;
pub mod extract;
pub mod output;
pub mod timeout;
pub mod types;
pub(crate) mod vm;

pub use cache::{cache_key, CodeCache};
pub use engine::Engine;
pub use env::Environment;
pub use extract::call_expression;
pub use output::OutputBuffer;
pub use types::{EngineSettings, ExecError, ExecuteResult, DEFAULT_TIMEOUT};
