//! Patchwright Core Library
//!
//! Repair-and-compile engine for generated UI components: extraction of
//! structured payloads from model output, multi-stage validation, the
//! diagnostic-driven repair loop and sandboxed compilation for preview.

pub mod compile;
pub mod domain;
pub mod extract;
pub mod metrics;
pub mod obs;
pub mod repair;
pub mod sandbox;
pub mod structural;
pub mod syntax;
pub mod telemetry;
pub mod toolchain;
pub mod tools;
pub mod validate;

pub use domain::{
    Diagnostic, DiagnosticSource, FileKind, PatchwrightError, Phase, Result, Severity, SourceFile,
    ValidationResult,
};

pub use extract::{extract, extract_with, ExtractionResult, END_DELIMITER, START_DELIMITER};

pub use validate::{Validator, ValidatorConfig};

pub use repair::{
    ComponentCatalog, PassRecord, Provenance, RepairLoop, RepairOutcome, RepairPolicy,
    RepairRequest, StaticCatalog,
};

pub use compile::{
    CompileConfig, CompileError, CompileOutput, CompileRequest, CompileService, DependencyStub,
    RuntimeBundle, RuntimeBundleRegistry, TtlPolicy,
};

pub use sandbox::{
    ModuleRunner, ResolverPolicy, ResolverRule, Sandbox, SandboxConfig, SandboxError,
    SubprocessRunner,
};

pub use structural::{cleanup, scan_hazards, Hazard};

pub use toolchain::Toolchain;
pub use tools::{
    CommandCompiler, CommandFormatter, CommandLinter, CommandSpec, CommandTypeChecker,
    CompileMode, CompiledOutput, Formatter, Linter, OpenAiPatchGenerator, PatchGenerator,
    TemplateCompiler, ToolError, TypeChecker,
};

pub use patchwright_state::{MemoryProjectStore, ProjectStore, SurrealProjectStore};

pub use metrics::METRICS;
pub use obs::RepairSpan;
pub use telemetry::init_tracing;

/// Patchwright version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
