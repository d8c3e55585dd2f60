//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use patchwright_core::domain::Diagnostic;
use patchwright_core::repair::ComponentCatalog;
use patchwright_core::sandbox::{ModuleGraph, ModuleOrigin, ModuleRunner, RenderedMarkup};
use patchwright_core::sandbox::{SandboxError, SandboxResult};
use patchwright_core::tools::{
    CompileMode, CompiledOutput, Formatter, LintMessage, LintOutput, Linter, PatchGenerator,
    TemplateCompiler, ToolError, TypeChecker,
};
use patchwright_core::{Toolchain, Validator};
use patchwright_state::{FileRecord, ProjectStore, RepairAuditRecord, StorageError, StorageResult};

/// Marker that every fake tool treats as a syntax error.
pub const BROKEN: &str = "BROKEN";

fn broken_line(source: &str) -> Option<u32> {
    source
        .lines()
        .position(|line| line.contains(BROKEN))
        .map(|idx| idx as u32 + 1)
}

/// Reports an error on the first line containing [`BROKEN`] and auto-fixes
/// `var ` declarations to `let `.
#[derive(Default)]
pub struct MarkerLinter {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Linter for MarkerLinter {
    async fn lint(&self, source: &str, _virtual_path: &str) -> Result<LintOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let messages = broken_line(source)
            .map(|line| LintMessage {
                severity: 2,
                rule: Some("no-broken".to_string()),
                message: "unexpected token".to_string(),
                line: Some(line),
                column: Some(1),
            })
            .into_iter()
            .collect();
        let fixed = source.replace("var ", "let ");
        Ok(LintOutput {
            fixed_source: (fixed != source).then_some(fixed),
            messages,
        })
    }
}

/// Strips trailing whitespace and ends the file with one newline.
pub struct TrimFormatter;

#[async_trait]
impl Formatter for TrimFormatter {
    async fn format(&self, source: &str, _parser: &str) -> Result<String, ToolError> {
        let mut out = source
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        Ok(out)
    }
}

pub struct PanickingLinter;

#[async_trait]
impl Linter for PanickingLinter {
    async fn lint(&self, _source: &str, _virtual_path: &str) -> Result<LintOutput, ToolError> {
        panic!("linter exploded")
    }
}

/// Rejects [`BROKEN`] sources; otherwise emits a module that imports what
/// the source's script imports and renders a fixed body.
#[derive(Default)]
pub struct FakeCompiler {
    pub calls: AtomicUsize,
}

impl FakeCompiler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateCompiler for FakeCompiler {
    async fn compile(
        &self,
        source: &str,
        mode: CompileMode,
        filename: &str,
    ) -> Result<CompiledOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(line) = broken_line(source) {
            return Err(ToolError::Rejected {
                message: "Unexpected token".to_string(),
                line: Some(line),
                column: Some(1),
            });
        }
        let imports: Vec<&str> = source
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("import "))
            .collect();
        match mode {
            CompileMode::Interactive => Ok(CompiledOutput {
                code: format!(
                    "// {filename}\n{}\nexport default function Component() {{}}\n",
                    imports.join("\n")
                ),
                css: Some(".interactive{}".to_string()),
            }),
            CompileMode::Static => Ok(CompiledOutput {
                code: format!(
                    "{}\nexport default {{ render: function () {{ return {{ html: \"<main></main>\" }}; }} }};\n",
                    imports.join("\n")
                ),
                css: Some(".static{}".to_string()),
            }),
        }
    }
}

/// Replies from a script; the last reply repeats once the script runs out.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    pub calls: AtomicUsize,
    pub contexts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `code` unchanged.
    pub fn echo(code: &str) -> Self {
        Self::new(vec![Ok(code.to_string())])
    }

    /// Answers with a structured reply carrying `code` and `summary`.
    pub fn fixing(code: &str, summary: &str) -> Self {
        let reply = serde_json::json!({ "code": code, "summary": summary }).to_string();
        Self::new(vec![Ok(reply)])
    }

    pub fn failing() -> Self {
        Self::new(vec![Err("upstream 503".to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatchGenerator for ScriptedGenerator {
    async fn generate(&self, _instructions: &str, context: &str) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(String::new())),
        };
        reply.map_err(ToolError::Http)
    }
}

#[derive(Default)]
pub struct CountingChecker {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TypeChecker for CountingChecker {
    async fn check(&self, _filename: &str, _source: &str) -> Result<Vec<Diagnostic>, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Diagnostic::warning(
            patchwright_core::DiagnosticSource::Typecheck,
            "parameter implicitly has an any type",
        )
        .at(Some(2), Some(5))])
    }
}

/// Catalog with one component that counts its lookups.
pub struct CountingCatalog {
    name: String,
    source: String,
    pub lookups: AtomicUsize,
}

impl CountingCatalog {
    pub fn new(name: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ComponentCatalog for CountingCatalog {
    fn names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn lookup(&self, stem: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        stem.eq_ignore_ascii_case(&self.name)
            .then(|| self.source.clone())
    }
}

/// Runner that records the graph and renders every stub module's code, so
/// stub markers show up in the output.
#[derive(Default)]
pub struct RecordingRunner {
    pub graphs: Mutex<Vec<ModuleGraph>>,
    pub fail_with: Mutex<Option<String>>,
}

impl RecordingRunner {
    pub fn failing_evaluation(message: &str) -> Self {
        Self {
            graphs: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(message.to_string())),
        }
    }

    pub fn last_graph(&self) -> Option<ModuleGraph> {
        self.graphs.lock().unwrap().last().cloned()
    }

    pub fn runs(&self) -> usize {
        self.graphs.lock().unwrap().len()
    }
}

#[async_trait]
impl ModuleRunner for RecordingRunner {
    async fn run(&self, graph: &ModuleGraph) -> SandboxResult<RenderedMarkup> {
        self.graphs.lock().unwrap().push(graph.clone());
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(SandboxError::Evaluation { message });
        }
        let stubs: Vec<String> = graph
            .modules
            .values()
            .filter(|m| m.origin == ModuleOrigin::Stub)
            .filter_map(|m| m.code.clone())
            .collect();
        Ok(RenderedMarkup {
            html: format!("<main>{}</main>", stubs.join("")),
            css: None,
            head: None,
        })
    }
}

pub fn toolchain() -> Arc<Toolchain> {
    Arc::new(Toolchain::ready(
        Arc::new(MarkerLinter::default()),
        Arc::new(TrimFormatter),
    ))
}

pub fn validator(compiler: Option<Arc<dyn TemplateCompiler>>) -> Arc<Validator> {
    Arc::new(Validator::new(toolchain(), compiler))
}

/// Serves one stored file but fails every write and memory load.
pub struct FailingStore {
    pub content: String,
    pub writes: AtomicUsize,
}

impl FailingStore {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            writes: AtomicUsize::new(0),
        }
    }

    fn refuse<T>(&self) -> StorageResult<T> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Backend("connection reset".to_string()))
    }
}

#[async_trait]
impl ProjectStore for FailingStore {
    async fn upsert_file(
        &self,
        _project_id: &str,
        _filename: &str,
        _content: &str,
    ) -> StorageResult<FileRecord> {
        self.refuse()
    }

    async fn read_file(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StorageResult<Option<FileRecord>> {
        Ok(Some(FileRecord::new(project_id, filename, self.content.as_str())))
    }

    async fn load_memory(&self, _project_id: &str, _filename: &str) -> StorageResult<Vec<String>> {
        Err(StorageError::Backend("connection reset".to_string()))
    }

    async fn save_memory(
        &self,
        _project_id: &str,
        _filename: &str,
        _entries: Vec<String>,
    ) -> StorageResult<()> {
        self.refuse()
    }

    async fn append_audit(&self, _record: RepairAuditRecord) -> StorageResult<()> {
        self.refuse()
    }

    async fn list_audits(
        &self,
        _project_id: &str,
        _filename: &str,
    ) -> StorageResult<Vec<RepairAuditRecord>> {
        Ok(Vec::new())
    }
}
