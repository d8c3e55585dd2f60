//! Multi-stage validator behaviour with in-memory tools.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{FakeCompiler, MarkerLinter, PanickingLinter, TrimFormatter};
use patchwright_core::domain::{DiagnosticSource, Phase, Severity};
use patchwright_core::toolchain::Tools;
use patchwright_core::tools::{TemplateCompiler, ToolError};
use patchwright_core::{Toolchain, Validator, ValidatorConfig};

const CLEAN: &str = "<script>\n  let name = \"world\";\n</script>\n\n<h1>Hello {name}!</h1>\n";

fn compiler() -> Arc<dyn TemplateCompiler> {
    Arc::new(FakeCompiler::default())
}

#[tokio::test]
async fn clean_component_passes_every_stage() {
    let validator = common::validator(Some(compiler()));
    let result = validator.validate_file("src/App.svelte", CLEAN).await;

    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert!(result.static_mode_ok);
    assert!(result.interactive_mode_ok);
    assert!(!result.fix_applied);
    assert_eq!(result.formatted, CLEAN);
    assert_eq!(result.original, CLEAN);
}

#[tokio::test]
async fn revalidating_formatted_output_is_stable() {
    let validator = common::validator(Some(compiler()));
    let first = validator
        .validate_file("App.svelte", "<script>\n  let a = 1;   \n</script>\n<p>{a}</p>")
        .await;
    assert!(first.is_clean());

    let second = validator.validate_file("App.svelte", &first.formatted).await;
    assert_eq!(second.formatted, first.formatted);
    assert!(second.diagnostics.is_empty());
}

#[tokio::test]
async fn lint_fixes_feed_later_stages() {
    let validator = common::validator(Some(compiler()));
    let result = validator
        .validate_file("App.svelte", "<script>\n  var n = 1;\n</script>\n<p>{n}</p>\n")
        .await;
    assert!(result.fix_applied);
    assert!(result.formatted.contains("let n = 1;"));
    assert!(result.is_clean());
}

#[tokio::test]
async fn broken_component_reports_lint_and_both_compile_modes() {
    let validator = common::validator(Some(compiler()));
    let result = validator
        .validate_file("App.svelte", "<script>\n  let a = 1;\n</script>\n<p>BROKEN {a</p>\n")
        .await;

    assert!(!result.static_mode_ok);
    assert!(!result.interactive_mode_ok);
    let phases: Vec<Option<Phase>> = result.errors().map(|d| d.phase).collect();
    assert!(phases.contains(&Some(Phase::Lint)));
    assert!(phases.contains(&Some(Phase::Static)));
    assert!(phases.contains(&Some(Phase::Interactive)));
    assert!(result.errors().all(|d| d.line == Some(4)));
}

#[tokio::test]
async fn data_files_are_parse_checked_not_linted() {
    let linter = Arc::new(MarkerLinter::default());
    let toolchain = Arc::new(Toolchain::ready(linter.clone(), Arc::new(TrimFormatter)));
    let validator = Validator::new(toolchain, None);

    let result = validator
        .validate_file("package.json", "{\n  \"name\": \"app\",\n}\n")
        .await;
    assert_eq!(linter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.error_count(), 1);
    let diag = &result.diagnostics[0];
    assert_eq!(diag.source, DiagnosticSource::Parse);
    assert_eq!(diag.line, Some(3));
}

#[tokio::test]
async fn unavailable_toolchain_degrades_to_info() {
    let toolchain = Arc::new(Toolchain::lazy(|| {
        Box::pin(async { Err::<Tools, _>(ToolError::unavailable("toolchain", "eslint missing")) })
    }));
    let validator = Validator::new(toolchain, Some(compiler()));
    let result = validator.validate_file("App.svelte", CLEAN).await;

    assert!(result.is_clean());
    let infos: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Info)
        .collect();
    assert_eq!(infos.len(), 2, "lint and format stages skipped");
    assert!(result.static_mode_ok && result.interactive_mode_ok);
}

#[tokio::test]
async fn crashing_stage_is_isolated() {
    let toolchain = Arc::new(Toolchain::ready(
        Arc::new(PanickingLinter),
        Arc::new(TrimFormatter),
    ));
    let validator = Validator::new(toolchain, Some(compiler()));
    let result = validator
        .validate_file("App.svelte", "<p>hi</p>   ")
        .await;

    let crash = result
        .errors()
        .find(|d| d.phase == Some(Phase::Lint))
        .expect("lint crash recorded");
    assert!(crash.message.contains("linter exploded"));
    assert_eq!(result.formatted, "<p>hi</p>\n", "format still ran");
    assert!(result.static_mode_ok, "compile still ran");
}

#[tokio::test]
async fn missing_compiler_is_reported_not_failed() {
    let validator = common::validator(None);
    let result = validator.validate_file("App.svelte", CLEAN).await;
    assert!(result.is_clean());
    assert!(!result.static_mode_ok);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Info && d.source == DiagnosticSource::Compiler));
}

#[tokio::test]
async fn hazards_are_warnings_and_can_be_disabled() {
    let source = "<script>\n  const token = localStorage.getItem(\"t\");\n</script>\n<p>{token}</p>\n";
    let validator = common::validator(Some(compiler()));
    let result = validator.validate_file("App.svelte", source).await;
    assert!(result.is_clean());
    let hazard = result
        .diagnostics
        .iter()
        .find(|d| d.source == DiagnosticSource::Structure)
        .expect("hazard reported");
    assert_eq!(hazard.severity, Severity::Warning);
    assert_eq!(hazard.line, Some(2));

    let quiet = Validator::new(common::toolchain(), Some(compiler())).with_config(ValidatorConfig {
        pre_format: true,
        scan_hazards: false,
    });
    let result = quiet.validate_file("App.svelte", source).await;
    assert!(result.diagnostics.is_empty());
}

#[tokio::test]
async fn batch_validation_covers_every_file() {
    let validator = common::validator(Some(compiler()));
    let files: BTreeMap<String, String> = [
        ("src/App.svelte", CLEAN),
        ("src/lib/util.ts", "export const x = 1;  \n"),
        ("src/data.json", "{\"ok\": true}"),
        ("src/Broken.svelte", "<p>BROKEN</p>\n"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let results = validator.validate(&files).await;
    assert_eq!(results.len(), 4);
    assert!(results["src/App.svelte"].is_clean());
    assert_eq!(results["src/lib/util.ts"].formatted, "export const x = 1;\n");
    assert!(results["src/lib/util.ts"].static_mode_ok, "non-components report true");
    assert!(results["src/data.json"].is_clean());
    assert!(!results["src/Broken.svelte"].is_clean());
}
