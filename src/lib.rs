pub mod ast;
pub mod builder;
pub mod catalog;
pub mod costumes;
pub mod diagnostic;
pub mod ids;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod procedures;
pub mod project;
pub mod recovery;
pub mod scope;
pub mod slot;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

use anyhow::{bail, Result};
use ast::Program;
use builder::Builder;
use costumes::CostumeLoader;
use diagnostic::{Diagnostic, Diagnostics};
use ids::{IdGen, IdStrategy, PrefixPool};
use parser::{parse_source, Grammar};
use project::{CompiledTarget, ProjectArchive, SourceUnit, STAGE_NAME};
use recovery::suggest_terminator;
use scope::Target;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub ids: IdStrategy,
    pub scale_svgs: bool,
    /// Build units on scoped threads.
    pub parallel: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            ids: IdStrategy::Random,
            scale_svgs: true,
            parallel: false,
        }
    }
}

/// Everything a compile run produced. Targets are empty when a unit failed
/// to parse.
#[derive(Debug)]
pub struct CompileOutcome {
    pub diagnostics: Diagnostics,
    pub targets: Vec<CompiledTarget>,
}

impl CompileOutcome {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn render_diagnostics(&self, color: bool) -> String {
        self.diagnostics.render(color)
    }

    pub fn target(&self, name: &str) -> Option<&CompiledTarget> {
        self.targets.iter().find(|compiled| compiled.target.name == name)
    }

    pub fn archive(&self, loader: &CostumeLoader) -> Result<ProjectArchive> {
        if !self.is_clean() {
            bail!("{} diagnostic(s) were reported; no project was produced.", self.diagnostics.len());
        }
        ProjectArchive::assemble(&self.targets, loader)
    }
}

/// Compiles a set of units into targets. A syntax error in any unit stops
/// the run before anything is built.
pub fn compile_units(units: &[SourceUnit], options: &CompileOptions) -> CompileOutcome {
    let diagnostics = Diagnostics::new();
    let mut programs = Vec::with_capacity(units.len());
    for unit in units {
        diagnostics.set_source(&unit.origin, &unit.source);
        match parse_source(&unit.source) {
            Ok(program) => programs.push(program),
            Err(err) => {
                let remediation = diagnostics
                    .source_lines(&unit.origin)
                    .and_then(|lines| suggest_terminator(&lines, &err.kind, err.pos, &Grammar));
                diagnostics.sink(Some(unit.origin.as_str())).throw(
                    Diagnostic::syntax(err.kind.to_string())
                        .with_remediation(remediation)
                        .at(err.pos),
                );
                tracing::warn!(unit = %unit.origin, "syntax error, stopping before the build");
                return CompileOutcome {
                    diagnostics,
                    targets: Vec::new(),
                };
            }
        }
    }

    let shared_ids = Arc::new(IdGen::Random);
    let mut prefixes = PrefixPool::new();
    let mut ids_for = |name: &str| match options.ids {
        IdStrategy::Random => Arc::clone(&shared_ids),
        IdStrategy::Sequential => Arc::new(prefixes.sequential(name)),
    };
    let synthesized_stage = if units.iter().any(|unit| unit.is_stage) {
        None
    } else {
        Some(Target::new(STAGE_NAME, true, ids_for(STAGE_NAME)))
    };
    let mut targets: Vec<Target> = Vec::with_capacity(units.len());
    let mut sprite_layer = 1;
    for unit in units {
        let ids = ids_for(&unit.target);
        let mut target = Target::new(unit.target.as_str(), unit.is_stage, ids);
        if !unit.is_stage {
            target.layer_order = sprite_layer;
            sprite_layer += 1;
        }
        targets.push(target);
    }

    let outputs = if options.parallel && units.len() > 1 {
        std::thread::scope(|scope| {
            let handles: Vec<_> = units
                .iter()
                .zip(&programs)
                .zip(targets.iter_mut())
                .map(|((unit, program), target)| {
                    let diagnostics = &diagnostics;
                    scope.spawn(move || build_unit(unit, program, target, diagnostics))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect::<Vec<_>>()
        })
    } else {
        units
            .iter()
            .zip(&programs)
            .zip(targets.iter_mut())
            .map(|((unit, program), target)| build_unit(unit, program, target, &diagnostics))
            .collect()
    };

    let mut compiled: Vec<CompiledTarget> = targets
        .into_iter()
        .zip(outputs)
        .map(|(target, output)| CompiledTarget { target, output })
        .collect();
    if let Some(stage) = synthesized_stage {
        compiled.insert(0, CompiledTarget::empty_stage(stage));
    }
    compiled.sort_by_key(|c| !c.target.is_stage);
    CompileOutcome {
        diagnostics,
        targets: compiled,
    }
}

fn build_unit(
    unit: &SourceUnit,
    program: &Program,
    target: &mut Target,
    diagnostics: &Diagnostics,
) -> builder::BuildOutput {
    let ids = target.ids();
    let sink = diagnostics.sink(Some(unit.origin.as_str()));
    tracing::debug!(unit = %unit.origin, target_name = %unit.target, "building unit");
    Builder::new(target, ids, sink).build(program)
}

/// Compiles one source text as a single sprite next to an empty stage.
pub fn compile_source(source: &str, options: &CompileOptions) -> CompileOutcome {
    compile_units(&[SourceUnit::sprite("Sprite1", source)], options)
}

/// Compiles a project directory or a single source file. Returns the
/// directory costumes resolve against.
pub fn compile_path(input: &Path, options: &CompileOptions) -> Result<(CompileOutcome, PathBuf)> {
    let (base_dir, units) = project::discover_units(input)?;
    Ok((compile_units(&units, options), base_dir))
}

/// Compiles source text straight to `.sb3` bytes, failing with the rendered
/// diagnostics when any were reported.
pub fn compile_source_to_sb3_bytes(source: &str, source_dir: Option<&Path>, scale_svgs: bool) -> Result<Vec<u8>> {
    let options = CompileOptions {
        scale_svgs,
        ..CompileOptions::default()
    };
    let outcome = compile_source(source, &options);
    if !outcome.is_clean() {
        bail!("{}", outcome.render_diagnostics(false));
    }
    outcome
        .archive(&CostumeLoader::new(source_dir, scale_svgs))?
        .to_sb3_bytes()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<std::process::ExitCode> {
    use std::io::IsTerminal;
    use std::process::ExitCode;

    let options = args.compile_options();
    let total_stages = 3 + usize::from(args.output.is_some()) + usize::from(args.debug);
    let progress = CliProgress::new("Compile", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Discovering sources");
    let (base_dir, units) = project::discover_units(&args.input)?;

    stage += 1;
    progress.emit(stage, "Parsing and building block graphs");
    let outcome = compile_units(&units, &options);
    if !outcome.is_clean() {
        eprint!("{}", outcome.render_diagnostics(std::io::stderr().is_terminal()));
        tracing::warn!(diagnostics = outcome.diagnostics.len(), "compilation failed");
        return Ok(ExitCode::FAILURE);
    }

    stage += 1;
    progress.emit(stage, "Assembling project");
    let archive = outcome.archive(&CostumeLoader::new(Some(&base_dir), options.scale_svgs))?;

    if args.debug {
        stage += 1;
        let debug_path = debug_path(args);
        progress.emit(stage, "Writing debug dump");
        let dump = project::debug_json(&archive, &outcome.targets)?;
        std::fs::write(&debug_path, serde_json::to_vec_pretty(&dump)?)?;
        tracing::info!(path = %debug_path.display(), "wrote debug dump");
    }

    if let Some(output) = &args.output {
        stage += 1;
        let mut package_cb = |step: usize, total: usize, label: &str| {
            progress.emit_with_total(stage - 1 + step, stage - 1 + total, label);
        };
        archive.write_sb3(output, Some(&mut package_cb))?;
        tracing::info!(path = %output.display(), "wrote archive");
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(not(target_arch = "wasm32"))]
fn debug_path(args: &cli::Args) -> PathBuf {
    let anchor = args.output.as_deref().unwrap_or(args.input.as_path());
    let stem = anchor
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("project");
    let dir = if anchor.is_dir() {
        anchor.to_path_buf()
    } else {
        anchor.parent().map(Path::to_path_buf).unwrap_or_default()
    };
    dir.join(format!("{}.debug.json", stem))
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        self.emit_with_total(step, self.total, label);
    }

    fn emit_with_total(&self, step: usize, total: usize, label: &str) {
        let total = total.max(1);
        let step = step.clamp(1, total);
        let bar = render_progress_bar(step, total, 14);
        eprintln!("[{}] {}... ({}/{}) {}", self.prefix, label, step, total, bar);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;

    fn sequential() -> CompileOptions {
        CompileOptions {
            ids: IdStrategy::Sequential,
            ..CompileOptions::default()
        }
    }

    #[test]
    fn single_source_gets_a_synthesized_stage() {
        let outcome = compile_source("onflag { move(10); }", &sequential());
        assert!(outcome.is_clean());
        assert_eq!(outcome.targets.len(), 2);
        assert!(outcome.targets[0].target.is_stage);
        assert_eq!(outcome.targets[1].target.layer_order, 1);
        assert_eq!(outcome.target("Sprite1").map(|c| c.output.blocks.len()), Some(2));
    }

    #[test]
    fn syntax_error_stops_before_building() {
        let outcome = compile_source("onflag {\n  move(1)\n  say(\"hi\");\n}", &sequential());
        assert!(outcome.targets.is_empty());
        let entries = outcome.diagnostics.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiagnosticKind::Syntax);
        assert!(entries[0].remediation.is_some());
    }

    #[test]
    fn parallel_units_collect_into_one_sink() {
        let units = vec![
            SourceUnit::stage("onflag { mvoe(1); }"),
            SourceUnit::sprite("A", "onflag { say(ghost); }"),
            SourceUnit::sprite("B", "onflag { move(1); }"),
        ];
        let options = CompileOptions {
            parallel: true,
            ..CompileOptions::default()
        };
        let outcome = compile_units(&units, &options);
        assert_eq!(outcome.diagnostics.count(DiagnosticKind::UnknownObject), 2);
        assert_eq!(outcome.targets.len(), 3);
        let mut ids: Vec<&String> = outcome
            .targets
            .iter()
            .flat_map(|c| c.output.blocks.keys())
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn sequential_ids_stay_distinct_when_names_sanitize_alike() {
        let units = vec![
            SourceUnit::stage("onflag { lives = 3; }"),
            SourceUnit::sprite("my sprite", "onflag { move(1); }"),
            SourceUnit::sprite("my_sprite", "onflag { move(2); }"),
            SourceUnit::sprite("Stage", "onflag { score = 1; }"),
        ];
        let outcome = compile_units(&units, &sequential());
        assert!(outcome.is_clean(), "{}", outcome.render_diagnostics(false));
        let mut ids: Vec<String> = outcome
            .targets
            .iter()
            .flat_map(|c| {
                c.output
                    .blocks
                    .keys()
                    .cloned()
                    .chain(c.target.variables_json().as_object().into_iter().flat_map(|vars| vars.keys().cloned()))
                    .collect::<Vec<_>>()
            })
            .collect();
        let total = ids.len();
        assert_eq!(total, 10);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn archive_is_refused_with_diagnostics() {
        let outcome = compile_source("onflag { move(\"far\"); }", &sequential());
        assert!(!outcome.is_clean());
        assert!(outcome.archive(&CostumeLoader::new(None, true)).is_err());
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(render_progress_bar(1, 2, 4), "[==--]");
        assert_eq!(render_progress_bar(2, 2, 4), "[====]");
    }
}
