use crate::builder::BuildOutput;
use crate::costumes::{Asset, CostumeLoader};
use crate::scope::Target;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

pub const SOURCE_EXTENSION: &str = "gs";
pub const STAGE_FILE: &str = "stage.gs";
pub const STAGE_NAME: &str = "Stage";

type ProgressCallback<'a> = dyn FnMut(usize, usize, &str) + 'a;

/// One source file to compile into one target.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    /// Label used in diagnostics, usually the file name.
    pub origin: String,
    pub target: String,
    pub source: String,
    pub is_stage: bool,
}

impl SourceUnit {
    pub fn sprite(target: impl Into<String>, source: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            origin: format!("{}.{}", target, SOURCE_EXTENSION),
            target,
            source: source.into(),
            is_stage: false,
        }
    }

    pub fn stage(source: impl Into<String>) -> Self {
        Self {
            origin: STAGE_FILE.to_string(),
            target: STAGE_NAME.to_string(),
            source: source.into(),
            is_stage: true,
        }
    }
}

/// Reads the compilation units of a project. A directory contributes
/// `stage.gs` as the stage and every other source file as a sprite; a single
/// file compiles as one sprite. Returns the costume base directory too.
pub fn discover_units(input: &Path) -> Result<(PathBuf, Vec<SourceUnit>)> {
    if input.is_file() {
        let base_dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        let origin = file_name(input);
        let target = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Sprite1")
            .to_string();
        let source = read_source(input)?;
        let is_stage = origin == STAGE_FILE;
        let unit = SourceUnit {
            origin,
            target: if is_stage { STAGE_NAME.to_string() } else { target },
            source,
            is_stage,
        };
        return Ok((base_dir, vec![unit]));
    }
    if !input.is_dir() {
        bail!("Input not found: '{}'.", input.display());
    }

    let mut paths = fs::read_dir(input)
        .with_context(|| format!("Failed to list '{}'.", input.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.retain(|path| path.is_file() && path.extension().and_then(|x| x.to_str()) == Some(SOURCE_EXTENSION));
    paths.sort();
    if paths.is_empty() {
        bail!("No .{} files found in '{}'.", SOURCE_EXTENSION, input.display());
    }

    let mut units = Vec::new();
    for path in &paths {
        let origin = file_name(path);
        let source = read_source(path)?;
        if origin == STAGE_FILE {
            units.insert(
                0,
                SourceUnit {
                    origin,
                    target: STAGE_NAME.to_string(),
                    source,
                    is_stage: true,
                },
            );
        } else {
            let target = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Sprite").to_string();
            units.push(SourceUnit {
                origin,
                target,
                source,
                is_stage: false,
            });
        }
    }
    tracing::info!(units = units.len(), dir = %input.display(), "discovered project");
    Ok((input.to_path_buf(), units))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read '{}'.", path.display()))
}

/// A target together with the block graph compiled for it.
#[derive(Debug)]
pub struct CompiledTarget {
    pub target: Target,
    pub output: BuildOutput,
}

impl CompiledTarget {
    pub fn empty_stage(target: Target) -> Self {
        Self {
            target,
            output: BuildOutput::default(),
        }
    }

    fn to_json(&self, loader: &CostumeLoader, assets: &mut Vec<Asset>) -> Result<Value> {
        let target = &self.target;
        let (costumes, target_assets) = loader.load_all(&target.name, target.costume_paths(), target.is_stage)?;
        for asset in target_assets {
            if !assets.iter().any(|known| known.md5ext == asset.md5ext) {
                assets.push(asset);
            }
        }
        let costumes: Vec<Value> = costumes.iter().map(|costume| costume.to_json()).collect();

        let mut target_json = json!({
            "isStage": target.is_stage,
            "name": target.name,
            "variables": target.variables_json(),
            "lists": {},
            "broadcasts": {},
            "blocks": self.output.blocks_json(),
            "comments": {},
            "currentCostume": 0,
            "costumes": costumes,
            "sounds": [],
            "volume": 100,
            "layerOrder": target.layer_order
        });
        let extra = if target.is_stage {
            json!({
                "tempo": 60,
                "videoTransparency": 50,
                "videoState": "on",
                "textToSpeechLanguage": Value::Null
            })
        } else {
            json!({
                "visible": true,
                "x": 0,
                "y": 0,
                "size": 100,
                "direction": 90,
                "draggable": false,
                "rotationStyle": "all around"
            })
        };
        merge_object(&mut target_json, extra)?;
        Ok(target_json)
    }
}

/// The assembled `project.json` and the assets it references.
#[derive(Debug, Clone)]
pub struct ProjectArchive {
    pub project_json: Value,
    pub assets: Vec<Asset>,
}

impl ProjectArchive {
    pub fn assemble(targets: &[CompiledTarget], loader: &CostumeLoader) -> Result<Self> {
        let mut assets = Vec::new();
        let mut targets_json = Vec::new();
        for compiled in targets {
            targets_json.push(compiled.to_json(loader, &mut assets)?);
        }
        let mut extensions = Vec::new();
        if targets.iter().any(|compiled| compiled.output.uses_opcode_prefix("pen_")) {
            extensions.push("pen");
        }
        let project_json = json!({
            "targets": targets_json,
            "monitors": [],
            "extensions": extensions,
            "meta": {
                "semver": "3.0.0",
                "vm": "0.2.0",
                "agent": ""
            }
        });
        Ok(Self { project_json, assets })
    }

    pub fn to_sb3_bytes(&self) -> Result<Vec<u8>> {
        self.to_sb3_bytes_with_progress(Option::<&mut fn(usize, usize, &str)>::None)
    }

    pub fn to_sb3_bytes_with_progress<F>(&self, progress: Option<&mut F>) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize, &str),
    {
        let mut progress = progress.map(|cb| cb as &mut ProgressCallback<'_>);
        let mut buffer = Cursor::new(Vec::<u8>::new());
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        report_progress(&mut progress, 1, 1, "Writing project.json");
        zip.start_file("project.json", opts)?;
        zip.write_all(&serde_json::to_vec(&self.project_json)?)?;

        let mut assets = self.assets.iter().collect::<Vec<_>>();
        assets.sort_by(|left, right| left.md5ext.cmp(&right.md5ext));
        let asset_total = assets.len().max(1);
        for (index, asset) in assets.into_iter().enumerate() {
            zip.start_file(asset.md5ext.as_str(), opts)?;
            zip.write_all(&asset.bytes)?;
            report_progress(&mut progress, index + 1, asset_total, "Packaging assets");
        }
        zip.finish()?;
        Ok(buffer.into_inner())
    }

    /// Writes the archive, creating missing parent directories.
    pub fn write_sb3<F>(&self, output_path: &Path, progress: Option<&mut F>) -> Result<()>
    where
        F: FnMut(usize, usize, &str),
    {
        let bytes = self.to_sb3_bytes_with_progress(progress)?;
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, bytes).with_context(|| format!("Failed to write '{}'.", output_path.display()))?;
        Ok(())
    }
}

/// The project JSON with each target's procedure registry attached.
pub fn debug_json(archive: &ProjectArchive, targets: &[CompiledTarget]) -> Result<Value> {
    let mut dump = archive.project_json.clone();
    let targets_json = dump
        .get_mut("targets")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| anyhow!("Expected a targets array in project.json"))?;
    for (target_json, compiled) in targets_json.iter_mut().zip(targets) {
        let mut procedures = Map::new();
        procedures.insert("procedures".to_string(), compiled.output.procedures.to_json());
        merge_object(target_json, Value::Object(procedures))?;
    }
    Ok(dump)
}

fn report_progress(progress: &mut Option<&mut ProgressCallback<'_>>, step: usize, total: usize, label: &str) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(step, total, label);
    }
}

fn merge_object(dst: &mut Value, add: Value) -> Result<()> {
    let dst_obj = dst
        .as_object_mut()
        .ok_or_else(|| anyhow!("Expected object in merge_object dst"))?;
    let Value::Object(add_obj) = add else {
        bail!("Expected object in merge_object add");
    };
    dst_obj.extend(add_obj);
    Ok(())
}
