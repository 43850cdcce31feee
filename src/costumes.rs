use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use xmltree::{Element, XMLNode};

const DEFAULT_STAGE_SVG: &str =
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1" viewBox="0 0 1 1"></svg>"##;
const DEFAULT_SPRITE_SVG: &str =
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1" viewBox="0 0 1 1"></svg>"##;
pub const DEFAULT_SVG_TARGET_SIZE: f64 = 64.0;
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, PartialEq)]
pub struct Costume {
    pub name: String,
    pub asset_id: String,
    pub data_format: String,
    pub rotation_center: (f64, f64),
    pub bitmap_resolution: Option<u32>,
}

impl Costume {
    pub fn md5ext(&self) -> String {
        format!("{}.{}", self.asset_id, self.data_format)
    }

    pub fn to_json(&self) -> Value {
        let mut entry = json!({
            "name": self.name,
            "assetId": self.asset_id,
            "md5ext": self.md5ext(),
            "dataFormat": self.data_format,
            "rotationCenterX": self.rotation_center.0,
            "rotationCenterY": self.rotation_center.1
        });
        if let (Some(resolution), Value::Object(map)) = (self.bitmap_resolution, &mut entry) {
            map.insert("bitmapResolution".to_string(), json!(resolution));
        }
        entry
    }
}

/// Stored costume bytes keyed by `md5ext`.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub md5ext: String,
    pub bytes: Vec<u8>,
}

/// Reads costume files relative to a project directory. Without a directory
/// only the default costume is available.
#[derive(Debug, Clone)]
pub struct CostumeLoader {
    base_dir: Option<PathBuf>,
    scale_svgs: bool,
}

impl CostumeLoader {
    pub fn new(base_dir: Option<&Path>, scale_svgs: bool) -> Self {
        Self {
            base_dir: base_dir.map(Path::to_path_buf),
            scale_svgs,
        }
    }

    pub fn load_all(&self, target: &str, paths: &[String], is_stage: bool) -> Result<(Vec<Costume>, Vec<Asset>)> {
        let mut costumes = Vec::new();
        let mut assets = Vec::new();
        let mut used_names = HashSet::new();

        for path in paths {
            let Some(base_dir) = &self.base_dir else {
                bail!(
                    "Costume '{}' of target '{}' cannot be loaded without a project directory.",
                    path,
                    target
                );
            };
            let file_path = base_dir.join(path);
            if !file_path.is_file() {
                bail!(
                    "Costume file not found for target '{}': '{}' resolved to '{}'.",
                    target,
                    path,
                    file_path.display()
                );
            }
            let ext = file_path
                .extension()
                .and_then(|x| x.to_str())
                .unwrap_or("")
                .to_lowercase();
            let data = fs::read(&file_path)?;
            let stem = file_path.file_stem().and_then(|s| s.to_str()).unwrap_or("costume");
            let name = uniquify_costume_name(stem, &mut used_names);

            let (data, rotation_center, bitmap_resolution) = match ext.as_str() {
                "svg" => {
                    let (prepared, cx, cy) = prepare_svg(&data, path, self.scale_svgs)?;
                    (prepared, (cx, cy), None)
                }
                "png" => {
                    let (width, height) = png_dimensions(&data)
                        .ok_or_else(|| anyhow!("Invalid PNG file '{}'.", file_path.display()))?;
                    (data, (f64::from(width) / 2.0, f64::from(height) / 2.0), Some(1))
                }
                _ => bail!(
                    "Unsupported costume format '.{}' for '{}'. Only .svg and .png are supported.",
                    ext,
                    file_path.display()
                ),
            };
            tracing::debug!(target_name = target, costume = %name, format = %ext, "loaded costume");
            let (costume, asset) = store(name, ext, data, rotation_center, bitmap_resolution);
            costumes.push(costume);
            assets.push(asset);
        }

        if costumes.is_empty() {
            let (fallback_svg, fallback_name) = if is_stage {
                (DEFAULT_STAGE_SVG, "backdrop1")
            } else {
                (DEFAULT_SPRITE_SVG, "costume1")
            };
            let (prepared, cx, cy) = prepare_svg(fallback_svg.as_bytes(), "__fallback_default__.svg", self.scale_svgs)?;
            let (costume, asset) = store(fallback_name.to_string(), "svg".to_string(), prepared, (cx, cy), None);
            costumes.push(costume);
            assets.push(asset);
        }
        Ok((costumes, assets))
    }
}

fn store(
    name: String,
    ext: String,
    data: Vec<u8>,
    rotation_center: (f64, f64),
    bitmap_resolution: Option<u32>,
) -> (Costume, Asset) {
    let digest = format!("{:x}", md5::compute(&data));
    let costume = Costume {
        name,
        asset_id: digest,
        data_format: ext,
        rotation_center,
        bitmap_resolution,
    };
    let asset = Asset {
        md5ext: costume.md5ext(),
        bytes: data,
    };
    (costume, asset)
}

/// Width and height from the IHDR chunk.
pub fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || !data.starts_with(PNG_SIGNATURE) || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

/// Parses an SVG and optionally rescales it into a square of the default
/// size. Returns the bytes and the rotation centre.
pub fn prepare_svg(data: &[u8], source_name: &str, scale: bool) -> Result<(Vec<u8>, f64, f64)> {
    let mut root = Element::parse(Cursor::new(data)).map_err(|e| anyhow!("Invalid SVG file '{}': {}.", source_name, e))?;
    let (min_x, min_y, width, height) = read_svg_bounds(&root, source_name)?;
    let mut out = Vec::new();
    if scale {
        normalize_svg_root(&mut root, min_x, min_y, width, height, DEFAULT_SVG_TARGET_SIZE)?;
        root.write(&mut out)?;
        let centered = DEFAULT_SVG_TARGET_SIZE / 2.0;
        return Ok((out, centered, centered));
    }
    root.write(&mut out)?;
    Ok((out, width / 2.0, height / 2.0))
}

fn normalize_svg_root(
    root: &mut Element,
    min_x: f64,
    min_y: f64,
    width: f64,
    height: f64,
    target_size: f64,
) -> Result<()> {
    if width <= 0.0 || height <= 0.0 {
        bail!("SVG width/height must be positive before normalization.");
    }
    let transform = format!(
        "scale({} {}) translate({} {})",
        format_num(target_size / width),
        format_num(target_size / height),
        format_num(-min_x),
        format_num(-min_y)
    );

    let mut wrapper = Element::new("g");
    wrapper.prefix = root.prefix.clone();
    wrapper.namespace = root.namespace.clone();
    wrapper.attributes.insert("transform".to_string(), transform);
    wrapper.children = std::mem::take(&mut root.children);

    let size = format_num(target_size);
    root.attributes
        .insert("viewBox".to_string(), format!("0 0 {} {}", size, size));
    root.attributes.insert("width".to_string(), size.clone());
    root.attributes.insert("height".to_string(), size);
    root.children.push(XMLNode::Element(wrapper));
    Ok(())
}

fn read_svg_bounds(root: &Element, source_name: &str) -> Result<(f64, f64, f64, f64)> {
    if let Some(view_box) = root.attributes.get("viewBox") {
        if let Some(parsed) = parse_view_box(view_box, source_name)? {
            return Ok(parsed);
        }
    }
    let width = parse_svg_length(root.attributes.get("width").map(String::as_str));
    let height = parse_svg_length(root.attributes.get("height").map(String::as_str));
    if let (Some(w), Some(h)) = (width, height) {
        return Ok((0.0, 0.0, w, h));
    }
    Ok((0.0, 0.0, DEFAULT_SVG_TARGET_SIZE, DEFAULT_SVG_TARGET_SIZE))
}

fn parse_view_box(view_box: &str, source_name: &str) -> Result<Option<(f64, f64, f64, f64)>> {
    let parts = view_box
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if parts.len() != 4 {
        return Ok(None);
    }
    let mut numbers = [0.0; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid SVG viewBox in '{}': '{}'.", source_name, view_box))?;
    }
    let [min_x, min_y, width, height] = numbers;
    if width <= 0.0 || height <= 0.0 {
        bail!("SVG viewBox must have positive width/height in '{}'.", source_name);
    }
    Ok(Some((min_x, min_y, width, height)))
}

/// Leading positive number of a length such as `"48px"`.
fn parse_svg_length(value: Option<&str>) -> Option<f64> {
    static LENGTH: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = LENGTH
        .get_or_init(|| Regex::new(r"^\s*\+?(\d+(?:\.\d*)?|\.\d+)").ok())
        .as_ref()?;
    let captures = pattern.captures(value?)?;
    let n = captures.get(1)?.as_str().parse::<f64>().ok()?;
    if n > 0.0 {
        Some(n)
    } else {
        None
    }
}

fn format_num(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        let s = format!("{:.6}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn uniquify_costume_name(base: &str, used: &mut HashSet<String>) -> String {
    let trimmed = base.trim();
    let base_name = if trimmed.is_empty() { "costume" } else { trimmed };
    let mut candidate = base_name.to_string();
    let mut suffix = 2usize;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{} {}", base_name, suffix);
        suffix += 1;
    }
    candidate
}
