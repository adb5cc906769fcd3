//! Bundle manifest serialization.
//!
//! JSON form: an array of `{ "id": <u32>, "set": <tile set> }` objects in id order.
//!
//! Binary form (little endian):
//!
//! ```text
//! magic "TSBD", u16 version, u32 entry count
//! entry:   u32 id, u8 form (0 = source, 1 = trimmed), body
//! string:  u32 byte length + UTF-8
//! option:  u8 presence flag + value
//! spot:    i16 x, i16 y, i8 orient (-1 = no spot)
//! ```

use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::config::MetadataFormat;
use crate::error::{BundleError, Result};
use crate::model::{
    BundleManifest, BundleTileSet, CellLayout, ObjectMetrics, Rect, RowSpec, Spot, Sprite,
    TileSet, TileSetKind, TrimmedSprite, TrimmedTileSet,
};

pub const BINARY_MAGIC: &[u8; 4] = b"TSBD";
pub const BINARY_VERSION: u16 = 1;

const FORM_SOURCE: u8 = 0;
const FORM_TRIMMED: u8 = 1;
const KIND_PLAIN: u8 = 0;
const KIND_OBJECT: u8 = 1;
const LAYOUT_UNIFORM: u8 = 0;
const LAYOUT_ROWS: u8 = 1;
const LAYOUT_EXPLICIT: u8 = 2;

#[derive(Serialize, Deserialize)]
struct JsonEntry {
    id: u32,
    set: BundleTileSet,
}

pub fn encode_manifest(manifest: &BundleManifest, format: MetadataFormat) -> Result<Vec<u8>> {
    match format {
        MetadataFormat::Json => to_json(manifest),
        MetadataFormat::Binary => to_binary(manifest),
    }
}

/// Decoded manifests carry `UNIX_EPOCH` as their newest source time.
pub fn decode_manifest(bytes: &[u8], format: MetadataFormat) -> Result<BundleManifest> {
    match format {
        MetadataFormat::Json => from_json(bytes),
        MetadataFormat::Binary => from_binary(bytes),
    }
}

pub fn to_json(manifest: &BundleManifest) -> Result<Vec<u8>> {
    let entries: Vec<JsonEntry> = manifest
        .iter()
        .map(|(id, set)| JsonEntry {
            id,
            set: set.clone(),
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&entries)?)
}

pub fn from_json(bytes: &[u8]) -> Result<BundleManifest> {
    let entries: Vec<JsonEntry> = serde_json::from_slice(bytes)?;
    let mut manifest = BundleManifest::new(SystemTime::UNIX_EPOCH);
    for e in entries {
        manifest.insert(e.id, e.set);
    }
    Ok(manifest)
}

pub fn to_binary(manifest: &BundleManifest) -> Result<Vec<u8>> {
    let mut w = Vec::new();
    w.write_all(BINARY_MAGIC)?;
    w.write_u16::<LittleEndian>(BINARY_VERSION)?;
    write_len(&mut w, manifest.len())?;
    for (id, set) in manifest.iter() {
        w.write_u32::<LittleEndian>(id)?;
        match set {
            BundleTileSet::Source(ts) => {
                w.write_u8(FORM_SOURCE)?;
                write_source(&mut w, ts)?;
            }
            BundleTileSet::Trimmed(ts) => {
                w.write_u8(FORM_TRIMMED)?;
                write_trimmed(&mut w, ts)?;
            }
        }
    }
    Ok(w)
}

pub fn from_binary(bytes: &[u8]) -> Result<BundleManifest> {
    let mut r = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != BINARY_MAGIC {
        return Err(BundleError::Metadata("bad magic".into()));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != BINARY_VERSION {
        return Err(BundleError::Metadata(format!("unsupported version {version}")));
    }
    let count = read_len(&mut r)?;
    let mut manifest = BundleManifest::new(SystemTime::UNIX_EPOCH);
    for _ in 0..count {
        let id = r.read_u32::<LittleEndian>()?;
        let set = match r.read_u8()? {
            FORM_SOURCE => BundleTileSet::Source(read_source(&mut r)?),
            FORM_TRIMMED => BundleTileSet::Trimmed(read_trimmed(&mut r)?),
            other => return Err(BundleError::Metadata(format!("unknown tile set form {other}"))),
        };
        manifest.insert(id, set);
    }
    if (r.position() as usize) != bytes.len() {
        return Err(BundleError::Metadata("trailing bytes after manifest".into()));
    }
    Ok(manifest)
}

// ---------- writers ----------

fn write_len<W: Write>(w: &mut W, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| BundleError::Metadata(format!("length {len} does not fit in u32")))?;
    w.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_opt_str<W: Write>(w: &mut W, s: Option<&str>) -> Result<()> {
    match s {
        Some(s) => {
            w.write_u8(1)?;
            write_str(w, s)
        }
        None => Ok(w.write_u8(0)?),
    }
}

fn write_opt_strings<W: Write>(w: &mut W, list: Option<&[String]>) -> Result<()> {
    match list {
        Some(list) => {
            w.write_u8(1)?;
            write_len(w, list.len())?;
            for s in list {
                write_str(w, s)?;
            }
            Ok(())
        }
        None => Ok(w.write_u8(0)?),
    }
}

fn write_rect<W: Write>(w: &mut W, r: &Rect) -> Result<()> {
    for v in [r.x, r.y, r.w, r.h] {
        w.write_u32::<LittleEndian>(v)?;
    }
    Ok(())
}

fn write_render_bits<W: Write>(
    w: &mut W,
    priority: Option<i8>,
    spot: Option<Spot>,
    constraints: Option<&[String]>,
) -> Result<()> {
    match priority {
        Some(p) => {
            w.write_u8(1)?;
            w.write_i8(p)?;
        }
        None => w.write_u8(0)?,
    }
    let (x, y, orient) = spot.map_or((0, 0, Spot::NO_ORIENT), |s| (s.x, s.y, s.orient));
    w.write_i16::<LittleEndian>(x)?;
    w.write_i16::<LittleEndian>(y)?;
    w.write_i8(orient)?;
    write_opt_strings(w, constraints)
}

fn write_layout<W: Write>(w: &mut W, layout: &CellLayout) -> Result<()> {
    match layout {
        CellLayout::Uniform { width, height } => {
            w.write_u8(LAYOUT_UNIFORM)?;
            w.write_u32::<LittleEndian>(*width)?;
            w.write_u32::<LittleEndian>(*height)?;
        }
        CellLayout::Rows { rows, offset, gap } => {
            w.write_u8(LAYOUT_ROWS)?;
            write_len(w, rows.len())?;
            for row in rows {
                write_len(w, row.count)?;
                w.write_u32::<LittleEndian>(row.width)?;
                w.write_u32::<LittleEndian>(row.height)?;
            }
            for v in [offset.0, offset.1, gap.0, gap.1] {
                w.write_u32::<LittleEndian>(v)?;
            }
        }
        CellLayout::Explicit { cells } => {
            w.write_u8(LAYOUT_EXPLICIT)?;
            write_len(w, cells.len())?;
            for c in cells {
                write_rect(w, c)?;
            }
        }
    }
    Ok(())
}

fn write_source<W: Write>(w: &mut W, ts: &TileSet) -> Result<()> {
    write_opt_str(w, ts.name())?;
    write_str(w, &ts.image_path)?;
    write_layout(w, &ts.layout)?;
    match &ts.kind {
        TileSetKind::Plain => w.write_u8(KIND_PLAIN)?,
        TileSetKind::Object { sprites } => {
            w.write_u8(KIND_OBJECT)?;
            write_len(w, sprites.len())?;
            for s in sprites {
                w.write_u32::<LittleEndian>(s.owidth)?;
                w.write_u32::<LittleEndian>(s.oheight)?;
                w.write_i32::<LittleEndian>(s.xorigin)?;
                w.write_i32::<LittleEndian>(s.yorigin)?;
                write_render_bits(w, s.priority, s.spot, s.constraints.as_deref())?;
            }
        }
    }
    write_opt_strings(w, ts.colorizations.as_deref())
}

fn write_trimmed<W: Write>(w: &mut W, ts: &TrimmedTileSet) -> Result<()> {
    write_str(w, &ts.name)?;
    write_str(w, &ts.image_path)?;
    write_len(w, ts.sprites.len())?;
    for s in &ts.sprites {
        write_rect(w, &s.bounds)?;
        w.write_i32::<LittleEndian>(s.metrics.x)?;
        w.write_i32::<LittleEndian>(s.metrics.y)?;
        w.write_u32::<LittleEndian>(s.metrics.width)?;
        w.write_u32::<LittleEndian>(s.metrics.height)?;
        write_render_bits(w, s.priority, s.spot, s.constraints.as_deref())?;
    }
    write_opt_strings(w, ts.colorizations.as_deref())
}

// ---------- readers ----------

type Reader<'a> = Cursor<&'a [u8]>;

fn remaining(r: &Reader<'_>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

/// Reads a count and rejects values that cannot fit in the rest of the input,
/// given that every element takes at least `min_elem` bytes.
fn read_count(r: &mut Reader<'_>, min_elem: usize) -> Result<usize> {
    let n = r.read_u32::<LittleEndian>()? as usize;
    if n.saturating_mul(min_elem.max(1)) > remaining(r) {
        return Err(BundleError::Metadata(format!("count {n} exceeds remaining input")));
    }
    Ok(n)
}

fn read_len(r: &mut Reader<'_>) -> Result<usize> {
    read_count(r, 1)
}

fn read_str(r: &mut Reader<'_>) -> Result<String> {
    let len = read_count(r, 1)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| BundleError::Metadata(format!("invalid UTF-8: {e}")))
}

fn read_flag(r: &mut Reader<'_>) -> Result<bool> {
    match r.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(BundleError::Metadata(format!("bad presence flag {other}"))),
    }
}

fn read_opt_str(r: &mut Reader<'_>) -> Result<Option<String>> {
    if read_flag(r)? { read_str(r).map(Some) } else { Ok(None) }
}

fn read_opt_strings(r: &mut Reader<'_>) -> Result<Option<Vec<String>>> {
    if !read_flag(r)? {
        return Ok(None);
    }
    let n = read_count(r, 4)?;
    (0..n).map(|_| read_str(r)).collect::<Result<Vec<_>>>().map(Some)
}

fn read_rect(r: &mut Reader<'_>) -> Result<Rect> {
    Ok(Rect::new(
        r.read_u32::<LittleEndian>()?,
        r.read_u32::<LittleEndian>()?,
        r.read_u32::<LittleEndian>()?,
        r.read_u32::<LittleEndian>()?,
    ))
}

type RenderBits = (Option<i8>, Option<Spot>, Option<Vec<String>>);

fn read_render_bits(r: &mut Reader<'_>) -> Result<RenderBits> {
    let priority = if read_flag(r)? { Some(r.read_i8()?) } else { None };
    let x = r.read_i16::<LittleEndian>()?;
    let y = r.read_i16::<LittleEndian>()?;
    let orient = r.read_i8()?;
    let constraints = read_opt_strings(r)?;
    Ok((priority, Spot::from_raw(x, y, orient), constraints))
}

fn read_layout(r: &mut Reader<'_>) -> Result<CellLayout> {
    Ok(match r.read_u8()? {
        LAYOUT_UNIFORM => CellLayout::Uniform {
            width: r.read_u32::<LittleEndian>()?,
            height: r.read_u32::<LittleEndian>()?,
        },
        LAYOUT_ROWS => {
            let n = read_count(r, 12)?;
            let mut rows = Vec::new();
            for _ in 0..n {
                rows.push(RowSpec {
                    count: r.read_u32::<LittleEndian>()? as usize,
                    width: r.read_u32::<LittleEndian>()?,
                    height: r.read_u32::<LittleEndian>()?,
                });
            }
            let offset = (r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?);
            let gap = (r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?);
            CellLayout::Rows { rows, offset, gap }
        }
        LAYOUT_EXPLICIT => {
            let n = read_count(r, 16)?;
            let cells = (0..n).map(|_| read_rect(r)).collect::<Result<Vec<_>>>()?;
            CellLayout::Explicit { cells }
        }
        other => return Err(BundleError::Metadata(format!("unknown layout tag {other}"))),
    })
}

fn read_colorizations(r: &mut Reader<'_>) -> Result<Option<Arc<[String]>>> {
    Ok(read_opt_strings(r)?.map(Arc::from))
}

fn read_source(r: &mut Reader<'_>) -> Result<TileSet> {
    let name = read_opt_str(r)?;
    let image_path = read_str(r)?;
    let layout = read_layout(r)?;
    let kind = match r.read_u8()? {
        KIND_PLAIN => TileSetKind::Plain,
        KIND_OBJECT => {
            let n = read_count(r, 22)?;
            let mut sprites = Vec::new();
            for _ in 0..n {
                let owidth = r.read_u32::<LittleEndian>()?;
                let oheight = r.read_u32::<LittleEndian>()?;
                let xorigin = r.read_i32::<LittleEndian>()?;
                let yorigin = r.read_i32::<LittleEndian>()?;
                let (priority, spot, constraints) = read_render_bits(r)?;
                sprites.push(Sprite {
                    owidth,
                    oheight,
                    xorigin,
                    yorigin,
                    priority,
                    spot,
                    constraints,
                });
            }
            TileSetKind::Object { sprites }
        }
        other => return Err(BundleError::Metadata(format!("unknown tile set kind {other}"))),
    };
    let colorizations = read_colorizations(r)?;
    Ok(TileSet {
        name,
        image_path,
        layout,
        kind,
        colorizations,
    })
}

fn read_trimmed(r: &mut Reader<'_>) -> Result<TrimmedTileSet> {
    let name = read_str(r)?;
    let image_path = read_str(r)?;
    let n = read_count(r, 38)?;
    let mut sprites = Vec::new();
    for _ in 0..n {
        let bounds = read_rect(r)?;
        let metrics = ObjectMetrics {
            x: r.read_i32::<LittleEndian>()?,
            y: r.read_i32::<LittleEndian>()?,
            width: r.read_u32::<LittleEndian>()?,
            height: r.read_u32::<LittleEndian>()?,
        };
        let (priority, spot, constraints) = read_render_bits(r)?;
        sprites.push(TrimmedSprite {
            bounds,
            metrics,
            priority,
            spot,
            constraints,
        });
    }
    let colorizations = read_colorizations(r)?;
    Ok(TrimmedTileSet {
        name,
        image_path,
        sprites,
        colorizations,
    })
}
