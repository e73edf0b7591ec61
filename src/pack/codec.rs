use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as Flate2Compression;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use std::io::{Cursor, Read, Write};

use crate::tiling::DetailRecord;

/// Magic bytes for cell detail blobs: "PRDB" (PopRadius Detail Blob)
const MAGIC: &[u8] = b"PRDB";
/// Format version (currently 1)
const VERSION: u8 = 1;

/// WKB geometry type for Polygon
const WKB_POLYGON: u32 = 3;
/// WKB geometry type for MultiPolygon
const WKB_MULTIPOLYGON: u32 = 6;
/// WKB byte order: little endian
const WKB_LE: u8 = 1;

fn write_ring(wkb: &mut Vec<u8>, ring: &LineString<f64>) -> Result<()> {
    wkb.write_all(&(ring.0.len() as u32).to_le_bytes())?;
    for coord in ring.coords() {
        wkb.write_all(&coord.x.to_le_bytes())?;
        wkb.write_all(&coord.y.to_le_bytes())?;
    }
    Ok(())
}

fn write_polygon(wkb: &mut Vec<u8>, poly: &Polygon<f64>) -> Result<()> {
    wkb.write_all(&[WKB_LE])?;
    wkb.write_all(&WKB_POLYGON.to_le_bytes())?;
    wkb.write_all(&((1 + poly.interiors().len()) as u32).to_le_bytes())?;
    write_ring(wkb, poly.exterior())?;
    for interior in poly.interiors() {
        write_ring(wkb, interior)?;
    }
    Ok(())
}

/// Write a MultiPolygon to WKB (little endian, 2D only).
pub(crate) fn multipolygon_to_wkb(mp: &MultiPolygon<f64>) -> Result<Vec<u8>> {
    let mut wkb = Vec::new();
    wkb.write_all(&[WKB_LE])?;
    wkb.write_all(&WKB_MULTIPOLYGON.to_le_bytes())?;
    wkb.write_all(&(mp.0.len() as u32).to_le_bytes())?;
    for poly in &mp.0 {
        write_polygon(&mut wkb, poly)?;
    }
    Ok(wkb)
}

fn read_u32(cursor: &mut Cursor<&[u8]>, is_le: bool) -> Result<u32> {
    let mut bytes = [0u8; 4];
    cursor.read_exact(&mut bytes)?;
    Ok(if is_le { u32::from_le_bytes(bytes) } else { u32::from_be_bytes(bytes) })
}

fn read_f64(cursor: &mut Cursor<&[u8]>, is_le: bool) -> Result<f64> {
    let mut bytes = [0u8; 8];
    cursor.read_exact(&mut bytes)?;
    Ok(if is_le { f64::from_le_bytes(bytes) } else { f64::from_be_bytes(bytes) })
}

/// Read a u32 count of items at least `item_size` bytes long, rejecting counts
/// the rest of the input cannot hold before anything is allocated for them.
fn read_count(cursor: &mut Cursor<&[u8]>, is_le: bool, item_size: usize, what: &str) -> Result<usize> {
    let count = read_u32(cursor, is_le)? as usize;
    let left = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if count.saturating_mul(item_size) > left {
        bail!("{what} count {count} does not fit in the {left} bytes left");
    }
    Ok(count)
}

/// Read a byte-order marker and a geometry type, checking the type.
fn read_header(cursor: &mut Cursor<&[u8]>, expected: u32) -> Result<bool> {
    let mut byte_order = [0u8; 1];
    cursor.read_exact(&mut byte_order)?;
    let is_le = byte_order[0] == WKB_LE;

    let geom_type = read_u32(cursor, is_le)?;
    if geom_type != expected {
        bail!("Expected WKB geometry type {expected}, got {geom_type}");
    }
    Ok(is_le)
}

fn read_ring(cursor: &mut Cursor<&[u8]>, is_le: bool) -> Result<LineString<f64>> {
    let len = read_count(cursor, is_le, 16, "Point")?;
    let mut coords = Vec::with_capacity(len);
    for _ in 0..len {
        let x = read_f64(cursor, is_le)?;
        let y = read_f64(cursor, is_le)?;
        coords.push(Coord { x, y });
    }
    Ok(LineString::from(coords))
}

fn read_polygon(cursor: &mut Cursor<&[u8]>) -> Result<Polygon<f64>> {
    let is_le = read_header(cursor, WKB_POLYGON)?;
    let num_rings = read_count(cursor, is_le, 4, "Ring")?;
    if num_rings == 0 {
        bail!("Polygon must have at least one ring");
    }

    let exterior = read_ring(cursor, is_le)?;
    let interiors = (1..num_rings)
        .map(|_| read_ring(cursor, is_le))
        .collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(exterior, interiors))
}

/// Read a MultiPolygon from WKB. A bare Polygon is accepted as a one-part MultiPolygon.
pub(crate) fn multipolygon_from_wkb(wkb: &[u8]) -> Result<MultiPolygon<f64>> {
    if wkb.len() >= 5 {
        let is_le = wkb[0] == WKB_LE;
        let ty = if is_le {
            u32::from_le_bytes([wkb[1], wkb[2], wkb[3], wkb[4]])
        } else {
            u32::from_be_bytes([wkb[1], wkb[2], wkb[3], wkb[4]])
        };
        if ty == WKB_POLYGON {
            return Ok(MultiPolygon::new(vec![read_polygon(&mut Cursor::new(wkb))?]));
        }
    }

    let mut cursor = Cursor::new(wkb);
    let is_le = read_header(&mut cursor, WKB_MULTIPOLYGON)?;
    let count = read_count(&mut cursor, is_le, 9, "Polygon")?;
    let polygons = (0..count)
        .map(|_| read_polygon(&mut cursor))
        .collect::<Result<Vec<_>>>()?;

    Ok(MultiPolygon::new(polygons))
}

/// Serde adapter storing a MultiPolygon as hex-encoded WKB.
pub(crate) mod wkb_hex {
    use geo::MultiPolygon;
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(mp: &MultiPolygon<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let wkb = super::multipolygon_to_wkb(mp).map_err(S::Error::custom)?;
        serializer.serialize_str(&hex::encode(wkb))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MultiPolygon<f64>, D::Error> {
        let text = String::deserialize(deserializer)?;
        let wkb = hex::decode(text).map_err(D::Error::custom)?;
        super::multipolygon_from_wkb(&wkb).map_err(D::Error::custom)
    }
}

/// Serde adapter storing a Point as an `[x, y]` array.
pub(crate) mod point_xy {
    use geo::Point;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) fn serialize<S: Serializer>(point: &Point<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        [point.x(), point.y()].serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point<f64>, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Point::new(x, y))
    }
}

/// Write detail records to blob bytes.
/// Format: [magic: 4 bytes][version: 1 byte][count: u32][compressed: 1 byte][data...]
/// Data: repeated [id_len: u32][id: utf-8][value: f64][wkb_len: u32][wkb]
pub(crate) fn write_records(records: &[DetailRecord], compress: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    out.write_all(MAGIC)?;
    out.write_all(&[VERSION])?;
    out.write_all(&(records.len() as u32).to_le_bytes())?;
    out.write_all(&[if compress { 1 } else { 0 }])?;

    let mut data = Vec::new();
    for record in records {
        data.write_all(&(record.id.len() as u32).to_le_bytes())?;
        data.write_all(record.id.as_bytes())?;
        data.write_all(&record.value.to_le_bytes())?;
        let wkb = multipolygon_to_wkb(&record.geometry)?;
        data.write_all(&(wkb.len() as u32).to_le_bytes())?;
        data.write_all(&wkb)?;
    }

    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Flate2Compression::default());
        encoder.write_all(&data)?;
        out.write_all(&encoder.finish()?)?;
    } else {
        out.write_all(&data)?;
    }

    Ok(out)
}

/// Read detail records from blob bytes.
pub(crate) fn read_records(bytes: &[u8]) -> Result<Vec<DetailRecord>> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).context("Truncated detail blob")?;
    if magic != MAGIC {
        bail!("Invalid detail blob: bad magic bytes");
    }

    let mut version = [0u8; 1];
    cursor.read_exact(&mut version)?;
    if version[0] != VERSION {
        bail!("Unsupported detail blob version: {}", version[0]);
    }

    let count = read_u32(&mut cursor, true)? as usize;

    let mut compressed_flag = [0u8; 1];
    cursor.read_exact(&mut compressed_flag)?;

    let mut data = Vec::new();
    cursor.read_to_end(&mut data)?;
    if compressed_flag[0] != 0 {
        let mut decompressed = Vec::new();
        GzDecoder::new(&data[..]).read_to_end(&mut decompressed)
            .context("Failed to decompress detail blob")?;
        data = decompressed;
    }

    // id length, value and wkb length are the smallest possible record
    if count.saturating_mul(16) > data.len() {
        bail!("Detail blob claims {count} records but holds {} bytes", data.len());
    }

    let mut cursor = Cursor::new(&data[..]);
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let id_len = read_count(&mut cursor, true, 1, "Id byte")?;
        let mut id = vec![0u8; id_len];
        cursor.read_exact(&mut id)?;
        let id = String::from_utf8(id).context("Detail record id is not UTF-8")?;

        let value = read_f64(&mut cursor, true)?;

        let wkb_len = read_count(&mut cursor, true, 1, "Geometry byte")?;
        let mut wkb = vec![0u8; wkb_len];
        cursor.read_exact(&mut wkb)?;
        let geometry = multipolygon_from_wkb(&wkb)
            .with_context(|| format!("Failed to parse geometry of record {id:?}"))?;

        records.push(DetailRecord { id, geometry, value });
    }

    Ok(records)
}
