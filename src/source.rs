//! Readers for raw census inputs: polygon shapefiles joined with CSV
//! attribute tables, case reports, landmark lists.

use std::{collections::HashMap, fs::File, io::{Cursor, Read}, path::Path, sync::Arc};

use anyhow::{Context, Result, bail, ensure};
use flate2::read::GzDecoder;
use geo::MultiPolygon;
use log::{info, warn};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvEncoding, CsvReadOptions, CsvReader, DataType, Field, Schema}};
use shapefile::dbase::{FieldValue, Record};

use crate::{common, count::CaseRow, landmark::Landmark, municipality::Municipality, tiling::SourceFeature};

/// Column names of the census inputs.
#[derive(Debug, Clone)]
pub struct SourceFields {
    /// Tract id in the tract shapefile.
    pub tract_id: String,
    /// Tract id in the population table.
    pub tract_table_id: String,
    pub tract_population: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub municipality_region: String,
    /// Municipality code in the population table.
    pub municipality_table_code: String,
    pub municipality_population: String,
    /// Keep only this many leading digits of municipality codes.
    pub code_digits: Option<usize>,
}

impl Default for SourceFields {
    fn default() -> Self {
        Self {
            tract_id: "CD_GEOCODI".into(),
            tract_table_id: "Cod_setor".into(),
            tract_population: "populacao_residente".into(),
            municipality_code: "CD_MUN".into(),
            municipality_name: "NM_MUN".into(),
            municipality_region: "SIGLA_UF".into(),
            municipality_table_code: "code_muni".into(),
            municipality_population: "pop_2019".into(),
            code_digits: Some(6),
        }
    }
}

impl SourceFields {
    fn municipality_code(&self, code: &str) -> String {
        let code = code.trim();
        match self.code_digits {
            Some(n) if code.len() > n && code.bytes().all(|b| b.is_ascii_digit()) => code[..n].to_string(),
            _ => code.to_string(),
        }
    }
}

/// Get the value of a character field from a Record; numeric codes are
/// rendered without a fractional part.
fn character_field(record: &Record, field: &str) -> Result<String> {
    match record.get(field) {
        Some(FieldValue::Character(Some(s))) => Ok(s.trim().to_string()),
        Some(FieldValue::Numeric(Some(n))) if n.fract() == 0.0 => Ok(format!("{n:.0}")),
        _ => bail!("missing or invalid character field: {}", field),
    }
}

/// Read every polygon of a shapefile with the value of `id_field`.
pub fn read_shapes(path: &Path, id_field: &str) -> Result<Vec<(String, MultiPolygon<f64>)>> {
    Ok(read_shapes_with(path, &[id_field])?.into_iter()
        .map(|(mut values, geometry)| (values.swap_remove(0), geometry))
        .collect())
}

/// Read every shape of a shapefile with several character fields.
fn read_shapes_with(path: &Path, fields: &[&str]) -> Result<Vec<(Vec<String>, MultiPolygon<f64>)>> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("[source] Failed to open shapefile: {}", path.display()))?;

    reader.iter_shapes_and_records()
        .map(|item| {
            let (shape, record) = item.with_context(|| format!("[source] Failed to read {}", path.display()))?;
            let values = fields.iter()
                .map(|field| character_field(&record, field))
                .collect::<Result<Vec<_>>>()?;
            Ok((values, common::shape_to_multipolygon(shape)?))
        })
        .collect()
}

/// Read a national outline: the union of every polygon in the shapefile.
pub fn read_extent(path: &Path) -> Result<MultiPolygon<f64>> {
    let mut reader = shapefile::ShapeReader::from_path(path)
        .with_context(|| format!("[source] Failed to open shapefile: {}", path.display()))?;

    let mut polygons = Vec::new();
    for shape in reader.iter_shapes() {
        let shape = shape.with_context(|| format!("[source] Failed to read {}", path.display()))?;
        polygons.extend(common::shape_to_multipolygon(shape)?.0);
    }
    ensure!(!polygons.is_empty(), "[source] Extent shapefile {} has no polygons", path.display());
    Ok(MultiPolygon::new(polygons))
}

/// Read a CSV file, gunzipping it first when the name ends in `.gz`.
/// Columns in `text_columns` are read as strings to preserve leading zeros.
pub fn read_table(path: &Path, text_columns: &[&str]) -> Result<DataFrame> {
    let mut bytes = Vec::new();
    let mut file = File::open(path)
        .with_context(|| format!("[source] Failed to open table: {}", path.display()))?;
    let read = if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(&mut file).read_to_end(&mut bytes)
    } else {
        file.read_to_end(&mut bytes)
    };
    read.with_context(|| format!("[source] Failed to read table: {}", path.display()))?;

    read_table_bytes(&bytes, text_columns)
        .with_context(|| format!("[source] Failed to parse table: {}", path.display()))
}

fn read_table_bytes(bytes: &[u8], text_columns: &[&str]) -> Result<DataFrame> {
    let schema = Arc::new(Schema::from_iter(
        text_columns.iter().map(|&name| Field::new(name.into(), DataType::String))
    ));
    let options = CsvReadOptions::default()
        .with_has_header(true)
        .with_schema_overwrite(Some(schema))
        .map_parse_options(|po| po.with_encoding(CsvEncoding::LossyUtf8));

    Ok(CsvReader::new(Cursor::new(bytes))
        .with_options(options)
        .finish()?)
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)
        .with_context(|| format!("[source] Missing column {name}"))?
        .cast(&DataType::String)?;
    Ok(column.str()?.into_iter().map(|s| s.map(|s| s.trim().to_string())).collect())
}

fn number_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)
        .with_context(|| format!("[source] Missing column {name}"))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Map from id to value, rejecting duplicate ids and negative values.
fn value_table(df: &DataFrame, id: &str, value: &str) -> Result<HashMap<String, f64>> {
    let mut table = HashMap::with_capacity(df.height());
    for (key, value) in text_column(df, id)?.into_iter().zip(number_column(df, value)?) {
        let Some(key) = key else { continue };
        let value = value.unwrap_or(0.0);
        ensure!(value.is_finite() && value >= 0.0, "[source] Invalid value {value} for {key}");
        ensure!(table.insert(key.clone(), value).is_none(), "[source] Duplicate id {key}");
    }
    Ok(table)
}

/// Attach populations to tract shapes; tracts missing from the table count
/// as empty.
fn join_tracts(shapes: Vec<(String, MultiPolygon<f64>)>, table: &HashMap<String, f64>) -> Vec<SourceFeature> {
    let mut missing = 0;
    let features = shapes.into_iter()
        .map(|(id, geometry)| {
            let value = table.get(&id).copied().unwrap_or_else(|| { missing += 1; 0.0 });
            SourceFeature::new(id, geometry, value)
        })
        .collect();
    if missing > 0 {
        warn!("[source] {missing} tracts have no population row; using 0");
    }
    features
}

/// Read tract polygons and join them with their populations.
pub fn read_tracts(shapes: &Path, populations: &Path, fields: &SourceFields) -> Result<Vec<SourceFeature>> {
    let shapes = read_shapes(shapes, &fields.tract_id)?;
    let df = read_table(populations, &[&fields.tract_table_id])?;
    let table = value_table(&df, &fields.tract_table_id, &fields.tract_population)?;

    let tracts = join_tracts(shapes, &table);
    info!("[source] read {} tracts", tracts.len());
    Ok(tracts)
}

fn join_municipalities(shapes: Vec<(Vec<String>, MultiPolygon<f64>)>, table: &HashMap<String, f64>, fields: &SourceFields) -> Result<Vec<Municipality>> {
    shapes.into_iter()
        .map(|(values, geometry)| {
            let [code, name, region] = <[String; 3]>::try_from(values)
                .map_err(|_| anyhow::anyhow!("[source] Expected code, name and region fields"))?;
            let code = fields.municipality_code(&code);
            let population = table.get(&code).copied()
                .with_context(|| format!("[source] No population for municipality {code}"))?;
            Municipality::new(code, name, region, population.round() as u64, geometry)
        })
        .collect()
}

/// Read municipality outlines and join them with their populations.
/// Every municipality must have a population.
pub fn read_municipalities(shapes: &Path, populations: &Path, fields: &SourceFields) -> Result<Vec<Municipality>> {
    let shapes = read_shapes_with(shapes, &[
        &fields.municipality_code, &fields.municipality_name, &fields.municipality_region,
    ])?;
    let df = read_table(populations, &[&fields.municipality_table_code])?;
    let table = value_table(&df, &fields.municipality_table_code, &fields.municipality_population)?
        .into_iter()
        .map(|(code, population)| (fields.municipality_code(&code), population))
        .collect();

    let municipalities = join_municipalities(shapes, &table, fields)?;
    info!("[source] read {} municipalities", municipalities.len());
    Ok(municipalities)
}

fn case_rows(df: &DataFrame) -> Result<Vec<CaseRow>> {
    let dates = text_column(df, "date")?;
    let place_types = text_column(df, "place_type")?;
    let is_last = text_column(df, "is_last")?;
    let deaths = number_column(df, "deaths")?;
    let confirmed = number_column(df, "confirmed")?;
    let population = number_column(df, "estimated_population_2019")?;

    Ok((0..df.height())
        .map(|i| CaseRow {
            date: dates[i].clone().unwrap_or_default(),
            place_type: place_types[i].clone().unwrap_or_default(),
            is_last: is_last[i].as_deref().is_some_and(|s| s.eq_ignore_ascii_case("true")),
            deaths: deaths[i].unwrap_or(0.0).max(0.0) as u64,
            confirmed: confirmed[i].unwrap_or(0.0).max(0.0) as u64,
            estimated_population: population[i].map(|p| p.max(0.0) as u64),
        })
        .collect())
}

/// Read a per-place case report (`.csv` or `.csv.gz`).
pub fn read_case_rows(path: &Path) -> Result<Vec<CaseRow>> {
    let df = read_table(path, &["date", "place_type", "is_last"])?;
    case_rows(&df).with_context(|| format!("[source] Invalid case report: {}", path.display()))
}

/// Read a JSON list of landmarks.
pub fn read_landmarks(path: &Path) -> Result<Vec<Landmark>> {
    let file = File::open(path)
        .with_context(|| format!("[source] Failed to open landmarks: {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("[source] Failed to parse landmarks: {}", path.display()))
}
