use std::fs;
use std::path::Path;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::bronze::RawTable;
use crate::error::{PipelineError, Result};

/// Raw fields the silver query reads. Any the source omitted become all-null columns.
pub const SILVER_SOURCE_COLUMNS: [&str; 12] = [
    "id",
    "name",
    "brewery_type",
    "address_1",
    "city",
    "state_province",
    "postal_code",
    "country",
    "longitude",
    "latitude",
    "phone",
    "website_url",
];

pub const FACT_FILE: &str = "fact_breweries.csv";
pub const LOCATION_FILE: &str = "dim_location.csv";
pub const TYPE_FILE: &str = "dim_brewery_type.csv";

/// In-memory store for a single transform. Dropping the connection releases it.
pub fn open() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    register_functions(&conn)?;
    Ok(conn)
}

fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "to_coordinate",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value = match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i as f64),
                ValueRef::Real(f) => Some(f).filter(|f| f.is_finite()),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    parse_coordinate(&String::from_utf8_lossy(bytes))
                }
            };
            Ok(value)
        },
    )?;
    Ok(())
}

/// Text to a finite float. Anything else is NULL.
pub fn parse_coordinate(text: &str) -> Option<f64> {
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!(value = text, "unparseable coordinate, storing NULL");
            None
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

// ── Bronze → raw_breweries ──

pub fn load_raw(conn: &Connection, table: &RawTable) -> Result<usize> {
    let mut columns: Vec<&str> = table.columns.iter().map(String::as_str).collect();
    for needed in SILVER_SOURCE_COLUMNS {
        if !columns.contains(&needed) {
            columns.push(needed);
        }
    }

    let defs = columns
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS raw_breweries; CREATE TABLE raw_breweries ({defs});"
    ))?;

    let insert = if table.columns.is_empty() {
        "INSERT INTO raw_breweries DEFAULT VALUES".to_string()
    } else {
        let names = table
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=table.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO raw_breweries ({names}) VALUES ({placeholders})")
    };

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&insert)?;
        for row in &table.rows {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;

    debug!(rows = table.len(), columns = columns.len(), "raw_breweries loaded");
    Ok(table.len())
}

// ── Silver ──

const SILVER_SQL: &str = "
    CREATE TABLE silver_breweries AS
    SELECT
        id AS brewery_id,
        UPPER(name) AS name,
        brewery_type,
        COALESCE(address_1, 'Unknown') AS address,
        city,
        state_province AS state,
        postal_code,
        country,
        CASE WHEN longitude IN ('None', 'nan') THEN NULL ELSE to_coordinate(longitude) END AS longitude,
        CASE WHEN latitude IN ('None', 'nan') THEN NULL ELSE to_coordinate(latitude) END AS latitude,
        phone,
        website_url
    FROM raw_breweries
    WHERE state_province IS NOT NULL
      AND country = ?1
    ORDER BY rowid";

/// Filter to one country and normalize. Returns the silver row count.
pub fn build_silver(conn: &Connection, target_country: &str) -> Result<usize> {
    conn.execute("DROP TABLE IF EXISTS silver_breweries", [])?;
    conn.execute(SILVER_SQL, [target_country])?;
    let rows = count_rows(conn, "silver_breweries")?;
    debug!(rows, country = target_country, "silver_breweries built");
    Ok(rows)
}

// ── Gold ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoldCounts {
    pub locations: usize,
    pub types: usize,
    pub facts: usize,
}

const DIM_LOCATION_SQL: &str = "
    CREATE TABLE dim_location AS
    SELECT DISTINCT
        dense_rank() OVER (ORDER BY state, city) AS location_key,
        city,
        state,
        country
    FROM silver_breweries";

const DIM_TYPE_SQL: &str = "
    CREATE TABLE dim_brewery_type AS
    SELECT DISTINCT
        dense_rank() OVER (ORDER BY brewery_type) AS type_key,
        brewery_type
    FROM silver_breweries";

// Rows with a NULL city, state or type never satisfy the equality joins.
const FACT_SQL: &str = "
    CREATE TABLE fact_breweries AS
    SELECT
        b.brewery_id,
        b.name,
        l.location_key,
        t.type_key,
        b.longitude,
        b.latitude
    FROM silver_breweries b
    JOIN dim_location l ON b.city = l.city AND b.state = l.state
    JOIN dim_brewery_type t ON b.brewery_type = t.brewery_type
    ORDER BY b.rowid";

/// Star schema from the silver layer: two dimensions, then the fact table.
pub fn build_gold(conn: &Connection) -> Result<GoldCounts> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS fact_breweries;
         DROP TABLE IF EXISTS dim_location;
         DROP TABLE IF EXISTS dim_brewery_type;",
    )?;
    conn.execute(DIM_LOCATION_SQL, [])?;
    conn.execute(DIM_TYPE_SQL, [])?;
    conn.execute(FACT_SQL, [])?;

    let counts = GoldCounts {
        locations: count_rows(conn, "dim_location")?,
        types: count_rows(conn, "dim_brewery_type")?,
        facts: count_rows(conn, "fact_breweries")?,
    };

    let silver = count_rows(conn, "silver_breweries")?;
    if counts.facts < silver {
        warn!(
            dropped = silver - counts.facts,
            "silver rows with NULL city, state or brewery_type were left out of fact_breweries"
        );
    }
    debug!(?counts, "gold layer built");
    Ok(counts)
}

// ── Export ──

/// Write the three gold tables as headered, comma-delimited files.
pub fn export(conn: &Connection, gold_dir: &Path) -> Result<GoldCounts> {
    fs::create_dir_all(gold_dir).map_err(|e| PipelineError::io(gold_dir, e))?;

    let facts = export_query(
        conn,
        "SELECT brewery_id, name, location_key, type_key, longitude, latitude
         FROM fact_breweries ORDER BY rowid",
        &gold_dir.join(FACT_FILE),
    )?;
    let locations = export_query(
        conn,
        "SELECT location_key, city, state, country FROM dim_location ORDER BY location_key",
        &gold_dir.join(LOCATION_FILE),
    )?;
    let types = export_query(
        conn,
        "SELECT type_key, brewery_type FROM dim_brewery_type ORDER BY type_key",
        &gold_dir.join(TYPE_FILE),
    )?;

    Ok(GoldCounts {
        locations,
        types,
        facts,
    })
}

fn export_query(conn: &Connection, sql: &str, path: &Path) -> Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&headers)?;

    let mut written = 0;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(headers.len());
        for i in 0..headers.len() {
            record.push(csv_cell(row.get_ref(i)?));
        }
        writer.write_record(&record)?;
        written += 1;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    debug!(path = %path.display(), rows = written, "table exported");
    Ok(written)
}

fn csv_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(b) | ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}
