use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use crate::models::{FOODS_COLLECTION, Fields, Value};
use crate::store::DocumentStore;

/// One food parsed from the CoFID "1.3 Proximates" sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct CofidRow {
    pub name: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
    pub fibre: Option<f64>,
}

impl CofidRow {
    /// Fields of the `foods` document this row becomes.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        let num = |v: Option<f64>| v.map_or(Value::Null, Value::Double);
        Fields::from([
            ("name".to_string(), Value::String(self.name.clone())),
            ("calories".to_string(), num(self.calories)),
            ("protein".to_string(), num(self.protein)),
            ("fat".to_string(), num(self.fat)),
            ("carbs".to_string(), num(self.carbs)),
            ("fibre".to_string(), num(self.fibre)),
        ])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CofidImportSummary {
    pub dry_run: bool,
    pub rows_parsed: usize,
    pub foods_added: usize,
}

/// Parse a nutrient cell. CoFID marks trace amounts with `Tr` and values that
/// were not measured with `N`.
fn parse_nutrient(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.eq_ignore_ascii_case("tr") {
        return Some(0.0);
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a CSV export of the CoFID proximates sheet.
///
/// Expected columns (case-insensitive):
/// `Food Name, Energy (kcal) (kcal), Protein (g), Fat (g), Carbohydrate (g), AOAC fibre (g)`.
/// Only `Food Name` is required. Rows without a name are dropped.
pub fn parse_cofid_csv<R: Read>(reader: R) -> Result<Vec<CofidRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let Some(idx_name) = col("Food Name") else {
        bail!("Missing required column: Food Name");
    };
    let idx_kcal = col("Energy (kcal) (kcal)");
    let idx_protein = col("Protein (g)");
    let idx_fat = col("Fat (g)");
    let idx_carbs = col("Carbohydrate (g)");
    let idx_fibre = col("AOAC fibre (g)");

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", line_num + 2))?;

        let name = record.get(idx_name).unwrap_or("").trim();
        if name.is_empty() {
            debug!(line = line_num + 2, "skipping CoFID row without a food name");
            continue;
        }

        let nutrient = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(parse_nutrient);

        rows.push(CofidRow {
            name: name.to_string(),
            calories: nutrient(idx_kcal),
            protein: nutrient(idx_protein),
            fat: nutrient(idx_fat),
            carbs: nutrient(idx_carbs),
            fibre: nutrient(idx_fibre),
        });
    }

    Ok(rows)
}

/// Add one `foods` document per row. When `dry_run` is true, nothing is written.
pub async fn import_cofid_foods<S: DocumentStore + ?Sized>(
    store: &S,
    rows: &[CofidRow],
    dry_run: bool,
) -> Result<CofidImportSummary> {
    let mut foods_added = 0;

    if !dry_run {
        for row in rows {
            let id = store
                .add_document(FOODS_COLLECTION, &row.to_fields())
                .await
                .with_context(|| format!("Failed to add food '{}'", row.name))?;
            debug!(id = id.as_str(), name = row.name.as_str(), "added food");
            foods_added += 1;
        }
    }

    Ok(CofidImportSummary {
        dry_run,
        rows_parsed: rows.len(),
        foods_added,
    })
}
