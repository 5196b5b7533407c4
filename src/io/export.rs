//! Sample table CSV read/write.
//!
//! Exported tables have one header row of column names followed by one row
//! per draw. On read, a leading `#` on the header (as written by common
//! sampler front-ends) is stripped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::AppError;
use crate::fit::{CurveBands, SampleSource, SampleTable};

/// Write any sample source to CSV.
pub fn write_samples_csv<S: SampleSource + ?Sized>(path: &Path, source: &S) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create samples CSV '{}': {e}", path.display()),
        )
    })?;
    let mut writer = csv::Writer::from_writer(file);

    writer
        .write_record(source.columns())
        .map_err(|e| AppError::new(2, format!("Failed to write samples CSV header: {e}")))?;

    let columns: Vec<&[f64]> = source
        .columns()
        .iter()
        .map(|c| source.column(c).unwrap_or(&[]))
        .collect();
    for i in 0..source.len() {
        let row: Vec<String> = columns
            .iter()
            .map(|col| col.get(i).map(|v| format!("{v:e}")).unwrap_or_default())
            .collect();
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write samples CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush samples CSV: {e}")))?;
    Ok(())
}

/// Read a samples CSV into a raw table.
pub fn read_samples_csv(path: &Path) -> Result<SampleTable, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open samples CSV '{}': {e}", path.display()),
        )
    })?;
    parse_samples(file)
}

pub fn parse_samples<R: Read>(reader: R) -> Result<SampleTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read samples CSV header: {e}")))?
        .clone();
    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('#') } else { h };
            h.trim().to_string()
        })
        .collect();
    if columns.iter().any(|c| c.is_empty()) {
        return Err(AppError::new(2, "Samples CSV has an empty column name."));
    }

    let mut table = SampleTable::new(columns);
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::new(3, format!("Samples CSV line {line}: {e}")))?;
        let row = record
            .iter()
            .map(|f| {
                f.parse::<f64>()
                    .map_err(|_| AppError::new(3, format!("Samples CSV line {line}: '{f}' is not a number")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        table
            .push_row(&row)
            .map_err(|e| AppError::new(3, format!("Samples CSV line {line}: {e}")))?;
    }

    if table.is_empty() {
        return Err(AppError::new(3, "Samples CSV has no rows."));
    }
    Ok(table)
}

/// Write quantile bands as `x,q<quantile>...` columns.
pub fn write_bands_csv(path: &Path, bands: &CurveBands) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create bands CSV '{}': {e}", path.display()),
        )
    })?;
    let mut writer = csv::Writer::from_writer(file);

    let header: Vec<String> = std::iter::once("x".to_string())
        .chain(bands.quantiles.iter().map(|q| format!("q{q}")))
        .collect();
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write bands CSV header: {e}")))?;

    for (g, x) in bands.grid.iter().enumerate() {
        let row: Vec<String> = std::iter::once(format!("{x:.6}"))
            .chain(bands.bands.iter().map(|band| format!("{:.8}", band[g])))
            .collect();
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write bands CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush bands CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_hash_is_stripped() {
        let csv = "# weight,loglike,fy_f\n1.0,-3.5,0.25\n0.5,-4.0,0.5\n";
        let table = parse_samples(csv.as_bytes()).unwrap();
        assert_eq!(table.columns(), ["weight", "loglike", "fy_f"]);
        assert_eq!(table.column("fy_f").unwrap(), &[0.25, 0.5]);
        assert_eq!(table.best_fit(), Some(0));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let csv = "weight,x_1\n1.0\n";
        let err = parse_samples(csv.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn written_tables_load_back() {
        let table = SampleTable::from_rows(
            vec!["weight".into(), "x_1".into(), "y_1".into()],
            vec![vec![1.0, 5.0, 0.125], vec![0.25, 6.5, -1e-7]],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        write_samples_csv(&path, &table).unwrap();
        let loaded = read_samples_csv(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn bands_csv_has_one_row_per_grid_point() {
        let bands = CurveBands {
            grid: vec![0.0, 1.0],
            quantiles: vec![0.5],
            bands: vec![vec![0.1, 0.2]],
            skipped: 0,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        write_bands_csv(&path, &bands).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "x,q0.5");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "1.000000,0.20000000");
    }

    #[test]
    fn bands_csv_reads_back_as_a_table() {
        let bands = CurveBands {
            grid: vec![50.0, 75.0, 100.0],
            quantiles: vec![0.025, 0.975],
            bands: vec![vec![-0.5, -0.25, 0.0], vec![0.5, 0.25, 0.0]],
            skipped: 0,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bands.csv");
        write_bands_csv(&path, &bands).unwrap();

        let table = read_samples_csv(&path).unwrap();
        assert_eq!(table.columns(), ["x", "q0.025", "q0.975"]);
        assert_eq!(table.column("x").unwrap(), &[50.0, 75.0, 100.0]);
        assert_eq!(table.column("q0.025").unwrap(), &[-0.5, -0.25, 0.0]);
    }
}
