//! MoMo CSV decoding.
//!
//! Only the columns the query engine needs are read; any other column is
//! ignored. Counts may be written as decimals and are truncated toward zero;
//! a count that is not finite or implausibly large drops the row.

use std::io::Read;

use chrono::NaiveDate;
use serde::Deserialize;

use momo_core::error::{MomoError, Result};
use momo_core::{DatasetRecord, ScopeLevel};

const REQUIRED_COLUMNS: [&str; 6] = [
    "ambito",
    "cod_sexo",
    "cod_gedad",
    "fecha_defuncion",
    "defunciones_observadas",
    "defunciones_esperadas",
];

/// Upper bound on any death count.
const MAX_COUNT: f64 = 1e12;

#[derive(Debug, Deserialize)]
struct RawRow {
    ambito: String,
    #[serde(default)]
    nombre_ambito: String,
    cod_sexo: String,
    cod_gedad: String,
    fecha_defuncion: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    defunciones_observadas: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    defunciones_esperadas: Option<f64>,
}

/// Decoded rows plus the number of rows that were dropped.
#[derive(Debug, Default)]
pub struct DecodeReport {
    pub rows: Vec<DatasetRecord>,
    pub skipped: usize,
}

/// Decode a full MoMo CSV document.
pub fn decode_csv<R: Read>(reader: R) -> Result<DecodeReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| MomoError::Refresh(format!("CSV header: {e}")))?
        .clone();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|col| !headers.iter().any(|h| h == **col))
    {
        return Err(MomoError::Refresh(format!("CSV is missing column '{missing}'")));
    }

    let mut report = DecodeReport::default();
    for result in rdr.deserialize::<RawRow>() {
        match result.ok().and_then(into_record) {
            Some(record) => report.rows.push(record),
            None => report.skipped += 1,
        }
    }
    Ok(report)
}

fn into_record(raw: RawRow) -> Option<DatasetRecord> {
    let level = ScopeLevel::from_dataset_code(&raw.ambito)?;
    let date = parse_date(&raw.fecha_defuncion)?;
    let expected = count(raw.defunciones_esperadas?)?;
    let observed = match raw.defunciones_observadas {
        Some(v) => Some(count(v)?),
        None => None,
    };
    Some(DatasetRecord {
        level,
        scope_name: raw.nombre_ambito,
        date,
        sex_code: raw.cod_sexo,
        age_group_code: raw.cod_gedad,
        observed,
        expected,
    })
}

fn count(v: f64) -> Option<i64> {
    (v.is_finite() && v.abs() < MAX_COUNT).then(|| v.trunc() as i64)
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ambito,cod_ambito,cod_ine_ambito,nombre_ambito,cod_sexo,nombre_sexo,cod_gedad,nombre_gedad,fecha_defuncion,defunciones_observadas,defunciones_observadas_lim_inf,defunciones_observadas_lim_sup,defunciones_esperadas,defunciones_esperadas_q01,defunciones_esperadas_q99
nacional,,,,all,todos,all,todos,2024-01-10,1200,1150,1250,1100.7,1000,1200
ccaa,MD,13,Madrid,all,todos,all,todos,2024-01-10,150,140,160,155.2,130,170
provincia,PM,07,\"Balears, Illes\",all,todos,all,todos,2024-01-10,,,,40,30,50
ccaa,MD,13,Madrid,1,hombres,all,todos,2024-01-10,70,60,80,72,60,85
municipio,X,1,Nowhere,all,todos,all,todos,2024-01-10,1,1,1,1,1,1
nacional,,,,all,todos,all,todos,not-a-date,1,1,1,1,1,1
";

    #[test]
    fn test_decode_sample() {
        let report = decode_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.skipped, 2);

        let national = &report.rows[0];
        assert_eq!(national.level, ScopeLevel::National);
        assert_eq!(national.observed, Some(1200));
        assert_eq!(national.expected, 1100);

        let balears = &report.rows[2];
        assert_eq!(balears.scope_name, "Balears, Illes");
        assert_eq!(balears.observed, None);
    }

    #[test]
    fn test_rejects_out_of_range_counts() {
        let csv = "\
ambito,nombre_ambito,cod_sexo,cod_gedad,fecha_defuncion,defunciones_observadas,defunciones_esperadas
nacional,,all,all,2024-01-10,inf,10
nacional,,all,all,2024-01-11,1e300,10
nacional,,all,all,2024-01-12,5,NaN
nacional,,all,all,2024-01-13,5,-1e20
nacional,,all,all,2024-01-14,5,4
";
        let report = decode_csv(csv.as_bytes()).unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.skipped, 4);
        assert_eq!(report.rows[0].observed, Some(5));
    }

    #[test]
    fn test_missing_column() {
        let err = decode_csv("ambito,cod_sexo\nnacional,all\n".as_bytes()).unwrap_err();
        assert!(matches!(err, MomoError::Refresh(_)));
    }

    #[test]
    fn test_parse_date_with_time() {
        assert_eq!(
            parse_date("2024-03-01 00:00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date("01/03/2024"), None);
    }
}
