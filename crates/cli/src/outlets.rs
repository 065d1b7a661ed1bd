//! Outlet list parsing
//!
//! Outlet files come from spreadsheets in the wild, so the delimiter is
//! sniffed from the header line (tab, semicolon or comma) and a UTF-8 BOM
//! is tolerated. The five canonical columns must all be present; the area
//! column may hold empty values for stations with no published area.

use anyhow::{bail, Context, Result};
use basin_engine::PourPoint;
use std::fs;
use std::path::Path;

const REQUIRED: [&str; 5] = ["id", "name", "long", "lat", "area[km2]"];

/// Read pour points from a delimited text file.
pub fn read_outlets(path: &Path) -> Result<Vec<PourPoint>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read outlets file {}", path.display()))?;
    parse_outlets(&text).with_context(|| format!("in outlets file {}", path.display()))
}

pub fn parse_outlets(text: &str) -> Result<Vec<PourPoint>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header_line = match lines.next() {
        Some(line) => line,
        None => bail!("outlets file is empty"),
    };
    let delimiter = sniff_delimiter(header_line);

    let header: Vec<String> = header_line
        .split(delimiter)
        .map(|c| c.trim().to_string())
        .collect();

    let missing: Vec<&str> = REQUIRED
        .iter()
        .filter(|&&col| !header.iter().any(|h| h == col))
        .copied()
        .collect();
    if !missing.is_empty() {
        bail!("missing columns {:?}; expected header {:?}", missing, REQUIRED);
    }

    let index = |col: &str| header.iter().position(|h| h == col);
    let (id_at, name_at, long_at, lat_at, area_at) = match (
        index("id"),
        index("name"),
        index("long"),
        index("lat"),
        index("area[km2]"),
    ) {
        (Some(a), Some(b), Some(c), Some(d), Some(e)) => (a, b, c, d, e),
        _ => bail!("missing required columns"),
    };

    let mut points = Vec::new();
    for (number, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        if fields.len() < header.len() {
            bail!(
                "line {}: {} fields, header has {}",
                number + 2,
                fields.len(),
                header.len()
            );
        }

        let parse_coord = |at: usize, what: &str| -> Result<f64> {
            fields[at]
                .parse::<f64>()
                .with_context(|| format!("line {}: bad {} '{}'", number + 2, what, fields[at]))
        };

        let area = fields[area_at];
        let declared_area_km2 = if area.is_empty() {
            None
        } else {
            Some(
                area.parse::<f64>()
                    .with_context(|| format!("line {}: bad area '{}'", number + 2, area))?,
            )
        };

        points.push(PourPoint {
            id: fields[id_at].to_string(),
            name: fields[name_at].to_string(),
            x: parse_coord(long_at, "longitude")?,
            y: parse_coord(lat_at, "latitude")?,
            declared_area_km2,
        });
    }

    if points.is_empty() {
        bail!("outlets file has a header but no points");
    }

    Ok(points)
}

/// Pick the delimiter that actually splits the header.
fn sniff_delimiter(header: &str) -> char {
    for candidate in ['\t', ';', ','] {
        if header.contains(candidate) {
            return candidate;
        }
    }
    ','
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tab_separated() {
        let text = "id\tname\tlong\tlat\tarea[km2]\n1\tgauge_a\t29.05\t41.1\t153.2\n2\tgauge_b\t29.50\t40.9\t\n";
        let points = parse_outlets(text).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "1");
        assert_eq!(points[0].name, "gauge_a");
        assert_eq!(points[0].x, 29.05);
        assert_eq!(points[0].declared_area_km2, Some(153.2));
        assert_eq!(points[1].declared_area_km2, None);
    }

    #[test]
    fn test_parse_semicolon_with_bom() {
        let text = "\u{feff}id;name;long;lat;area[km2]\n7;k\u{0131}z\u{0131}l;32.1;39.5;12.0\n";
        let points = parse_outlets(text).unwrap();
        assert_eq!(points[0].id, "7");
        assert_eq!(points[0].y, 39.5);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let text = "id,name,long,lat\n1,a,29.0,41.0\n";
        let err = parse_outlets(text).unwrap_err();
        assert!(err.to_string().contains("area[km2]"));
    }

    #[test]
    fn test_bad_coordinate_is_an_error() {
        let text = "id,name,long,lat,area[km2]\n1,a,east,41.0,\n";
        assert!(parse_outlets(text).is_err());
    }

    #[test]
    fn test_empty_file_is_an_error() {
        assert!(parse_outlets("").is_err());
        assert!(parse_outlets("id,name,long,lat,area[km2]\n").is_err());
    }
}
