//! Run report
//!
//! One CSV row per input point, successful or not, written next to the
//! result layers. The change rate compares the delineated area against the
//! declared area from the outlet list, which is the first sanity check a
//! hydrologist reaches for.

use anyhow::{Context, Result};
use basin_engine::{ClipStatus, PointOutcome, PourPoint};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

const HEADER: &str = "id,name,long,lat,area[km2],snap_long,snap_lat,snap_distance[deg],snap_distance[m],CalculatedArea[km2],change_rate[%],status,comment";

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub point: PourPoint,
    pub snap: Option<(f64, f64, f64, f64)>,
    pub calculated_area_km2: Option<f64>,
    pub status: String,
    pub comment: String,
}

impl ReportRow {
    pub fn from_outcome(outcome: &PointOutcome) -> Self {
        match outcome {
            PointOutcome::Delineated(d) => {
                let (status, comment) = match &d.rivers {
                    Some((_, feedback)) => {
                        let status = match feedback.status {
                            ClipStatus::Clipped => "success",
                            ClipStatus::Empty => "empty",
                        };
                        (status.to_string(), feedback.message.clone())
                    }
                    None => ("success".to_string(), format!("{} cells", d.cell_count)),
                };

                Self {
                    point: d.point.clone(),
                    snap: Some((d.snapped.x, d.snapped.y, d.snapped.shift_deg, d.snapped.shift_m)),
                    calculated_area_km2: Some(d.area_km2),
                    status,
                    comment,
                }
            }
            PointOutcome::Failed { point, error } => Self {
                point: point.clone(),
                snap: None,
                calculated_area_km2: None,
                status: "failed".to_string(),
                comment: error.to_string(),
            },
        }
    }

    pub fn skipped(point: &PourPoint, comment: impl Into<String>) -> Self {
        Self {
            point: point.clone(),
            snap: None,
            calculated_area_km2: None,
            status: "failed".to_string(),
            comment: comment.into(),
        }
    }

    fn change_rate(&self) -> Option<f64> {
        match (self.calculated_area_km2, self.point.declared_area_km2) {
            (Some(calculated), Some(declared)) if declared != 0.0 => {
                Some(100.0 * (calculated - declared) / declared)
            }
            _ => None,
        }
    }

    fn to_csv(&self) -> String {
        let fmt = |v: Option<f64>| v.map(|v| format!("{:.6}", v)).unwrap_or_default();
        let (snap_long, snap_lat, dist_deg, dist_m) = match self.snap {
            Some((x, y, deg, m)) => (Some(x), Some(y), Some(deg), Some(m)),
            None => (None, None, None, None),
        };

        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            escape(&self.point.id),
            escape(&self.point.name),
            self.point.x,
            self.point.y,
            fmt(self.point.declared_area_km2),
            fmt(snap_long),
            fmt(snap_lat),
            fmt(dist_deg),
            fmt(dist_m),
            fmt(self.calculated_area_km2),
            fmt(self.change_rate()),
            self.status,
            escape(&self.comment),
        )
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Timestamped report path inside the results directory.
pub fn report_path(results: &Path) -> PathBuf {
    let stamp = Local::now().format("%d%m%Y_%H%M");
    results.join(format!("report_{}.csv", stamp))
}

pub fn write_report(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let mut out = String::with_capacity(rows.len() * 96 + HEADER.len());
    out.push_str(HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_csv());
        out.push('\n');
    }
    fs::write(path, out).with_context(|| format!("cannot write report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(area: Option<f64>) -> PourPoint {
        PourPoint {
            id: "3".into(),
            name: "gauge".into(),
            x: 29.0,
            y: 41.0,
            declared_area_km2: area,
        }
    }

    #[test]
    fn test_change_rate() {
        let row = ReportRow {
            point: point(Some(100.0)),
            snap: Some((29.01, 41.01, 0.014, 1500.0)),
            calculated_area_km2: Some(110.0),
            status: "success".into(),
            comment: String::new(),
        };
        assert_eq!(row.change_rate(), Some(10.0));
    }

    #[test]
    fn test_change_rate_requires_declared_area() {
        let row = ReportRow {
            point: point(None),
            snap: None,
            calculated_area_km2: Some(110.0),
            status: "success".into(),
            comment: String::new(),
        };
        assert_eq!(row.change_rate(), None);
    }

    #[test]
    fn test_csv_escaping_and_layout() {
        let row = ReportRow {
            point: point(Some(100.0)),
            snap: None,
            calculated_area_km2: None,
            status: "failed".into(),
            comment: "point (29, 41) is outside".into(),
        };
        let line = row.to_csv();
        assert!(line.ends_with(",failed,\"point (29, 41) is outside\""));

        let plain = ReportRow::skipped(&point(None), "outside");
        assert_eq!(
            plain.to_csv().split(',').count(),
            HEADER.split(',').count()
        );
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(dir.path());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("report_"));

        write_report(&path, &[ReportRow::skipped(&point(None), "no watershed")]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("id,name,"));
        assert_eq!(text.lines().count(), 2);
    }
}
