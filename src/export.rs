use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::fields::{format_duration, format_number, format_total_time};
use crate::phase::{Phase, StatKey};
use crate::session::SessionData;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer flush failed: {0}")]
    Flush(String),
    #[error("csv output was not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("could not write export file: {0}")]
    Io(#[from] std::io::Error),
}

/// One `(session, category, variable_name, value, unit)` tuple as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeRow {
    pub session_id: i64,
    pub category: String,
    pub variable_name: String,
    pub value: String,
    pub unit: String,
}

impl AttributeRow {
    fn new(session_id: i64, category: &str, variable_name: String, value: String, unit: &str) -> Self {
        Self {
            session_id,
            category: category.to_string(),
            variable_name,
            value,
            unit: unit.to_string(),
        }
    }
}

/// Weight is only "recorded" when it is a real, non-negative number.
fn recorded_weight(weight: Option<f64>) -> Option<f64> {
    weight.filter(|w| w.is_finite() && *w >= 0.0)
}

fn nonzero_stats(data: &SessionData) -> impl Iterator<Item = (StatKey, u64)> + '_ {
    data.climbing_stats.iter().filter(|(_, count)| *count > 0)
}

fn write_block(records: &[Vec<String>]) -> Result<String, ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for record in records {
        wtr.write_record(record)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

fn row<const N: usize>(fields: [&str; N]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// Renders the "Email Summary" text: an overview block followed by the
/// climbing, hangboard, weighted-pull and power-endurance blocks, each
/// separated by a blank line.
pub fn render_csv(data: &SessionData) -> Result<String, ExportError> {
    let mut overview = vec![row(["Category", "Value", "Unit"])];
    for phase in Phase::ALL {
        overview.push(vec![
            format!("{} Duration", phase.label()),
            format_duration(data.durations.get(phase)),
            String::new(),
        ]);
    }
    overview.push(vec![
        "Total Time".to_string(),
        format_total_time(data.total_elapsed_seconds),
        "H:MM".to_string(),
    ]);
    overview.push(vec![
        "Total Moves (Climbing)".to_string(),
        data.total_moves.to_string(),
        "moves".to_string(),
    ]);

    let mut climbing = vec![row(["Climbing Details"]), row(["Grade", "Type", "Count"])];
    climbing.extend(
        nonzero_stats(data)
            .map(|(key, count)| vec![key.grade.to_string(), key.stat.to_string(), count.to_string()]),
    );

    let mut hangboard = vec![
        row(["Hangboard Sets Data"]),
        row(["Set", "Metric", "Value", "Unit"]),
    ];
    for (i, set) in data.hangboard_sets.iter().enumerate() {
        let Some(weight) = recorded_weight(set.weight) else {
            continue;
        };
        let n = (i + 1).to_string();
        hangboard.push(vec![n.clone(), "Weight".into(), format_number(weight), "lbs".into()]);
        if let Some(duration) = set.duration {
            hangboard.push(vec![n.clone(), "Duration".into(), format_number(duration), "s".into()]);
        }
        hangboard.push(vec![n, "Edge Size".into(), set.edge_size.mm().to_string(), "mm".into()]);
    }

    let mut pulls = vec![
        row(["Weighted Pulls Sets Data"]),
        row(["Set", "Metric", "Value", "Unit"]),
    ];
    for (i, set) in data.weighted_pulls.iter().enumerate() {
        let n = (i + 1).to_string();
        if let Some(weight) = recorded_weight(set.weight) {
            pulls.push(vec![n.clone(), "Weight".into(), format_number(weight), "lbs".into()]);
        }
        if let Some(reps) = set.reps {
            pulls.push(vec![n, "Reps".into(), format_number(reps), "reps".into()]);
        }
    }

    let mut power = vec![row(["Power Endurance Climbs Data"]), row(["Climb", "Grade"])];
    for (i, set) in data.power_endurance_sets.iter().enumerate() {
        let grade = set.grade.trim();
        if !grade.is_empty() {
            power.push(vec![(i + 1).to_string(), grade.to_string()]);
        }
    }

    let blocks = [overview, climbing, hangboard, pulls, power]
        .iter()
        .map(|records| write_block(records))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(blocks.join("\n"))
}

/// Flattens the session into attribute rows, applying the same filters as [`render_csv`].
pub fn attribute_rows(session_id: i64, data: &SessionData) -> Vec<AttributeRow> {
    let mut rows = Vec::new();

    for phase in Phase::ALL {
        rows.push(AttributeRow::new(
            session_id,
            "duration",
            phase.to_string(),
            data.durations.get(phase).to_string(),
            "seconds",
        ));
    }
    rows.push(AttributeRow::new(
        session_id,
        "summary",
        "total_time".into(),
        data.total_elapsed_seconds.to_string(),
        "seconds",
    ));
    rows.push(AttributeRow::new(
        session_id,
        "summary",
        "total_moves".into(),
        data.total_moves.to_string(),
        "moves",
    ));

    for (key, count) in nonzero_stats(data) {
        rows.push(AttributeRow::new(
            session_id,
            "climbing",
            key.to_string(),
            count.to_string(),
            "count",
        ));
    }

    for (i, set) in data.hangboard_sets.iter().enumerate() {
        let Some(weight) = recorded_weight(set.weight) else {
            continue;
        };
        let n = i + 1;
        rows.push(AttributeRow::new(
            session_id,
            "hangboard",
            format!("set_{n}_weight"),
            format_number(weight),
            "lbs",
        ));
        if let Some(duration) = set.duration {
            rows.push(AttributeRow::new(
                session_id,
                "hangboard",
                format!("set_{n}_duration"),
                format_number(duration),
                "seconds",
            ));
        }
        rows.push(AttributeRow::new(
            session_id,
            "hangboard",
            format!("set_{n}_edge_size"),
            set.edge_size.mm().to_string(),
            "mm",
        ));
    }

    for (i, set) in data.weighted_pulls.iter().enumerate() {
        let n = i + 1;
        if let Some(weight) = recorded_weight(set.weight) {
            rows.push(AttributeRow::new(
                session_id,
                "weighted_pulls",
                format!("set_{n}_weight"),
                format_number(weight),
                "lbs",
            ));
        }
        if let Some(reps) = set.reps {
            rows.push(AttributeRow::new(
                session_id,
                "weighted_pulls",
                format!("set_{n}_reps"),
                format_number(reps),
                "reps",
            ));
        }
    }

    for (i, set) in data.power_endurance_sets.iter().enumerate() {
        let grade = set.grade.trim();
        if !grade.is_empty() {
            rows.push(AttributeRow::new(
                session_id,
                "power_endurance",
                format!("climb_{}_grade", i + 1),
                grade.to_string(),
                "grade",
            ));
        }
    }

    rows
}

/// Builds a `mailto:` link carrying the summary as the message body.
pub fn mailto_url(recipient: Option<&str>, subject: &str, body: &str) -> String {
    let encode = |s: &str| {
        url::form_urlencoded::byte_serialize(s.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    };
    format!(
        "mailto:{}?subject={}&body={}",
        recipient.map(encode).unwrap_or_default(),
        encode(subject),
        encode(body)
    )
}

pub fn summary_subject(when: DateTime<Local>) -> String {
    format!("Workout Summary {}", when.format("%Y-%m-%d"))
}

/// Writes the summary under `dir` as `workout-<timestamp>.csv`.
pub fn write_export_file(dir: &Path, csv: &str, when: DateTime<Local>) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("workout-{}.csv", when.format("%Y%m%d-%H%M%S")));
    std::fs::write(&path, csv)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Grade, StatType};
    use crate::session::WeightedPull;
    use tempfile::tempdir;

    fn sample() -> SessionData {
        let mut data = SessionData::default();
        data.durations.stretching = 65;
        data.durations.hangboard = 610;
        data.durations.climbing = 300;
        data.durations.power_endurance = 200;
        data.durations.rehab = 400;
        data.total_elapsed_seconds = data.durations.total();
        data.record_climbing_stat(StatKey::new(Grade::V5V6, StatType::Sends), 2);
        data
    }

    #[test]
    fn test_overview_rows() {
        let csv = render_csv(&sample()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Category,Value,Unit");
        assert_eq!(lines[1], "Stretching Duration,1m 5s,");
        assert_eq!(lines[3], "Climbing Duration,5m 0s,");
        assert_eq!(lines[6], "Total Time,0:26,H:MM");
        assert_eq!(lines[7], "Total Moves (Climbing),2,moves");
        assert_eq!(lines[8], "");
        assert_eq!(lines[9], "Climbing Details");
        assert_eq!(lines[10], "Grade,Type,Count");
        assert_eq!(lines[11], "V5-V6,sends,2");
    }

    #[test]
    fn test_block_order_and_separators() {
        let csv = render_csv(&SessionData::default()).unwrap();
        let headings: Vec<&str> = csv
            .split("\n\n")
            .map(|block| block.lines().next().unwrap_or_default())
            .collect();
        assert_eq!(
            headings,
            vec![
                "Category,Value,Unit",
                "Climbing Details",
                "Hangboard Sets Data",
                "Weighted Pulls Sets Data",
                "Power Endurance Climbs Data",
            ]
        );
    }

    #[test]
    fn test_hangboard_without_weight_is_excluded() {
        let mut data = sample();
        data.hangboard_sets[0].weight = None;
        data.hangboard_sets[1].weight = Some(12.5);
        let csv = render_csv(&data).unwrap();
        assert!(!csv.contains("\n1,Weight"));
        assert!(csv.contains("2,Weight,12.5,lbs\n2,Duration,8,s\n2,Edge Size,10,mm"));

        let rows = attribute_rows(7, &data);
        assert!(!rows.iter().any(|r| r.variable_name.starts_with("set_1_")
            && r.category == "hangboard"));
        assert!(rows
            .iter()
            .any(|r| r.variable_name == "set_2_edge_size" && r.value == "10"));
    }

    #[test]
    fn test_weighted_pull_with_only_reps_emits_one_row() {
        let mut data = SessionData::default();
        data.weighted_pulls[2] = WeightedPull {
            weight: None,
            reps: Some(5.0),
        };
        let csv = render_csv(&data).unwrap();
        let pull_block = csv.split("\n\n").nth(3).unwrap();
        assert_eq!(
            pull_block,
            "Weighted Pulls Sets Data\nSet,Metric,Value,Unit\n3,Reps,5,reps"
        );

        let rows: Vec<_> = attribute_rows(1, &data)
            .into_iter()
            .filter(|r| r.category == "weighted_pulls")
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].variable_name, "set_3_reps");
    }

    #[test]
    fn test_power_endurance_skips_blank_grades() {
        let mut data = SessionData::default();
        data.power_endurance_sets[1].grade = "V7".into();
        data.power_endurance_sets[2].grade = "   ".into();
        let csv = render_csv(&data).unwrap();
        assert!(csv.ends_with("Power Endurance Climbs Data\nClimb,Grade\n2,V7\n"));
        let rows: Vec<_> = attribute_rows(1, &data)
            .into_iter()
            .filter(|r| r.category == "power_endurance")
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, "V7");
    }

    #[test]
    fn test_attribute_rows_summary_values_are_text() {
        let rows = attribute_rows(42, &sample());
        let moves = rows
            .iter()
            .find(|r| r.variable_name == "total_moves")
            .unwrap();
        assert_eq!(moves.value, "2");
        assert_eq!(moves.session_id, 42);
        let climbing: Vec<_> = rows.iter().filter(|r| r.category == "climbing").collect();
        assert_eq!(climbing.len(), 1);
        assert_eq!(climbing[0].variable_name, "V5-V6_sends");
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["value"], serde_json::json!("65"));
    }

    #[test]
    fn test_mailto_url_encodes_body() {
        let url = mailto_url(Some("coach@example.com"), "Workout Summary", "a,b\nc d");
        assert_eq!(
            url,
            "mailto:coach%40example.com?subject=Workout%20Summary&body=a%2Cb%0Ac%20d"
        );
        assert!(mailto_url(None, "s", "b").starts_with("mailto:?subject="));
    }

    #[test]
    fn test_write_export_file() {
        let dir = tempdir().unwrap();
        let when = Local::now();
        let path = write_export_file(&dir.path().join("exports"), "Category,Value,Unit\n", when)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Category,Value,Unit\n"
        );
    }
}
