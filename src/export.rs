//! CSV export of the current inputs and derived values.
//!
//! One `Field,Value` pair per row, inputs first, so the file opens cleanly in
//! a spreadsheet.

use crate::calculator::{Calculated, GoalInputs};
use chrono::NaiveDate;

pub fn export_csv(inputs: &GoalInputs, calculated: &Calculated) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Field", "Value"])?;

    for (label, value) in inputs.labeled_values().into_iter().chain(calculated.labeled_values()) {
        writer.write_record([label, format_value(value).as_str()])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("goal-tracker-{}.csv", date.format("%Y-%m-%d"))
}

fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
