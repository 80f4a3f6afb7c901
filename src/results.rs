// CLASSIFICATION: COMMUNITY
// Filename: results.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! RI / diffusion results published on `{station}/ri/results`.
//!
//! The payload is a JSON object. Recognised averages are coerced to numbers
//! one by one; a value that cannot be coerced is dropped with a warning and
//! the rest of the update still goes through.

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::store::{RecordStore, TestRecord};

/// Averages understood by the record.
pub const NUMERIC_KEYS: [&str; 6] = [
    "ri_discharge_average",
    "ri_charge_average",
    "diffusion_discharge_average",
    "diffusion_charge_average",
    "delta_ri_average",
    "delta_diffusion_average",
];

/// Validated subset of a results payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultsUpdate {
    pub values: Vec<(&'static str, f64)>,
    pub delta_ri_cells: Option<Vec<Value>>,
    pub delta_diffusion_cells: Option<Vec<Value>>,
}

impl ResultsUpdate {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
            && self.delta_ri_cells.is_none()
            && self.delta_diffusion_cells.is_none()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Merge into a record; keys absent from the update are left untouched.
    pub fn apply(&self, record: &mut TestRecord) {
        for (key, value) in &self.values {
            let value = *value;
            match *key {
                "ri_discharge_average" => record.ri_discharge_avg = value,
                "ri_charge_average" => record.ri_charge_avg = value,
                "diffusion_discharge_average" => record.diffusion_discharge_avg = value,
                "diffusion_charge_average" => record.diffusion_charge_avg = value,
                "delta_ri_average" => record.delta_ri_avg = Some(value),
                "delta_diffusion_average" => record.delta_diffusion_avg = Some(value),
                _ => {}
            }
        }
        if let Some(cells) = &self.delta_ri_cells {
            record.delta_ri_cells = Some(cells.clone());
        }
        if let Some(cells) = &self.delta_diffusion_cells {
            record.delta_diffusion_cells = Some(cells.clone());
        }
    }
}

fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Extract the recognised fields from a decoded payload.
///
/// Returns `None` when the payload is not a JSON object.
pub fn extract(payload: &Value, station: &str) -> Option<ResultsUpdate> {
    let obj = payload.as_object()?;
    let mut update = ResultsUpdate::default();
    for key in NUMERIC_KEYS {
        let Some(raw) = obj.get(key) else { continue };
        match coerce(raw) {
            Some(v) => {
                debug!("{station}: {key} = {v}");
                update.values.push((key, v));
            }
            None => warn!("{station}: invalid value for {key}: {raw}; ignored"),
        }
    }
    if let Some(Value::Array(cells)) = obj.get("delta_ri_cells") {
        update.delta_ri_cells = Some(cells.clone());
    }
    if let Some(Value::Array(cells)) = obj.get("delta_diffusion_cells") {
        update.delta_diffusion_cells = Some(cells.clone());
    }
    Some(update)
}

/// Handle one `ri/results` payload. Returns whether the record is current.
pub fn handle(payload: &str, station: &str, records: &RecordStore) -> bool {
    let decoded: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            error!("{station}: ri/results is not JSON: {e}; payload {payload:?}");
            return false;
        }
    };
    info!("{station}: RI results received: {decoded}");
    let Some(update) = extract(&decoded, station) else {
        error!("{station}: ri/results is not an object; nothing updated");
        return false;
    };
    if update.is_empty() {
        warn!("{station}: ri/results carried no usable value");
        return true;
    }
    let ok = records.update(|r| update.apply(r));
    if ok {
        let keys: Vec<&str> = update.values.iter().map(|(k, _)| *k).collect();
        info!("{station}: record updated with RI results {keys:?}");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_are_coerced_and_junk_dropped() {
        let payload = json!({
            "ri_discharge_average": "1.25",
            "ri_charge_average": 2,
            "diffusion_discharge_average": "abc",
            "diffusion_charge_average": true,
        });
        let update = extract(&payload, "banc1").unwrap();
        assert_eq!(update.get("ri_discharge_average"), Some(1.25));
        assert_eq!(update.get("ri_charge_average"), Some(2.0));
        assert_eq!(update.get("diffusion_discharge_average"), None);
        assert_eq!(update.get("diffusion_charge_average"), None);
    }

    #[test]
    fn cell_arrays_only_when_arrays() {
        let payload = json!({"delta_ri_cells": [1, 2.5], "delta_diffusion_cells": "x"});
        let update = extract(&payload, "banc1").unwrap();
        assert_eq!(update.delta_ri_cells, Some(vec![json!(1), json!(2.5)]));
        assert!(update.delta_diffusion_cells.is_none());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(extract(&json!([1, 2]), "banc1").is_none());
        assert!(extract(&json!({}), "banc1").unwrap().is_empty());
    }
}
