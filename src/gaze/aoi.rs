//! Area-of-interest classification.
//!
//! Zones are axis-aligned rectangles in normalized screen coordinates. Bounds are
//! inclusive on every edge, so a point on the shared edge of two adjacent zones
//! belongs to both.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::gaze::types::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AoiZone {
    pub name: String,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl AoiZone {
    pub fn new(name: &str, x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            name: name.to_string(),
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.x_min <= point.x
            && point.x <= self.x_max
            && self.y_min <= point.y
            && point.y <= self.y_max
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("AOI zone name must not be empty".to_string());
        }
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(format!("AOI zone '{}' has non-finite bounds", self.name));
        }
        if self.x_min > self.x_max || self.y_min > self.y_max {
            return Err(format!("AOI zone '{}' has inverted bounds", self.name));
        }
        Ok(())
    }
}

/// Returns the names of every zone containing `point`, in name order.
pub fn classify(point: &Point, zones: &[AoiZone]) -> BTreeSet<String> {
    zones
        .iter()
        .filter(|zone| zone.contains(point))
        .map(|zone| zone.name.clone())
        .collect()
}

/// Parses `name:x_min,y_min,x_max,y_max;name:...`.
pub fn parse_zones(raw: &str) -> Result<Vec<AoiZone>, String> {
    let mut zones = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, bounds) = entry
            .split_once(':')
            .ok_or_else(|| format!("AOI entry '{entry}' is missing ':'"))?;
        let values = bounds
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("AOI entry '{entry}': {e}"))?;
        let [x_min, y_min, x_max, y_max] = values[..] else {
            return Err(format!("AOI entry '{entry}' needs exactly four bounds"));
        };
        let zone = AoiZone::new(name.trim(), x_min, y_min, x_max, y_max);
        zone.validate()?;
        if zones.iter().any(|z: &AoiZone| z.name == zone.name) {
            return Err(format!("duplicate AOI zone '{}'", zone.name));
        }
        zones.push(zone);
    }
    Ok(zones)
}
